//! Read reconciliation and create-or-update orchestration.
//!
//! The proxy does not guarantee read-after-write consistency: a resource that
//! was just written may read as absent for a while. After every write the
//! [`Reconciler`] reads the resource back, retrying not-found results with
//! capped exponential backoff, until the read succeeds, fails for another
//! reason, or the kind's attempt budget runs out.
//!
//! ```text
//! START → WRITE_SENT ─┬─ error ───────────────→ FATAL_FAIL
//!                     ├─ update target missing → START (as create, once)
//!                     └─ ok → WRITE_OK → RECONCILE_LOOP(1..N)
//!                                          ├→ RECONCILED_OK
//!                                          ├→ FATAL_FAIL
//!                                          └→ EXHAUSTED_FAIL
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::audit::{ReconcileAudit, ReconcileEvent, TracingAudit};
use crate::backoff::RetryPolicy;
use crate::error::{Error, ErrorKind, Op, Result};
use crate::fields::ResourceData;
use crate::resource::{ReadOp, Resource, WriteMode};

/// An update is retried as a create at most this many times.
const MAX_CREATE_FALLBACKS: u32 = 1;

/// Outcome of a standalone read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    Present,
    Gone,
}

/// Drives writes, deletes and read-back loops for resource kinds.
///
/// Holds no per-resource state; one instance can serve any number of
/// operations, including concurrent ones on distinct resources.
#[derive(Clone)]
pub struct Reconciler {
    audit: Arc<dyn ReconcileAudit>,
    cancel: CancellationToken,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Arc::new(TracingAudit))
    }
}

impl Reconciler {
    pub fn new(audit: Arc<dyn ReconcileAudit>) -> Self {
        Self {
            audit,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling `token` interrupts pending backoff sleeps with
    /// [`Error::Cancelled`].
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Read the resource named by `data.id()` until it is visible.
    ///
    /// Not-found results are retried per `policy`; any other error is returned
    /// at once. If a read clears the identifier it is restored before the next
    /// attempt and before returning, and a clearing read that reported success
    /// counts as not found. Once the budget is spent the last not-found error
    /// is returned unchanged.
    pub async fn reconcile_read<R>(
        &self,
        read: &R,
        data: &mut ResourceData,
        policy: &RetryPolicy,
    ) -> Result<()>
    where
        R: ReadOp + ?Sized,
    {
        let kind = read.kind();
        let orig_id = data.id().to_string();
        if orig_id.is_empty() {
            return Err(Error::MissingIdentifier { kind });
        }

        let budget = policy.budget();
        let backoff = &policy.backoff;
        self.audit.record(ReconcileEvent::Started {
            kind,
            id: orig_id.clone(),
            budget,
            worst_case: backoff.worst_case(budget),
        });

        if let Some(settle) = backoff.settle {
            self.pause(settle).await?;
        }

        let mut delay = backoff.initial();
        let mut attempt = 1;
        loop {
            self.audit.record(ReconcileEvent::Attempt {
                kind,
                id: orig_id.clone(),
                attempt,
                budget,
            });

            let mut outcome = read.read(data).await;

            // Runs for every outcome: the clearing convention reports Ok,
            // the error convention leaves the identifier in place.
            if data.id().is_empty() {
                data.set_id(orig_id.clone());
                self.audit.record(ReconcileEvent::IdentifierRestored {
                    kind,
                    id: orig_id.clone(),
                    attempt,
                });
                if outcome.is_ok() {
                    outcome = Err(Error::NotFound(read.not_found_sentinel()));
                }
            }

            let err = match outcome {
                Ok(()) => {
                    self.audit.record(ReconcileEvent::Succeeded {
                        kind,
                        id: orig_id,
                        attempts: attempt,
                        budget,
                    });
                    return Ok(());
                }
                Err(err) => err,
            };

            if err.kind() == ErrorKind::Fatal {
                self.audit.record(ReconcileEvent::Fatal {
                    kind,
                    id: orig_id,
                    attempt,
                    budget,
                    error: err.to_string(),
                });
                return Err(err);
            }

            if attempt >= budget {
                self.audit.record(ReconcileEvent::Exhausted {
                    kind,
                    id: orig_id,
                    attempt,
                    budget,
                    error: err.to_string(),
                });
                return Err(err);
            }

            self.audit.record(ReconcileEvent::RetryScheduled {
                kind,
                id: orig_id.clone(),
                attempt,
                budget,
                delay,
                error: err.to_string(),
            });
            self.pause(delay).await?;
            delay = backoff.next_delay(delay);
            attempt += 1;
        }
    }

    /// Create or update the resource described by `data`, then reconcile it.
    ///
    /// On success `data.id()` names the written resource and `data` holds the
    /// fields read back from the proxy.
    pub async fn upsert<R>(&self, resource: &R, data: &mut ResourceData, mode: WriteMode) -> Result<()>
    where
        R: Resource + ?Sized,
    {
        let kind = resource.kind();
        let policy = *resource.policy();

        let mut mode = mode;
        let mut fallbacks = 0;
        let id = loop {
            let id = match mode {
                WriteMode::Create => resource.new_identifier(data)?,
                WriteMode::Update if data.id().is_empty() => {
                    return Err(Error::MissingIdentifier { kind });
                }
                WriteMode::Update => data.id().to_string(),
            };

            match resource.write(data, &id, mode).await {
                Ok(()) => break id,
                Err(err)
                    if mode == WriteMode::Update
                        && policy.create_on_missing
                        && fallbacks < MAX_CREATE_FALLBACKS
                        && err.is_target_missing() =>
                {
                    self.audit
                        .record(ReconcileEvent::FallbackToCreate { kind, id });
                    mode = WriteMode::Create;
                    fallbacks += 1;
                }
                Err(err) => return Err(err.context(mode.op(), kind)),
            }
        };

        self.audit.record(ReconcileEvent::Written {
            kind,
            id: id.clone(),
            op: mode.op(),
        });
        data.set_id(id);

        self.reconcile_read(resource, data, &policy.read).await
    }

    /// Refresh `data` once, without retrying.
    ///
    /// Absence is reported as [`ReadState::Gone`] with the identifier cleared,
    /// whichever convention the kind uses.
    pub async fn read<R>(&self, resource: &R, data: &mut ResourceData) -> Result<ReadState>
    where
        R: Resource + ?Sized,
    {
        if data.id().is_empty() {
            return Err(Error::MissingIdentifier {
                kind: resource.kind(),
            });
        }

        match resource.read(data).await {
            Ok(()) if data.id().is_empty() => Ok(ReadState::Gone),
            Ok(()) => Ok(ReadState::Present),
            Err(err) if err.is_target_missing() => {
                data.clear_id();
                Ok(ReadState::Gone)
            }
            Err(err) => Err(err),
        }
    }

    /// Delete the resource named by `data.id()`.
    ///
    /// A resource the proxy reports as absent counts as deleted. The identifier
    /// is cleared on success and kept on failure.
    pub async fn delete<R>(&self, resource: &R, data: &mut ResourceData) -> Result<()>
    where
        R: Resource + ?Sized,
    {
        let kind = resource.kind();
        if data.id().is_empty() {
            return Err(Error::MissingIdentifier { kind });
        }

        match resource.delete(data.id()).await {
            Ok(()) | Err(Error::NotFound(_)) => {
                self.audit.record(ReconcileEvent::Deleted {
                    kind,
                    id: data.id().to_string(),
                });
                data.clear_id();
                Ok(())
            }
            Err(err) => Err(err.context(Op::Delete, kind)),
        }
    }
}
