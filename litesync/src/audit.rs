//! Reconciliation audit events.
//!
//! The reconciler reports every attempt, retry decision and outcome to a
//! [`ReconcileAudit`] sink instead of writing to a process-wide logger, so
//! callers choose where the events go and tests can inspect them.

use std::time::Duration;

/// One observable step of a reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileEvent {
    /// A read reconciliation is starting.
    Started {
        kind: &'static str,
        id: String,
        budget: u32,
        worst_case: Duration,
    },
    /// A read attempt is about to run.
    Attempt {
        kind: &'static str,
        id: String,
        attempt: u32,
        budget: u32,
    },
    /// A read cleared the identifier and it was put back.
    IdentifierRestored {
        kind: &'static str,
        id: String,
        attempt: u32,
    },
    /// The resource was not visible yet; the next attempt follows after `delay`.
    RetryScheduled {
        kind: &'static str,
        id: String,
        attempt: u32,
        budget: u32,
        delay: Duration,
        error: String,
    },
    Succeeded {
        kind: &'static str,
        id: String,
        attempts: u32,
        budget: u32,
    },
    /// A non-retryable error stopped the loop.
    Fatal {
        kind: &'static str,
        id: String,
        attempt: u32,
        budget: u32,
        error: String,
    },
    /// Every attempt reported the resource as absent.
    Exhausted {
        kind: &'static str,
        id: String,
        attempt: u32,
        budget: u32,
        error: String,
    },
    /// An update found no target and is being retried as a create.
    FallbackToCreate { kind: &'static str, id: String },
    /// A write was accepted by the proxy.
    Written {
        kind: &'static str,
        id: String,
        op: crate::Op,
    },
    Deleted { kind: &'static str, id: String },
}

/// Sink for reconciliation events.
pub trait ReconcileAudit: Send + Sync {
    fn record(&self, event: ReconcileEvent);
}

/// Emits events as structured `tracing` records under the `litesync::reconcile` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl ReconcileAudit for TracingAudit {
    fn record(&self, event: ReconcileEvent) {
        match event {
            ReconcileEvent::Started {
                kind,
                id,
                budget,
                worst_case,
            } => {
                tracing::info!(target: "litesync::reconcile", kind, id = %id, budget, worst_case = ?worst_case, "Starting read reconciliation")
            }
            ReconcileEvent::Attempt {
                kind,
                id,
                attempt,
                budget,
            } => {
                tracing::info!(target: "litesync::reconcile", kind, id = %id, attempt, budget, "Attempting to read {} (attempt {}/{})", kind, attempt, budget)
            }
            ReconcileEvent::IdentifierRestored { kind, id, attempt } => {
                tracing::debug!(target: "litesync::reconcile", kind, id = %id, attempt, "Read cleared the identifier, restored it")
            }
            ReconcileEvent::RetryScheduled {
                kind,
                id,
                attempt,
                budget,
                delay,
                error,
            } => {
                tracing::info!(target: "litesync::reconcile", kind, id = %id, attempt, budget, delay = ?delay, error = %error, "{} not found yet, retrying in {:?}", kind, delay)
            }
            ReconcileEvent::Succeeded {
                kind,
                id,
                attempts,
                budget,
            } => {
                tracing::info!(target: "litesync::reconcile", kind, id = %id, attempts, budget, "Read {} after {}/{} attempts", kind, attempts, budget)
            }
            ReconcileEvent::Fatal {
                kind,
                id,
                attempt,
                budget,
                error,
            } => {
                tracing::error!(target: "litesync::reconcile", kind, id = %id, attempt, budget, error = %error, "Non-retryable error reading {} (attempt {}/{})", kind, attempt, budget)
            }
            ReconcileEvent::Exhausted {
                kind,
                id,
                attempt,
                budget,
                error,
            } => {
                tracing::warn!(target: "litesync::reconcile", kind, id = %id, attempt, budget, error = %error, "Failed to read {} after {} attempts", kind, attempt)
            }
            ReconcileEvent::FallbackToCreate { kind, id } => {
                tracing::warn!(target: "litesync::reconcile", kind, id = %id, "Update target missing, creating {} instead", kind)
            }
            ReconcileEvent::Written { kind, id, op } => {
                tracing::info!(target: "litesync::reconcile", kind, id = %id, op = %op, "{} {} accepted", kind, op)
            }
            ReconcileEvent::Deleted { kind, id } => {
                tracing::info!(target: "litesync::reconcile", kind, id = %id, "{} deleted", kind)
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl ReconcileAudit for NoopAudit {
    fn record(&self, _event: ReconcileEvent) {}
}
