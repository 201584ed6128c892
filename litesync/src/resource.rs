//! Resource kind contract.
//!
//! Each kind (model, credential) knows how to map its fields into requests,
//! how to read itself back, and how the proxy tells it that it is absent.

use async_trait::async_trait;

use crate::backoff::RetryPolicy;
use crate::error::{Error, Op, Result};
use crate::fields::ResourceData;

/// Whether a write creates a new resource or changes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

impl WriteMode {
    pub fn op(self) -> Op {
        match self {
            WriteMode::Create => Op::Create,
            WriteMode::Update => Op::Update,
        }
    }
}

/// How a kind's read reports that the resource does not exist.
///
/// The two conventions are kept per kind rather than unified: the reconciler
/// handles both the same way, but standalone reads surface them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsenceSignal {
    /// Clear the identifier and return `Ok`.
    ClearsIdentifier,
    /// Return [`Error::NotFound`] and leave the identifier alone.
    ReturnsError,
}

impl AbsenceSignal {
    /// Apply the convention to a not-found read error. Other errors pass
    /// through wrapped as `failed to read <kind>: ...`.
    pub fn absorb(self, err: Error, data: &mut ResourceData, kind: &'static str) -> Result<()> {
        match (err, self) {
            (Error::NotFound(_), AbsenceSignal::ClearsIdentifier) => {
                data.clear_id();
                Ok(())
            }
            (err @ Error::NotFound(_), AbsenceSignal::ReturnsError) => Err(err),
            (err, _) => Err(err.context(Op::Read, kind)),
        }
    }
}

/// Per-kind reconciliation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    /// Attempt budget and backoff for read reconciliation after a write.
    pub read: RetryPolicy,
    pub absence: AbsenceSignal,
    /// Retry an update whose target is missing as a create (once).
    pub create_on_missing: bool,
}

/// A read-back operation the reconciler can drive.
#[async_trait]
pub trait ReadOp: Send + Sync {
    /// Kind name used in messages, e.g. `model`.
    fn kind(&self) -> &'static str;

    /// Message of the not-found error synthesized when a read clears the
    /// identifier.
    fn not_found_sentinel(&self) -> &'static str;

    /// Read the resource named by `data.id()` and refresh `data` from it.
    async fn read(&self, data: &mut ResourceData) -> Result<()>;
}

/// A remote resource kind with full lifecycle.
#[async_trait]
pub trait Resource: ReadOp {
    fn policy(&self) -> &KindPolicy;

    /// Identifier for a resource about to be created.
    fn new_identifier(&self, data: &ResourceData) -> Result<String>;

    /// Send a create or update for `data` under `id`.
    ///
    /// A missing update target is reported as an unwrapped
    /// [`Error::NotFound`]; the caller adds operation context.
    async fn write(&self, data: &ResourceData, id: &str, mode: WriteMode) -> Result<()>;

    /// Send the delete request for `id`. Errors are unwrapped.
    async fn delete(&self, id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clearing_convention_absorbs_not_found() {
        let mut data = ResourceData::new();
        data.set_id("aws");
        AbsenceSignal::ClearsIdentifier
            .absorb(Error::NotFound("credential_not_found"), &mut data, "credential")
            .unwrap();
        assert_eq!(data.id(), "");
    }

    #[test]
    fn test_error_convention_keeps_identifier() {
        let mut data = ResourceData::new();
        data.set_id("m-1");
        let err = AbsenceSignal::ReturnsError
            .absorb(Error::NotFound("model_not_found"), &mut data, "model")
            .unwrap_err();
        assert!(err.is_target_missing());
        assert_eq!(data.id(), "m-1");
    }

    #[test]
    fn test_other_errors_are_wrapped() {
        let mut data = ResourceData::new();
        data.set_id("aws");
        let err = AbsenceSignal::ClearsIdentifier
            .absorb(Error::Cancelled, &mut data, "credential")
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to read credential: operation cancelled");
        assert_eq!(data.id(), "aws");
    }
}
