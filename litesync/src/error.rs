//! Error types and retry classification.

use std::fmt;

use thiserror::Error;

/// Operation a context wrapper refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    Read,
    Delete,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Create => write!(f, "create"),
            Op::Update => write!(f, "update"),
            Op::Read => write!(f, "read"),
            Op::Delete => write!(f, "delete"),
        }
    }
}

/// Retry decision for a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The resource is not visible yet; another read may find it.
    RetryableNotFound,
    /// Anything else. Never retried.
    Fatal,
}

/// Errors that can occur while talking to the proxy or reconciling state.
#[derive(Debug, Error)]
pub enum Error {
    /// The proxy reported the resource as absent. Carries the kind's sentinel.
    #[error("{0}")]
    NotFound(&'static str),

    /// The request never produced a response.
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// The proxy answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// A response body did not have the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// An operation needed an identifier but the field set has none.
    #[error("{kind} has no identifier")]
    MissingIdentifier { kind: &'static str },

    /// A declared field cannot be mapped into a request.
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    /// Client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The reconciliation was cancelled while waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// Context wrapper added at the operation boundary.
    #[error("failed to {op} {kind}: {source}")]
    Operation {
        op: Op,
        kind: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap with `failed to <op> <kind>: ...`.
    pub fn context(self, op: Op, kind: &'static str) -> Self {
        Error::Operation {
            op,
            kind,
            source: Box::new(self),
        }
    }

    /// Retry classification.
    ///
    /// A read wrapper reports the kind of what it wraps. Create, update and
    /// delete wrappers are always fatal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::RetryableNotFound,
            Error::Operation {
                op: Op::Read,
                source,
                ..
            } => source.kind(),
            _ => ErrorKind::Fatal,
        }
    }

    /// True for an unwrapped `NotFound`, the shape a write reports when its
    /// target is missing.
    pub fn is_target_missing(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Classify the outcome of a read.
///
/// `None` means the read succeeded; success is not a failure to retry, so it
/// classifies as [`ErrorKind::Fatal`] and callers must check for success first.
pub fn classify(err: Option<&Error>) -> ErrorKind {
    match err {
        Some(e) => e.kind(),
        None => ErrorKind::Fatal,
    }
}

/// Result type for litesync operations.
pub type Result<T> = std::result::Result<T, Error>;
