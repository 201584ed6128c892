//! Resource kinds managed on the proxy.

mod credential;
mod model;

pub use credential::{CredentialResource, credential_request};
pub use model::{ModelResource, model_request};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::client::Transport;
use crate::error::Error;
use crate::resource::Resource;

/// Kinds selectable by name, e.g. from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Model,
    Credential,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Model => "model",
            ResourceKind::Credential => "credential",
        }
    }

    /// Instantiate the kind with its default policy.
    pub fn resource(self, transport: Arc<dyn Transport>) -> Box<dyn Resource> {
        match self {
            ResourceKind::Model => Box::new(ModelResource::new(transport)),
            ResourceKind::Credential => Box::new(CredentialResource::new(transport)),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "model" => Ok(ResourceKind::Model),
            "credential" => Ok(ResourceKind::Credential),
            other => Err(Error::InvalidField {
                field: "kind".to_string(),
                reason: format!("unknown resource kind {other:?}, expected model or credential"),
            }),
        }
    }
}
