//! Eventual-consistency reconciliation for LiteLLM proxy resources.
//!
//! The proxy may answer "not found" for a resource it accepted a moment ago.
//! [`Reconciler`] turns create, update and delete into operations that either
//! end with a readable resource and its identifier in the caller's
//! [`ResourceData`], or fail with a classified error.
//!
//! ```no_run
//! use std::sync::Arc;
//! use litesync::{ClientConfig, HttpTransport, ModelResource, Reconciler, ResourceData, WriteMode};
//!
//! # async fn run() -> litesync::Result<()> {
//! let transport = Arc::new(HttpTransport::new(&ClientConfig::new("http://localhost:4000"))?);
//! let models = ModelResource::new(transport);
//!
//! let mut data = ResourceData::new();
//! data.set("model_name", "claude-sonnet");
//! data.set("custom_llm_provider", "anthropic");
//! data.set("base_model", "claude-sonnet-4");
//!
//! Reconciler::default()
//!     .upsert(&models, &mut data, WriteMode::Create)
//!     .await?;
//! println!("created {}", data.id());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod backoff;
pub mod client;
pub mod error;
pub mod fields;
pub mod params;
pub mod reconciler;
pub mod resource;
pub mod resources;

pub use audit::{NoopAudit, ReconcileAudit, ReconcileEvent, TracingAudit};
pub use backoff::{Backoff, RetryPolicy};
pub use client::{ApiRequest, ApiResponse, ClientConfig, HttpTransport, NotFoundSignal, Transport};
pub use error::{Error, ErrorKind, Op, Result, classify};
pub use fields::ResourceData;
pub use reconciler::{ReadState, Reconciler};
pub use resource::{AbsenceSignal, KindPolicy, ReadOp, Resource, WriteMode};
pub use resources::{CredentialResource, ModelResource, ResourceKind};
