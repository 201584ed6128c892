//! Stored provider credentials (`/credentials`).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::backoff::RetryPolicy;
use crate::client::{ApiRequest, NotFoundSignal, Transport};
use crate::error::{Error, Op, Result};
use crate::fields::ResourceData;
use crate::resource::{AbsenceSignal, KindPolicy, ReadOp, Resource, WriteMode};

const KIND: &str = "credential";

const SIGNAL: NotFoundSignal = NotFoundSignal {
    sentinel: "credential_not_found",
    markers: &["credential_not_found"],
};

/// A named credential on the proxy. The name is the identifier.
///
/// Reads report absence by clearing the identifier. Secret values are sent but
/// never read back.
pub struct CredentialResource {
    transport: Arc<dyn Transport>,
    policy: KindPolicy,
}

impl CredentialResource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: KindPolicy {
                read: RetryPolicy::credential(),
                absence: AbsenceSignal::ClearsIdentifier,
                create_on_missing: false,
            },
        }
    }

    pub fn with_read_policy(mut self, read: RetryPolicy) -> Self {
        self.policy.read = read;
        self
    }
}

/// Build the create (`POST /credentials`) or update
/// (`PATCH /credentials/{name}`) body.
pub fn credential_request(data: &ResourceData, name: &str, mode: WriteMode) -> Value {
    let mut body = Map::new();
    body.insert("credential_name".into(), json!(name));
    if mode == WriteMode::Create {
        let model_id = data.get_str("model_id");
        if !model_id.is_empty() {
            body.insert("model_id".into(), json!(model_id));
        }
    }
    body.insert(
        "credential_info".into(),
        Value::Object(data.get_map("credential_info")),
    );
    body.insert(
        "credential_values".into(),
        Value::Object(data.get_map("credential_values")),
    );
    Value::Object(body)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CredentialEntry {
    credential_name: Option<String>,
    credential_info: Option<Map<String, Value>>,
}

#[async_trait]
impl ReadOp for CredentialResource {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn not_found_sentinel(&self) -> &'static str {
        SIGNAL.sentinel
    }

    async fn read(&self, data: &mut ResourceData) -> Result<()> {
        let mut request = ApiRequest::new(Method::GET, ["credentials", "by_name", data.id()]);
        let model_id = data.get_str("model_id");
        if !model_id.is_empty() {
            request = request.query("model_id", model_id);
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.context(Op::Read, KIND))?;

        let entry = match response
            .into_result(&SIGNAL)
            .and_then(|body| Ok(serde_json::from_value::<CredentialEntry>(body)?))
        {
            Ok(entry) => entry,
            Err(err) => return self.policy.absence.absorb(err, data, KIND),
        };

        let name = entry
            .credential_name
            .unwrap_or_else(|| data.id().to_string());
        data.set("credential_name", name);
        data.set(
            "credential_info",
            Value::Object(entry.credential_info.unwrap_or_default()),
        );
        Ok(())
    }
}

#[async_trait]
impl Resource for CredentialResource {
    fn policy(&self) -> &KindPolicy {
        &self.policy
    }

    fn new_identifier(&self, data: &ResourceData) -> Result<String> {
        let name = data.get_str("credential_name");
        if name.is_empty() {
            return Err(Error::InvalidField {
                field: "credential_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(name.to_string())
    }

    async fn write(&self, data: &ResourceData, id: &str, mode: WriteMode) -> Result<()> {
        let request = match mode {
            WriteMode::Create => ApiRequest::new(Method::POST, ["credentials"]),
            WriteMode::Update => ApiRequest::new(Method::PATCH, ["credentials", id]),
        }
        .json(credential_request(data, id, mode));
        self.transport.send(request).await?.into_result(&SIGNAL)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let request = ApiRequest::new(Method::DELETE, ["credentials", id]);
        self.transport.send(request).await?.into_result(&SIGNAL)?;
        Ok(())
    }
}
