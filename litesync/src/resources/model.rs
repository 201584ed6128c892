//! Model deployments (`/model/*`).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::backoff::RetryPolicy;
use crate::client::{ApiRequest, NotFoundSignal, Transport};
use crate::error::{Error, Op, Result};
use crate::fields::ResourceData;
use crate::params;
use crate::resource::{AbsenceSignal, KindPolicy, ReadOp, Resource, WriteMode};

const KIND: &str = "model";

/// Absence as reported by `/model/info`, which words it several ways.
const SIGNAL: NotFoundSignal = NotFoundSignal {
    sentinel: "model_not_found",
    markers: &["not found", "Model id =", "model_not_found"],
};

/// Absence as reported by writes and deletes. Only the sentinel counts: other
/// "not found" messages name a missing dependency, not the model.
const WRITE_SIGNAL: NotFoundSignal = NotFoundSignal {
    sentinel: "model_not_found",
    markers: &["model_not_found"],
};

/// String fields copied into `litellm_params` when non-empty, as
/// (field, param) pairs.
const OPTIONAL_STRINGS: &[(&str, &str)] = &[
    ("model_api_key", "api_key"),
    ("model_api_base", "api_base"),
    ("api_version", "api_version"),
    ("aws_access_key_id", "aws_access_key_id"),
    ("aws_secret_access_key", "aws_secret_access_key"),
    ("aws_region_name", "aws_region_name"),
    ("aws_session_name", "aws_session_name"),
    ("aws_role_name", "aws_role_name"),
    ("vertex_project", "vertex_project"),
    ("vertex_location", "vertex_location"),
    ("vertex_credentials", "vertex_credentials"),
    ("reasoning_effort", "reasoning_effort"),
];

/// Rate limits copied when positive.
const OPTIONAL_LIMITS: &[&str] = &["tpm", "rpm"];

/// Per-pixel and per-second prices copied when positive.
const OPTIONAL_COSTS: &[&str] = &[
    "input_cost_per_pixel",
    "output_cost_per_pixel",
    "input_cost_per_second",
    "output_cost_per_second",
];

/// A model deployment on the proxy.
///
/// Identified by a generated UUID stored in `model_info.id`. Reads report
/// absence as [`Error::NotFound`], and an update whose target has vanished is
/// retried once as a create.
pub struct ModelResource {
    transport: Arc<dyn Transport>,
    policy: KindPolicy,
}

impl ModelResource {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            policy: KindPolicy {
                read: RetryPolicy::model(),
                absence: AbsenceSignal::ReturnsError,
                create_on_missing: true,
            },
        }
    }

    /// Replace the read-back retry policy.
    pub fn with_read_policy(mut self, read: RetryPolicy) -> Self {
        self.policy.read = read;
        self
    }
}

/// Build the `/model/new` and `/model/update` body for `data` under `id`.
pub fn model_request(data: &ResourceData, id: &str) -> Value {
    let provider = data.get_str("custom_llm_provider");
    let base_model = data.get_str("base_model");

    let mut litellm = Map::new();
    litellm.insert("custom_llm_provider".into(), json!(provider));
    litellm.insert("model".into(), json!(format!("{provider}/{base_model}")));
    litellm.insert(
        "input_cost_per_token".into(),
        json!(data.get_f64("input_cost_per_million_tokens") / 1_000_000.0),
    );
    litellm.insert(
        "output_cost_per_token".into(),
        json!(data.get_f64("output_cost_per_million_tokens") / 1_000_000.0),
    );
    litellm.insert(
        "merge_reasoning_content_in_choices".into(),
        json!(data.get_bool("merge_reasoning_content_in_choices")),
    );

    for key in OPTIONAL_LIMITS {
        let value = data.get_i64(key);
        if value > 0 {
            litellm.insert((*key).into(), json!(value));
        }
    }
    for (field, param) in OPTIONAL_STRINGS {
        let value = data.get_str(field);
        if !value.is_empty() {
            litellm.insert((*param).into(), json!(value));
        }
    }
    for key in OPTIONAL_COSTS {
        let value = data.get_f64(key);
        if value > 0.0 {
            litellm.insert((*key).into(), json!(value));
        }
    }

    if data.get_bool("thinking_enabled") {
        litellm.insert(
            "thinking".into(),
            json!({
                "type": "enabled",
                "budget_tokens": data.get_i64("thinking_budget_tokens"),
            }),
        );
    }

    if let Some(Value::Object(extra)) = data.get_ok("additional_litellm_params") {
        params::merge_additional(&mut litellm, extra);
    }

    json!({
        "model_name": data.get_str("model_name"),
        "litellm_params": litellm,
        "model_info": {
            "id": id,
            "db_model": true,
            "base_model": base_model,
            "tier": data.get_str("tier"),
            "mode": data.get_str("mode"),
            "team_id": data.get_str("team_id"),
        },
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelEntry {
    model_name: Option<String>,
    litellm_params: LitellmParams,
    model_info: ModelInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LitellmParams {
    custom_llm_provider: Option<String>,
    tpm: Option<i64>,
    rpm: Option<i64>,
    api_base: Option<String>,
    api_version: Option<String>,
    aws_region_name: Option<String>,
    thinking: Option<Map<String, Value>>,
    merge_reasoning_content_in_choices: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelInfo {
    base_model: Option<String>,
    tier: Option<String>,
    mode: Option<String>,
    team_id: Option<String>,
}

/// `/model/info` answers with `{"data": [...]}`; an empty list means the id
/// is unknown. A bare entry is accepted as well.
fn decode_info(body: Value) -> Result<ModelEntry> {
    let entry = match body {
        Value::Object(mut obj) if obj.contains_key("data") => match obj.remove("data") {
            Some(Value::Array(items)) => items
                .into_iter()
                .next()
                .ok_or(Error::NotFound(SIGNAL.sentinel))?,
            _ => return Err(Error::NotFound(SIGNAL.sentinel)),
        },
        other => other,
    };
    Ok(serde_json::from_value(entry)?)
}

fn refresh_str(data: &mut ResourceData, key: &str, remote: Option<String>) {
    if let Some(value) = remote.filter(|v| !v.is_empty()) {
        data.set(key, value);
    }
}

fn refresh_i64(data: &mut ResourceData, key: &str, remote: Option<i64>) {
    if let Some(value) = remote.filter(|v| *v != 0) {
        data.set(key, value);
    }
}

/// Copy what the proxy reports back into `data`.
///
/// Remote values win when non-empty; secrets and prices are never returned and
/// keep their declared values. Thinking and reasoning-merge settings are only
/// taken from the proxy when the caller never declared them.
fn apply_entry(data: &mut ResourceData, entry: ModelEntry) {
    let params = entry.litellm_params;
    let info = entry.model_info;

    refresh_str(data, "model_name", entry.model_name);
    refresh_str(data, "custom_llm_provider", params.custom_llm_provider);
    refresh_i64(data, "tpm", params.tpm);
    refresh_i64(data, "rpm", params.rpm);
    refresh_str(data, "model_api_base", params.api_base);
    refresh_str(data, "api_version", params.api_version);
    refresh_str(data, "base_model", info.base_model);
    refresh_str(data, "tier", info.tier);
    refresh_str(data, "mode", info.mode);
    refresh_str(data, "team_id", info.team_id);
    refresh_str(data, "aws_region_name", params.aws_region_name);

    if data.get_ok("thinking_enabled").is_none() {
        let thinking = params.thinking.unwrap_or_default();
        let enabled = thinking.get("type").and_then(Value::as_str) == Some("enabled");
        data.set("thinking_enabled", enabled);
        if enabled {
            if let Some(budget) = thinking.get("budget_tokens").and_then(Value::as_f64) {
                data.set("thinking_budget_tokens", budget as i64);
            }
        }
    }

    if data.get_ok("merge_reasoning_content_in_choices").is_none() {
        data.set(
            "merge_reasoning_content_in_choices",
            params.merge_reasoning_content_in_choices.unwrap_or_default(),
        );
    }
}

#[async_trait]
impl ReadOp for ModelResource {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn not_found_sentinel(&self) -> &'static str {
        SIGNAL.sentinel
    }

    async fn read(&self, data: &mut ResourceData) -> Result<()> {
        let request = ApiRequest::new(Method::GET, ["model", "info"])
            .query("litellm_model_id", data.id());
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.context(Op::Read, KIND))?;

        let entry = match response.into_result(&SIGNAL).and_then(decode_info) {
            Ok(entry) => entry,
            Err(err) => return self.policy.absence.absorb(err, data, KIND),
        };

        debug!(id = %data.id(), "Refreshing model from proxy");
        apply_entry(data, entry);
        Ok(())
    }
}

#[async_trait]
impl Resource for ModelResource {
    fn policy(&self) -> &KindPolicy {
        &self.policy
    }

    fn new_identifier(&self, _data: &ResourceData) -> Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn write(&self, data: &ResourceData, id: &str, mode: WriteMode) -> Result<()> {
        let endpoint = match mode {
            WriteMode::Create => "new",
            WriteMode::Update => "update",
        };
        let request = ApiRequest::new(Method::POST, ["model", endpoint]).json(model_request(data, id));
        self.transport.send(request).await?.into_result(&WRITE_SIGNAL)?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let request = ApiRequest::new(Method::POST, ["model", "delete"]).json(json!({ "id": id }));
        self.transport.send(request).await?.into_result(&WRITE_SIGNAL)?;
        Ok(())
    }
}
