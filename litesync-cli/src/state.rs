//! Local state file holding the last reconciled field set.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use litesync::ResourceData;
use serde_json::Value;

/// Default state path for a manifest: `model.json` → `model.state.json`.
pub fn default_path(manifest: &Path) -> PathBuf {
    manifest.with_extension("state.json")
}

/// Load a manifest: a JSON object of declared fields.
pub async fn load_manifest(path: &Path) -> Result<ResourceData> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    match value {
        Value::Object(fields) => Ok(ResourceData::from_fields(fields)),
        _ => bail!("manifest {} must be a JSON object", path.display()),
    }
}

/// Load a state file. A missing file means no prior state.
pub async fn load(path: &Path) -> Result<Option<ResourceData>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read state {}", path.display()));
        }
    };
    let data = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse state {}", path.display()))?;
    Ok(Some(data))
}

pub async fn save(path: &Path, data: &ResourceData) -> Result<()> {
    let encoded = serde_json::to_string_pretty(data)?;
    tokio::fs::write(path, encoded + "\n")
        .await
        .with_context(|| format!("failed to write state {}", path.display()))
}
