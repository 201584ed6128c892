//! litesync: apply, read and delete LiteLLM proxy resources.
//!
//! Every write is followed by read reconciliation, so a successful `apply`
//! means the proxy already serves the resource.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, Subcommand};
use litesync::{
    ClientConfig, HttpTransport, ReadState, Reconciler, ResourceData, ResourceKind, TracingAudit,
    WriteMode,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod state;

/// Reconcile LiteLLM proxy resources
#[derive(Parser, Debug)]
#[command(name = "litesync", version, about)]
struct Cli {
    /// Proxy base URL
    #[arg(long, env = "LITELLM_API_BASE", default_value = "http://localhost:4000")]
    api_base: String,

    /// Proxy API key (sent as a bearer token)
    #[arg(long, env = "LITELLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "LITELLM_TIMEOUT_SECS", default_value = "30")]
    timeout_secs: u64,

    /// Accept invalid TLS certificates
    #[arg(long, env = "LITELLM_INSECURE_SKIP_VERIFY")]
    insecure_skip_verify: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or update a resource from a JSON manifest
    Apply {
        /// Resource kind: model or credential
        #[arg(long)]
        kind: ResourceKind,

        /// Manifest with the declared fields
        #[arg(long)]
        file: PathBuf,

        /// State file (defaults to the manifest name with .state.json)
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// Read a resource once and print its fields
    Get {
        #[arg(long)]
        kind: ResourceKind,

        /// Model id or credential name
        #[arg(long)]
        id: String,
    },

    /// Delete a resource
    #[command(group(ArgGroup::new("target").required(true).args(["id", "state"])))]
    Delete {
        #[arg(long)]
        kind: ResourceKind,

        /// Model id or credential name
        #[arg(long)]
        id: Option<String>,

        /// State file written by apply; updated after the delete
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            insecure_skip_verify: self.insecure_skip_verify,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "litesync=info,litesync_cli=info,reqwest=warn,hyper=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let transport = Arc::new(
        HttpTransport::new(&cli.client_config()).context("failed to configure proxy client")?,
    );

    let cancel = CancellationToken::new();
    let reconciler = Reconciler::new(Arc::new(TracingAudit)).with_cancellation(cancel.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Apply { kind, file, state } => {
            let resource = kind.resource(transport);
            let state_path = state.unwrap_or_else(|| state::default_path(&file));

            let mut data = state::load_manifest(&file).await?;
            let prior = state::load(&state_path).await?;
            let mode = match prior {
                Some(prior) if !prior.id().is_empty() => {
                    data.set_id(prior.id());
                    WriteMode::Update
                }
                _ => WriteMode::Create,
            };

            info!(kind = %kind, file = %file.display(), ?mode, "Applying manifest");
            let outcome = reconciler.upsert(resource.as_ref(), &mut data, mode).await;

            // Keep the identifier even when reconciliation did not converge.
            if !data.id().is_empty() {
                state::save(&state_path, &data).await?;
            }
            outcome.with_context(|| format!("failed to apply {}", file.display()))?;

            info!(kind = %kind, id = %data.id(), state = %state_path.display(), "Applied");
            print_fields(&data)?;
        }

        Commands::Get { kind, id } => {
            let resource = kind.resource(transport);
            let mut data = ResourceData::new();
            data.set_id(id.clone());

            match reconciler.read(resource.as_ref(), &mut data).await? {
                ReadState::Present => print_fields(&data)?,
                ReadState::Gone => bail!("{kind} {id} not found"),
            }
        }

        Commands::Delete { kind, id, state } => {
            let resource = kind.resource(transport);
            let recorded = match &state {
                Some(path) => state::load(path).await?,
                None => None,
            };
            let Some(mut data) = delete_target(recorded, id) else {
                info!(kind = %kind, "Nothing to delete");
                return Ok(());
            };

            let target = data.id().to_string();
            reconciler
                .delete(resource.as_ref(), &mut data)
                .await
                .with_context(|| format!("failed to delete {kind} {target}"))?;

            if let Some(path) = &state {
                state::save(path, &data).await?;
            }
            info!(kind = %kind, id = %target, "Deleted");
        }
    }

    Ok(())
}

/// What `delete` acts on: the recorded state, if any, with `id` overriding
/// its identifier. Other recorded fields are kept so saving the state after
/// the delete does not drop them. `None` when there is no identifier.
fn delete_target(recorded: Option<ResourceData>, id: Option<String>) -> Option<ResourceData> {
    let mut data = recorded.unwrap_or_default();
    if let Some(id) = id {
        data.set_id(id);
    }
    (!data.id().is_empty()).then_some(data)
}

fn print_fields(data: &ResourceData) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_args() {
        let cli = Cli::try_parse_from([
            "litesync",
            "--api-base",
            "https://proxy.example.com",
            "apply",
            "--kind",
            "model",
            "--file",
            "claude.json",
        ])
        .unwrap();

        assert_eq!(cli.client_config().base_url, "https://proxy.example.com");
        match cli.command {
            Commands::Apply { kind, file, state } => {
                assert_eq!(kind, ResourceKind::Model);
                assert_eq!(file, PathBuf::from("claude.json"));
                assert!(state.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_delete_needs_a_target() {
        let err = Cli::try_parse_from(["litesync", "delete", "--kind", "credential"]);
        assert!(err.is_err());

        let cli =
            Cli::try_parse_from(["litesync", "delete", "--kind", "credential", "--id", "aws"])
                .unwrap();
        assert!(matches!(cli.command, Commands::Delete { id: Some(_), .. }));
    }

    fn recorded() -> ResourceData {
        let fields = serde_json::json!({
            "credential_name": "aws",
            "credential_info": {"provider": "aws"},
        });
        let mut data = ResourceData::from_fields(fields.as_object().cloned().unwrap());
        data.set_id("aws");
        data
    }

    #[test]
    fn test_delete_target_keeps_recorded_fields() {
        let data = delete_target(Some(recorded()), Some("aws-eu".to_string())).unwrap();
        assert_eq!(data.id(), "aws-eu");
        assert_eq!(data.get_str("credential_name"), "aws");
        assert_eq!(
            data.get("credential_info"),
            Some(&serde_json::json!({"provider": "aws"}))
        );

        let data = delete_target(Some(recorded()), None).unwrap();
        assert_eq!(data, recorded());
    }

    #[test]
    fn test_delete_target_without_identifier() {
        assert!(delete_target(None, None).is_none());

        let mut cleared = recorded();
        cleared.clear_id();
        assert!(delete_target(Some(cleared), None).is_none());

        let data = delete_target(None, Some("m-1".to_string())).unwrap();
        assert_eq!(data.id(), "m-1");
        assert!(data.get("credential_name").is_none());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = Cli::try_parse_from(["litesync", "get", "--kind", "team", "--id", "t-1"]);
        assert!(err.is_err());
    }
}
