//! Startup helpers for the Drishti terminal client.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;

use crate::api::{ApiClient, ClientConfig};
use crate::cli::Repl;
use crate::store::{IdentityStore, KeyValueStore, SqliteKeyValueStore};

/// Run the interactive client (used by the `drishti` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` when the user quits, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Drishti client v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    tracing::info!("Backend endpoint: {}", config.base_url);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(run_interactive(config)) {
        tracing::error!("Client error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build the API client and restore the stored identity.
///
/// # Errors
/// Returns an error if the base URL is invalid or the store cannot be opened.
pub async fn initialize(
    config: ClientConfig,
) -> anyhow::Result<(Arc<ApiClient>, Arc<IdentityStore>)> {
    let storage_path = config.storage_path.clone();
    let api = ApiClient::new(config).context("Failed to create API client")?;

    let kv: Arc<dyn KeyValueStore> = Arc::new(
        SqliteKeyValueStore::open(&storage_path)
            .await
            .with_context(|| format!("Failed to open store at {}", storage_path.display()))?,
    );
    let identity = IdentityStore::hydrate(kv)
        .await
        .context("Failed to restore identity")?;

    Ok((Arc::new(api), Arc::new(identity)))
}

/// Run the read-eval-print loop on stdin and stdout.
///
/// # Errors
/// Returns an error if initialization or terminal I/O fails.
pub async fn run_interactive(config: ClientConfig) -> anyhow::Result<()> {
    let (api, identity) = initialize(config).await?;
    let mut repl = Repl::new(api, identity, tokio::io::stdout());
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    repl.run(stdin).await.context("Terminal I/O failed")?;
    tracing::info!("Bye");
    Ok(())
}
