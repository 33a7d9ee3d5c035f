//! Ledger node binary
//!
//! Opens one ledger instance (root or child) and logs every `Requested`
//! event it emits until ctrl-c, serving Prometheus metrics on
//! `metrics_listen_addr`. Configuration comes from the TOML file named by
//! `TOKEN_LEDGER_CONFIG`, or from `TOKEN_LEDGER_*` variables.

use anyhow::Context;
use token_ledger::{Config, Ledger};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::var("TOKEN_LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => Config::from_env().context("loading config from environment")?,
    };

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        role = %config.role,
        "Starting token ledger node"
    );

    let listener = TcpListener::bind(&config.metrics_listen_addr)
        .await
        .with_context(|| format!("binding metrics on {}", config.metrics_listen_addr))?;

    let authorizer = config.authorizer();
    let ledger = Ledger::open(config, authorizer).context("opening ledger")?;
    let metrics_server = tokio::spawn(ledger.metrics().clone().serve(listener));
    let mut events = ledger.subscribe();

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let json = serde_json::to_string(&event)?;
                    tracing::info!(target: "requested", "{}", json);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Shutting down token ledger node");
    metrics_server.abort();
    ledger.shutdown().await?;
    Ok(())
}
