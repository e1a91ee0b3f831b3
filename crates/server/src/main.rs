use anyhow::Context;
use cistern_core::config::AppConfig;
use cistern_server::{create_router, AppState, Reconciler};
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cistern-server", about = "Volume lifecycle manager")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CISTERN_CONFIG")]
    config: Option<PathBuf>,
}

fn load_config(args: &Args) -> anyhow::Result<AppConfig> {
    let mut figment = Figment::new();
    if let Some(path) = &args.config {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed("CISTERN_").split("__"))
        .extract()
        .context("loading configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cistern_server=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Arc::new(load_config(&args)?);

    let store = cistern_ledger::from_config(&config.database)
        .await
        .context("opening ledger database")?;
    store
        .health_check()
        .await
        .context("ledger database health check")?;

    let billing = cistern_clients::billing_from_config(&config.collaborators);
    let orchestrator = cistern_clients::orchestrator_from_config(&config.collaborators);

    let state = AppState::new(config.clone(), store.clone(), billing, orchestrator);

    if config.reconcile.enabled {
        Reconciler::new(state.service.clone(), store, config.reconcile.clone()).spawn();
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("failed to install ctrl-c handler");
    }
    tracing::info!("shutting down");
}
