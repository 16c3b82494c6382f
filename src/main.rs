use anyhow::{Context as _, Result};
use std::sync::Arc;

use clap::Parser;
use tokio::{sync::oneshot, time::Duration};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = cni_agent::config::Cli::parse();
    let cmd = cli.command.clone().unwrap_or(cni_agent::config::Command::Run);

    match cmd {
        cni_agent::config::Command::Run => run_server(cli.config).await,
    }
}

async fn run_server(config: cni_agent::config::Config) -> Result<()> {
    // Volatile by design: plugins re-register after an agent restart.
    let store = Arc::new(cni_agent::state::AgentStore::new());

    let app = cni_agent::http::build_router(store)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(
        bind = %config.bind,
        version = cni_agent::version::VERSION,
        "starting cni-agent"
    );
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("bind {}", config.bind))?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        res = &mut server => {
            res.context("join server task")?.context("server exited with error")?;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    info!("shutdown requested, draining in-flight requests");
    let _ = shutdown_tx.send(());
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(res) => res
            .context("join server task")?
            .context("server exited with error")?,
        Err(_) => warn!(
            grace_secs = config.shutdown_grace_secs,
            "in-flight requests did not finish before the grace period"
        ),
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).compact().init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
