use anyhow::Context;
use deployment::Deployment;
use server::{DeploymentImpl, app};
use utils::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may be set some other way.
    let _ = dotenvy::dotenv();
    init_tracing();

    let deployment = DeploymentImpl::new()
        .await
        .context("failed to initialise deployment")?;
    let sweeps = deployment.spawn_background_tasks();

    let addr = deployment.config().bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server running on http://{addr}");

    axum::serve(listener, app(deployment))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeps.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
