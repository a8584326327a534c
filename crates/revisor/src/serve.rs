use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api;
use crate::service::RevisionService;

/// Serve the revision API until Ctrl+C
pub async fn run(host: &str, port: u16, service: Arc<RevisionService>) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server to {}", addr))?;

    eprintln!("Revision API listening on http://{}", addr);
    tracing::info!(%addr, agent = service.agent().name(), "Server started");

    let router = api::create_router(service);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    eprintln!("\nShutting down...");
}
