use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

/// Standalone target service for local stress runs
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "test_origin=info,tower_http=info,surge_engine=info".into()),
        )
        .with_target(false)
        .init();

    let listen_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()
        .context("Invalid listen address")?;

    info!("Starting test origin v{}", env!("CARGO_PKG_VERSION"));

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    surge_engine::origin::serve(listener)
        .await
        .context("Test origin server failed")
}
