use clap::Parser;
use density_viewer_server::{start_server, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = ServerConfig::parse();
    let handle = start_server(cfg).await?;
    // Park until the server task ends
    handle.await?;
    Ok(())
}
