use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use movie_api::cli::Args;
use movie_api::server;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.load_config()?;

    server::run(args, config).await
}
