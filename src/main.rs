//! Dataverse command-line client.

use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

use dataverse_client::commands;
use dataverse_client::config::{Args, Config, LogFormat};
use dataverse_client::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    let command = args.command.clone();
    let config: Config = args.into();

    debug!("dataverse v{}", VERSION);
    debug!("Client config: {:?}", config.client);

    commands::run(config, command).await
}
