use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "authgate",
    version,
    about = "Account registration, login, and session tokens over HTTP"
)]
struct Cli {
    /// Path to the config file (default: ~/.authgate/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bind host, overriding the config file
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("authgate=info")),
        )
        .init();

    let config = authgate::config::Config::load(cli.config.as_deref())?;
    let host = cli
        .host
        .unwrap_or_else(|| config.gateway.host.clone());
    let port = cli.port.unwrap_or(config.gateway.port);

    authgate::gateway::run_gateway(&host, port, config).await
}
