use anyhow::Result;
use clap::Parser;
use ifwatch_core::{connect_clients, Engine, EngineConfig};
use ifwatch_server::api;
use tracing::info;

/// Ifwatch — live SNMP interface traffic monitoring server.
#[derive(Parser, Debug)]
#[command(name = "ifwatch-server", version, about)]
struct Cli {
    /// Address and port to listen on.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Path to the TOML configuration file with the target list.
    #[arg(short, long, default_value = "/etc/ifwatch/config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (logs).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ifwatch_server=info,ifwatch_core=info".into()),
        )
        .init();

    let cli = Cli::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting ifwatch server"
    );

    // A malformed configuration is fatal here, before any polling begins.
    let config = EngineConfig::from_file(&cli.config)?;
    info!(
        targets = config.targets.len(),
        max_concurrent_polls = config.max_concurrent_polls,
        "Configuration loaded"
    );

    // One SNMP transport per target, then the polling engine on top.
    let clients = connect_clients(&config).await?;
    let engine = Engine::start(&config, clients);

    // The read surface: pull-only, the engine never pushes to a UI.
    let app = api::router(engine.registry());

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!(addr = %cli.listen, "Listening");

    axum::serve(listener, app).await?;

    Ok(())
}
