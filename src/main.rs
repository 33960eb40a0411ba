use anyhow::Result;
use duet::config::Config;
use duet::logging;
use duet::signaling::SignalingServer;
use tracing::info;

const CONFIG_ENV: &str = "DUET_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "duet.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = Config::load(&config_path)?;
    logging::init(&config.logging.level, &config.logging.format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path,
        "Starting duet signaling server"
    );

    let server = SignalingServer::bind(&config.server.bind_addr, &config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Ctrl+C received, shutting down"),
    }

    Ok(())
}
