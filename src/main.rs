//! slsvcd - Straylight IRC services daemon.

use slsvcd::config::{Config, LoggingConfig};
use slsvcd::session::{self, Services};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "slsvcd.toml".to_string()),
    );

    // Tracing is configured from the file, so a load failure goes to stderr.
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("slsvcd: cannot load {}: {e}", config_path.display());
            return Err(e.into());
        }
    };
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dialect = ?config.uplink.dialect,
        sid = %config.uplink.sid,
        name = %config.uplink.name,
        uplink = %format!("{}:{}", config.uplink.host, config.uplink.port),
        "Starting slsvcd"
    );

    let (svc, rx) = Services::new(config, Some(config_path)).await.map_err(|e| {
        error!(error = %e, "Failed to start");
        e
    })?;

    session::run(svc, rx).await?;
    info!("slsvcd stopped");
    Ok(())
}
