//! Ferry server binary.

use anyhow::{Context, Result};
use clap::Parser;
use ferry_core::config::AppConfig;
use ferry_server::{AppState, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Ferry - an ephemeral file-sharing server
#[derive(Parser, Debug)]
#[command(name = "ferryd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "FERRY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `FERRY_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("FERRY_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Ferry v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    ferry_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = ferry_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = ferry_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let validator = ferry_server::validator::from_config(&config.token_validation)
        .context("failed to initialize token validator")?;
    if validator.is_enabled() {
        tracing::info!("One-time token protection enabled");
    }

    let state = AppState::new(config.clone(), storage, metadata, validator);

    match state.sweeper() {
        Some(sweeper) => {
            sweeper.spawn();
            tracing::info!("Expiry sweeper spawned");
        }
        None => tracing::info!("Expiry sweeper disabled"),
    }

    let app = create_router(state);
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo records the remote address of each upload.
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::config::{MetadataConfig, StorageConfig};
    use tempfile::tempdir;

    #[test]
    fn load_config_from_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "127.0.0.1:9000"
max_file_size = 1024

[storage]
type = "filesystem"
path = "/var/lib/ferry/files"

[metadata]
type = "sqlite"
path = "/var/lib/ferry/metadata.db"

[sweeper]
min_interval_secs = 10
max_interval_secs = 20
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.server.max_file_size, 1024);
        assert!(matches!(config.storage, StorageConfig::Filesystem { .. }));
        assert!(matches!(config.metadata, MetadataConfig::Sqlite { .. }));
        assert_eq!(config.sweeper.max_interval_secs, 20);
    }

    #[test]
    fn load_config_rejects_invalid_sweeper_window() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(
            &path,
            "[sweeper]\nmin_interval_secs = 30\nmax_interval_secs = 10\n",
        )
        .unwrap();

        let err = load_config(path.to_str().unwrap()).unwrap_err();
        assert!(format!("{err:#}").contains("invalid configuration"));
    }
}
