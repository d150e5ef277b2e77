//! wasm-host CLI entry point.
//!
//! Loads a TOML configuration, spawns the components it lists, and runs
//! until interrupted.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wasm_host_common::ConfigFile;
use wasm_host_system::{HostSystemManager, WasmSource};

#[derive(Debug, Parser)]
#[command(name = "wasm-host", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "WASM_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "WASM_HOST_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,wasm_host=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Component paths are relative to the configuration file.
fn resolve(base: Option<&Path>, path: &str) -> PathBuf {
    match base {
        Some(dir) if Path::new(path).is_relative() => dir.join(path),
        _ => PathBuf::from(path),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    info!("Starting wasm-host");

    let config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ConfigFile::default(),
    };
    let base = cli.config.as_deref().and_then(Path::parent);

    let manager = HostSystemManager::with_config(&config.host)?;

    for entry in config.components {
        let path = resolve(base, &entry.path);
        let component_id = entry.id.clone();

        if let Err(e) = manager
            .spawn_component(
                entry.id,
                WasmSource::Path(path),
                entry.metadata,
                entry.capabilities,
            )
            .await
        {
            warn!(%component_id, error = %e, "Skipping component");
        }
    }

    let components = manager.list_components()?;
    info!(count = components.len(), "Components running. Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Shutting down");
    manager.shutdown().await?;

    Ok(())
}
