//! promload binary entry point.

use std::time::SystemTime;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use promload::config::load_config;
use promload::{CliArgs, MigrationConfig, RemoteClient, migrate};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Parse CLI arguments
    let args = CliArgs::parse();

    let file_config = if let Some(config_path) = &args.config {
        match load_config(config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to load configuration: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        MigrationConfig::default()
    };

    let config = file_config
        .resolve(&args, SystemTime::now())
        .unwrap_or_else(|e| {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        });

    tracing::info!(
        "Migrating {} -> {} in {} segments of {:?}",
        config.source.url,
        config.destination.url,
        config.range.segment_count(),
        config.range.step()
    );

    let mut source = RemoteClient::with_config(config.source, config.range)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to create source client: {}", e);
            std::process::exit(1);
        });
    let mut destination = RemoteClient::with_config(config.destination, config.range)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to create destination client: {}", e);
            std::process::exit(1);
        });

    match migrate(&mut source, &mut destination).await {
        Ok(stats) => tracing::info!("Migration complete: {}", stats),
        Err(e) => {
            tracing::error!(
                "Migration failed with {} segments remaining: {}",
                source.window().remaining(),
                e
            );
            std::process::exit(1);
        }
    }
}
