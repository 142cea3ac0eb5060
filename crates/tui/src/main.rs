mod app;

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    path::Path,
};

use idle_core::{
    config::{self, AppConfig},
    Game, ProgressObserver,
};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Stands in for the achievement and analytics services by logging.
struct LogObserver;

impl ProgressObserver for LogObserver {
    fn milestone_reached(&mut self, threshold: f64, gold: f64) {
        info!(threshold, gold, "Achievement unlocked: milestone");
    }

    fn cloud_saved(&mut self, gold: f64) {
        info!(gold, "Cloud save recorded");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config::ensure_default_config()?;
    let config = AppConfig::load_from(&config_path)?;
    init_logging(&config.data_dir)?;
    info!(config = %config_path.display(), data = %config.data_dir.display(), "Starting");

    let game = Game::start(&config, Box::new(LogObserver)).await?;
    let mut app = app::IdleApp::new(game);
    app.run().await
}

fn init_logging(data_dir: &Path) -> Result<()> {
    let log_dir = data_dir.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("idle-tycoon.log");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
