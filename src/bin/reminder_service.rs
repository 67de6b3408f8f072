//! Delivery reminder service
//!
//! Opens the database, seeds settings, serves host requests over the IPC socket
//! and runs the escalation, digest and cleanup jobs.
//!
//! Usage: cargo run --bin reminder-service

use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info, warn};
use purchase_enhancements::features::reminders::JobIntervals;
use purchase_enhancements::{
    Config, Database, IpcServer, OutboxMailer, ReminderScheduler, ReminderService, Settings,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Purchase Enhancements reminder service...");

    let database = Database::new(&config.database_path).await?;
    let mailer = Arc::new(OutboxMailer::new(database.clone()));
    let service = ReminderService::new(database, mailer, config.base_url());

    // Seed settings from YAML on first start
    if let Some(path) = &config.settings_seed_path {
        match Settings::load_yaml(path) {
            Ok(settings) => {
                if service.settings.seed(settings).await? {
                    info!("📄 Seeded settings from {path}");
                } else {
                    info!("📄 Settings already stored, ignoring {path}");
                }
            }
            Err(e) => {
                if std::path::Path::new(path).exists() {
                    error!("❌ Failed to load settings from {path}: {e}");
                } else {
                    warn!("📄 No settings file found at {path} - using stored settings");
                }
            }
        }
    }

    let ipc_server = Arc::new(IpcServer::new(service.clone(), &config.socket_path));
    if let Err(e) = ipc_server.clone().start().await {
        error!("Failed to start IPC server: {e}. Host integration will be unavailable.");
    } else {
        info!("📡 IPC server started on {}", config.socket_path);
    }

    // Spawn IPC heartbeat task
    let heartbeat_ipc = ipc_server.clone();
    let heartbeat_every = Duration::from_secs(config.heartbeat_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_every);
        loop {
            interval.tick().await;
            heartbeat_ipc.send_heartbeat();
        }
    });

    // The scheduler runs for the life of the process
    let scheduler = ReminderScheduler::new(
        service.reminders.clone(),
        JobIntervals::from_config(&config),
    );
    scheduler.run().await;

    Ok(())
}
