use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use worktime::clock::SystemClock;
use worktime::database::init_database;
use worktime::services::{
    ClockInCodes, LocalNotifier, LogMailer, NotificationService, NotifierPruner,
};
use worktime::{AppState, Config, Stores};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    env_logger::init();

    let config = Config::from_env()?;
    log::info!(
        "Starting worktime (environment: {}, timezone: {})",
        config.environment,
        config.timezone
    );

    let pool = init_database(&config.database_url).await?;
    log::info!("Database initialized");

    let notifier = LocalNotifier::new(64);
    let pruner = NotifierPruner::start(
        notifier.clone(),
        Duration::from_secs(config.notifier_prune_seconds.max(1)),
    );
    let notifications = NotificationService::new(Arc::new(notifier), Arc::new(LogMailer));

    let state = AppState::new(
        Stores::postgres(pool),
        notifications,
        ClockInCodes::default(),
        Arc::new(SystemClock::new(config.timezone)),
    );

    let mut scheduler = state.scheduler(&config)?;
    log::info!("Scheduled jobs: {}", scheduler.job_names().join(", "));
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    log::info!("Shutdown signal received");

    scheduler.shutdown().await;
    pruner.shutdown().await;

    Ok(())
}
