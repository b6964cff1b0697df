use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use servicecrm::{
    auth::jwt::JwtService, config::AppConfig, db, default_handlers, notify, state::AppState,
    workers::escalation::EscalationSweep, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 2,
        webhook_enabled = config.notification_webhook_url.is_some(),
        max_attempts = config.notification_max_attempts,
        sweep_interval_secs = config.sla_sweep_interval_seconds,
        "loaded servicecrm configuration"
    );
    // One connection for the job loop, one for the escalation sweep.
    let pool = db::init_pool_with_size(&config.database_url, 2)?;
    let notifier = notify::from_config(config.notification_webhook_url.as_deref())?;
    let jwt = JwtService::from_config(&config)?;
    let poll_interval = Duration::from_secs(config.worker_poll_interval_seconds.max(1));
    let sweep_interval = Duration::from_secs(config.sla_sweep_interval_seconds);

    let state = Arc::new(AppState::new(pool, config, notifier, jwt));
    let worker = Worker::new(state.clone(), default_handlers(), poll_interval);
    let sweep = EscalationSweep::new(state, sweep_interval);

    tokio::select! {
        _ = worker.run() => {}
        _ = sweep.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
