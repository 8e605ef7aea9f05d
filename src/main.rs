//! Demo binary: wires up a durable scheduler with a couple of sample tasks
//! and runs until interrupted.

use cronkeep::{RawRegistration, SchedulerSettings, Scheduler, SqliteStateStore, SystemClock, TokioSleeper};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = SchedulerSettings::load(std::path::Path::new("cronkeep.toml"))?;
    info!(?settings, "loaded scheduler settings");

    let store = Arc::new(SqliteStateStore::connect(&settings.state_db_path).await?);
    let clock = Arc::new(SystemClock);
    let sleeper = Arc::new(TokioSleeper);

    let scheduler = Scheduler::new(
        store,
        clock,
        sleeper,
        cronkeep::Millis::from_u64(settings.polling_interval_ms),
        settings.lookback_days(),
    );

    let registrations = vec![
        RawRegistration {
            name: Some("heartbeat".to_string()),
            cron: Some("* * * * *".to_string()),
            callback: Some(Arc::new(|| {
                Box::pin(async {
                    info!("heartbeat task ran");
                    Ok(())
                })
            })),
            retry_delay_ms: None,
        },
        RawRegistration {
            name: Some("nightly-report".to_string()),
            cron: Some("0 2 * * *".to_string()),
            callback: Some(Arc::new(|| {
                Box::pin(async {
                    info!("nightly report task ran");
                    Ok(())
                })
            })),
            retry_delay_ms: Some(60_000),
        },
    ];

    let warnings = scheduler.initialize(registrations).await?;
    for warning in warnings {
        tracing::warn!(?warning, "registration warning at startup");
    }
    scheduler.start()?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping scheduler");
    scheduler.stop().await;

    Ok(())
}
