use checkout_engine::{events::EventProducers, SqliteDatabase, WebhookApi};
use log::*;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;

/// The most events re-processed per tick.
const RETRY_BATCH_SIZE: i64 = 50;

/// Starts the webhook retry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// On every tick, events that still have attempts left are processed again if they failed with a retryable error, or if
/// they have been stuck in `pending` or `processing` for longer than the processing lease. The latter covers events
/// whose spawned handler never ran or never finished, e.g. across a restart.
pub fn start_webhook_worker(db: SqliteDatabase, producers: EventProducers, config: &ServerConfig) -> JoinHandle<()> {
    let interval = config.webhooks.retry_interval;
    let max_attempts = config.webhooks.max_attempts;
    let lease = config.webhooks.processing_lease;
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = WebhookApi::new(db, producers).with_max_attempts(max_attempts).with_processing_lease(lease);
        info!("🕰️ Webhook retry worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running webhook retry job");
            match api.retry_failed(RETRY_BATCH_SIZE).await {
                Ok(0) => trace!("🕰️ No webhook events to retry"),
                Ok(n) => info!("🕰️ Re-processed {n} outstanding webhook events"),
                Err(e) => error!("🕰️ Error running webhook retry job: {e}"),
            }
        }
    })
}
