// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::AppState;

/// Expires pending quotes whose expiry has passed. A failed sweep is retried on the next tick.
pub async fn start_quote_expiry_job(app_state: Arc<AppState>) {
    let mut interval = interval(Duration::from_secs(app_state.env.quote_sweep_interval_secs.max(1)));

    loop {
        interval.tick().await;

        tracing::debug!("Running quote expiry job at {}", Utc::now());

        match app_state.quote_service.sweep_expired(Utc::now()).await {
            Ok(expired) if !expired.is_empty() => {
                tracing::info!("Quote expiry job completed: {} quotes expired", expired.len())
            }
            Ok(_) => {}
            Err(e) => tracing::error!("Quote expiry job failed: {}", e),
        }
    }
}
