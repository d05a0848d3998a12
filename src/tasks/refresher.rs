use crate::handlers::AppState;
use actix_web::web;
use chrono::Utc;
use log::{debug, error, info};
use std::time::Duration;
use tokio::time::interval;

/// Sample `poll_id` every `period` so stored counts stay fresh even when no
/// results page is open. Failures are logged and the loop carries on.
pub async fn refresh_poll_task(state: web::Data<AppState>, poll_id: i64, period: Duration) {
    info!("Starting background refresh of poll {} every {:?}", poll_id, period);
    let mut interval = interval(period);

    loop {
        interval.tick().await;
        debug!("Refreshing poll {} at {}", poll_id, Utc::now().to_rfc3339());

        match state.sampler.sample(poll_id).await {
            Ok(votes) => debug!("Poll {} now at {:?}", poll_id, votes.votes),
            Err(e) => error!("Background refresh of poll {} failed: {}", poll_id, e),
        }
    }
}
