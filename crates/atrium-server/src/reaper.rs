//! Background removal of expired messages.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use atrium_db::Database;
use atrium_db::models::fmt_ts;

/// Sweep expired messages forever. A failed sweep is logged and retried at
/// the next tick; request handling never waits on this task.
pub async fn run_reaper_loop(db: Arc<Database>, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;
        match sweep(&db).await {
            Ok(0) => {}
            Ok(deleted) => info!("expiry reaper removed {deleted} message(s)"),
            Err(e) => warn!("expiry sweep failed: {e:#}"),
        }
    }
}

async fn sweep(db: &Arc<Database>) -> anyhow::Result<usize> {
    let db = db.clone();
    let now = fmt_ts(Utc::now());
    tokio::task::spawn_blocking(move || db.delete_expired_messages(&now))
        .await
        .map_err(|e| anyhow::anyhow!("blocking task failed: {e}"))?
}
