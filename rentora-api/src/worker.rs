use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::state::AppState;

/// Periodic reaper sweep, on top of the opportunistic purge done by `create`.
pub async fn start_reaper_worker(state: AppState, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Reaper worker started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

/// One sweep. Returns how many reservations were purged; failures are logged.
pub async fn sweep_once(state: &AppState) -> usize {
    match state.engine.reaper.sweep().await {
        Ok(purged) => {
            state.metrics.reaped(purged.len());
            purged.len()
        }
        Err(e) => {
            error!("Reaper sweep failed: {}", e);
            0
        }
    }
}
