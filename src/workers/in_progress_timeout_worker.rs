use crate::discord::bot_state::BotState;
use crate::shutdown::Shutdown;
use async_tourney_bot::config::CONFIG;
use async_tourney_bot::worker_funcs::sweep_in_progress_timeouts;
use async_tourney_bot::TourneyBotError;
use chrono::Utc;
use log::{info, warn};
use std::ops::DerefMut;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;

async fn sweep(state: &Arc<BotState>) -> Result<(), TourneyBotError> {
    let mut conn = state.diesel_cxn().await?;
    let stats =
        sweep_in_progress_timeouts(Utc::now(), conn.deref_mut(), state.notifier()).await?;
    if stats.forfeited > 0 {
        info!("In-progress sweep: forfeited {}", stats.forfeited);
    }
    Ok(())
}

pub(crate) async fn cron(mut sd: Receiver<Shutdown>, state: Arc<BotState>) {
    let tick_duration = core::time::Duration::from_secs(CONFIG.in_progress_sweep_tick_secs);
    info!(
        "Starting in-progress timeout worker: running every {} seconds",
        tick_duration.as_secs()
    );
    let mut intv = tokio::time::interval(tick_duration);
    loop {
        tokio::select! {
            _ = intv.tick() => {
                if let Err(e) = sweep(&state).await {
                    warn!("Error running in-progress timeout sweep: {e}");
                }
            }
            _sd = sd.recv() => {
                info!("in-progress timeout worker shutting down");
                break;
            }
        }
    }
}
