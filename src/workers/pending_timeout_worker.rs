use crate::discord::bot_state::BotState;
use crate::shutdown::Shutdown;
use async_tourney_bot::config::CONFIG;
use async_tourney_bot::worker_funcs::sweep_pending_timeouts;
use async_tourney_bot::TourneyBotError;
use chrono::Utc;
use log::{info, warn};
use std::ops::DerefMut;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;

async fn sweep(state: &Arc<BotState>) -> Result<(), TourneyBotError> {
    let mut conn = state.diesel_cxn().await?;
    let stats = sweep_pending_timeouts(Utc::now(), conn.deref_mut(), state.notifier()).await?;
    if stats.warned > 0 || stats.forfeited > 0 {
        info!(
            "Pending sweep: warned {}, forfeited {}",
            stats.warned, stats.forfeited
        );
    }
    Ok(())
}

pub(crate) async fn cron(mut sd: Receiver<Shutdown>, state: Arc<BotState>) {
    let tick_duration = core::time::Duration::from_secs(CONFIG.pending_sweep_tick_secs);
    info!(
        "Starting pending timeout worker: running every {} seconds",
        tick_duration.as_secs()
    );
    let mut intv = tokio::time::interval(tick_duration);
    loop {
        tokio::select! {
            _ = intv.tick() => {
                if let Err(e) = sweep(&state).await {
                    warn!("Error running pending timeout sweep: {e}");
                }
            }
            _sd = sd.recv() => {
                info!("pending timeout worker shutting down");
                break;
            }
        }
    }
}
