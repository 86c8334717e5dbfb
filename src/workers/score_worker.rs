use crate::discord::bot_state::BotState;
use crate::shutdown::Shutdown;
use async_tourney_bot::config::CONFIG;
use async_tourney_bot::models::tournaments::Tournament;
use async_tourney_bot::scoring::calculate_tournament_scores;
use async_tourney_bot::TourneyBotError;
use log::{info, warn};
use std::ops::DerefMut;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;

/// one scoring pass over every active tournament; a failure in one tournament
/// doesn't stop the others
async fn sweep(state: &Arc<BotState>) -> Result<(), TourneyBotError> {
    let mut conn = state.diesel_cxn().await?;
    let tournaments = Tournament::get_active(conn.deref_mut())?;
    for tournament in tournaments {
        info!("Calculating scores for tournament {}", tournament.id);
        if let Err(e) = calculate_tournament_scores(&tournament, false, conn.deref_mut()) {
            warn!(
                "Error calculating scores for tournament {}: {e:?}",
                tournament.id
            );
        }
    }
    Ok(())
}

pub(crate) async fn cron(mut sd: Receiver<Shutdown>, state: Arc<BotState>) {
    let tick_duration = core::time::Duration::from_secs(CONFIG.scoring_tick_secs);
    info!(
        "Starting score worker: running every {} seconds",
        tick_duration.as_secs()
    );
    let mut intv = tokio::time::interval(tick_duration);
    loop {
        tokio::select! {
            _ = intv.tick() => {
                if let Err(e) = sweep(&state).await {
                    warn!("Error running score calculation: {e}");
                }
            }
            _sd = sd.recv() => {
                info!("score worker shutting down");
                break;
            }
        }
    }
}
