//! Translates interactions (buttons and slash commands) into lifecycle operations.

use crate::discord::bot_state::BotState;
use crate::discord::interactions::{
    button_component, interaction_to_custom_id, plain_interaction_response,
};
use crate::discord::{
    ADD_SEEDS_CMD, CALC_SCORES_CMD, CLOSE_TOURNAMENT_CMD, CREATE_TOURNAMENT_CMD, CUSTOM_ID_FINISH,
    CUSTOM_ID_FORFEIT, CUSTOM_ID_READY, CUSTOM_ID_TIMER, DONE_CMD, EXTEND_TIMEOUT_CMD,
    NEW_RACE_CMD, PERMISSIONS_CMD, REATTEMPT_CMD, RECORD_LIVE_CMD, REVIEW_CMD, SUBMIT_VOD_CMD,
    UPDATE_RUN_CMD, WHITELIST_CMD,
};
use async_tourney_bot::config::CONFIG;
use async_tourney_bot::lifecycle::{self, RaceAction, RaceActionError, TournamentParams};
use async_tourney_bot::models::permissions::PermissionRole;
use async_tourney_bot::models::races::{AsyncRace, RaceStatus, ReviewStatus};
use async_tourney_bot::models::tournaments::Tournament;
use async_tourney_bot::models::users::User;
use async_tourney_bot::notify::{parse_channel_id, NotificationSink};
use async_tourney_bot::reconcile::record_live_race;
use async_tourney_bot::scoring::calculate_tournament_scores;
use async_tourney_bot::seed_service::HttpSeedService;
use log::warn;
use std::ops::DerefMut;
use std::str::FromStr;
use std::sync::Arc;
use twilight_model::application::interaction::application_command::{
    CommandData, CommandDataOption, CommandOptionValue,
};
use twilight_model::application::interaction::{Interaction, InteractionData};
use twilight_model::channel::message::component::{ActionRow, ButtonStyle};
use twilight_model::channel::message::Component;
use twilight_model::gateway::payload::incoming::InteractionCreate;
use twilight_model::id::marker::ChannelMarker;
use twilight_model::id::Id;

pub(super) async fn handle_interaction(ic: Box<InteractionCreate>, state: &Arc<BotState>) {
    let interaction = ic.0;
    match dispatch(&interaction, state).await {
        Ok(Some(reply)) => respond(state, &interaction, reply).await,
        Ok(None) => {}
        Err(e) => respond(state, &interaction, e).await,
    }
}

async fn respond(state: &Arc<BotState>, interaction: &Interaction, content: String) {
    let resp = plain_interaction_response(content);
    if let Err(e) = state
        .interaction_client()
        .create_response(interaction.id, &interaction.token, &resp)
        .await
    {
        warn!("Error responding to interaction: {e}");
    }
}

fn get_string_opt(options: &[CommandDataOption], name: &str) -> Option<String> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandOptionValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

fn get_int_opt(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandOptionValue::Integer(i) => Some(*i),
        _ => None,
    })
}

fn get_bool_opt(options: &[CommandDataOption], name: &str) -> Option<bool> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandOptionValue::Boolean(b) => Some(*b),
        _ => None,
    })
}

fn get_user_opt(options: &[CommandDataOption], name: &str) -> Option<String> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandOptionValue::User(id) => Some(id.to_string()),
        _ => None,
    })
}

fn race_status_from_plain(s: &str) -> Result<RaceStatus, String> {
    serde_json::from_str(&format!("\"{s}\""))
        .map_err(|_| format!("Unknown status: {s}"))
}

fn review_status_from_plain(s: &str) -> Result<ReviewStatus, String> {
    serde_json::from_str(&format!("\"{s}\""))
        .map_err(|_| format!("Unknown review status: {s}"))
}

/// returns Ok(Some(reply)) for the normal path, Ok(None) when the branch already
/// responded itself, Err(user-facing message) otherwise
async fn dispatch(
    interaction: &Interaction,
    state: &Arc<BotState>,
) -> Result<Option<String>, String> {
    let author = interaction
        .author()
        .ok_or("Interaction with no author?".to_string())?
        .clone();
    let channel_id = interaction
        .channel
        .as_ref()
        .map(|c| c.id.to_string())
        .ok_or("Interaction outside of a channel".to_string())?;

    let mut conn_wrapper = state
        .diesel_cxn()
        .await
        .map_err(|e| format!("Error getting database connection: {e}"))?;
    let conn = conn_wrapper.deref_mut();
    let user = User::get_or_create(author.id.to_string(), author.name.clone(), conn)
        .map_err(|e| format!("Database error: {e}"))?;

    if let Some(custom_id) = interaction_to_custom_id(interaction) {
        let action = match custom_id {
            CUSTOM_ID_READY => RaceAction::Ready,
            CUSTOM_ID_FINISH => RaceAction::Finish,
            CUSTOM_ID_FORFEIT => RaceAction::Forfeit,
            CUSTOM_ID_TIMER => RaceAction::Timer,
            other => {
                warn!("Unknown component custom id: {other}");
                return Err("I don't know what that button does.".to_string());
            }
        };
        return handle_race_button(action, &channel_id, &user, interaction, state, conn).await;
    }

    let data = match interaction.data.as_ref() {
        Some(InteractionData::ApplicationCommand(ac)) => ac,
        _ => {
            return Err("Unsupported interaction.".to_string());
        }
    };
    handle_command(data, &channel_id, &user, state, conn)
        .await
        .map(Some)
}

async fn handle_race_button(
    action: RaceAction,
    channel_id: &str,
    user: &User,
    interaction: &Interaction,
    state: &Arc<BotState>,
    conn: &mut diesel::SqliteConnection,
) -> Result<Option<String>, String> {
    if action != RaceAction::Ready {
        let reply = lifecycle::handle_race_action(action, channel_id, user, conn, state.notifier())
            .await
            .map_err(|e| e.to_string())?;
        return Ok(Some(reply));
    }

    // The countdown takes ten seconds and interactions must be answered within
    // three, so Ready responds first and then runs the countdown.
    let mut race = AsyncRace::get_by_thread_id(channel_id, conn)
        .map_err(|e| format!("Database error: {e}"))?
        .ok_or("This thread is not an async race room.".to_string())?;
    if race.user_id != user.id {
        return Err(RaceActionError::NotOwner.to_string());
    }
    match race.status() {
        Ok(RaceStatus::Pending) => {}
        _ => return Err(RaceActionError::InvalidState.to_string()),
    }
    respond(state, interaction, "Countdown starting!".to_string()).await;

    match lifecycle::mark_ready(&mut race, user, conn, state.notifier()).await {
        Ok(()) => {
            if let Err(e) = post_in_progress_buttons(state, channel_id).await {
                warn!("Error posting in-progress buttons for race {}: {e}", race.id);
            }
        }
        Err(e) => {
            warn!("Error running countdown for race {}: {e}", race.id);
        }
    }
    Ok(None)
}

fn action_row(components: Vec<Component>) -> Vec<Component> {
    vec![Component::ActionRow(ActionRow { components })]
}

async fn post_ready_buttons(
    state: &Arc<BotState>,
    thread_id: Id<ChannelMarker>,
) -> Result<(), async_tourney_bot::TourneyBotError> {
    let components = action_row(vec![
        button_component("Ready (start countdown)", CUSTOM_ID_READY, ButtonStyle::Success),
        button_component("Forfeit", CUSTOM_ID_FORFEIT, ButtonStyle::Danger),
    ]);
    state
        .discord_client
        .create_message(thread_id)
        .content("Click Ready when you are ready to begin. The timer starts after a ten second countdown.")?
        .components(&components)?
        .await?;
    Ok(())
}

async fn post_in_progress_buttons(
    state: &Arc<BotState>,
    thread_id: &str,
) -> Result<(), async_tourney_bot::TourneyBotError> {
    let thread = parse_channel_id(thread_id)
        .map_err(|e| async_tourney_bot::TourneyBotError::StateError(e.to_string()))?;
    let components = action_row(vec![
        button_component("Finish", CUSTOM_ID_FINISH, ButtonStyle::Success),
        button_component("Forfeit", CUSTOM_ID_FORFEIT, ButtonStyle::Danger),
        button_component("Get timer", CUSTOM_ID_TIMER, ButtonStyle::Secondary),
    ]);
    state
        .discord_client
        .create_message(thread)
        .content("Good luck! Use these when you're done.")?
        .components(&components)?
        .await?;
    Ok(())
}

async fn handle_command(
    data: &CommandData,
    channel_id: &str,
    user: &User,
    state: &Arc<BotState>,
    conn: &mut diesel::SqliteConnection,
) -> Result<String, String> {
    let options = &data.options;
    match data.name.as_str() {
        NEW_RACE_CMD => {
            let pool = get_string_opt(options, "pool").ok_or("Missing pool option")?;
            let race = lifecycle::request_new_race(channel_id, user, &pool, conn, state.notifier())
                .await
                .map_err(|e| e.to_string())?;
            let thread = race
                .thread_id
                .as_ref()
                .and_then(|t| parse_channel_id(t).ok())
                .ok_or("Race created without a thread?".to_string())?;
            if let Err(e) = post_ready_buttons(state, thread).await {
                warn!("Error posting ready buttons for race {}: {e}", race.id);
            }
            Ok(format!(
                "Successfully created <#{thread}>. Please join that thread for more details."
            ))
        }
        DONE_CMD => lifecycle::handle_race_action(
            RaceAction::Finish,
            channel_id,
            user,
            conn,
            state.notifier(),
        )
        .await
        .map_err(|e| e.to_string()),
        REATTEMPT_CMD => {
            let race_id = get_int_opt(options, "race_id").ok_or("Missing race_id option")?;
            let reason = get_string_opt(options, "reason");
            let mut race = AsyncRace::get_by_id(race_id as i32, conn)
                .map_err(|_| "Race not found.".to_string())?;
            lifecycle::mark_reattempted(&mut race, user, reason, conn)
                .map_err(|e| e.to_string())?;
            Ok(format!(
                "Race {race_id} is now marked as a re-attempt. You may request a fresh run from its pool."
            ))
        }
        CREATE_TOURNAMENT_CMD => {
            if user.discord_id != CONFIG.operator_discord_id {
                return Err("Only the bot operator may create tournaments.".to_string());
            }
            let name = get_string_opt(options, "name").ok_or("Missing name option")?;
            let runs_per_pool =
                get_int_opt(options, "runs_per_pool").ok_or("Missing runs_per_pool option")?;
            let allowed_reattempts = get_int_opt(options, "allowed_reattempts")
                .ok_or("Missing allowed_reattempts option")?;
            let params = TournamentParams {
                name: name.clone(),
                guild_id: CONFIG.guild_id.to_string(),
                channel_id: channel_id.to_string(),
                report_channel_id: None,
                owner_discord_id: user.discord_id.clone(),
                runs_per_pool: runs_per_pool as i32,
                allowed_reattempts: allowed_reattempts as i32,
            };
            let tournament =
                lifecycle::create_tournament(params, user, conn).map_err(|e| e.to_string())?;
            Ok(format!(
                "Tournament **{name}** created (ID: {}). Add seeds with /{ADD_SEEDS_CMD}.",
                tournament.id
            ))
        }
        ADD_SEEDS_CMD => {
            let tournament = tournament_for_channel(channel_id, conn)?;
            if !tournament.is_owner(&user.discord_id) {
                return Err("Only the tournament owner may add seeds.".to_string());
            }
            let pool = get_string_opt(options, "pool").ok_or("Missing pool option")?;
            let preset = get_string_opt(options, "preset").ok_or("Missing preset option")?;
            let num = get_int_opt(options, "num").unwrap_or(1).max(1) as usize;
            let seeds = HttpSeedService::new(CONFIG.seed_service_url.clone());
            let permalinks =
                lifecycle::add_seeds(&tournament, &pool, &preset, num, &seeds, conn)
                    .await
                    .map_err(|e| e.to_string())?;
            Ok(format!("Added {} seed(s) to pool {pool}.", permalinks.len()))
        }
        CLOSE_TOURNAMENT_CMD => {
            let mut tournament = tournament_for_channel(channel_id, conn)?;
            lifecycle::close_tournament(&mut tournament, user, conn).map_err(|e| e.to_string())?;
            Ok("This tournament has been closed.".to_string())
        }
        EXTEND_TIMEOUT_CMD => {
            let minutes = get_int_opt(options, "minutes").ok_or("Missing minutes option")?;
            let mut race = AsyncRace::get_by_thread_id(channel_id, conn)
                .map_err(|e| format!("Database error: {e}"))?
                .ok_or("This channel is not an async tournament thread.".to_string())?;
            let deadline = lifecycle::extend_timeout(&mut race, user, minutes, conn)
                .map_err(|e| e.to_string())?;
            Ok(format!(
                "Timeout extended to <t:{deadline}:f> (<t:{deadline}:R>)."
            ))
        }
        SUBMIT_VOD_CMD => {
            let vod_url = get_string_opt(options, "vod_url").ok_or("Missing vod_url option")?;
            let notes = get_string_opt(options, "notes");
            let mut race = AsyncRace::get_by_thread_id(channel_id, conn)
                .map_err(|e| format!("Database error: {e}"))?
                .ok_or("There is no async run in this thread.".to_string())?;
            lifecycle::submit_run_info(&mut race, user, Some(vod_url.clone()), notes, conn)
                .map_err(|e| e.to_string())?;
            Ok(format!("VOD link and runner notes saved.\n\n**URL:**\n{vod_url}"))
        }
        REVIEW_CMD => {
            let race_id = get_int_opt(options, "race_id").ok_or("Missing race_id option")?;
            let status_str = get_string_opt(options, "status").ok_or("Missing status option")?;
            let status = review_status_from_plain(&status_str)?;
            let notes = get_string_opt(options, "notes");
            let mut race = AsyncRace::get_by_id(race_id as i32, conn)
                .map_err(|_| "Race not found.".to_string())?;
            lifecycle::submit_review(&mut race, user, status, notes, conn)
                .map_err(|e| e.to_string())?;
            Ok(format!("Race {race_id} has been marked as {status_str}."))
        }
        UPDATE_RUN_CMD => {
            let mut race = AsyncRace::get_by_thread_id(channel_id, conn)
                .map_err(|e| format!("Database error: {e}"))?
                .ok_or("There is no async run in this thread.".to_string())?;
            let status = match get_string_opt(options, "status") {
                Some(s) => Some(race_status_from_plain(&s)?),
                None => None,
            };
            let elapsed = get_string_opt(options, "elapsed_time");
            let vod = get_string_opt(options, "vod_url");
            lifecycle::admin_update(&mut race, user, status, elapsed.as_deref(), vod, conn)
                .map_err(|e| e.to_string())
        }
        PERMISSIONS_CMD => {
            let tournament = tournament_for_channel(channel_id, conn)?;
            let target_id = get_user_opt(options, "user").ok_or("Missing user option")?;
            let role_str = get_string_opt(options, "role").ok_or("Missing role option")?;
            let role = PermissionRole::from_str(&role_str)?;
            let target = User::get_or_create(target_id.clone(), target_id.clone(), conn)
                .map_err(|e| format!("Database error: {e}"))?;
            lifecycle::grant_permission(&tournament, user, &target, role, conn)
                .map_err(|e| e.to_string())?;
            Ok(format!(
                "<@{target_id}> has been granted {role_str} permissions."
            ))
        }
        WHITELIST_CMD => {
            let tournament = tournament_for_channel(channel_id, conn)?;
            let target_id = get_user_opt(options, "user").ok_or("Missing user option")?;
            let target = User::get_or_create(target_id.clone(), target_id.clone(), conn)
                .map_err(|e| format!("Database error: {e}"))?;
            lifecycle::whitelist_user(&tournament, user, &target, conn)
                .map_err(|e| e.to_string())?;
            Ok(format!("<@{target_id}> has been whitelisted."))
        }
        RECORD_LIVE_CMD => {
            let slug =
                get_string_opt(options, "racetime_slug").ok_or("Missing racetime_slug option")?;
            let force = get_bool_opt(options, "force").unwrap_or(false);
            let report =
                record_live_race(&slug, force, user, &CONFIG.racetime_base_url, conn)
                    .await
                    .map_err(|e| e.to_string())?;
            if report.warnings.is_empty() {
                Ok("The recording of this race finished without any warnings!".to_string())
            } else {
                Ok(format!(
                    "There were some warnings when recording this race:\n{}",
                    report.warnings.join("\n")
                ))
            }
        }
        CALC_SCORES_CMD => {
            let tournament = tournament_for_channel(channel_id, conn)?;
            let authorized = tournament
                .user_has_any_role(user.id, &[PermissionRole::Admin], conn)
                .map_err(|e| format!("Database error: {e}"))?;
            if !authorized {
                return Err("You are not authorized to perform a score recalculation.".to_string());
            }
            let only_approved = get_bool_opt(options, "only_approved").unwrap_or(false);
            calculate_tournament_scores(&tournament, only_approved, conn)
                .map_err(|e| format!("Error calculating scores: {e}"))?;
            Ok("Done!".to_string())
        }
        other => {
            warn!("Unknown command: {other}");
            Err("I don't know that command.".to_string())
        }
    }
}

fn tournament_for_channel(
    channel_id: &str,
    conn: &mut diesel::SqliteConnection,
) -> Result<Tournament, String> {
    Tournament::get_by_channel_id(channel_id, conn)
        .map_err(|e| format!("Database error: {e}"))?
        .ok_or("This channel is not configured for async tournaments.".to_string())
}
