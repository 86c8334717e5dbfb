//! Player-facing race operations: everything that moves a race through its
//! lifecycle, plus tournament administration. Chat transports call in here with
//! the final selected parameters; multi-step dialog state lives upstream.

use crate::models::audit_log::{actions, NewAuditLogEntry};
use crate::models::permalink_pools::PermalinkPool;
use crate::models::permalinks::{NewPermalink, Permalink};
use crate::models::permissions::{NewTournamentPermission, NewWhitelistEntry, PermissionRole};
use crate::models::races::{AsyncRace, NewAsyncRace, RaceStateError, RaceStatus, ReviewStatus};
use crate::models::tournaments::{NewTournament, Tournament};
use crate::models::users::User;
use crate::notify::{parse_channel_id, NotificationSink, NotifyError};
use crate::schema::races;
use crate::seed_service::{SeedService, SeedServiceError};
use crate::utils::{format_hms, parse_hms, snowflake_created_at};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::warn;
use thiserror::Error;

pub const COUNTDOWN_TICKS: u64 = 10;
const ACCOUNT_AGE_BUFFER_DAYS: i64 = 7;
pub const PENDING_TIMEOUT_MINUTES: i64 = 20;

#[derive(Debug, Error)]
pub enum RaceActionError {
    #[error("This channel is not configured for async tournaments.")]
    ChannelNotConfigured,

    #[error("This tournament is not currently active.")]
    TournamentInactive,

    #[error("Your Discord account is too new to participate in this tournament. Please contact a tournament administrator for manual verification and whitelisting.")]
    AccountTooNew,

    #[error("You must link your RaceTime.gg account before you can participate in an async tournament.")]
    RacetimeLinkRequired,

    #[error("You have already played all available seeds for this pool.")]
    NoEligiblePools,

    #[error("You already have an active race. If you believe this is in error, please contact a moderator.")]
    DuplicateActiveRace,

    #[error("Only the runner of this race can do that.")]
    NotOwner,

    #[error("This race is not in the right state for that action.")]
    InvalidState,

    #[error("You are not authorized to do that.")]
    NotAuthorized,

    #[error("An async tournament is already associated with this channel.")]
    DuplicateChannelBinding,

    #[error("You have already used all of your re-attempts for this tournament.")]
    NoReattemptsRemaining,

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Error generating seed: {0}")]
    SeedServiceError(#[from] SeedServiceError),

    #[error("[De]serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),

    #[error("Error reaching Discord: {0}")]
    NotifyError(#[from] NotifyError),
}

impl From<RaceStateError> for RaceActionError {
    fn from(value: RaceStateError) -> Self {
        match value {
            RaceStateError::InvalidState => Self::InvalidState,
            RaceStateError::ParseError(e) => Self::SerdeError(e),
            RaceStateError::DatabaseError(e) => Self::DatabaseError(e),
        }
    }
}

/// the per-button actions available inside a race thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceAction {
    Ready,
    Finish,
    Forfeit,
    Timer,
}

fn assert_owner(race: &AsyncRace, user: &User) -> Result<(), RaceActionError> {
    if race.user_id != user.id {
        return Err(RaceActionError::NotOwner);
    }
    Ok(())
}

/// pools this user can still draw a seed from, given runs_per_pool
pub fn eligible_pools(
    tournament: &Tournament,
    user: &User,
    conn: &mut SqliteConnection,
) -> Result<Vec<PermalinkPool>, RaceActionError> {
    let mut out = vec![];
    for pool in PermalinkPool::for_tournament(tournament.id, conn)? {
        if pool.play_count_for_user(user.id, conn)? < tournament.runs_per_pool as i64 {
            out.push(pool);
        }
    }
    Ok(out)
}

fn check_entry_requirements(
    tournament: &Tournament,
    user: &User,
    conn: &mut SqliteConnection,
) -> Result<(), RaceActionError> {
    if !tournament.is_active() {
        return Err(RaceActionError::TournamentInactive);
    }

    // the account must predate the tournament by at least a week, unless whitelisted
    if let Ok(discord_id) = user.discord_id() {
        let account_created = snowflake_created_at(discord_id.get());
        let cutoff = tournament.created_at() - Duration::days(ACCOUNT_AGE_BUFFER_DAYS);
        if account_created > cutoff && !tournament.user_is_whitelisted(user.id, conn)? {
            return Err(RaceActionError::AccountTooNew);
        }
    }

    if user.racetime_id.is_none() {
        return Err(RaceActionError::RacetimeLinkRequired);
    }
    Ok(())
}

/// Creates a new pending race for this user against the named pool: opens a private
/// thread, picks a permalink, writes the race row and an audit entry, and posts the
/// seed into the thread.
pub async fn request_new_race<N: NotificationSink>(
    channel_id: &str,
    user: &User,
    pool_name: &str,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<AsyncRace, RaceActionError> {
    let tournament = Tournament::get_by_channel_id(channel_id, conn)?
        .ok_or(RaceActionError::ChannelNotConfigured)?;
    check_entry_requirements(&tournament, user, conn)?;

    if AsyncRace::active_race_for_user(user.id, tournament.id, conn)?.is_some() {
        return Err(RaceActionError::DuplicateActiveRace);
    }

    let pool = PermalinkPool::get_by_name(tournament.id, pool_name, conn)?.ok_or(
        RaceActionError::InvalidArgument(format!("No pool named {pool_name}")),
    )?;
    if pool.play_count_for_user(user.id, conn)? >= tournament.runs_per_pool as i64 {
        return Err(RaceActionError::NoEligiblePools);
    }
    let permalink = pool
        .eligible_permalink_for_user(user.id, conn)?
        .ok_or(RaceActionError::NoEligiblePools)?;

    let thread_name = format!("{} - {}", truncate(&user.name, 20), pool.name);
    let thread_id = sink
        .create_private_thread(
            parse_channel_id(&tournament.channel_id)?,
            &thread_name,
            user.discord_id()
                .map_err(|e| RaceActionError::InvalidArgument(e.to_string()))?,
        )
        .await?;

    // the duplicate-race invariant is enforced by a re-check inside the same
    // transaction as the insert; it is not a database constraint
    let race = conn.transaction::<_, RaceActionError, _>(|c| {
        if AsyncRace::active_race_for_user(user.id, tournament.id, c)?.is_some() {
            return Err(RaceActionError::DuplicateActiveRace);
        }
        NewAuditLogEntry::new(
            tournament.id,
            Some(user.id),
            actions::CREATE_THREAD,
            format!(
                "Created thread {thread_id} for pool {}, permalink {}",
                pool.name, permalink.url
            ),
        )
        .save(c)?;
        Ok(NewAsyncRace::new(
            &tournament,
            user,
            &permalink,
            Some(thread_id.to_string()),
            Some(Utc::now()),
        )
        .save(c)?)
    })?;

    let mut briefing = format!(
        "**Tournament Async Run**\nPool: {}\nPermalink: {}",
        pool.name, permalink.url
    );
    if let Some(notes) = &permalink.notes {
        briefing.push_str(&format!("\nNotes: {notes}"));
    }
    briefing.push_str(&format!(
        "\n\nYou must start your race within {PENDING_TIMEOUT_MINUTES} minutes of opening this thread or it will be forfeited.\nRace ID: {}",
        race.id
    ));
    sink.send_message(thread_id, &briefing).await?;

    Ok(race)
}

/// Ready button: runs the ten second countdown and stamps the start time. A forfeit
/// that lands mid-countdown wins; the countdown then completes without starting
/// anything.
pub async fn mark_ready<N: NotificationSink>(
    race: &mut AsyncRace,
    user: &User,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<(), RaceActionError> {
    assert_owner(race, user)?;
    if race.status()? != RaceStatus::Pending {
        return Err(RaceActionError::InvalidState);
    }

    NewAuditLogEntry::new(
        race.tournament_id,
        Some(user.id),
        actions::RACE_READY,
        format!("{} is marked as ready", race.id),
    )
    .save(conn)?;

    race.begin_countdown(conn)?;

    NewAuditLogEntry::new(
        race.tournament_id,
        Some(user.id),
        actions::RACE_COUNTDOWN,
        format!("{} is starting a countdown", race.id),
    )
    .save(conn)?;

    let thread = race
        .thread_id
        .as_ref()
        .ok_or(RaceActionError::InvalidArgument(
            "Race has no thread".to_string(),
        ))
        .and_then(|t| parse_channel_id(t).map_err(From::from))?;

    for i in (1..=COUNTDOWN_TICKS).rev() {
        // a dropped tick shouldn't kill the countdown
        if let Err(e) = sink.send_message(thread, &format!("{i}...")).await {
            warn!("Error sending countdown tick for race {}: {e}", race.id);
        }
        tokio::time::sleep(core::time::Duration::from_secs(1)).await;
    }

    if race.record_start(Utc::now(), conn)? {
        if let Err(e) = sink.send_message(thread, "**GO!**").await {
            warn!("Error sending GO for race {}: {e}", race.id);
        }
        NewAuditLogEntry::new(
            race.tournament_id,
            Some(user.id),
            actions::RACE_STARTED,
            format!("{} has started", race.id),
        )
        .save(conn)?;
    }
    Ok(())
}

pub async fn finish_race<N: NotificationSink>(
    race: &mut AsyncRace,
    user: &User,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<(), RaceActionError> {
    assert_owner(race, user)?;
    race.finish(Utc::now(), conn)?;

    NewAuditLogEntry::new(
        race.tournament_id,
        Some(user.id),
        actions::RACE_FINISH,
        format!("{} has finished", race.id),
    )
    .save(conn)?;

    if let Some(thread) = race.thread_id.as_ref().and_then(|t| parse_channel_id(t).ok()) {
        let msg = format!(
            "Your finish time of **{}** has been recorded. Thank you for playing!\n\nDon't forget to submit a VoD of your run.",
            race.elapsed_formatted()
        );
        if let Err(e) = sink.send_message(thread, &msg).await {
            warn!("Error confirming finish for race {}: {e}", race.id);
        }
    }
    Ok(())
}

pub async fn forfeit_race<N: NotificationSink>(
    race: &mut AsyncRace,
    user: &User,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<(), RaceActionError> {
    assert_owner(race, user)?;
    race.forfeit(conn)?;

    NewAuditLogEntry::new(
        race.tournament_id,
        Some(user.id),
        actions::RUNNER_FORFEIT,
        format!("{} was forfeited by runner", race.id),
    )
    .save(conn)?;

    if let Some(thread) = race.thread_id.as_ref().and_then(|t| parse_channel_id(t).ok()) {
        if let Err(e) = sink
            .send_message(thread, "This run has been forfeited.")
            .await
        {
            warn!("Error confirming forfeit for race {}: {e}", race.id);
        }
    }
    Ok(())
}

/// dispatches a thread-scoped button press to the matching operation and returns
/// the user-facing reply
pub async fn handle_race_action<N: NotificationSink>(
    action: RaceAction,
    thread_id: &str,
    user: &User,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<String, RaceActionError> {
    let mut race = AsyncRace::get_by_thread_id(thread_id, conn)?.ok_or(
        RaceActionError::InvalidArgument("This thread is not an async race room.".to_string()),
    )?;
    match action {
        RaceAction::Ready => {
            mark_ready(&mut race, user, conn, sink).await?;
            Ok("Countdown complete.".to_string())
        }
        RaceAction::Finish => {
            finish_race(&mut race, user, conn, sink).await?;
            Ok(format!("Finish time: **{}**", race.elapsed_formatted()))
        }
        RaceAction::Forfeit => {
            forfeit_race(&mut race, user, conn, sink).await?;
            Ok("This run has been forfeited.".to_string())
        }
        RaceAction::Timer => {
            if race.status()?.is_terminal() {
                return Err(RaceActionError::InvalidState);
            }
            Ok(format!("Timer: **{}**", race.running_time_formatted(Utc::now())))
        }
    }
}

/// voids a prior race so the pool can be attempted again, spending one of the
/// tournament's allowed reattempts
pub fn mark_reattempted(
    race: &mut AsyncRace,
    user: &User,
    reason: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), RaceActionError> {
    assert_owner(race, user)?;
    if race.is_reattempted() {
        return Err(RaceActionError::InvalidState);
    }
    let tournament = race.tournament(conn)?;
    let used: i64 = races::table
        .filter(races::user_id.eq(user.id))
        .filter(races::tournament_id.eq(tournament.id))
        .filter(races::reattempted.eq(1))
        .count()
        .get_result(conn)?;
    if used >= tournament.allowed_reattempts as i64 {
        return Err(RaceActionError::NoReattemptsRemaining);
    }

    race.mark_reattempted(reason, conn)?;
    NewAuditLogEntry::new(
        tournament.id,
        Some(user.id),
        actions::REATTEMPT,
        format!("Marked {} as a re-attempt", race.id),
    )
    .save(conn)?;
    Ok(())
}

/// admin/mod action: pushes a pending race's forfeit deadline out by `minutes`
pub fn extend_timeout(
    race: &mut AsyncRace,
    actor: &User,
    minutes: i64,
    conn: &mut SqliteConnection,
) -> Result<i64, RaceActionError> {
    if race.status()? != RaceStatus::Pending {
        return Err(RaceActionError::InvalidState);
    }
    let tournament = race.tournament(conn)?;
    if !tournament.user_has_any_role(
        actor.id,
        &[PermissionRole::Admin, PermissionRole::Mod],
        conn,
    )? {
        return Err(RaceActionError::NotAuthorized);
    }

    let base = match race.thread_timeout_time {
        Some(t) => t,
        None => {
            race.thread_open_time
                .ok_or(RaceActionError::InvalidState)?
                + PENDING_TIMEOUT_MINUTES * 60
        }
    };
    let new_deadline = base + minutes * 60;
    race.set_thread_timeout(
        chrono::TimeZone::timestamp_opt(&Utc, new_deadline, 0)
            .single()
            .ok_or(RaceActionError::InvalidArgument("Bad timestamp".to_string()))?,
        conn,
    )?;

    NewAuditLogEntry::new(
        tournament.id,
        Some(actor.id),
        actions::EXTEND_TIMEOUT,
        format!("{} extended by {minutes} minutes", race.id),
    )
    .save(conn)?;
    Ok(new_deadline)
}

/// Owner-only correction trapdoor. Skips state validation on purpose; the applied
/// changes are appended to the runner notes so the override is visible later.
pub fn admin_update(
    race: &mut AsyncRace,
    actor: &User,
    status: Option<RaceStatus>,
    elapsed_time: Option<&str>,
    vod_url: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<String, RaceActionError> {
    let tournament = race.tournament(conn)?;
    if !tournament.is_owner(&actor.discord_id) {
        return Err(RaceActionError::NotAuthorized);
    }

    let mut msg = format!("{} administratively updated this run:\n", actor.name);
    let mut start_time = None;
    let mut end_time = None;
    if let Some(raw) = elapsed_time {
        let secs = parse_hms(raw).ok_or(RaceActionError::InvalidArgument(format!(
            "Cannot parse {raw} as H:MM:SS"
        )))?;
        let end = Utc::now().timestamp();
        start_time = Some(end - secs as i64);
        end_time = Some(end);
        msg.push_str(&format!("Elapsed time: {}\n", format_hms(secs)));
    }
    if let Some(s) = status {
        msg.push_str(&format!("Status: {s}\n"));
    }
    if let Some(v) = &vod_url {
        msg.push_str(&format!("VOD URL: {v}\n"));
    }

    race.admin_override(status, start_time, end_time, vod_url, conn)?;
    race.append_runner_note(&msg, conn)?;

    NewAuditLogEntry::new(
        tournament.id,
        Some(actor.id),
        actions::ADMIN_UPDATE,
        format!("{} was administratively updated", race.id),
    )
    .save(conn)?;
    Ok(msg)
}

pub fn submit_run_info(
    race: &mut AsyncRace,
    user: &User,
    vod_url: Option<String>,
    notes: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), RaceActionError> {
    assert_owner(race, user)?;
    race.set_run_info(vod_url, notes, conn)?;
    Ok(())
}

/// review queue action: admins/mods accept or reject a finished run (never their own)
pub fn submit_review(
    race: &mut AsyncRace,
    reviewer: &User,
    status: ReviewStatus,
    notes: Option<String>,
    conn: &mut SqliteConnection,
) -> Result<(), RaceActionError> {
    let tournament = race.tournament(conn)?;
    if !tournament.user_has_any_role(
        reviewer.id,
        &[PermissionRole::Admin, PermissionRole::Mod],
        conn,
    )? {
        return Err(RaceActionError::NotAuthorized);
    }
    if race.user_id == reviewer.id {
        return Err(RaceActionError::NotAuthorized);
    }
    if race.status()? != RaceStatus::Finished || race.is_reattempted() {
        return Err(RaceActionError::InvalidState);
    }
    race.set_review(reviewer.id, status, notes, Utc::now(), conn)?;
    Ok(())
}

pub struct TournamentParams {
    pub name: String,
    pub guild_id: String,
    pub channel_id: String,
    pub report_channel_id: Option<String>,
    pub owner_discord_id: String,
    pub runs_per_pool: i32,
    pub allowed_reattempts: i32,
}

/// binds a new tournament to a channel; a channel can host at most one
pub fn create_tournament(
    params: TournamentParams,
    creator: &User,
    conn: &mut SqliteConnection,
) -> Result<Tournament, RaceActionError> {
    if Tournament::get_by_channel_id(&params.channel_id, conn)?.is_some() {
        return Err(RaceActionError::DuplicateChannelBinding);
    }
    let tournament = NewTournament::new(
        params.name.clone(),
        params.guild_id,
        params.channel_id,
        params.report_channel_id,
        params.owner_discord_id,
        params.runs_per_pool,
        params.allowed_reattempts,
    )
    .save(conn)
    .map_err(|e| match e {
        // the unique constraint on channel_id backstops the pre-check
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => RaceActionError::DuplicateChannelBinding,
        other => RaceActionError::DatabaseError(other),
    })?;

    NewAuditLogEntry::new(
        tournament.id,
        Some(creator.id),
        actions::CREATE,
        format!("{} ({}) created", params.name, tournament.id),
    )
    .save(conn)?;
    Ok(tournament)
}

/// Generates `count` seeds into the named pool (creating it if needed). All seeds
/// are generated before anything is written, so a generator failure leaves no
/// partial pool behind.
pub async fn add_seeds<S: SeedService>(
    tournament: &Tournament,
    pool_name: &str,
    preset: &str,
    count: usize,
    seeds: &S,
    conn: &mut SqliteConnection,
) -> Result<Vec<Permalink>, RaceActionError> {
    let mut generated = Vec::with_capacity(count);
    for _ in 0..count {
        generated.push(seeds.generate(preset).await?);
    }

    let pool = match PermalinkPool::get_by_name(tournament.id, pool_name, conn)? {
        Some(p) => p,
        None => crate::models::permalink_pools::NewPermalinkPool::new(
            tournament.id,
            pool_name,
            preset,
        )
        .save(conn)?,
    };
    let mut out = Vec::with_capacity(count);
    for seed in generated {
        out.push(
            NewPermalink::new(pool.id, seed.url.clone(), Some(seed.code_string()), false)
                .save(conn)?,
        );
    }
    Ok(out)
}

pub fn close_tournament(
    tournament: &mut Tournament,
    actor: &User,
    conn: &mut SqliteConnection,
) -> Result<(), RaceActionError> {
    if !tournament.is_owner(&actor.discord_id) {
        return Err(RaceActionError::NotAuthorized);
    }
    if !tournament.is_active() {
        return Err(RaceActionError::TournamentInactive);
    }
    tournament.deactivate(conn)?;
    NewAuditLogEntry::new(
        tournament.id,
        Some(actor.id),
        actions::CLOSE,
        format!("{} ({}) closed", tournament.name, tournament.id),
    )
    .save(conn)?;
    Ok(())
}

pub fn grant_permission(
    tournament: &Tournament,
    actor: &User,
    target: &User,
    role: PermissionRole,
    conn: &mut SqliteConnection,
) -> Result<(), RaceActionError> {
    if !tournament.is_owner(&actor.discord_id) {
        return Err(RaceActionError::NotAuthorized);
    }
    NewTournamentPermission::new(tournament.id, target.id, role).save_if_absent(conn)?;
    Ok(())
}

pub fn whitelist_user(
    tournament: &Tournament,
    actor: &User,
    target: &User,
    conn: &mut SqliteConnection,
) -> Result<(), RaceActionError> {
    if !tournament.is_owner(&actor.discord_id) {
        return Err(RaceActionError::NotAuthorized);
    }
    if !tournament.user_is_whitelisted(target.id, conn)? {
        NewWhitelistEntry::new(tournament.id, target.id).save(conn)?;
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
