use crate::models::epoch_timestamp;
use crate::models::live_races::LiveRace;
use crate::models::permalinks::Permalink;
use crate::models::tournaments::Tournament;
use crate::models::users::User;
use crate::schema::{permalinks, races};
use crate::utils::format_hms;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use thiserror::Error;

#[derive(serde::Serialize, serde::Deserialize, Eq, PartialEq, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RaceStatus {
    Pending,
    InProgress,
    Finished,
    Forfeit,
    Disqualified,
}

impl RaceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Forfeit | Self::Disqualified)
    }
}

impl Display for RaceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Finished => "finished",
            Self::Forfeit => "forfeit",
            Self::Disqualified => "disqualified",
        };
        write!(f, "{s}")
    }
}

#[derive(serde::Serialize, serde::Deserialize, Eq, PartialEq, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Error)]
pub enum RaceStateError {
    #[error("Invalid state")]
    InvalidState,
    #[error("Deserialization error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

fn status_json(status: &RaceStatus) -> String {
    serde_json::to_string(status).unwrap_or("Unknown".to_string())
}

fn review_status_json(status: &ReviewStatus) -> String {
    serde_json::to_string(status).unwrap_or("Unknown".to_string())
}

#[derive(Queryable, Identifiable, AsChangeset, Selectable, Debug, Clone, Serialize)]
#[diesel(table_name=races)]
pub struct AsyncRace {
    pub id: i32,
    pub tournament_id: i32,
    pub user_id: i32,
    pub permalink_id: i32,
    pub live_race_id: Option<i32>,
    pub thread_id: Option<String>,
    pub status: String,
    pub thread_open_time: Option<i64>,
    pub thread_timeout_time: Option<i64>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub reattempted: i32,
    pub reattempt_reason: Option<String>,
    pub runner_vod_url: Option<String>,
    pub runner_notes: Option<String>,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<i64>,
    pub review_status: String,
    pub reviewer_notes: Option<String>,
    pub score: Option<f64>,
    pub created: i64,
}

// statics
impl AsyncRace {
    /// this expects the object to exist, so it returns Self instead of Option<Self>
    pub fn get_by_id(id: i32, conn: &mut SqliteConnection) -> Result<Self, diesel::result::Error> {
        races::table.find(id).first(conn)
    }

    pub fn get_by_thread_id(
        thread_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        Ok(races::table
            .filter(races::thread_id.eq(thread_id))
            .load(conn)?
            .pop())
    }

    /// the user's race in this tournament that is still pending or in progress, if any
    pub fn active_race_for_user(
        user_id: i32,
        tournament_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        let active = vec![
            status_json(&RaceStatus::Pending),
            status_json(&RaceStatus::InProgress),
        ];
        Ok(races::table
            .filter(races::user_id.eq(user_id))
            .filter(races::tournament_id.eq(tournament_id))
            .filter(races::status.eq_any(active))
            .load(conn)?
            .pop())
    }

    pub fn for_user_in_tournament(
        user_id: i32,
        tournament_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        races::table
            .filter(races::user_id.eq(user_id))
            .filter(races::tournament_id.eq(tournament_id))
            .order_by(races::created.desc())
            .load(conn)
    }

    pub fn pending_with_threads(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        races::table
            .filter(races::status.eq(status_json(&RaceStatus::Pending)))
            .filter(races::thread_id.is_not_null())
            .load(conn)
    }

    pub fn in_progress_with_threads(
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        races::table
            .filter(races::status.eq(status_json(&RaceStatus::InProgress)))
            .filter(races::thread_id.is_not_null())
            .load(conn)
    }

    pub fn for_live_race(
        live_race: &LiveRace,
        user_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        Ok(races::table
            .filter(races::live_race_id.eq(live_race.id))
            .filter(races::user_id.eq(user_id))
            .load(conn)?
            .pop())
    }

    pub fn in_progress_count_for_live_race(
        live_race: &LiveRace,
        conn: &mut SqliteConnection,
    ) -> Result<i64, diesel::result::Error> {
        races::table
            .filter(races::live_race_id.eq(live_race.id))
            .filter(races::status.eq(status_json(&RaceStatus::InProgress)))
            .count()
            .get_result(conn)
    }

    /// every non-reattempted race against a permalink in this pool, any status
    pub fn for_pool(
        pool_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        races::table
            .inner_join(permalinks::table)
            .filter(permalinks::pool_id.eq(pool_id))
            .filter(races::reattempted.eq(0))
            .select(AsyncRace::as_select())
            .load(conn)
    }
}

impl AsyncRace {
    pub fn status(&self) -> Result<RaceStatus, RaceStateError> {
        serde_json::from_str(&self.status).map_err(From::from)
    }

    pub fn review_status(&self) -> Result<ReviewStatus, RaceStateError> {
        serde_json::from_str(&self.review_status).map_err(From::from)
    }

    pub fn is_reattempted(&self) -> bool {
        self.reattempted == 1
    }

    pub fn elapsed_secs(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(s), Some(e)) if e >= s => Some(e - s),
            _ => None,
        }
    }

    /// HH:MM:SS at seconds resolution; "N/A" for races without a full start/end pair
    pub fn elapsed_formatted(&self) -> String {
        self.elapsed_secs()
            .map(|s| format_hms(s as u64))
            .unwrap_or("N/A".to_string())
    }

    /// elapsed from start to `now` for a race still running
    pub fn running_time_formatted(&self, now: DateTime<Utc>) -> String {
        match self.start_time {
            Some(s) if now.timestamp() >= s => format_hms((now.timestamp() - s) as u64),
            _ => "N/A".to_string(),
        }
    }

    pub fn tournament(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Tournament, diesel::result::Error> {
        Tournament::get_by_id(self.tournament_id, conn)?.ok_or(diesel::result::Error::NotFound)
    }

    pub fn user(&self, conn: &mut SqliteConnection) -> Result<User, diesel::result::Error> {
        User::get_by_id(self.user_id, conn)?.ok_or(diesel::result::Error::NotFound)
    }

    pub fn permalink(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Permalink, diesel::result::Error> {
        Permalink::get_by_id(self.permalink_id, conn)?.ok_or(diesel::result::Error::NotFound)
    }
}

// State transitions.
//
// Every transition re-checks the row's current status in the UPDATE itself, so a
// concurrent actor that already moved the row causes an InvalidState here instead
// of a silent overwrite. Rows never regress.
impl AsyncRace {
    /// Pending -> InProgress, with no start time yet; the countdown runs between
    /// this and [record_start].
    pub fn begin_countdown(
        &mut self,
        conn: &mut SqliteConnection,
    ) -> Result<(), RaceStateError> {
        let n = diesel::update(
            races::table
                .filter(races::id.eq(self.id))
                .filter(races::status.eq(status_json(&RaceStatus::Pending))),
        )
        .set(races::status.eq(status_json(&RaceStatus::InProgress)))
        .execute(conn)?;
        if n == 0 {
            return Err(RaceStateError::InvalidState);
        }
        self.status = status_json(&RaceStatus::InProgress);
        Ok(())
    }

    /// Stamps the start time at countdown completion. Returns false (not an error)
    /// if the race was forfeited out from under the countdown.
    pub fn record_start(
        &mut self,
        at: DateTime<Utc>,
        conn: &mut SqliteConnection,
    ) -> Result<bool, RaceStateError> {
        let n = diesel::update(
            races::table
                .filter(races::id.eq(self.id))
                .filter(races::status.eq(status_json(&RaceStatus::InProgress)))
                .filter(races::start_time.is_null()),
        )
        .set(races::start_time.eq(Some(at.timestamp())))
        .execute(conn)?;
        if n == 1 {
            self.start_time = Some(at.timestamp());
        }
        Ok(n == 1)
    }

    /// InProgress -> Finished; stamps end_time
    pub fn finish(
        &mut self,
        at: DateTime<Utc>,
        conn: &mut SqliteConnection,
    ) -> Result<(), RaceStateError> {
        let n = diesel::update(
            races::table
                .filter(races::id.eq(self.id))
                .filter(races::status.eq(status_json(&RaceStatus::InProgress))),
        )
        .set((
            races::status.eq(status_json(&RaceStatus::Finished)),
            races::end_time.eq(Some(at.timestamp())),
        ))
        .execute(conn)?;
        if n == 0 {
            return Err(RaceStateError::InvalidState);
        }
        self.status = status_json(&RaceStatus::Finished);
        self.end_time = Some(at.timestamp());
        Ok(())
    }

    /// Pending or InProgress -> Forfeit. No end_time. Irreversible.
    pub fn forfeit(&mut self, conn: &mut SqliteConnection) -> Result<(), RaceStateError> {
        let eligible = vec![
            status_json(&RaceStatus::Pending),
            status_json(&RaceStatus::InProgress),
        ];
        let n = diesel::update(
            races::table
                .filter(races::id.eq(self.id))
                .filter(races::status.eq_any(eligible)),
        )
        .set(races::status.eq(status_json(&RaceStatus::Forfeit)))
        .execute(conn)?;
        if n == 0 {
            return Err(RaceStateError::InvalidState);
        }
        self.status = status_json(&RaceStatus::Forfeit);
        Ok(())
    }

    /// applies an externally-observed terminal result (live qualifier import); only
    /// fires if the row is still active, which is what makes re-imports idempotent
    pub fn record_live_result(
        &mut self,
        status: RaceStatus,
        end_time: Option<DateTime<Utc>>,
        conn: &mut SqliteConnection,
    ) -> Result<bool, RaceStateError> {
        if !status.is_terminal() {
            return Err(RaceStateError::InvalidState);
        }
        let eligible = vec![
            status_json(&RaceStatus::Pending),
            status_json(&RaceStatus::InProgress),
        ];
        let end_secs = end_time.map(|t| t.timestamp());
        let n = diesel::update(
            races::table
                .filter(races::id.eq(self.id))
                .filter(races::status.eq_any(eligible)),
        )
        .set((
            races::status.eq(status_json(&status)),
            races::end_time.eq(end_secs),
        ))
        .execute(conn)?;
        if n == 1 {
            self.status = status_json(&status);
            self.end_time = end_secs;
        }
        Ok(n == 1)
    }

    pub fn set_thread_timeout(
        &mut self,
        at: DateTime<Utc>,
        conn: &mut SqliteConnection,
    ) -> Result<(), RaceStateError> {
        self.thread_timeout_time = Some(at.timestamp());
        diesel::update(races::table.find(self.id))
            .set(races::thread_timeout_time.eq(self.thread_timeout_time))
            .execute(conn)?;
        Ok(())
    }

    /// flags this race as voided; it no longer counts against eligibility or scoring
    pub fn mark_reattempted(
        &mut self,
        reason: Option<String>,
        conn: &mut SqliteConnection,
    ) -> Result<(), RaceStateError> {
        self.reattempted = 1;
        self.reattempt_reason = reason;
        diesel::update(races::table.find(self.id))
            .set((
                races::reattempted.eq(1),
                races::reattempt_reason.eq(&self.reattempt_reason),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn set_run_info(
        &mut self,
        vod_url: Option<String>,
        notes: Option<String>,
        conn: &mut SqliteConnection,
    ) -> Result<(), RaceStateError> {
        self.runner_vod_url = vod_url;
        self.runner_notes = notes;
        diesel::update(races::table.find(self.id))
            .set((
                races::runner_vod_url.eq(&self.runner_vod_url),
                races::runner_notes.eq(&self.runner_notes),
            ))
            .execute(conn)?;
        Ok(())
    }

    pub fn set_review(
        &mut self,
        reviewer_id: i32,
        status: ReviewStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
        conn: &mut SqliteConnection,
    ) -> Result<(), RaceStateError> {
        self.reviewed_by = Some(reviewer_id);
        self.reviewed_at = Some(at.timestamp());
        self.review_status = review_status_json(&status);
        self.reviewer_notes = notes;
        diesel::update(races::table.find(self.id))
            .set((
                races::reviewed_by.eq(self.reviewed_by),
                races::reviewed_at.eq(self.reviewed_at),
                races::review_status.eq(&self.review_status),
                races::reviewer_notes.eq(&self.reviewer_notes),
            ))
            .execute(conn)?;
        Ok(())
    }

    /// Persists a freshly computed score, but only if the race hasn't changed status
    /// since we read it; a stale row is skipped, not clobbered.
    pub fn set_score(
        &mut self,
        score: f64,
        conn: &mut SqliteConnection,
    ) -> Result<bool, RaceStateError> {
        let n = diesel::update(
            races::table
                .filter(races::id.eq(self.id))
                .filter(races::status.eq(&self.status)),
        )
        .set(races::score.eq(Some(score)))
        .execute(conn)?;
        if n == 1 {
            self.score = Some(score);
        }
        Ok(n == 1)
    }

    /// Administrative override. Deliberately skips every state check; the tournament
    /// owner is trusted to know what they're doing.
    pub fn admin_override(
        &mut self,
        status: Option<RaceStatus>,
        start_time: Option<i64>,
        end_time: Option<i64>,
        vod_url: Option<String>,
        conn: &mut SqliteConnection,
    ) -> Result<(), RaceStateError> {
        if let Some(s) = status {
            self.status = status_json(&s);
        }
        if let Some(s) = start_time {
            self.start_time = Some(s);
        }
        if let Some(e) = end_time {
            self.end_time = Some(e);
        }
        if let Some(v) = vod_url {
            self.runner_vod_url = Some(v);
        }
        self.update(conn)?;
        Ok(())
    }

    pub fn append_runner_note(
        &mut self,
        note: &str,
        conn: &mut SqliteConnection,
    ) -> Result<(), RaceStateError> {
        self.runner_notes = match self.runner_notes.take() {
            Some(existing) => Some(format!("{existing}\n\n{note}")),
            None => Some(note.to_string()),
        };
        diesel::update(races::table.find(self.id))
            .set(races::runner_notes.eq(&self.runner_notes))
            .execute(conn)?;
        Ok(())
    }

    crate::update_fn! {}
}

#[derive(Insertable)]
#[diesel(table_name=races)]
pub struct NewAsyncRace {
    tournament_id: i32,
    user_id: i32,
    permalink_id: i32,
    live_race_id: Option<i32>,
    thread_id: Option<String>,
    status: String,
    thread_open_time: Option<i64>,
    review_status: String,
    reattempted: i32,
    created: i64,
}

impl NewAsyncRace {
    pub fn new(
        tournament: &Tournament,
        user: &User,
        permalink: &Permalink,
        thread_id: Option<String>,
        thread_open_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            tournament_id: tournament.id,
            user_id: user.id,
            permalink_id: permalink.id,
            live_race_id: None,
            thread_id,
            status: status_json(&RaceStatus::Pending),
            thread_open_time: thread_open_time.map(|t| t.timestamp()),
            review_status: review_status_json(&ReviewStatus::Pending),
            reattempted: 0,
            created: epoch_timestamp(),
        }
    }

    pub fn for_live_race(mut self, live_race_id: i32) -> Self {
        self.live_race_id = Some(live_race_id);
        self
    }

    crate::save_fn!(races::table, AsyncRace);
}

#[cfg(test)]
mod tests {
    use super::{AsyncRace, RaceStatus};
    use crate::models::races::RaceStateError;
    use crate::test_utils::{fixtures, setup_db};
    use chrono::{Duration, Utc};

    #[test]
    fn test_happy_path_transitions() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let mut race = fx.new_race(0, &mut conn)?;
        assert_eq!(RaceStatus::Pending, race.status()?);

        race.begin_countdown(&mut conn)?;
        assert_eq!(RaceStatus::InProgress, race.status()?);
        assert!(race.start_time.is_none());

        let started = Utc::now();
        assert!(race.record_start(started, &mut conn)?);

        let ended = started + Duration::seconds(3600);
        race.finish(ended, &mut conn)?;
        assert_eq!(RaceStatus::Finished, race.status()?);
        assert_eq!(Some(3600), race.elapsed_secs());
        assert_eq!("01:00:00", race.elapsed_formatted());
        Ok(())
    }

    #[test]
    fn test_elapsed_truncates_fractional_seconds() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let mut race = fx.new_race(0, &mut conn)?;
        race.begin_countdown(&mut conn)?;
        let started = chrono::TimeZone::timestamp_opt(&Utc, Utc::now().timestamp(), 0)
            .single()
            .unwrap();
        race.record_start(started, &mut conn)?;
        // 59.9 seconds of wall time records as 59: timestamps are second-resolution
        race.finish(started + Duration::milliseconds(59_900), &mut conn)?;
        assert_eq!("00:00:59", race.elapsed_formatted());
        Ok(())
    }

    #[test]
    fn test_finish_requires_in_progress() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let mut race = fx.new_race(0, &mut conn)?;
        match race.finish(Utc::now(), &mut conn) {
            Err(RaceStateError::InvalidState) => {}
            other => panic!("Expected InvalidState, got {other:?}"),
        }
        assert_eq!(RaceStatus::Pending, race.status()?);
        assert!(race.end_time.is_none());
        Ok(())
    }

    #[test]
    fn test_forfeit_supersedes_countdown() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let mut race = fx.new_race(0, &mut conn)?;
        race.begin_countdown(&mut conn)?;

        // a concurrent forfeit lands while the countdown is sleeping
        let mut concurrent = AsyncRace::get_by_id(race.id, &mut conn)?;
        concurrent.forfeit(&mut conn)?;

        // countdown completion is now a no-op
        assert!(!race.record_start(Utc::now(), &mut conn)?);
        let reloaded = AsyncRace::get_by_id(race.id, &mut conn)?;
        assert_eq!(RaceStatus::Forfeit, reloaded.status()?);
        assert!(reloaded.start_time.is_none());
        Ok(())
    }

    #[test]
    fn test_forfeit_is_irreversible() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let mut race = fx.new_race(0, &mut conn)?;
        race.forfeit(&mut conn)?;
        // no transition leads back out of forfeit
        assert!(race.begin_countdown(&mut conn).is_err());
        assert!(race.finish(Utc::now(), &mut conn).is_err());
        assert!(race.forfeit(&mut conn).is_err());
        Ok(())
    }

    #[test]
    fn test_record_live_result_is_idempotent() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let mut race = fx.new_race(0, &mut conn)?;
        race.begin_countdown(&mut conn)?;
        race.record_start(Utc::now(), &mut conn)?;

        let end = Utc::now() + Duration::seconds(100);
        assert!(race.record_live_result(RaceStatus::Finished, Some(end), &mut conn)?);
        // the second application observes a terminal row and does nothing
        let mut again = AsyncRace::get_by_id(race.id, &mut conn)?;
        assert!(!again.record_live_result(RaceStatus::Finished, Some(end), &mut conn)?);
        assert_eq!(Some(end.timestamp()), again.end_time);
        Ok(())
    }

    #[test]
    fn test_score_write_skips_stale_rows() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let mut race = fx.new_race(0, &mut conn)?;
        race.begin_countdown(&mut conn)?;
        race.record_start(Utc::now(), &mut conn)?;

        // scoring read the row while it was in progress...
        let mut scored_copy = AsyncRace::get_by_id(race.id, &mut conn)?;
        // ...and the runner finished in the meantime
        race.finish(Utc::now(), &mut conn)?;

        assert!(!scored_copy.set_score(100.0, &mut conn)?);
        let reloaded = AsyncRace::get_by_id(race.id, &mut conn)?;
        assert!(reloaded.score.is_none());
        Ok(())
    }
}
