//! Sweep bodies for the background workers, kept here so test code can drive them
//! with a fixed clock and a mock sink.

use crate::lifecycle::PENDING_TIMEOUT_MINUTES;
use crate::models::audit_log::{actions, NewAuditLogEntry};
use crate::models::races::{AsyncRace, RaceStateError};
use crate::notify::{parse_channel_id, NotificationSink};
use chrono::{DateTime, Duration, TimeZone, Utc};
use diesel::SqliteConnection;
use log::warn;
use twilight_mention::Mention;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

pub const IN_PROGRESS_TIMEOUT_HOURS: i64 = 12;
const WARNING_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub warned: usize,
    pub forfeited: usize,
}

fn mention_for(race: &AsyncRace, conn: &mut SqliteConnection) -> String {
    race.user(conn)
        .ok()
        .and_then(|u| u.discord_id().ok())
        .map(|id: Id<UserMarker>| id.mention().to_string())
        .unwrap_or("runner".to_string())
}

/// Forfeits `race` as a system action and records the audit entry. The transition
/// is conditional, so losing the race to a concurrent player action is fine.
async fn force_forfeit<N: NotificationSink>(
    race: &mut AsyncRace,
    message: &str,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<bool, RaceStateError> {
    match race.forfeit(conn) {
        Ok(()) => {}
        Err(RaceStateError::InvalidState) => {
            // someone else moved this row first; nothing to do
            return Ok(false);
        }
        Err(e) => return Err(e),
    }
    NewAuditLogEntry::new(
        race.tournament_id,
        None,
        actions::TIMEOUT_FORFEIT,
        format!("{} was automatically forfeited by System due to timeout", race.id),
    )
    .save(conn)?;

    if let Some(thread) = race.thread_id.as_ref().and_then(|t| parse_channel_id(t).ok()) {
        if let Err(e) = sink.send_message(thread, message).await {
            warn!("Error notifying thread about forced forfeit of race {}: {e}", race.id);
        }
    }
    Ok(true)
}

/// One pass of the pending-race sweep: stamps missing deadlines, warns runners
/// inside the final ten minutes, and forfeits races whose deadline has passed.
/// A failure on one race is logged and does not stop the rest.
pub async fn sweep_pending_timeouts<N: NotificationSink>(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<SweepStats, diesel::result::Error> {
    let mut stats = SweepStats::default();
    for mut race in AsyncRace::pending_with_threads(conn)? {
        if let Err(e) = handle_pending_race(&mut race, now, &mut stats, conn, sink).await {
            warn!("Error sweeping pending race {}: {e:?}", race.id);
        }
    }
    Ok(stats)
}

async fn handle_pending_race<N: NotificationSink>(
    race: &mut AsyncRace,
    now: DateTime<Utc>,
    stats: &mut SweepStats,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<(), RaceStateError> {
    let deadline = match race.thread_timeout_time {
        Some(t) => t,
        None => {
            let open = match race.thread_open_time {
                Some(o) => o,
                None => {
                    return Ok(());
                }
            };
            let deadline = open + PENDING_TIMEOUT_MINUTES * 60;
            race.set_thread_timeout(
                Utc.timestamp_opt(deadline, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                conn,
            )?;
            deadline
        }
    };

    if now.timestamp() >= deadline {
        let msg = format!(
            "{}, the grace period for the start of this run has elapsed. This run has been forfeit. Please contact the admins if you believe this was in error.",
            mention_for(race, conn)
        );
        if force_forfeit(race, &msg, conn, sink).await? {
            stats.forfeited += 1;
        }
        return Ok(());
    }

    let warning_opens = deadline - WARNING_WINDOW_MINUTES * 60;
    if now.timestamp() > warning_opens {
        let msg = format!(
            "{}, your race will be permanently forfeit at <t:{deadline}:f> (<t:{deadline}:R>) if you do not start it by then. Please start your run as soon as possible.",
            mention_for(race, conn)
        );
        if let Err(e) = sink
            .send_message(
                race.thread_id
                    .as_ref()
                    .and_then(|t| parse_channel_id(t).ok())
                    .ok_or(RaceStateError::InvalidState)?,
                &msg,
            )
            .await
        {
            warn!("Error warning race {} about its timeout: {e}", race.id);
        } else {
            stats.warned += 1;
        }
    }
    Ok(())
}

/// One pass of the in-progress sweep: any race running for longer than twelve
/// hours is forfeited as a system action.
pub async fn sweep_in_progress_timeouts<N: NotificationSink>(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
    sink: &N,
) -> Result<SweepStats, diesel::result::Error> {
    let mut stats = SweepStats::default();
    let cutoff = now - Duration::hours(IN_PROGRESS_TIMEOUT_HOURS);
    for mut race in AsyncRace::in_progress_with_threads(conn)? {
        // a race mid-countdown has no start time yet and can't time out
        let start = match race.start_time {
            Some(s) => s,
            None => continue,
        };
        if start > cutoff.timestamp() {
            continue;
        }
        let msg = format!(
            "{}, this race has exceeded {IN_PROGRESS_TIMEOUT_HOURS} hours. This run has been forfeit. Please contact the admins if you believe this was in error.",
            mention_for(&race, conn)
        );
        match force_forfeit(&mut race, &msg, conn, sink).await {
            Ok(true) => stats.forfeited += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("Error sweeping in-progress race {}: {e:?}", race.id);
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit_log::AuditLogEntry;
    use crate::notify::{MockNotificationSink, NotifyError};
    use crate::schema::races;
    use crate::test_utils::{fixtures, setup_db};
    use diesel::prelude::*;

    fn backdate_thread_open(
        race: &AsyncRace,
        minutes: i64,
        conn: &mut SqliteConnection,
    ) -> anyhow::Result<()> {
        let t = Utc::now().timestamp() - minutes * 60;
        diesel::update(races::table.find(race.id))
            .set(races::thread_open_time.eq(Some(t)))
            .execute(conn)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_sweep_sets_deadline_quietly() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let race = fx.new_race(0, &mut conn)?;

        // freshly opened: no warning, no forfeit, just a stamped deadline
        let sink = MockNotificationSink::new();
        let stats = sweep_pending_timeouts(Utc::now(), &mut conn, &sink).await?;
        assert_eq!(SweepStats::default(), stats);
        let reloaded = AsyncRace::get_by_id(race.id, &mut conn)?;
        let expected = reloaded.thread_open_time.unwrap() + 20 * 60;
        assert_eq!(Some(expected), reloaded.thread_timeout_time);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_sweep_warns_inside_window() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let race = fx.new_race(0, &mut conn)?;
        backdate_thread_open(&race, 12, &mut conn)?;

        let mut sink = MockNotificationSink::new();
        sink.expect_send_message()
            .withf(|_, msg| msg.contains("permanently forfeit"))
            .times(1)
            .returning(|_, _| Ok(()));
        let stats = sweep_pending_timeouts(Utc::now(), &mut conn, &sink).await?;
        assert_eq!(1, stats.warned);
        assert_eq!(0, stats.forfeited);
        let reloaded = AsyncRace::get_by_id(race.id, &mut conn)?;
        assert_eq!(
            crate::models::races::RaceStatus::Pending,
            reloaded.status()?
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_sweep_forfeits_after_deadline_exactly_once() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let race = fx.new_race(0, &mut conn)?;
        backdate_thread_open(&race, 21, &mut conn)?;

        let mut sink = MockNotificationSink::new();
        sink.expect_send_message().returning(|_, _| Ok(()));
        let stats = sweep_pending_timeouts(Utc::now(), &mut conn, &sink).await?;
        assert_eq!(1, stats.forfeited);
        let reloaded = AsyncRace::get_by_id(race.id, &mut conn)?;
        assert_eq!(
            crate::models::races::RaceStatus::Forfeit,
            reloaded.status()?
        );

        // idempotence: a second sweep finds nothing to do
        let stats = sweep_pending_timeouts(Utc::now(), &mut conn, &sink).await?;
        assert_eq!(0, stats.forfeited);
        let entries = AuditLogEntry::for_tournament_with_action(
            fx.tournament.id,
            actions::TIMEOUT_FORFEIT,
            &mut conn,
        )?;
        assert_eq!(1, entries.len());
        assert!(entries[0].user_id.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_sweep_notification_failure_does_not_block_others() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 2, 2)?;
        let r1 = fx.new_race(0, &mut conn)?;
        let r2 = fx.new_race(1, &mut conn)?;
        backdate_thread_open(&r1, 30, &mut conn)?;
        backdate_thread_open(&r2, 30, &mut conn)?;

        let mut sink = MockNotificationSink::new();
        sink.expect_send_message().returning(|_, _| {
            Err(NotifyError::BadChannelId("nope".parse::<u64>().unwrap_err()))
        });
        let stats = sweep_pending_timeouts(Utc::now(), &mut conn, &sink).await?;
        // both forfeits landed even though every message send failed
        assert_eq!(2, stats.forfeited);
        for id in [r1.id, r2.id] {
            let reloaded = AsyncRace::get_by_id(id, &mut conn)?;
            assert_eq!(
                crate::models::races::RaceStatus::Forfeit,
                reloaded.status()?
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_in_progress_sweep() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 2, 2)?;

        // one race past the twelve hour limit, one comfortably inside it
        let mut stale = fx.new_race(0, &mut conn)?;
        stale.begin_countdown(&mut conn)?;
        stale.record_start(Utc::now() - Duration::hours(13), &mut conn)?;
        let mut fresh = fx.new_race(1, &mut conn)?;
        fresh.begin_countdown(&mut conn)?;
        fresh.record_start(Utc::now() - Duration::hours(1), &mut conn)?;

        let mut sink = MockNotificationSink::new();
        sink.expect_send_message().returning(|_, _| Ok(()));
        let stats = sweep_in_progress_timeouts(Utc::now(), &mut conn, &sink).await?;
        assert_eq!(1, stats.forfeited);

        let stale = AsyncRace::get_by_id(stale.id, &mut conn)?;
        assert_eq!(crate::models::races::RaceStatus::Forfeit, stale.status()?);
        let fresh = AsyncRace::get_by_id(fresh.id, &mut conn)?;
        assert_eq!(
            crate::models::races::RaceStatus::InProgress,
            fresh.status()?
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_in_progress_sweep_skips_countdown_races() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 1, 1)?;
        let mut race = fx.new_race(0, &mut conn)?;
        race.begin_countdown(&mut conn)?;

        let sink = MockNotificationSink::new();
        let stats = sweep_in_progress_timeouts(Utc::now(), &mut conn, &sink).await?;
        assert_eq!(0, stats.forfeited);
        Ok(())
    }
}
