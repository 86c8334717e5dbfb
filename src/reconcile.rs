//! Imports the results of a live qualifier (run on the external race service) into
//! the async race rows of entrants who are also tournament participants.

use crate::models::audit_log::{actions, NewAuditLogEntry};
use crate::models::live_races::{LiveRace, LiveRaceStatus};
use crate::models::permissions::PermissionRole;
use crate::models::races::{AsyncRace, RaceStatus};
use crate::models::tournaments::Tournament;
use crate::models::users::User;
use crate::racetime_types::{Entrant, EntrantOutcome, RaceSnapshot};
use diesel::SqliteConnection;
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("That slug is not an async tournament live race.")]
    UnknownSlug,

    #[error("This race is not currently in progress.")]
    NotInProgress,

    #[error("You are not authorized to record this live race.")]
    NotAuthorized,

    #[error("Error fetching race data: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Race service returned {0}")]
    BadStatus(u16),

    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// rows actually transitioned by this pass
    pub applied: usize,
    /// things a human should look at; a non-empty list means run it again later
    pub warnings: Vec<String>,
    pub live_race_closed: bool,
}

/// Applies one snapshot of entrant results. Safe to re-run: a row that is already
/// terminal is left alone, so a second pass with the same snapshot applies nothing.
pub fn apply_live_race_snapshot(
    live_race: &mut LiveRace,
    entrants: &[Entrant],
    conn: &mut SqliteConnection,
) -> Result<ReconcileReport, ReconcileError> {
    let mut report = ReconcileReport::default();

    for entrant in entrants {
        info!(
            "Processing entrant {} ({})...",
            entrant.user.name, entrant.user.id
        );
        // entrants who aren't tournament participants are simply not our problem
        let user = match User::get_by_racetime_id(&entrant.user.id, conn)? {
            Some(u) => u,
            None => continue,
        };
        let mut race = match AsyncRace::for_live_race(live_race, user.id, conn)? {
            Some(r) => r,
            None => continue,
        };

        let (status, end_time) = match entrant.outcome() {
            Ok(EntrantOutcome::Done(t)) => (RaceStatus::Finished, Some(t)),
            Ok(EntrantOutcome::Dnf) => (RaceStatus::Forfeit, None),
            Ok(EntrantOutcome::Dq(t)) => (RaceStatus::Disqualified, t),
            Ok(EntrantOutcome::NotDone) => {
                report.warnings.push(format!(
                    "{} is not finished, forfeited, or disqualified. This runner is likely still in progress, and this race will need to be recorded again.",
                    entrant.user.name
                ));
                continue;
            }
            Err(e) => {
                report
                    .warnings
                    .push(format!("Error reading result for {}: {e}", entrant.user.name));
                continue;
            }
        };

        match race.record_live_result(status, end_time, conn) {
            Ok(true) => report.applied += 1,
            Ok(false) => {
                // already recorded on a previous pass
            }
            Err(e) => {
                report
                    .warnings
                    .push(format!("Error recording result for {}: {e:?}", entrant.user.name));
            }
        }
    }

    let still_running = AsyncRace::in_progress_count_for_live_race(live_race, conn)?;
    if still_running > 0 {
        report.warnings.push(format!(
            "There are still {still_running} race(s) in progress for this live race, even after recording. You'll need to record this race again when they finish."
        ));
    } else {
        live_race.finish(conn)?;
        report.live_race_closed = true;
    }
    Ok(report)
}

/// Slash-command entry point: authorizes the actor, fetches the snapshot from the
/// race service, and applies it.
pub async fn record_live_race(
    slug: &str,
    force: bool,
    actor: &User,
    racetime_base_url: &str,
    conn: &mut SqliteConnection,
) -> Result<ReconcileReport, ReconcileError> {
    let mut live_race =
        LiveRace::get_by_slug(slug, conn)?.ok_or(ReconcileError::UnknownSlug)?;
    if live_race.status().ok() != Some(LiveRaceStatus::InProgress) && !force {
        return Err(ReconcileError::NotInProgress);
    }

    let tournament = Tournament::get_by_id(live_race.tournament_id, conn)?
        .ok_or(ReconcileError::UnknownSlug)?;
    if !tournament
        .user_has_any_role(actor.id, &[PermissionRole::Admin, PermissionRole::Mod], conn)?
    {
        return Err(ReconcileError::NotAuthorized);
    }

    let resp = reqwest::get(format!("{racetime_base_url}/{slug}/data")).await?;
    if !resp.status().is_success() {
        return Err(ReconcileError::BadStatus(resp.status().as_u16()));
    }
    let snapshot = resp.json::<RaceSnapshot>().await?;

    let report = apply_live_race_snapshot(&mut live_race, &snapshot.entrants, conn)?;
    NewAuditLogEntry::new(
        tournament.id,
        Some(actor.id),
        actions::LIVE_RACE_RECORD,
        format!(
            "Recorded live race {slug}: {} result(s) applied, {} warning(s)",
            report.applied,
            report.warnings.len()
        ),
    )
    .save(conn)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::live_races::NewLiveRace;
    use crate::models::races::NewAsyncRace;
    use crate::racetime_types::{EntrantStatus, EntrantUser};
    use crate::test_utils::{fixtures, setup_db, Fixture};
    use chrono::Utc;
    use diesel::SqliteConnection;

    fn entrant(rtgg_id: &str, status: &str, finished_at: Option<&str>) -> Entrant {
        Entrant {
            user: EntrantUser {
                id: rtgg_id.to_string(),
                name: format!("{rtgg_id} (name)"),
            },
            status: EntrantStatus {
                value: status.to_string(),
            },
            finished_at: finished_at.map(|s| s.to_string()),
        }
    }

    /// live-race rows: in progress, no thread, bound to the live race
    fn live_race_fixture(
        fx: &Fixture,
        nracers: usize,
        conn: &mut SqliteConnection,
    ) -> anyhow::Result<(LiveRace, Vec<AsyncRace>)> {
        let live = NewLiveRace::new(fx.tournament.id, "alttp/cunning-race-1234").save(conn)?;
        let mut races = vec![];
        for i in 0..nracers {
            let mut race = NewAsyncRace::new(
                &fx.tournament,
                &fx.users[i],
                &fx.permalinks[0],
                None,
                None,
            )
            .for_live_race(live.id)
            .save(conn)?;
            race.begin_countdown(conn)?;
            race.record_start(Utc::now(), conn)?;
            races.push(race);
        }
        Ok((live, races))
    }

    #[test]
    fn test_apply_snapshot_maps_statuses() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 3, 3)?;
        let (mut live, races) = live_race_fixture(&fx, 3, &mut conn)?;

        let entrants = vec![
            entrant("rtgg0", "done", Some("2023-04-15T19:23:45+00:00")),
            entrant("rtgg1", "dnf", None),
            entrant("rtgg2", "dq", Some("2023-04-15T19:30:00+00:00")),
            // a racer who isn't an async participant at all
            entrant("rtgg-stranger", "done", Some("2023-04-15T19:00:00+00:00")),
        ];
        let report = apply_live_race_snapshot(&mut live, &entrants, &mut conn)?;
        assert_eq!(3, report.applied);
        assert!(report.warnings.is_empty());
        assert!(report.live_race_closed);

        let r0 = AsyncRace::get_by_id(races[0].id, &mut conn)?;
        assert_eq!(RaceStatus::Finished, r0.status()?);
        assert_eq!(Some(1681586625), r0.end_time);
        let r1 = AsyncRace::get_by_id(races[1].id, &mut conn)?;
        assert_eq!(RaceStatus::Forfeit, r1.status()?);
        assert!(r1.end_time.is_none());
        let r2 = AsyncRace::get_by_id(races[2].id, &mut conn)?;
        assert_eq!(RaceStatus::Disqualified, r2.status()?);
        assert!(r2.end_time.is_some());
        Ok(())
    }

    #[test]
    fn test_apply_snapshot_is_idempotent() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 2, 2)?;
        let (mut live, races) = live_race_fixture(&fx, 2, &mut conn)?;

        let entrants = vec![
            entrant("rtgg0", "done", Some("2023-04-15T19:23:45+00:00")),
            entrant("rtgg1", "dnf", None),
        ];
        let first = apply_live_race_snapshot(&mut live, &entrants, &mut conn)?;
        assert_eq!(2, first.applied);

        let statuses_after_first: Vec<_> = races
            .iter()
            .map(|r| AsyncRace::get_by_id(r.id, &mut conn).unwrap().status)
            .collect();

        let second = apply_live_race_snapshot(&mut live, &entrants, &mut conn)?;
        assert_eq!(0, second.applied);
        let statuses_after_second: Vec<_> = races
            .iter()
            .map(|r| AsyncRace::get_by_id(r.id, &mut conn).unwrap().status)
            .collect();
        assert_eq!(statuses_after_first, statuses_after_second);
        Ok(())
    }

    #[test]
    fn test_apply_snapshot_leaves_unfinished_entrants_open() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 2, 2)?;
        let (mut live, races) = live_race_fixture(&fx, 2, &mut conn)?;

        let entrants = vec![
            entrant("rtgg0", "done", Some("2023-04-15T19:23:45+00:00")),
            entrant("rtgg1", "in_progress", None),
        ];
        let report = apply_live_race_snapshot(&mut live, &entrants, &mut conn)?;
        assert_eq!(1, report.applied);
        // one warning for the still-running entrant, one for the open live race
        assert_eq!(2, report.warnings.len());
        assert!(!report.live_race_closed);
        assert_eq!(
            LiveRaceStatus::InProgress,
            LiveRace::get_by_slug(&live.racetime_slug, &mut conn)?
                .unwrap()
                .status()?
        );

        let r1 = AsyncRace::get_by_id(races[1].id, &mut conn)?;
        assert_eq!(RaceStatus::InProgress, r1.status()?);

        // the straggler finishes; a second recording closes everything out
        let entrants = vec![
            entrant("rtgg0", "done", Some("2023-04-15T19:23:45+00:00")),
            entrant("rtgg1", "done", Some("2023-04-15T20:00:00+00:00")),
        ];
        let report = apply_live_race_snapshot(&mut live, &entrants, &mut conn)?;
        assert_eq!(1, report.applied);
        assert!(report.live_race_closed);
        Ok(())
    }
}
