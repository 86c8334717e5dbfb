//! Batch scoring: par times per pool, normalized scores per race, and the
//! tournament leaderboard.
//!
//! Par is the elapsed time of the fifth-fastest finisher in a pool; until five
//! finishers exist the pool is unscored. A finished race earns
//! `min(par / elapsed, 2.0) * 100` points (so matching par is 100, and no run can
//! earn more than 200 no matter how fast); forfeits and disqualifications score
//! zero. Ranking ties break toward the earlier finisher.

use crate::models::permalink_pools::PermalinkPool;
use crate::models::races::{AsyncRace, RaceStatus, ReviewStatus};
use crate::models::tournaments::Tournament;
use crate::models::users::User;
use crate::schema::{races, users};
use diesel::prelude::*;
use diesel::SqliteConnection;
use itertools::Itertools;
use log::warn;
use serde::Serialize;
use thiserror::Error;

pub const PAR_FINISHER_COUNT: usize = 5;
const MAX_RATIO: f64 = 2.0;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),

    #[error("Deserialization error: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// the fifth-fastest finish, or None until the pool has five finishers
pub fn par_time(finish_times: &[i64]) -> Option<i64> {
    if finish_times.len() < PAR_FINISHER_COUNT {
        return None;
    }
    let mut sorted = finish_times.to_vec();
    sorted.sort();
    Some(sorted[PAR_FINISHER_COUNT - 1])
}

/// pure scoring curve for a finished race
pub fn score_for(elapsed: i64, par: i64) -> f64 {
    if elapsed <= 0 || par <= 0 {
        return 0.0;
    }
    let ratio = (par as f64) / (elapsed as f64);
    ratio.min(MAX_RATIO) * 100.0
}

fn eligible_for_scoring(race: &AsyncRace, only_approved: bool) -> bool {
    let status = match race.status() {
        Ok(s) => s,
        Err(_) => return false,
    };
    if !status.is_terminal() {
        return false;
    }
    if only_approved {
        return matches!(race.review_status(), Ok(ReviewStatus::Accepted));
    }
    true
}

/// Recomputes scores for every pool in this tournament. Each race is re-read and
/// conditionally written, so player transitions racing this pass are skipped
/// rather than clobbered.
pub fn calculate_tournament_scores(
    tournament: &Tournament,
    only_approved: bool,
    conn: &mut SqliteConnection,
) -> Result<(), ScoringError> {
    for pool in PermalinkPool::for_tournament(tournament.id, conn)? {
        let eligible: Vec<AsyncRace> = AsyncRace::for_pool(pool.id, conn)?
            .into_iter()
            .filter(|r| eligible_for_scoring(r, only_approved))
            .collect();

        let finish_times = eligible
            .iter()
            .filter(|r| matches!(r.status(), Ok(RaceStatus::Finished)))
            .filter_map(|r| r.elapsed_secs())
            .collect::<Vec<_>>();
        let par = match par_time(&finish_times) {
            Some(p) => p,
            None => {
                // not enough finishers yet; scores for this pool stay unset
                continue;
            }
        };

        for mut race in eligible {
            let score = match race.status() {
                Ok(RaceStatus::Finished) => match race.elapsed_secs() {
                    Some(elapsed) => score_for(elapsed, par),
                    None => continue,
                },
                Ok(RaceStatus::Forfeit) | Ok(RaceStatus::Disqualified) => 0.0,
                _ => continue,
            };
            match race.set_score(score, conn) {
                Ok(true) => {}
                Ok(false) => {
                    // the row moved out from under us; next pass will pick it up
                }
                Err(e) => {
                    warn!("Error persisting score for race {}: {e:?}", race.id);
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct LeaderboardRaceDetail {
    pub race_id: i32,
    pub pool_id: i32,
    pub pool_name: String,
    pub status: String,
    pub elapsed_time: String,
    pub score: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub player: User,
    pub score: f64,
    /// one slot per pool, in pool order; None for pools this player hasn't attempted
    pub races: Vec<Option<LeaderboardRaceDetail>>,
    pub finished_race_count: usize,
    pub forfeited_race_count: usize,
    pub unattempted_race_count: usize,
    /// earliest finish among this player's races; breaks score ties toward the
    /// earlier finisher
    earliest_finish: Option<i64>,
}

/// one row per participant with at least one non-reattempted race, sorted by
/// descending total score
pub fn get_leaderboard(
    tournament: &Tournament,
    conn: &mut SqliteConnection,
) -> Result<Vec<LeaderboardEntry>, ScoringError> {
    let pools = PermalinkPool::for_tournament(tournament.id, conn)?;

    let participant_ids: Vec<i32> = races::table
        .filter(races::tournament_id.eq(tournament.id))
        .filter(races::reattempted.eq(0))
        .select(races::user_id)
        .distinct()
        .load(conn)?;
    let participants: Vec<User> = users::table
        .filter(users::id.eq_any(&participant_ids))
        .load(conn)?;

    let mut by_pool: Vec<Vec<AsyncRace>> = Vec::with_capacity(pools.len());
    for pool in &pools {
        by_pool.push(AsyncRace::for_pool(pool.id, conn)?);
    }

    let mut entries = Vec::with_capacity(participants.len());
    for player in participants {
        let mut details: Vec<Option<LeaderboardRaceDetail>> = Vec::with_capacity(pools.len());
        let mut total = 0.0;
        let mut finished = 0;
        let mut forfeited = 0;
        let mut earliest_finish: Option<i64> = None;

        for (pool, pool_races) in pools.iter().zip(by_pool.iter()) {
            // one attempt per pool per player counts (the best-scored one, if the
            // tournament allows several); reattempts were filtered upstream
            let race = pool_races
                .iter()
                .filter(|r| r.user_id == player.id)
                .max_by(|a, b| {
                    let a_score = a.score.unwrap_or(0.0);
                    let b_score = b.score.unwrap_or(0.0);
                    a_score
                        .partial_cmp(&b_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            match race {
                Some(r) => {
                    match r.status() {
                        Ok(RaceStatus::Finished) => {
                            finished += 1;
                            if let Some(e) = r.end_time {
                                earliest_finish =
                                    Some(earliest_finish.map_or(e, |cur: i64| cur.min(e)));
                            }
                        }
                        Ok(RaceStatus::Forfeit) | Ok(RaceStatus::Disqualified) => {
                            forfeited += 1;
                        }
                        _ => {}
                    }
                    total += r.score.unwrap_or(0.0);
                    details.push(Some(LeaderboardRaceDetail {
                        race_id: r.id,
                        pool_id: pool.id,
                        pool_name: pool.name.clone(),
                        status: r.status().map(|s| s.to_string()).unwrap_or("unknown".to_string()),
                        elapsed_time: r.elapsed_formatted(),
                        score: r.score,
                    }));
                }
                None => details.push(None),
            }
        }

        let unattempted = details.iter().filter(|d| d.is_none()).count();
        entries.push(LeaderboardEntry {
            player,
            score: total,
            races: details,
            finished_race_count: finished,
            forfeited_race_count: forfeited,
            unattempted_race_count: unattempted,
            earliest_finish,
        });
    }

    let sorted = entries
        .into_iter()
        .sorted_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let a_key = a.earliest_finish.unwrap_or(i64::MAX);
                    let b_key = b.earliest_finish.unwrap_or(i64::MAX);
                    a_key.cmp(&b_key)
                })
        })
        .collect();
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fixtures, setup_db};
    use chrono::{Duration, Utc};

    #[test]
    fn test_par_time_requires_five_finishers() {
        assert_eq!(None, par_time(&[100, 200, 300, 400]));
        assert_eq!(Some(500), par_time(&[500, 100, 300, 200, 400]));
        assert_eq!(Some(500), par_time(&[500, 100, 300, 200, 400, 9000]));
    }

    #[test]
    fn test_score_curve() {
        // matching par is worth 100
        assert_eq!(100.0, score_for(3400, 3400));
        // twice as fast as par hits the cap
        assert_eq!(200.0, score_for(1700, 3400));
        // four times as fast is still capped
        assert_eq!(200.0, score_for(850, 3400));
        // slower than par decays but never goes negative
        assert!(score_for(6800, 3400) == 50.0);
        assert!(score_for(1_000_000, 3400) > 0.0);
        // determinism: same inputs, same output
        assert_eq!(score_for(3100, 3400), score_for(3100, 3400));
    }

    /// five finishers define par; a sixth at half of par outscores them all
    #[test]
    fn test_pool_scoring_scenario() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 6, 6)?;
        let base = Utc::now() - Duration::hours(6);
        let times = [3000, 3100, 3200, 3300, 3400, 1700];
        for (i, elapsed) in times.iter().enumerate() {
            let mut race = fx.new_race(i, &mut conn)?;
            race.begin_countdown(&mut conn)?;
            race.record_start(base, &mut conn)?;
            race.finish(base + Duration::seconds(*elapsed), &mut conn)?;
        }

        calculate_tournament_scores(&fx.tournament, false, &mut conn)?;

        let leaderboard = get_leaderboard(&fx.tournament, &mut conn)?;
        assert_eq!(6, leaderboard.len());
        // the 1700s runner beats every par-defining finisher
        assert_eq!("p5", leaderboard[0].player.name);
        assert_eq!(200.0, leaderboard[0].score);
        for entry in &leaderboard[1..] {
            assert!(entry.score < leaderboard[0].score);
        }
        // par was 3400, so the 3400s finisher scored exactly 100
        let par_runner = leaderboard.iter().find(|e| e.player.name == "p4").unwrap();
        assert_eq!(100.0, par_runner.score);
        Ok(())
    }

    #[test]
    fn test_no_scores_below_five_finishers() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 4, 4)?;
        let base = Utc::now() - Duration::hours(2);
        for i in 0..4 {
            let mut race = fx.new_race(i, &mut conn)?;
            race.begin_countdown(&mut conn)?;
            race.record_start(base, &mut conn)?;
            race.finish(base + Duration::seconds(3000 + i as i64), &mut conn)?;
        }
        calculate_tournament_scores(&fx.tournament, false, &mut conn)?;
        for entry in get_leaderboard(&fx.tournament, &mut conn)? {
            assert_eq!(0.0, entry.score);
            for d in entry.races.into_iter().flatten() {
                assert!(d.score.is_none());
            }
        }
        Ok(())
    }

    #[test]
    fn test_forfeits_score_zero() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 6, 6)?;
        let base = Utc::now() - Duration::hours(2);
        for i in 0..5 {
            let mut race = fx.new_race(i, &mut conn)?;
            race.begin_countdown(&mut conn)?;
            race.record_start(base, &mut conn)?;
            race.finish(base + Duration::seconds(3000), &mut conn)?;
        }
        let mut ff = fx.new_race(5, &mut conn)?;
        ff.forfeit(&mut conn)?;

        calculate_tournament_scores(&fx.tournament, false, &mut conn)?;
        let reloaded = AsyncRace::get_by_id(ff.id, &mut conn)?;
        assert_eq!(Some(0.0), reloaded.score);
        Ok(())
    }

    #[test]
    fn test_only_approved_filter() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 6, 6)?;
        let base = Utc::now() - Duration::hours(2);
        let mut race_ids = vec![];
        for i in 0..6 {
            let mut race = fx.new_race(i, &mut conn)?;
            race.begin_countdown(&mut conn)?;
            race.record_start(base, &mut conn)?;
            race.finish(base + Duration::seconds(3000 + 100 * i as i64), &mut conn)?;
            race_ids.push(race.id);
        }
        // only five runs are accepted; the sixth shouldn't be scored or counted
        for id in &race_ids[0..5] {
            let mut r = AsyncRace::get_by_id(*id, &mut conn)?;
            r.set_review(
                fx.users[5].id,
                ReviewStatus::Accepted,
                None,
                Utc::now(),
                &mut conn,
            )?;
        }
        calculate_tournament_scores(&fx.tournament, true, &mut conn)?;
        let unapproved = AsyncRace::get_by_id(race_ids[5], &mut conn)?;
        assert!(unapproved.score.is_none());
        let approved = AsyncRace::get_by_id(race_ids[0], &mut conn)?;
        assert!(approved.score.is_some());
        Ok(())
    }

    #[test]
    fn test_reattempted_races_are_excluded() -> anyhow::Result<()> {
        let mut conn = setup_db()?;
        let fx = fixtures(&mut conn, 6, 6)?;
        let base = Utc::now() - Duration::hours(2);
        for i in 0..5 {
            let mut race = fx.new_race(i, &mut conn)?;
            race.begin_countdown(&mut conn)?;
            race.record_start(base, &mut conn)?;
            race.finish(base + Duration::seconds(3000), &mut conn)?;
        }
        let mut voided = fx.new_race(5, &mut conn)?;
        voided.begin_countdown(&mut conn)?;
        voided.record_start(base, &mut conn)?;
        voided.finish(base + Duration::seconds(10), &mut conn)?;
        voided.mark_reattempted(Some("practice".to_string()), &mut conn)?;

        calculate_tournament_scores(&fx.tournament, false, &mut conn)?;
        let reloaded = AsyncRace::get_by_id(voided.id, &mut conn)?;
        assert!(reloaded.score.is_none());
        // and they don't show up on the leaderboard either
        let lb = get_leaderboard(&fx.tournament, &mut conn)?;
        assert!(lb.iter().all(|e| e.player.id != fx.users[5].id));
        Ok(())
    }
}
