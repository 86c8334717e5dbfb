use async_tourney_bot::lifecycle::{
    finish_race, mark_ready, request_new_race, RaceActionError,
};
use async_tourney_bot::models::races::{AsyncRace, RaceStatus};
use async_tourney_bot::schema::races;
use async_tourney_bot::test_utils::fixtures;
use diesel::prelude::*;

mod common;

/// The whole journey: request a seed, ready up through the countdown, play for an
/// hour, finish, and then try to draw from the pool again.
#[tokio::test(start_paused = true)]
async fn test_full_async_race_lifecycle() -> anyhow::Result<()> {
    let mut conn = common::start_db()?;
    let fx = fixtures(&mut conn, 1, 5)?;
    let sink = common::RecordingSink::new(777);
    let player = &fx.users[0];

    let mut race = request_new_race("2000", player, "Pool A", &mut conn, &sink).await?;
    assert_eq!(RaceStatus::Pending, race.status()?);
    assert_eq!(fx.permalinks[0].id, race.permalink_id);
    // the briefing went into the freshly created thread
    let msgs = sink.messages();
    assert_eq!(1, msgs.len());
    assert_eq!(777, msgs[0].0);
    assert!(msgs[0].1.contains(&fx.permalinks[0].url));

    mark_ready(&mut race, player, &mut conn, &sink).await?;
    assert_eq!(RaceStatus::InProgress, race.status()?);
    assert!(race.start_time.is_some());
    let msgs = sink.messages();
    assert_eq!(
        10,
        msgs.iter().filter(|(_, m)| m.ends_with("...")).count()
    );
    assert!(msgs.iter().any(|(_, m)| m == "**GO!**"));

    // an hour of play
    diesel::update(races::table.find(race.id))
        .set(races::start_time.eq(race.start_time.map(|s| s - 3600)))
        .execute(&mut conn)?;
    let mut race = AsyncRace::get_by_id(race.id, &mut conn)?;

    finish_race(&mut race, player, &mut conn, &sink).await?;
    assert_eq!(RaceStatus::Finished, race.status()?);
    assert_eq!("01:00:00", race.elapsed_formatted());
    assert!(race.end_time.unwrap() >= race.start_time.unwrap());

    // runs_per_pool is 1, so the pool is spent
    match request_new_race("2000", player, "Pool A", &mut conn, &sink).await {
        Err(RaceActionError::NoEligiblePools) => {}
        other => panic!("Expected NoEligiblePools, got {other:?}"),
    }

    // with a five-run allowance the remaining seeds come back in order
    let mut tournament = fx.tournament.clone();
    tournament.runs_per_pool = 5;
    tournament.update(&mut conn)?;
    for expected in &fx.permalinks[1..] {
        let mut next = request_new_race("2000", player, "Pool A", &mut conn, &sink).await?;
        assert_eq!(expected.id, next.permalink_id);
        next.forfeit(&mut conn)?;
    }
    // and the sixth attempt has nothing left
    match request_new_race("2000", player, "Pool A", &mut conn, &sink).await {
        Err(RaceActionError::NoEligiblePools) => Ok(()),
        other => panic!("Expected NoEligiblePools, got {other:?}"),
    }
}

/// concurrent actors can't give one player two active races
#[tokio::test]
async fn test_one_active_race_per_player() -> anyhow::Result<()> {
    let mut conn = common::start_db()?;
    let fx = fixtures(&mut conn, 2, 3)?;
    let sink = common::RecordingSink::new(900);

    let mut tournament = fx.tournament.clone();
    tournament.runs_per_pool = 3;
    tournament.update(&mut conn)?;

    let race = request_new_race("2000", &fx.users[0], "Pool A", &mut conn, &sink).await?;
    match request_new_race("2000", &fx.users[0], "Pool A", &mut conn, &sink).await {
        Err(RaceActionError::DuplicateActiveRace) => {}
        other => panic!("Expected DuplicateActiveRace, got {other:?}"),
    }
    // a different player is unaffected
    request_new_race("2000", &fx.users[1], "Pool A", &mut conn, &sink).await?;

    // once the first race ends, the player can race again
    let mut race = AsyncRace::get_by_id(race.id, &mut conn)?;
    race.forfeit(&mut conn)?;
    let second = request_new_race("2000", &fx.users[0], "Pool A", &mut conn, &sink).await?;
    assert_ne!(race.permalink_id, second.permalink_id);
    Ok(())
}
