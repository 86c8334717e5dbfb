//! read-only JSON projections of the tournament entities

use crate::web::{ApiKey, ConnectionWrapper};
use async_tourney_bot::models::permalink_pools::PermalinkPool;
use async_tourney_bot::models::permalinks::Permalink;
use async_tourney_bot::models::races::AsyncRace;
use async_tourney_bot::models::tournaments::Tournament;
use async_tourney_bot::schema::{permalink_pools, permalinks, races, tournaments};
use async_tourney_bot::scoring::{get_leaderboard, LeaderboardEntry, ScoringError};
use diesel::prelude::*;
use rocket::serde::json::Json;
use rocket::{get, Build, Rocket};
use std::ops::DerefMut;

const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_PAGE_SIZE: i64 = 20;

#[derive(serde::Serialize, thiserror::Error, Debug)]
enum ApiError {
    #[error("Internal error communicating with database")]
    DatabaseError,

    #[error("Tournament not found")]
    NotFound,

    #[error("page_size cannot be greater than 100")]
    PageSizeTooLarge,

    #[error("Unknown status filter")]
    BadStatusFilter,
}

impl From<diesel::result::Error> for ApiError {
    fn from(_value: diesel::result::Error) -> Self {
        Self::DatabaseError
    }
}

impl From<ScoringError> for ApiError {
    fn from(_value: ScoringError) -> Self {
        Self::DatabaseError
    }
}

fn get_tournaments(
    active: Option<bool>,
    db: &mut SqliteConnection,
) -> Result<Vec<Tournament>, ApiError> {
    let mut q = tournaments::table.into_boxed();
    if let Some(a) = active {
        q = q.filter(tournaments::active.eq(if a { 1 } else { 0 }));
    }
    Ok(q.order_by(tournaments::id.asc()).load(db)?)
}

#[get("/tournaments?<active>")]
async fn tournaments_list(
    _key: ApiKey,
    active: Option<bool>,
    mut db: ConnectionWrapper<'_>,
) -> Json<Result<Vec<Tournament>, ApiError>> {
    Json(get_tournaments(active, db.deref_mut()))
}

#[get("/tournaments/<id>")]
async fn tournament_detail(
    _key: ApiKey,
    id: i32,
    mut db: ConnectionWrapper<'_>,
) -> Json<Result<Tournament, ApiError>> {
    Json(
        Tournament::get_by_id(id, db.deref_mut())
            .map_err(ApiError::from)
            .and_then(|t| t.ok_or(ApiError::NotFound)),
    )
}

#[allow(clippy::too_many_arguments)]
fn get_races(
    tournament_id: i32,
    race_id: Option<i32>,
    user_id: Option<i32>,
    permalink_id: Option<i32>,
    pool_id: Option<i32>,
    status: Option<String>,
    page: Option<i64>,
    page_size: Option<i64>,
    db: &mut SqliteConnection,
) -> Result<Vec<AsyncRace>, ApiError> {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size > MAX_PAGE_SIZE {
        return Err(ApiError::PageSizeTooLarge);
    }

    let mut q = races::table
        .filter(races::tournament_id.eq(tournament_id))
        .into_boxed();
    if let Some(id) = race_id {
        q = q.filter(races::id.eq(id));
    }
    if let Some(uid) = user_id {
        q = q.filter(races::user_id.eq(uid));
    }
    if let Some(pid) = permalink_id {
        q = q.filter(races::permalink_id.eq(pid));
    }
    if let Some(pool) = pool_id {
        q = q.filter(
            races::permalink_id
                .eq_any(permalinks::table.select(permalinks::id).filter(permalinks::pool_id.eq(pool))),
        );
    }
    if let Some(s) = status {
        // stored statuses are JSON strings; validate the filter before quoting it
        serde_json::from_str::<async_tourney_bot::models::races::RaceStatus>(&format!("\"{s}\""))
            .map_err(|_| ApiError::BadStatusFilter)?;
        q = q.filter(races::status.eq(format!("\"{s}\"")));
    }

    Ok(q.order_by(races::id.asc())
        .offset((page - 1) * page_size)
        .limit(page_size)
        .load(db)?)
}

#[get("/tournaments/<id>/races?<race_id>&<user_id>&<permalink_id>&<pool_id>&<status>&<page>&<page_size>")]
#[allow(clippy::too_many_arguments)]
async fn races_list(
    _key: ApiKey,
    id: i32,
    race_id: Option<i32>,
    user_id: Option<i32>,
    permalink_id: Option<i32>,
    pool_id: Option<i32>,
    status: Option<String>,
    page: Option<i64>,
    page_size: Option<i64>,
    mut db: ConnectionWrapper<'_>,
) -> Json<Result<Vec<AsyncRace>, ApiError>> {
    Json(get_races(
        id,
        race_id,
        user_id,
        permalink_id,
        pool_id,
        status,
        page,
        page_size,
        db.deref_mut(),
    ))
}

#[get("/tournaments/<id>/pools")]
async fn pools_list(
    _key: ApiKey,
    id: i32,
    mut db: ConnectionWrapper<'_>,
) -> Json<Result<Vec<PermalinkPool>, ApiError>> {
    Json(PermalinkPool::for_tournament(id, db.deref_mut()).map_err(ApiError::from))
}

fn get_permalinks(
    tournament_id: i32,
    pool_id: Option<i32>,
    db: &mut SqliteConnection,
) -> Result<Vec<Permalink>, ApiError> {
    let mut q = permalinks::table
        .filter(
            permalinks::pool_id.eq_any(
                permalink_pools::table
                    .select(permalink_pools::id)
                    .filter(permalink_pools::tournament_id.eq(tournament_id)),
            ),
        )
        .into_boxed();
    if let Some(pid) = pool_id {
        q = q.filter(permalinks::pool_id.eq(pid));
    }
    Ok(q.order_by(permalinks::id.asc()).load(db)?)
}

#[get("/tournaments/<id>/permalinks?<pool_id>")]
async fn permalinks_list(
    _key: ApiKey,
    id: i32,
    pool_id: Option<i32>,
    mut db: ConnectionWrapper<'_>,
) -> Json<Result<Vec<Permalink>, ApiError>> {
    Json(get_permalinks(id, pool_id, db.deref_mut()))
}

fn leaderboard_inner(
    tournament_id: i32,
    db: &mut SqliteConnection,
) -> Result<Vec<LeaderboardEntry>, ApiError> {
    let tournament =
        Tournament::get_by_id(tournament_id, db)?.ok_or(ApiError::NotFound)?;
    Ok(get_leaderboard(&tournament, db)?)
}

#[get("/tournaments/<id>/leaderboard")]
async fn leaderboard(
    _key: ApiKey,
    id: i32,
    mut db: ConnectionWrapper<'_>,
) -> Json<Result<Vec<LeaderboardEntry>, ApiError>> {
    Json(leaderboard_inner(id, db.deref_mut()))
}

pub fn build_rocket(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount(
        "/api/v1",
        rocket::routes![
            tournaments_list,
            tournament_detail,
            races_list,
            pools_list,
            permalinks_list,
            leaderboard
        ],
    )
}
