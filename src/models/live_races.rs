use crate::models::epoch_timestamp;
use crate::save_fn;
use crate::schema::live_races;
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Serialize;

#[derive(serde::Serialize, serde::Deserialize, Eq, PartialEq, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LiveRaceStatus {
    Pending,
    InProgress,
    Finished,
}

fn status_json(status: &LiveRaceStatus) -> String {
    serde_json::to_string(status).unwrap_or("Unknown".to_string())
}

/// bridges a real-time qualifier session to the async race rows of its entrants
#[derive(Queryable, Identifiable, Debug, Clone, Serialize)]
pub struct LiveRace {
    pub id: i32,
    pub tournament_id: i32,
    pub racetime_slug: String,
    pub status: String,
    pub created: i64,
}

impl LiveRace {
    pub fn get_by_slug(
        slug: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        Ok(live_races::table
            .filter(live_races::racetime_slug.eq(slug))
            .load(conn)?
            .pop())
    }

    pub fn status(&self) -> Result<LiveRaceStatus, serde_json::Error> {
        serde_json::from_str(&self.status)
    }

    /// closes this live race once no async rows remain in progress; conditional so
    /// a concurrent close is harmless
    pub fn finish(&mut self, conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
        diesel::update(
            live_races::table
                .filter(live_races::id.eq(self.id))
                .filter(live_races::status.ne(status_json(&LiveRaceStatus::Finished))),
        )
        .set(live_races::status.eq(status_json(&LiveRaceStatus::Finished)))
        .execute(conn)?;
        self.status = status_json(&LiveRaceStatus::Finished);
        Ok(())
    }
}

#[derive(Insertable)]
#[diesel(table_name=live_races)]
pub struct NewLiveRace {
    tournament_id: i32,
    racetime_slug: String,
    status: String,
    created: i64,
}

impl NewLiveRace {
    pub fn new<S: Into<String>>(tournament_id: i32, racetime_slug: S) -> Self {
        Self {
            tournament_id,
            racetime_slug: racetime_slug.into(),
            status: status_json(&LiveRaceStatus::InProgress),
            created: epoch_timestamp(),
        }
    }

    save_fn!(live_races::table, LiveRace);
}
