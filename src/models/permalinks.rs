use crate::save_fn;
use crate::schema::permalinks;
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Serialize;

#[derive(Queryable, Identifiable, Debug, Clone, Serialize)]
pub struct Permalink {
    pub id: i32,
    pub pool_id: i32,
    pub url: String,
    pub notes: Option<String>,
    live_race: i32,
}

impl Permalink {
    pub fn get_by_id(
        id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        permalinks::table.find(id).first(conn).optional()
    }

    /// true if this permalink came out of a live qualifier rather than pre-generation
    pub fn is_live_race(&self) -> bool {
        self.live_race == 1
    }
}

#[derive(Insertable)]
#[diesel(table_name=permalinks)]
pub struct NewPermalink {
    pool_id: i32,
    url: String,
    notes: Option<String>,
    live_race: i32,
}

impl NewPermalink {
    pub fn new<S: Into<String>>(
        pool_id: i32,
        url: S,
        notes: Option<String>,
        live_race: bool,
    ) -> Self {
        Self {
            pool_id,
            url: url.into(),
            notes,
            live_race: if live_race { 1 } else { 0 },
        }
    }

    save_fn!(permalinks::table, Permalink);
}
