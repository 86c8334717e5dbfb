use crate::models::permalinks::Permalink;
use crate::save_fn;
use crate::schema::{permalink_pools, permalinks, races};
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Serialize;

#[derive(Queryable, Identifiable, Debug, Clone, Serialize)]
pub struct PermalinkPool {
    pub id: i32,
    pub tournament_id: i32,
    pub name: String,
    pub preset: String,
}

impl PermalinkPool {
    pub fn get_by_id(
        id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        permalink_pools::table.find(id).first(conn).optional()
    }

    pub fn get_by_name(
        tournament_id: i32,
        name: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        Ok(permalink_pools::table
            .filter(permalink_pools::tournament_id.eq(tournament_id))
            .filter(permalink_pools::name.eq(name))
            .load(conn)?
            .pop())
    }

    pub fn for_tournament(
        tournament_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        permalink_pools::table
            .filter(permalink_pools::tournament_id.eq(tournament_id))
            .order_by(permalink_pools::id.asc())
            .load(conn)
    }

    pub fn permalinks(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Permalink>, diesel::result::Error> {
        permalinks::table
            .filter(permalinks::pool_id.eq(self.id))
            .order_by(permalinks::id.asc())
            .load(conn)
    }

    /// how many non-reattempted races this user has recorded against this pool
    pub fn play_count_for_user(
        &self,
        user_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<i64, diesel::result::Error> {
        races::table
            .inner_join(permalinks::table)
            .filter(permalinks::pool_id.eq(self.id))
            .filter(races::user_id.eq(user_id))
            .filter(races::reattempted.eq(0))
            .count()
            .get_result(conn)
    }

    /// Picks the permalink to hand this user, or None if the pool has nothing left for them.
    ///
    /// Selection is deterministic: lowest-id permalink in the pool that this user has no
    /// non-reattempted play against. A reattempted play does not consume a permalink.
    pub fn eligible_permalink_for_user(
        &self,
        user_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Permalink>, diesel::result::Error> {
        let played: Vec<i32> = races::table
            .inner_join(permalinks::table)
            .filter(permalinks::pool_id.eq(self.id))
            .filter(races::user_id.eq(user_id))
            .filter(races::reattempted.eq(0))
            .select(races::permalink_id)
            .load(conn)?;

        Ok(self
            .permalinks(conn)?
            .into_iter()
            .find(|p| !played.contains(&p.id)))
    }
}

#[derive(Insertable)]
#[diesel(table_name=permalink_pools)]
pub struct NewPermalinkPool {
    tournament_id: i32,
    name: String,
    preset: String,
}

impl NewPermalinkPool {
    pub fn new<S: Into<String>>(tournament_id: i32, name: S, preset: S) -> Self {
        Self {
            tournament_id,
            name: name.into(),
            preset: preset.into(),
        }
    }

    save_fn!(permalink_pools::table, PermalinkPool);
}
