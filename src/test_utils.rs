use crate::db::run_migrations;
use crate::models::permalink_pools::{NewPermalinkPool, PermalinkPool};
use crate::models::permalinks::{NewPermalink, Permalink};
use crate::models::races::{AsyncRace, NewAsyncRace};
use crate::models::tournaments::{NewTournament, Tournament};
use crate::models::users::{NewUser, User};
use chrono::Utc;
use diesel::{Connection as _, SqliteConnection};

pub fn setup_db() -> Result<SqliteConnection, anyhow::Error> {
    let mut db = SqliteConnection::establish(":memory:")?;
    run_migrations(&mut db).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(db)
}

#[allow(unused)]
pub struct Fixture {
    pub tournament: Tournament,
    pub users: Vec<User>,
    pub pool: PermalinkPool,
    pub permalinks: Vec<Permalink>,
}

impl Fixture {
    /// opens a pending race (with a thread) for the nth fixture user against the
    /// first permalink they haven't played
    pub fn new_race(
        &self,
        user_idx: usize,
        conn: &mut SqliteConnection,
    ) -> Result<AsyncRace, anyhow::Error> {
        let user = &self.users[user_idx];
        let permalink = self
            .pool
            .eligible_permalink_for_user(user.id, conn)?
            .ok_or(anyhow::anyhow!("Pool exhausted for user {}", user.id))?;
        let race = NewAsyncRace::new(
            &self.tournament,
            user,
            &permalink,
            Some(format!("thread-{}-{}", user.id, permalink.id)),
            Some(Utc::now()),
        )
        .save(conn)?;
        Ok(race)
    }
}

/// creates a tournament (runs_per_pool=1, one reattempt allowed), one pool with
/// `npermalinks` seeds, and `nusers` users
pub fn fixtures(
    conn: &mut SqliteConnection,
    nusers: usize,
    npermalinks: usize,
) -> Result<Fixture, anyhow::Error> {
    let tournament = NewTournament::new(
        "test tournament",
        "1000",
        "2000",
        None,
        "123450001",
        1,
        1,
    )
    .save(conn)?;
    let pool = NewPermalinkPool::new(tournament.id, "Pool A", "open").save(conn)?;
    let mut permalinks = Vec::with_capacity(npermalinks);
    for i in 0..npermalinks {
        permalinks.push(
            NewPermalink::new(
                pool.id,
                format!("https://example.com/seed/{i}"),
                None,
                false,
            )
            .save(conn)?,
        );
    }
    let mut users = Vec::with_capacity(nusers);
    for i in 0..nusers {
        let mut u = NewUser::new(format!("p{i}"), format!("9{i}1234"), None).save(conn)?;
        u.set_racetime_id(format!("rtgg{i}"), conn)?;
        users.push(u);
    }
    Ok(Fixture {
        tournament,
        users,
        pool,
        permalinks,
    })
}

#[cfg(test)]
mod tests {
    use super::setup_db;
    use diesel::dsl::count;
    use diesel::prelude::*;

    #[test]
    fn test_database_init() -> anyhow::Result<()> {
        let mut db = setup_db()?;
        crate::models::users::NewUser::new("name", "1234", None).save(&mut db)?;
        let count = crate::schema::users::table
            .select(count(crate::schema::users::id))
            .get_result::<i64>(&mut db)?;
        assert_eq!(1, count);
        Ok(())
    }

    #[test]
    fn test_database_init_is_isolated() -> anyhow::Result<()> {
        // this is just a separate test to make sure that the user created in the previous test doesn't carry over

        let mut db = setup_db()?;
        crate::models::users::NewUser::new("name", "1234", None).save(&mut db)?;
        let count = crate::schema::users::table
            .select(count(crate::schema::users::id))
            .get_result::<i64>(&mut db)?;
        assert_eq!(1, count);
        Ok(())
    }
}
