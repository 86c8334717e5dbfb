use crate::save_fn;
use crate::schema::users;
use diesel::prelude::*;
use diesel::SqliteConnection;
use std::num::ParseIntError;
use std::str::FromStr;
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

#[derive(Queryable, Identifiable, Debug, Clone, serde::Serialize)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub discord_id: String,
    pub racetime_id: Option<String>,
}

impl User {
    /// this should never fail but i'm scared of assuming that
    pub fn discord_id(&self) -> Result<Id<UserMarker>, ParseIntError> {
        Id::<UserMarker>::from_str(&self.discord_id)
    }

    pub fn get_by_id(
        id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        users::table.find(id).first(conn).optional()
    }

    pub fn get_by_discord_id(
        id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        Ok(users::table
            .filter(users::discord_id.eq(id))
            .load(conn)?
            .pop())
    }

    pub fn get_by_racetime_id(
        rtgg_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        Ok(users::table
            .filter(users::racetime_id.eq(rtgg_id))
            .load(conn)?
            .pop())
    }

    /// fetches the user with this discord id, creating a row if there isn't one yet
    pub fn get_or_create<S: Into<String>>(
        discord_id: S,
        name: S,
        conn: &mut SqliteConnection,
    ) -> Result<Self, diesel::result::Error> {
        let did = discord_id.into();
        if let Some(u) = Self::get_by_discord_id(&did, conn)? {
            return Ok(u);
        }
        NewUser::new(name.into(), did, None).save(conn)
    }

    pub fn set_racetime_id(
        &mut self,
        rtgg_id: String,
        conn: &mut SqliteConnection,
    ) -> Result<(), diesel::result::Error> {
        self.racetime_id = Some(rtgg_id);
        diesel::update(users::table.find(self.id))
            .set(users::racetime_id.eq(&self.racetime_id))
            .execute(conn)?;
        Ok(())
    }
}

#[derive(Insertable)]
#[diesel(table_name=users)]
pub struct NewUser {
    pub name: String,
    pub discord_id: String,
    pub racetime_id: Option<String>,
}

impl NewUser {
    pub fn new<S: Into<String>>(name: S, discord_id: S, racetime_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            discord_id: discord_id.into(),
            racetime_id,
        }
    }
    save_fn!(users::table, User);
}
