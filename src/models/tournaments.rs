use crate::models::epoch_timestamp;
use crate::models::permissions::PermissionRole;
use crate::schema::{tournament_permissions, tournament_whitelist, tournaments};
use crate::{save_fn, update_fn};
use chrono::{DateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Serialize;

#[derive(Queryable, Identifiable, AsChangeset, Debug, Clone, Serialize)]
pub struct Tournament {
    pub id: i32,
    pub name: String,
    active: i32,
    pub guild_id: String,
    pub channel_id: String,
    pub report_channel_id: Option<String>,
    pub owner_discord_id: String,
    pub customization: String,
    pub runs_per_pool: i32,
    pub allowed_reattempts: i32,
    pub created: i64,
}

impl Tournament {
    pub fn get_by_id(
        id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        tournaments::table.find(id).first(conn).optional()
    }

    pub fn get_by_channel_id(
        channel_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, diesel::result::Error> {
        Ok(tournaments::table
            .filter(tournaments::channel_id.eq(channel_id))
            .load(conn)?
            .pop())
    }

    pub fn get_active(conn: &mut SqliteConnection) -> Result<Vec<Self>, diesel::result::Error> {
        tournaments::table
            .filter(tournaments::active.eq(1))
            .load(conn)
    }

    pub fn is_active(&self) -> bool {
        self.active == 1
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.created, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn is_owner(&self, discord_id: &str) -> bool {
        self.owner_discord_id == discord_id
    }

    /// tournaments are only ever deactivated, never deleted
    pub fn deactivate(&mut self, conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
        self.active = 0;
        self.update(conn)?;
        Ok(())
    }

    /// does this user hold any of these roles on this tournament?
    pub fn user_has_any_role(
        &self,
        user_id: i32,
        roles: &[PermissionRole],
        conn: &mut SqliteConnection,
    ) -> Result<bool, diesel::result::Error> {
        let role_strs = roles
            .iter()
            .map(|r| r.as_str().to_string())
            .collect::<Vec<_>>();
        let cnt: i64 = tournament_permissions::table
            .filter(tournament_permissions::tournament_id.eq(self.id))
            .filter(tournament_permissions::user_id.eq(user_id))
            .filter(tournament_permissions::role.eq_any(role_strs))
            .count()
            .get_result(conn)?;
        Ok(cnt > 0)
    }

    pub fn user_is_whitelisted(
        &self,
        user_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<bool, diesel::result::Error> {
        let cnt: i64 = tournament_whitelist::table
            .filter(tournament_whitelist::tournament_id.eq(self.id))
            .filter(tournament_whitelist::user_id.eq(user_id))
            .count()
            .get_result(conn)?;
        Ok(cnt > 0)
    }

    update_fn! {}
}

#[derive(Insertable)]
#[diesel(table_name=tournaments)]
pub struct NewTournament {
    name: String,
    active: i32,
    guild_id: String,
    channel_id: String,
    report_channel_id: Option<String>,
    owner_discord_id: String,
    customization: String,
    runs_per_pool: i32,
    allowed_reattempts: i32,
    created: i64,
}

impl NewTournament {
    pub fn new<S: Into<String>>(
        name: S,
        guild_id: S,
        channel_id: S,
        report_channel_id: Option<String>,
        owner_discord_id: S,
        runs_per_pool: i32,
        allowed_reattempts: i32,
    ) -> Self {
        Self {
            name: name.into(),
            active: 1,
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            report_channel_id,
            owner_discord_id: owner_discord_id.into(),
            customization: "standard".to_string(),
            runs_per_pool,
            allowed_reattempts,
            created: epoch_timestamp(),
        }
    }

    save_fn!(tournaments::table, Tournament);
}
