use crate::save_fn;
use crate::schema::{tournament_permissions, tournament_whitelist};
use diesel::prelude::*;
use diesel::SqliteConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionRole {
    Admin,
    Mod,
}

impl PermissionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionRole::Admin => "admin",
            PermissionRole::Mod => "mod",
        }
    }
}

impl std::str::FromStr for PermissionRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "mod" => Ok(Self::Mod),
            other => Err(format!("Unknown permission role: {other}")),
        }
    }
}

#[derive(Queryable, Identifiable, Debug)]
#[diesel(table_name=tournament_permissions)]
pub struct TournamentPermission {
    pub id: i32,
    pub tournament_id: i32,
    pub user_id: i32,
    pub role: String,
}

#[derive(Insertable)]
#[diesel(table_name=tournament_permissions)]
pub struct NewTournamentPermission {
    tournament_id: i32,
    user_id: i32,
    role: String,
}

impl NewTournamentPermission {
    pub fn new(tournament_id: i32, user_id: i32, role: PermissionRole) -> Self {
        Self {
            tournament_id,
            user_id,
            role: role.as_str().to_string(),
        }
    }

    /// grants are idempotent; re-granting an existing role is a no-op
    pub fn save_if_absent(
        self,
        conn: &mut SqliteConnection,
    ) -> Result<(), diesel::result::Error> {
        let existing: i64 = tournament_permissions::table
            .filter(tournament_permissions::tournament_id.eq(self.tournament_id))
            .filter(tournament_permissions::user_id.eq(self.user_id))
            .filter(tournament_permissions::role.eq(&self.role))
            .count()
            .get_result(conn)?;
        if existing == 0 {
            diesel::insert_into(tournament_permissions::table)
                .values(&self)
                .execute(conn)?;
        }
        Ok(())
    }
}

#[derive(Queryable, Identifiable, Debug)]
#[diesel(table_name=tournament_whitelist)]
pub struct WhitelistEntry {
    pub id: i32,
    pub tournament_id: i32,
    pub user_id: i32,
}

#[derive(Insertable)]
#[diesel(table_name=tournament_whitelist)]
pub struct NewWhitelistEntry {
    tournament_id: i32,
    user_id: i32,
}

impl NewWhitelistEntry {
    pub fn new(tournament_id: i32, user_id: i32) -> Self {
        Self {
            tournament_id,
            user_id,
        }
    }

    save_fn!(tournament_whitelist::table, WhitelistEntry);
}
