use crate::models::epoch_timestamp;
use crate::save_fn;
use crate::schema::audit_log_entries;
use diesel::prelude::*;
use diesel::SqliteConnection;
use serde::Serialize;

/// action tags recorded in the audit log
pub mod actions {
    pub const CREATE: &str = "create";
    pub const CLOSE: &str = "close";
    pub const CREATE_THREAD: &str = "create_thread";
    pub const RACE_READY: &str = "race_ready";
    pub const RACE_COUNTDOWN: &str = "race_countdown";
    pub const RACE_STARTED: &str = "race_started";
    pub const RACE_FINISH: &str = "race_finish";
    pub const RUNNER_FORFEIT: &str = "runner_forfeit";
    pub const TIMEOUT_FORFEIT: &str = "timeout_forfeit";
    pub const REATTEMPT: &str = "reattempt";
    pub const EXTEND_TIMEOUT: &str = "extend_timeout";
    pub const ADMIN_UPDATE: &str = "admin_update";
    pub const LIVE_RACE_RECORD: &str = "live_race_record";
}

// Append-only. There is deliberately no update or delete on this model.
#[derive(Queryable, Identifiable, Debug, Clone, Serialize)]
#[diesel(table_name=audit_log_entries)]
pub struct AuditLogEntry {
    pub id: i32,
    pub tournament_id: i32,
    pub user_id: Option<i32>,
    pub action: String,
    pub details: String,
    pub created: i64,
}

impl AuditLogEntry {
    pub fn for_tournament(
        tournament_id: i32,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        audit_log_entries::table
            .filter(audit_log_entries::tournament_id.eq(tournament_id))
            .order_by(audit_log_entries::id.asc())
            .load(conn)
    }

    pub fn for_tournament_with_action(
        tournament_id: i32,
        action: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Self>, diesel::result::Error> {
        audit_log_entries::table
            .filter(audit_log_entries::tournament_id.eq(tournament_id))
            .filter(audit_log_entries::action.eq(action))
            .order_by(audit_log_entries::id.asc())
            .load(conn)
    }
}

#[derive(Insertable)]
#[diesel(table_name=audit_log_entries)]
pub struct NewAuditLogEntry {
    tournament_id: i32,
    user_id: Option<i32>,
    action: String,
    details: String,
    created: i64,
}

impl NewAuditLogEntry {
    /// `user_id` is None for system actions (sweeps)
    pub fn new<S: Into<String>>(
        tournament_id: i32,
        user_id: Option<i32>,
        action: &str,
        details: S,
    ) -> Self {
        Self {
            tournament_id,
            user_id,
            action: action.to_string(),
            details: details.into(),
            created: epoch_timestamp(),
        }
    }

    save_fn!(audit_log_entries::table, AuditLogEntry);
}
