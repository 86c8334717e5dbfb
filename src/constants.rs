pub const TOKEN_VAR: &str = "DISCORD_TOKEN";
pub const APPLICATION_ID_VAR: &str = "APPLICATION_ID";

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

pub const GUILD_ID_VAR: &str = "TOURNEY_GUILD_ID";
pub const OPERATOR_DISCORD_ID_VAR: &str = "OPERATOR_DISCORD_ID";

pub const RACETIME_BASE_URL_VAR: &str = "RACETIME_BASE_URL";
pub const SEED_SERVICE_URL_VAR: &str = "SEED_SERVICE_URL";

pub const PENDING_SWEEP_TICK_SECS_VAR: &str = "PENDING_SWEEP_TICK_SECS";
pub const IN_PROGRESS_SWEEP_TICK_SECS_VAR: &str = "IN_PROGRESS_SWEEP_TICK_SECS";
pub const SCORING_TICK_SECS_VAR: &str = "SCORING_TICK_SECS";

pub const API_SECRET_VAR: &str = "API_SECRET";

pub const LOG4RS_CONF_FILE_VAR: &str = "LOG4RS_CONFIG_FILE";
