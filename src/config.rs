use crate::constants::{
    API_SECRET_VAR, APPLICATION_ID_VAR, DATABASE_URL_VAR, GUILD_ID_VAR,
    IN_PROGRESS_SWEEP_TICK_SECS_VAR, OPERATOR_DISCORD_ID_VAR, PENDING_SWEEP_TICK_SECS_VAR,
    RACETIME_BASE_URL_VAR, SCORING_TICK_SECS_VAR, SEED_SERVICE_URL_VAR, TOKEN_VAR,
};
use crate::utils::{env_default, env_var};
use once_cell::sync::Lazy;
use std::str::FromStr;
use twilight_model::id::marker::{ApplicationMarker, GuildMarker};
use twilight_model::id::Id;

pub static CONFIG: Lazy<Config> = Lazy::new(|| Config::new_from_env());

pub struct Config {
    pub discord_token: String,
    pub discord_application_id: Id<ApplicationMarker>,
    pub guild_id: Id<GuildMarker>,
    /// the one user allowed to create tournaments
    pub operator_discord_id: String,

    pub database_url: String,

    pub racetime_base_url: String,
    pub seed_service_url: String,

    pub pending_sweep_tick_secs: u64,
    pub in_progress_sweep_tick_secs: u64,
    pub scoring_tick_secs: u64,

    pub api_secret: String,
}

fn id_from_env<T>(k: &str) -> Id<T> {
    Id::<T>::new(parse::<u64>(k))
}

fn parse<T: FromStr>(k: &str) -> T {
    match env_var(k).parse::<T>() {
        Ok(t) => t,
        Err(_e) => {
            panic!(
                "Failed to parse value of {k} as {}",
                std::any::type_name::<T>()
            )
        }
    }
}

impl Config {
    fn new_from_env() -> Self {
        Self {
            discord_token: env_var(TOKEN_VAR),
            discord_application_id: id_from_env(APPLICATION_ID_VAR),
            guild_id: id_from_env(GUILD_ID_VAR),
            operator_discord_id: env_var(OPERATOR_DISCORD_ID_VAR),
            database_url: env_var(DATABASE_URL_VAR),
            racetime_base_url: env_var(RACETIME_BASE_URL_VAR),
            seed_service_url: env_var(SEED_SERVICE_URL_VAR),
            pending_sweep_tick_secs: env_default(PENDING_SWEEP_TICK_SECS_VAR, 60),
            in_progress_sweep_tick_secs: env_default(IN_PROGRESS_SWEEP_TICK_SECS_VAR, 60),
            scoring_tick_secs: env_default(SCORING_TICK_SECS_VAR, 3600),
            api_secret: env_var(API_SECRET_VAR),
        }
    }
}
