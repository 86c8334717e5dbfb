pub mod bot;
pub mod bot_state;
mod handlers;
mod interactions;

// button custom ids, stable across restarts
pub const CUSTOM_ID_READY: &str = "async_ready";
pub const CUSTOM_ID_FINISH: &str = "async_finish";
pub const CUSTOM_ID_FORFEIT: &str = "async_forfeit";
pub const CUSTOM_ID_TIMER: &str = "async_get_timer";

pub const NEW_RACE_CMD: &str = "newrace";
pub const DONE_CMD: &str = "done";
pub const REATTEMPT_CMD: &str = "reattempt";
pub const CREATE_TOURNAMENT_CMD: &str = "create_tournament";
pub const ADD_SEEDS_CMD: &str = "addseed";
pub const CLOSE_TOURNAMENT_CMD: &str = "close_tournament";
pub const EXTEND_TIMEOUT_CMD: &str = "extend_timeout";
pub const SUBMIT_VOD_CMD: &str = "submit_vod";
pub const REVIEW_CMD: &str = "review";
pub const UPDATE_RUN_CMD: &str = "update_run";
pub const PERMISSIONS_CMD: &str = "permissions";
pub const WHITELIST_CMD: &str = "whitelist";
pub const RECORD_LIVE_CMD: &str = "live_race_record";
pub const CALC_SCORES_CMD: &str = "calculate_scores";
