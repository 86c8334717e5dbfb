pub mod in_progress_timeout_worker;
pub mod pending_timeout_worker;
pub mod score_worker;
