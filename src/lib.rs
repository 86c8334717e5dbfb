use bb8::RunError;
use diesel::ConnectionError;
use thiserror::Error;
use twilight_http::response::DeserializeBodyError;
use twilight_validate::message::MessageValidationError;

pub mod config;
pub mod constants;
pub mod db;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod racetime_types;
pub mod reconcile;
pub mod schema;
pub mod scoring;
pub mod seed_service;
pub mod test_utils;
pub mod utils;
pub mod worker_funcs;

#[derive(Error, Debug)]
pub enum TourneyBotError {
    #[error("Twilight HTTP Error: {0}")]
    TwilightHttpError(#[from] twilight_http::Error),

    #[error("Error validating Discord message: {0}")]
    MessageValidationError(#[from] MessageValidationError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),

    #[error("[De]serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Illegal state transition: {0:?}")]
    StateError(String),

    #[error("{0}")]
    DeserializeBodyError(#[from] DeserializeBodyError),

    #[error("{0}")]
    Bb8Error(#[from] RunError<ConnectionError>),

    #[error("HTTP error: {0}")]
    ReqwestError(#[from] reqwest::Error),
}
