use crate::shutdown::Shutdown;
use async_tourney_bot::config::CONFIG;
use async_tourney_bot::db::DieselConnectionManager;
use bb8::{Pool, PooledConnection};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};
use std::ops::{Deref, DerefMut};
use tokio::sync::broadcast::Receiver;

mod api;

/// a pooled diesel connection as a request guard
pub struct ConnectionWrapper<'r>(PooledConnection<'r, DieselConnectionManager>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ConnectionWrapper<'r> {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let pool = match request.guard::<&State<Pool<DieselConnectionManager>>>().await {
            Outcome::Success(p) => p,
            _ => {
                return Outcome::Failure((Status::InternalServerError, ()));
            }
        };
        match pool.get().await {
            Ok(conn) => Outcome::Success(ConnectionWrapper(conn)),
            Err(e) => {
                warn!("Error getting connection for request: {e}");
                Outcome::Failure((Status::InternalServerError, ()))
            }
        }
    }
}

impl<'r> Deref for ConnectionWrapper<'r> {
    type Target = diesel::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl<'r> DerefMut for ConnectionWrapper<'r> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.deref_mut()
    }
}

/// API key guard for the JSON api: `Authorization: ApiKey <secret>`
pub struct ApiKey {}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiKey {
    type Error = ();

    #[cfg(feature = "no_auth_api")]
    async fn from_request(_request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(Self {})
    }

    #[cfg(not(feature = "no_auth_api"))]
    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        static AUTHZ_REGEX: Lazy<Result<Regex, regex::Error>> =
            Lazy::new(|| Regex::new(r"^ApiKey\s+(?<key>\w+)$"));
        let re = match &*AUTHZ_REGEX {
            Ok(re) => re,
            Err(e) => {
                warn!("Error with AUTHZ_REGEX, unable to authorize for API: {e}");
                return Outcome::Failure((Status::InternalServerError, ()));
            }
        };
        let az = match request.headers().get_one("Authorization") {
            Some(az) => az,
            None => {
                return Outcome::Failure((Status::Unauthorized, ()));
            }
        };
        if let Some(provided_token) = re
            .captures(az)
            .and_then(|c| c.name("key"))
            .map(|m| m.as_str())
        {
            if provided_token == CONFIG.api_secret {
                return Outcome::Success(Self {});
            }
        }
        Outcome::Failure((Status::Unauthorized, ()))
    }
}

pub async fn launch(pool: Pool<DieselConnectionManager>, mut sd: Receiver<Shutdown>) {
    let rocket = rocket::build().manage(pool);
    let rocket = api::build_rocket(rocket);
    let ignited = match rocket.ignite().await {
        Ok(r) => r,
        Err(e) => {
            warn!("Error igniting rocket: {e}");
            return;
        }
    };
    let handle = ignited.shutdown();
    tokio::spawn(async move {
        sd.recv().await.ok();
        info!("Website shutting down...");
        handle.notify();
    });
    if let Err(e) = ignited.launch().await {
        warn!("Error running website: {e}");
    }
}
