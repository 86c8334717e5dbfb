use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use diesel::{Connection, ConnectionError, SqliteConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::config::CONFIG;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub struct DieselConnectionManager {
    database_url: String,
}

impl DieselConnectionManager {
    pub fn new_from_env() -> Self {
        Self {
            database_url: CONFIG.database_url.clone(),
        }
    }
}

#[async_trait]
impl ManageConnection for DieselConnectionManager {
    type Connection = SqliteConnection;
    type Error = ConnectionError;

    // establishing a sqlite connection is cheap enough to do inline on the runtime
    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        SqliteConnection::establish(&self.database_url)
    }

    async fn is_valid(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub async fn get_diesel_pool() -> Pool<DieselConnectionManager> {
    let manager = DieselConnectionManager::new_from_env();
    Pool::builder()
        .max_size(12)
        .build(manager)
        .await
        .expect("Unable to build diesel connection pool")
}

pub fn raw_diesel_cxn_from_env() -> Result<SqliteConnection, ConnectionError> {
    SqliteConnection::establish(&CONFIG.database_url)
}

pub fn run_migrations(
    conn: &mut SqliteConnection,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    conn.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}
