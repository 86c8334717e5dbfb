use async_tourney_bot::db::run_migrations;
use async_tourney_bot::notify::{NotificationSink, NotifyError};
use diesel::{Connection, SqliteConnection};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use twilight_model::id::marker::{ChannelMarker, UserMarker};
use twilight_model::id::Id;

pub fn start_db() -> Result<SqliteConnection, anyhow::Error> {
    let mut db = SqliteConnection::establish(":memory:")?;
    run_migrations(&mut db).map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(db)
}

/// a sink that records everything it's asked to send and mints thread ids
pub struct RecordingSink {
    messages: Mutex<Vec<(u64, String)>>,
    next_thread: AtomicU64,
}

impl RecordingSink {
    pub fn new(first_thread_id: u64) -> Self {
        Self {
            messages: Mutex::new(vec![]),
            next_thread: AtomicU64::new(first_thread_id),
        }
    }

    pub fn messages(&self) -> Vec<(u64, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn send_message(
        &self,
        channel_id: Id<ChannelMarker>,
        content: &str,
    ) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((channel_id.get(), content.to_string()));
        Ok(())
    }

    async fn create_private_thread(
        &self,
        _parent: Id<ChannelMarker>,
        _name: &str,
        _user: Id<UserMarker>,
    ) -> Result<Id<ChannelMarker>, NotifyError> {
        Ok(Id::new(self.next_thread.fetch_add(1, Ordering::SeqCst)))
    }
}
