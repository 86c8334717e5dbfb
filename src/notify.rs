use std::num::ParseIntError;
use std::sync::Arc;
use thiserror::Error;
use twilight_http::response::DeserializeBodyError;
use twilight_http::Client;
use twilight_model::channel::ChannelType;
use twilight_model::id::marker::{ChannelMarker, UserMarker};
use twilight_model::id::Id;
use twilight_validate::channel::ChannelValidationError;
use twilight_validate::message::MessageValidationError;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Twilight HTTP Error: {0}")]
    TwilightHttpError(#[from] twilight_http::Error),

    #[error("Error validating Discord message: {0}")]
    MessageValidationError(#[from] MessageValidationError),

    #[error("Error validating Discord channel: {0}")]
    ChannelValidationError(#[from] ChannelValidationError),

    #[error("{0}")]
    DeserializeBodyError(#[from] DeserializeBodyError),

    #[error("Invalid channel id: {0}")]
    BadChannelId(#[from] ParseIntError),
}

/// The core's only line to the chat transport. Lifecycle code and sweeps talk to
/// this instead of a concrete Discord client so they can run against a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// posts a message into a channel or thread
    async fn send_message(
        &self,
        channel_id: Id<ChannelMarker>,
        content: &str,
    ) -> Result<(), NotifyError>;

    /// opens a private thread under `parent` and invites `user` into it
    async fn create_private_thread(
        &self,
        parent: Id<ChannelMarker>,
        name: &str,
        user: Id<UserMarker>,
    ) -> Result<Id<ChannelMarker>, NotifyError>;
}

pub fn parse_channel_id(raw: &str) -> Result<Id<ChannelMarker>, NotifyError> {
    let n = raw.parse::<u64>()?;
    Ok(Id::new(n))
}

/// the real sink: a thin wrapper over a shared twilight HTTP client
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Arc<Client>,
}

impl DiscordNotifier {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl NotificationSink for DiscordNotifier {
    async fn send_message(
        &self,
        channel_id: Id<ChannelMarker>,
        content: &str,
    ) -> Result<(), NotifyError> {
        twilight_validate::message::content(content)?;
        self.client
            .create_message(channel_id)
            .content(content)?
            .await?;
        Ok(())
    }

    async fn create_private_thread(
        &self,
        parent: Id<ChannelMarker>,
        name: &str,
        user: Id<UserMarker>,
    ) -> Result<Id<ChannelMarker>, NotifyError> {
        let resp = self
            .client
            .create_thread(parent, name, ChannelType::PrivateThread)?
            .invitable(false)
            .await?;
        let thread = resp.model().await?;
        self.client.add_thread_member(thread.id, user).await?;
        Ok(thread.id)
    }
}
