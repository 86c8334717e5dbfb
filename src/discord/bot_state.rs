use async_tourney_bot::db::DieselConnectionManager;
use async_tourney_bot::notify::DiscordNotifier;
use bb8::{Pool, PooledConnection, RunError};
use diesel::ConnectionError;
use std::sync::Arc;
use twilight_cache_inmemory::InMemoryCache;
use twilight_http::client::InteractionClient;
use twilight_http::Client;
use twilight_model::id::marker::ApplicationMarker;
use twilight_model::id::Id;

pub struct BotState {
    pub cache: InMemoryCache,
    pub discord_client: Arc<Client>,
    diesel_pool: Pool<DieselConnectionManager>,
    application_id: Id<ApplicationMarker>,
    notifier: DiscordNotifier,
}

impl BotState {
    pub fn new(
        cache: InMemoryCache,
        client: Arc<Client>,
        aid: Id<ApplicationMarker>,
        diesel_pool: Pool<DieselConnectionManager>,
    ) -> Self {
        let notifier = DiscordNotifier::new(client.clone());
        Self {
            cache,
            discord_client: client,
            diesel_pool,
            application_id: aid,
            notifier,
        }
    }

    pub fn interaction_client(&self) -> InteractionClient<'_> {
        self.discord_client.interaction(self.application_id)
    }

    pub fn notifier(&self) -> &DiscordNotifier {
        &self.notifier
    }

    pub fn diesel_pool(&self) -> Pool<DieselConnectionManager> {
        self.diesel_pool.clone()
    }

    pub async fn diesel_cxn(
        &self,
    ) -> Result<PooledConnection<'_, DieselConnectionManager>, RunError<ConnectionError>> {
        self.diesel_pool.get().await
    }
}
