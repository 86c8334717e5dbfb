use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedServiceError {
    #[error("Error reaching seed service: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Seed service returned {0}")]
    BadStatus(u16),
}

/// one generated seed; `code` is the human-checkable hash displayed on the file select
#[derive(Deserialize, Debug, Clone)]
pub struct GeneratedSeed {
    pub url: String,
    #[serde(default)]
    pub code: Vec<String>,
}

impl GeneratedSeed {
    pub fn code_string(&self) -> String {
        self.code.join("/")
    }
}

/// The randomizer service that mints permalinks. Failures surface to the caller as
/// user-visible errors; nothing here retries.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SeedService: Send + Sync {
    async fn generate(&self, preset: &str) -> Result<GeneratedSeed, SeedServiceError>;
}

pub struct HttpSeedService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSeedService {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait::async_trait]
impl SeedService for HttpSeedService {
    async fn generate(&self, preset: &str) -> Result<GeneratedSeed, SeedServiceError> {
        let resp = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&serde_json::json!({
                "preset": preset,
                "tournament": true,
                "spoilers": "off",
            }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SeedServiceError::BadStatus(resp.status().as_u16()));
        }
        Ok(resp.json::<GeneratedSeed>().await?)
    }
}
