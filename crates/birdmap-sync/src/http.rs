//! HTTP client for the eBird notable-observations endpoint.

use std::time::Duration;

use async_trait::async_trait;
use birdmap_core::NotableObservation;
use tracing::{info, warn};

use crate::{ApiKey, NotableSource, RegionQuery, SyncError};

pub const DEFAULT_BASE_URL: &str = "https://api.ebird.org/v2";

const TOKEN_HEADER: &str = "X-eBirdApiToken";

/// Connection settings. The API key is passed separately so this can be
/// logged freely.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Like `https://api.ebird.org/v2`; a trailing slash is tolerated.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct EbirdClient {
    client: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
}

impl EbirdClient {
    pub fn new(api_key: ApiKey, config: ClientConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("birdmap/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn notable_url(&self, query: &RegionQuery) -> String {
        format!(
            "{}/data/obs/{}/recent/notable?detail=full&back={}",
            self.base_url,
            query.region(),
            query.days_back()
        )
    }
}

#[async_trait]
impl NotableSource for EbirdClient {
    async fn fetch_notable(
        &self,
        query: &RegionQuery,
    ) -> Result<Vec<NotableObservation>, SyncError> {
        let url = self.notable_url(query);
        info!(url = %url, "requesting notable observations");

        let resp = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, self.api_key.expose())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), region = %query.region(), "eBird request failed");
            return Err(SyncError::from_status(
                status.as_u16(),
                query.region(),
                body,
                retry_after,
            ));
        }

        let body = resp.text().await?;
        let entries: Vec<NotableObservation> = serde_json::from_str(&body)?;
        info!(count = entries.len(), "received notable observations");
        Ok(entries)
    }
}
