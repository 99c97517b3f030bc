use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::{build_http_client, ClassificationSource, FetchError};
use crate::models::Config;

/// Company profile pages ("notowania") from biznesradar.pl
pub struct BiznesradarClient {
    client: Client,
    base_url: String,
}

impl BiznesradarClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_http_client(config.feed_timeout)?,
            base_url: config.classification_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ClassificationSource for BiznesradarClient {
    async fn fetch_profile(&self, ticker: &str) -> Result<Option<String>, FetchError> {
        let url = format!("{}/notowania/{}", self.base_url, ticker);
        debug!("Fetching profile {}", url);

        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.text().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(FetchError::Status { url, status: status.as_u16() }),
        }
    }
}
