//! REST adapter for the social platform.

use super::{RecordFetcher, ReplySender};
use crate::credentials::Credentials;
use crate::error::{AckError, Error, FetchError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rtmirror_core::{EventRecord, RecordId};
use std::time::Duration;

/// Configuration for [`HttpPlatform`].
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// REST API base, e.g. `https://api.twitter.com/1.1`.
    pub api_base: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.twitter.com/1.1".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Platform REST client used for parent fetches and replies.
#[derive(Debug, Clone)]
pub struct HttpPlatform {
    client: Client,
    api_base: String,
}

impl HttpPlatform {
    pub fn new(config: PlatformConfig, credentials: &Credentials) -> Result<Self> {
        if config.api_base.trim().is_empty() {
            return Err(Error::Config("platform API base must not be empty".to_string()));
        }
        let client = Client::builder()
            .default_headers(credentials.header_map()?)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn show_url(&self, id: RecordId) -> String {
        format!("{}/statuses/show/{}.json", self.api_base, id)
    }

    fn update_url(&self) -> String {
        format!("{}/statuses/update.json", self.api_base)
    }
}

#[async_trait]
impl RecordFetcher for HttpPlatform {
    async fn fetch(&self, id: RecordId) -> std::result::Result<EventRecord, FetchError> {
        let response = self.client.get(self.show_url(id)).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(id)),
            status => {
                return Err(FetchError::Status {
                    id,
                    status: status.as_u16(),
                });
            }
        }
        let body = response.text().await?;
        Ok(rtmirror_core::parse(&body)?)
    }
}

#[async_trait]
impl ReplySender for HttpPlatform {
    async fn reply(
        &self,
        text: &str,
        in_reply_to: Option<RecordId>,
    ) -> std::result::Result<(), AckError> {
        let mut form: Vec<(&str, String)> = vec![("status", text.to_string())];
        if let Some(id) = in_reply_to {
            form.push(("in_reply_to_status_id", id.to_string()));
        }

        let response = self.client.post(self.update_url()).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(AckError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
