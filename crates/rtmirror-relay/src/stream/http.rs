//! Streaming endpoint transport over reqwest.

use super::{StreamBody, StreamTransport};
use crate::credentials::Credentials;
use crate::error::{ConnectError, Error, ReadError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use std::time::Duration;

/// Configuration for [`HttpStreamTransport`].
#[derive(Debug, Clone)]
pub struct HttpStreamConfig {
    /// Streaming filter endpoint.
    pub url: String,
    /// Filter term sent as the `track` parameter.
    pub track: String,
    /// Timeout for establishing the connection and receiving headers.
    pub connect_timeout: Duration,
}

impl Default for HttpStreamConfig {
    fn default() -> Self {
        Self {
            url: "https://stream.twitter.com/1.1/statuses/filter.json".to_string(),
            track: String::new(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Opens the long-lived filter request.
///
/// No overall request timeout is set: the body is expected to stay open
/// indefinitely.
pub struct HttpStreamTransport {
    client: Client,
    url: String,
    track: String,
}

impl HttpStreamTransport {
    pub fn new(config: HttpStreamConfig, credentials: &Credentials) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::Config("stream URL must not be empty".to_string()));
        }
        if config.track.trim().is_empty() {
            return Err(Error::Config("track term must not be empty".to_string()));
        }
        let client = Client::builder()
            .default_headers(credentials.header_map()?)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            url: config.url,
            track: config.track,
        })
    }
}

#[async_trait]
impl StreamTransport for HttpStreamTransport {
    fn describe(&self) -> String {
        format!("{} (track={})", self.url, self.track)
    }

    async fn open(&self) -> std::result::Result<Box<dyn StreamBody>, ConnectError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("track", self.track.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectError::Status(status.as_u16()));
        }
        Ok(Box::new(HttpStreamBody { response }))
    }
}

struct HttpStreamBody {
    response: Response,
}

#[async_trait]
impl StreamBody for HttpStreamBody {
    async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, ReadError> {
        Ok(self.response.chunk().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use std::collections::HashMap;

    fn credentials() -> Credentials {
        Credentials::from_json(r#"{"headers": {"Authorization": "Bearer t"}}"#).unwrap()
    }

    #[test]
    fn test_describe_includes_track() {
        let transport = HttpStreamTransport::new(
            HttpStreamConfig {
                track: "#rtmirror".to_string(),
                ..Default::default()
            },
            &credentials(),
        )
        .unwrap();
        let description = transport.describe();
        assert!(description.contains("stream.twitter.com"));
        assert!(description.contains("track=#rtmirror"));
    }

    #[test]
    fn test_rejects_empty_track() {
        let result = HttpStreamTransport::new(HttpStreamConfig::default(), &credentials());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    async fn filter(
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, String) {
        let authorized = headers.get("authorization").is_some_and(|v| v == "Bearer t");
        if !authorized {
            return (StatusCode::UNAUTHORIZED, String::new());
        }
        let track = query.get("track").cloned().unwrap_or_default();
        (StatusCode::OK, format!("{{\"track\":\"{}\"}}\r\n\r\n", track))
    }

    async fn transport(token: &str) -> HttpStreamTransport {
        let app = Router::new().route("/1.1/statuses/filter.json", get(filter));
        let base = serve(app).await;
        let credentials =
            Credentials::from_json(&format!(r#"{{"headers": {{"Authorization": "{}"}}}}"#, token))
                .unwrap();
        HttpStreamTransport::new(
            HttpStreamConfig {
                url: format!("{}/1.1/statuses/filter.json", base),
                track: "#rtmirror".to_string(),
                ..Default::default()
            },
            &credentials,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_sends_track_and_headers() {
        let transport = transport("Bearer t").await;

        let mut body = transport.open().await.unwrap();
        let mut received = Vec::new();
        while let Some(chunk) = body.next_chunk().await.unwrap() {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"{\"track\":\"#rtmirror\"}\r\n\r\n");
    }

    #[tokio::test]
    async fn test_open_maps_http_status() {
        let transport = transport("Bearer expired").await;
        assert!(matches!(
            transport.open().await,
            Err(ConnectError::Status(401))
        ));
    }
}
