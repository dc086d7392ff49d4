//! Process configuration.
//!
//! Read once at startup and treated as immutable afterwards. The binary
//! fills a [`RelayConfig`] from command-line flags and the environment;
//! components receive the slices they need through the `*_config` helpers.

use crate::collab::{LedgerConfig, Network, PlatformConfig};
use crate::error::{Error, Result};
use crate::pipeline::{DEFAULT_CAPACITY, DEFAULT_WINDOW};
use crate::stream::{BackoffPolicy, HttpStreamConfig};
use rtmirror_core::DEFAULT_WEB_BASE;
use std::path::PathBuf;
use std::time::Duration;

/// Default capacity of the redelivery guard.
pub const DEFAULT_SEEN_CAPACITY: usize = 4096;

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The relay's own account; its records are never relayed.
    pub self_handle: String,
    /// Filter term for the inbound stream.
    pub track: String,

    pub stream_url: String,
    pub api_base: String,
    /// Platform web front end, used for links in bulletins.
    pub web_base: String,
    /// Base URL of the public status pages linked from confirmations.
    pub status_url: String,
    /// Token file written by the authorization tool.
    pub token_file: PathBuf,

    pub ledger: LedgerConfig,

    /// Relays allowed per window.
    pub window_capacity: usize,
    pub window: Duration,

    pub backoff: BackoffPolicy,

    /// Redelivery guard size; 0 disables it.
    pub seen_capacity: usize,

    /// Metrics HTTP port; 0 disables the server.
    pub metrics_port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            self_handle: String::new(),
            track: String::new(),
            stream_url: HttpStreamConfig::default().url,
            api_base: PlatformConfig::default().api_base,
            web_base: DEFAULT_WEB_BASE.to_string(),
            status_url: "http://localhost:8080/status".to_string(),
            token_file: PathBuf::from("token.json"),
            ledger: LedgerConfig::default(),
            window_capacity: DEFAULT_CAPACITY,
            window: DEFAULT_WINDOW,
            backoff: BackoffPolicy::default(),
            seen_capacity: DEFAULT_SEEN_CAPACITY,
            metrics_port: 9090,
        }
    }
}

impl RelayConfig {
    /// Check and normalize the configuration.
    ///
    /// A leading `@` on the self handle is dropped, since records carry
    /// bare handles.
    pub fn validate(mut self) -> Result<Self> {
        self.self_handle = self.self_handle.trim().trim_start_matches('@').to_string();
        self.track = self.track.trim().to_string();

        if self.self_handle.is_empty() {
            return Err(Error::Config("self handle must not be empty".to_string()));
        }
        if self.track.is_empty() {
            return Err(Error::Config("track term must not be empty".to_string()));
        }
        for (name, value) in [
            ("stream URL", &self.stream_url),
            ("API base", &self.api_base),
            ("web base", &self.web_base),
            ("status URL", &self.status_url),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }
        if self.window_capacity == 0 {
            return Err(Error::Config("window capacity must be at least 1".to_string()));
        }
        if self.window.is_zero() {
            return Err(Error::Config("window duration must be positive".to_string()));
        }
        if !(self.backoff.growth.is_finite() && self.backoff.growth > 0.0) {
            return Err(Error::Config(format!(
                "backoff growth must be positive, got {}",
                self.backoff.growth
            )));
        }
        if self.backoff.max_attempts == 0 {
            return Err(Error::Config("max reconnect attempts must be at least 1".to_string()));
        }

        self.web_base = self.web_base.trim_end_matches('/').to_string();
        self.status_url = self.status_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn stream_config(&self) -> HttpStreamConfig {
        HttpStreamConfig {
            url: self.stream_url.clone(),
            track: self.track.clone(),
            ..Default::default()
        }
    }

    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            api_base: self.api_base.clone(),
            ..Default::default()
        }
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        self.ledger.clone()
    }

    pub fn network(&self) -> Network {
        self.ledger.network
    }
}
