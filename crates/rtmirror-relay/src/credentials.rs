//! Long-lived platform credentials.
//!
//! The authorization handshake runs out of band and leaves a JSON token
//! file behind:
//!
//! ```json
//! { "headers": { "Authorization": "Bearer AAAA..." } }
//! ```
//!
//! The headers are opaque to the relay and attached verbatim to every
//! platform request.

use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Clone, Deserialize)]
pub struct Credentials {
    headers: BTreeMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Credentials {
    /// Load credentials from a token file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
            .map_err(|e| Error::Credentials(format!("{}: {}", path.display(), e)))
    }

    /// Parse credentials from the token file's JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        let creds: Self = serde_json::from_str(raw)
            .map_err(|e| Error::Credentials(format!("invalid token JSON: {}", e)))?;
        if creds.headers.is_empty() {
            return Err(Error::Credentials("token defines no headers".to_string()));
        }
        // Fail at startup rather than on the first request.
        creds.header_map()?;
        Ok(creds)
    }

    /// Header names, for logging.
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.headers.keys().map(String::as_str)
    }

    /// Headers as a reqwest header map. Values are marked sensitive.
    pub fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Credentials(format!("bad header name '{}': {}", name, e)))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|e| Error::Credentials(format!("bad value for '{}': {}", name, e)))?;
            value.set_sensitive(true);
            map.insert(name, value);
        }
        Ok(map)
    }
}
