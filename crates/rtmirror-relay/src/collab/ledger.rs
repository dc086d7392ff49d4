//! JSON-RPC adapter for the ledger node.
//!
//! Requests are JSON-RPC 1.0 over HTTP POST with basic auth:
//!
//! ```json
//! {"jsonrpc": "1.0", "id": 7, "method": "sendbulletin", "params": ["msg", 1700000000, "https://..."]}
//! ```
//!
//! Nodes serve RPC over TLS with their own self-signed certificate by
//! default; point `cert_file` at it so the client trusts it. When a wallet
//! passphrase is configured the wallet is unlocked for a few seconds before
//! every publish.

use super::{Ledger, TransactionRef};
use crate::error::{Error, PublishError, Result};
use async_trait::async_trait;
use reqwest::{Certificate, Client};
use rtmirror_core::Bulletin;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Seconds the wallet stays unlocked for one publish.
const UNLOCK_SECONDS: u64 = 5;

/// Ledger network the node runs on. Decides the default RPC port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn default_port(self) -> u16 {
        match self {
            Network::Mainnet => 8332,
            Network::Testnet => 18332,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" | "testnet3" => Ok(Network::Testnet),
            other => Err(format!("unknown network '{}'", other)),
        }
    }
}

/// Configuration for [`JsonRpcLedger`].
#[derive(Clone)]
pub struct LedgerConfig {
    /// Node address: `host`, `host:port` or a full `http(s)://` URL.
    pub endpoint: String,
    pub user: String,
    pub password: String,
    pub network: Network,
    /// RPC method that publishes a bulletin.
    pub method: String,
    /// Wallet passphrase; when set the wallet is unlocked before each publish.
    pub wallet_passphrase: Option<String>,
    /// PEM certificate of the node, added to the trusted roots.
    pub cert_file: Option<PathBuf>,
    /// Talk plain HTTP when the endpoint carries no scheme.
    pub no_tls: bool,
    pub request_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1".to_string(),
            user: String::new(),
            password: String::new(),
            network: Network::Mainnet,
            method: "sendbulletin".to_string(),
            wallet_passphrase: None,
            cert_file: None,
            no_tls: false,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("network", &self.network)
            .field("method", &self.method)
            .field("wallet_unlock", &self.wallet_passphrase.is_some())
            .field("cert_file", &self.cert_file)
            .field("no_tls", &self.no_tls)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Turn a configured endpoint into a request URL.
///
/// Endpoints without a scheme get `https`, or `http` when `tls` is off,
/// and endpoints without a port get the network's default port.
pub(crate) fn normalize_endpoint(endpoint: &str, network: Network, tls: bool) -> Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(Error::Config("ledger endpoint must not be empty".to_string()));
    }

    let default_scheme = if tls { "https" } else { "http" };
    let (scheme, rest) = match endpoint.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => (default_scheme, endpoint),
    };
    let rest = rest.trim_end_matches('/');
    if scheme.is_empty() || rest.is_empty() || rest.starts_with('/') {
        return Err(Error::Config(format!("ledger endpoint '{}' has no host", endpoint)));
    }

    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    // Bracketed IPv6 hosts carry colons of their own.
    let has_port = match authority.rfind(']') {
        Some(close) => authority[close..].contains(':'),
        None => authority.contains(':'),
    };

    if has_port {
        Ok(format!("{}://{}{}", scheme, authority, path))
    } else {
        Ok(format!(
            "{}://{}:{}{}",
            scheme,
            authority,
            network.default_port(),
            path
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Decode a JSON-RPC response body into its result value.
fn decode_response(body: &str) -> std::result::Result<Value, PublishError> {
    let response: RpcResponse = serde_json::from_str(body)
        .map_err(|e| PublishError::UnexpectedResponse(format!("invalid JSON-RPC body: {}", e)))?;
    if let Some(err) = response.error {
        return Err(PublishError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    Ok(response.result)
}

/// Extract the transaction reference from a publish result.
fn transaction_ref(result: Value) -> std::result::Result<TransactionRef, PublishError> {
    match result {
        Value::String(s) if !s.trim().is_empty() => Ok(TransactionRef(s)),
        Value::String(_) => Err(PublishError::UnexpectedResponse(
            "empty transaction reference".to_string(),
        )),
        Value::Null => Err(PublishError::UnexpectedResponse(
            "null transaction reference".to_string(),
        )),
        other => Err(PublishError::UnexpectedResponse(format!(
            "did not expect a JSON response: {}",
            other
        ))),
    }
}

/// Ledger client speaking JSON-RPC to a node.
pub struct JsonRpcLedger {
    client: Client,
    url: String,
    user: String,
    password: String,
    method: String,
    wallet_passphrase: Option<String>,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(config: LedgerConfig) -> Result<Self> {
        let url = normalize_endpoint(&config.endpoint, config.network, !config.no_tls)?;
        if config.method.trim().is_empty() {
            return Err(Error::Config("ledger RPC method must not be empty".to_string()));
        }

        let mut builder = Client::builder().timeout(config.request_timeout);
        match &config.cert_file {
            Some(path) if url.starts_with("https://") => {
                let pem = std::fs::read(path)?;
                builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
                tracing::debug!("Trusting ledger certificate {}", path.display());
            }
            Some(path) => {
                tracing::warn!("Ignoring ledger certificate {}: TLS is off", path.display());
            }
            None => {}
        }
        let client = builder.build()?;

        tracing::info!(
            "Ledger endpoint {} ({}), method {}, wallet unlock {}",
            url,
            config.network,
            config.method,
            if config.wallet_passphrase.is_some() { "on" } else { "off" }
        );

        Ok(Self {
            client,
            url,
            user: config.user,
            password: config.password,
            method: config.method,
            wallet_passphrase: config.wallet_passphrase,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request_body(&self, method: &str, params: Value) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        })
    }

    async fn call(&self, method: &str, params: Value) -> std::result::Result<Value, PublishError> {
        let body = self.request_body(method, params);
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            // Nodes report RPC errors with a 500 and a normal error body.
            if let Err(e @ PublishError::Rpc { .. }) = decode_response(&text) {
                return Err(e);
            }
            return Err(PublishError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        decode_response(&text)
    }

    /// Current chain height. Used at startup to check the node answers.
    pub async fn block_count(&self) -> std::result::Result<u64, PublishError> {
        let result = self.call("getblockcount", json!([])).await?;
        result.as_u64().ok_or_else(|| {
            PublishError::UnexpectedResponse(format!("block count is not a number: {}", result))
        })
    }

    async fn unlock_wallet(&self, passphrase: &str) -> std::result::Result<(), PublishError> {
        self.call("walletpassphrase", json!([passphrase, UNLOCK_SECONDS]))
            .await
            .map(|_| ())
            .map_err(|e| PublishError::WalletUnlock(e.to_string()))
    }
}

#[async_trait]
impl Ledger for JsonRpcLedger {
    async fn publish(&self, bulletin: &Bulletin) -> std::result::Result<TransactionRef, PublishError> {
        if let Some(passphrase) = &self.wallet_passphrase {
            self.unlock_wallet(passphrase).await?;
        }

        let params = json!([bulletin.message, bulletin.timestamp, bulletin.reference]);
        let result = self.call(&self.method, params).await?;
        let txref = transaction_ref(result)?;
        tracing::debug!("Ledger accepted bulletin as {}", txref);
        Ok(txref)
    }
}
