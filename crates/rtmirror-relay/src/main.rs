//! rtmirror relay daemon.
//!
//! Follows the platform's filtered stream and mirrors matching posts into
//! the ledger.
//!
//! # Usage
//!
//! ```bash
//! rtmirror \
//!     --self-handle rtmirror \
//!     --track '#rtmirror' \
//!     --token-file /etc/rtmirror/token.json \
//!     --ledger-endpoint 127.0.0.1 --ledger-network testnet \
//!     --ledger-cert /etc/rtmirror/ledger-rpc.cert \
//!     --status-url https://mirror.example/status
//! ```
//!
//! Secrets (`RTMIRROR_LEDGER_PASSWORD`, `RTMIRROR_WALLET_PASSPHRASE`) are
//! best passed through the environment.
//!
//! # Graceful Shutdown
//!
//! SIGINT (Ctrl+C) and SIGTERM abandon the pending read, close the stream
//! and print a run summary. Giving up on reconnecting exits non-zero.

use anyhow::{Context, Result};
use clap::Parser;
use rtmirror_core::metrics::{init_metrics, start_metrics_server};
use rtmirror_relay::{
    BackoffPolicy, Credentials, Engine, HttpPlatform, HttpStreamTransport, JsonRpcLedger, Ledger,
    LedgerConfig, Network, RecordFetcher, RelayConfig, RelayPipeline, ReplySender,
    StreamConnection,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// rtmirror relay daemon.
#[derive(Parser, Debug)]
#[command(name = "rtmirror")]
#[command(about = "Mirror tagged posts from a live stream into a ledger")]
#[command(version)]
struct Args {
    /// The relay's own account handle (its posts are never relayed)
    #[arg(long, env = "RTMIRROR_SELF_HANDLE")]
    self_handle: String,

    /// Stream filter term
    #[arg(long, env = "RTMIRROR_TRACK")]
    track: String,

    /// Token file produced by the authorization tool
    #[arg(long, env = "RTMIRROR_TOKEN_FILE", default_value = "token.json")]
    token_file: PathBuf,

    /// Streaming filter endpoint
    #[arg(long, default_value = "https://stream.twitter.com/1.1/statuses/filter.json")]
    stream_url: String,

    /// Platform REST API base
    #[arg(long, default_value = "https://api.twitter.com/1.1")]
    api_base: String,

    /// Platform web front end, used for links in bulletins
    #[arg(long, default_value = rtmirror_core::DEFAULT_WEB_BASE)]
    web_base: String,

    /// Public status page base linked from confirmations
    #[arg(long, env = "RTMIRROR_STATUS_URL", default_value = "http://localhost:8080/status")]
    status_url: String,

    /// Ledger node address (host, host:port or URL)
    #[arg(long, env = "RTMIRROR_LEDGER_ENDPOINT", default_value = "127.0.0.1")]
    ledger_endpoint: String,

    /// Ledger RPC user
    #[arg(long, env = "RTMIRROR_LEDGER_USER", default_value = "")]
    ledger_user: String,

    /// Ledger RPC password
    #[arg(long, env = "RTMIRROR_LEDGER_PASSWORD", default_value = "", hide_env_values = true)]
    ledger_password: String,

    /// Ledger network: mainnet or testnet
    #[arg(long, default_value = "mainnet")]
    ledger_network: Network,

    /// RPC method used to publish a bulletin
    #[arg(long, default_value = "sendbulletin")]
    ledger_method: String,

    /// PEM certificate of the ledger node's RPC server
    #[arg(long, env = "RTMIRROR_LEDGER_CERT")]
    ledger_cert: Option<PathBuf>,

    /// Talk plain HTTP to the ledger node
    #[arg(long)]
    ledger_notls: bool,

    /// Unlock the wallet with this passphrase before each publish
    #[arg(long, env = "RTMIRROR_WALLET_PASSPHRASE", hide_env_values = true)]
    wallet_passphrase: Option<String>,

    /// Relays allowed per window
    #[arg(long, default_value = "24")]
    window_capacity: usize,

    /// Window duration in seconds
    #[arg(long, default_value = "900")]
    window_secs: u64,

    /// First reconnect delay in milliseconds
    #[arg(long, default_value = "1000")]
    backoff_base_ms: u64,

    /// Per-attempt growth of the reconnect delay
    #[arg(long, default_value = "0.1")]
    backoff_growth: f64,

    /// Consecutive failed reconnects before giving up
    #[arg(long, default_value = "30")]
    max_reconnect_attempts: u32,

    /// Remembered record ids for skipping redeliveries (0 to disable)
    #[arg(long, default_value = "4096")]
    seen_capacity: usize,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            self_handle: self.self_handle,
            track: self.track,
            stream_url: self.stream_url,
            api_base: self.api_base,
            web_base: self.web_base,
            status_url: self.status_url,
            token_file: self.token_file,
            ledger: LedgerConfig {
                endpoint: self.ledger_endpoint,
                user: self.ledger_user,
                password: self.ledger_password,
                network: self.ledger_network,
                method: self.ledger_method,
                wallet_passphrase: self.wallet_passphrase.filter(|p| !p.is_empty()),
                cert_file: self.ledger_cert,
                no_tls: self.ledger_notls,
                ..Default::default()
            },
            window_capacity: self.window_capacity,
            window: Duration::from_secs(self.window_secs),
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.backoff_base_ms),
                growth: self.backoff_growth,
                max_attempts: self.max_reconnect_attempts,
            },
            seen_capacity: self.seen_capacity,
            metrics_port: self.metrics_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("rtmirror_relay=debug".parse()?),
        )
        .init();

    let config = Args::parse()
        .into_config()
        .validate()
        .context("Invalid configuration")?;

    tracing::info!("rtmirror relay starting...");
    tracing::info!("Configuration:");
    tracing::info!("  Self handle: @{}", config.self_handle);
    tracing::info!("  Track: {}", config.track);
    tracing::info!("  Stream: {}", config.stream_url);
    tracing::info!("  Ledger: {} ({})", config.ledger.endpoint, config.network());
    tracing::info!(
        "  Window: {} relays per {:?}",
        config.window_capacity,
        config.window
    );
    tracing::info!(
        "  Backoff: {:?} base, {} growth, {} attempts",
        config.backoff.base,
        config.backoff.growth,
        config.backoff.max_attempts
    );

    if config.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(config.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
    }

    let credentials = Credentials::load(&config.token_file)
        .with_context(|| format!("Failed to load credentials from {:?}", config.token_file))?;
    tracing::info!(
        "Loaded credential headers: {}",
        credentials.header_names().collect::<Vec<_>>().join(", ")
    );

    let transport = HttpStreamTransport::new(config.stream_config(), &credentials)
        .context("Failed to create stream transport")?;
    let platform = Arc::new(
        HttpPlatform::new(config.platform_config(), &credentials)
            .context("Failed to create platform client")?,
    );
    let ledger =
        JsonRpcLedger::new(config.ledger_config()).context("Failed to create ledger client")?;
    let height = ledger
        .block_count()
        .await
        .context("Ledger node did not answer getblockcount")?;
    tracing::info!("Ledger node at block {}", height);

    let pipeline = RelayPipeline::new(
        Arc::clone(&platform) as Arc<dyn RecordFetcher>,
        platform as Arc<dyn ReplySender>,
        Arc::new(ledger) as Arc<dyn Ledger>,
        config.status_url.clone(),
    )
    .with_web_base(config.web_base.clone());
    let stream = StreamConnection::new(Box::new(transport), config.backoff.clone());
    let mut engine = Engine::new(stream, pipeline, &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        let _ = shutdown_tx.send(true);
    })
    .context("Failed to set Ctrl+C handler")?;

    let result = engine.run(shutdown_rx).await;
    let stats = engine.stats();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Lines read:           {}", stats.lines);
    tracing::info!("Malformed:            {}", stats.malformed);
    tracing::info!("Rejected:             {}", stats.rejected);
    tracing::info!("Redelivered:          {}", stats.duplicates);
    tracing::info!("Rate limited:         {}", stats.rate_limited);
    tracing::info!("Relayed:              {}", stats.relayed);
    tracing::info!("Relay failures:       {}", stats.failed);
    tracing::info!("Reconnects:           {}", engine.stream().reconnects());

    result.context("Relay engine stopped")?;
    Ok(())
}
