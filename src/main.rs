//! nearlink - proximity-gated device linking
//!
//! Serves the linking API and watches BLE advertisements. A session is only linked
//! once the phone that scanned its QR code has been seen within about half a metre.

use anyhow::{Context, Result};
use clap::Parser;
use nearlink_auth::{ProximityMatcher, SessionRegistry};
use nearlink_core::{AdvertisementSample, Config, ConfirmedEvent};
use nearlink_discovery::{run_filter, AdvertisementFilter, ReplaySource};
use nearlink_server::{create_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// nearlink - link a device only when it is physically close
#[derive(Parser, Debug)]
#[command(name = "nearlink")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the HTTP server to
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Relying party id for the passkey ceremony
    #[arg(long)]
    rp_id: Option<String>,

    /// URL the phone uses to reach this server (default: http://localhost:<port>)
    #[arg(long)]
    public_url: Option<String>,

    /// Minimum RSSI in dBm for a sample to count as nearby
    #[arg(long, allow_hyphen_values = true)]
    rssi_threshold: Option<i16>,

    /// Consecutive strong samples required to confirm proximity
    #[arg(long)]
    consecutive_hits: Option<u32>,

    /// Manufacturer id carrying the sid, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_company_id)]
    company_id: Option<u16>,

    /// Seconds during which repeat confirmations of an identifier are ignored
    #[arg(long)]
    dedupe_window: Option<u64>,

    /// Expire sessions older than this many seconds (default: never)
    #[arg(long)]
    session_ttl: Option<u64>,

    /// Replay advertisements from a JSON-lines file instead of scanning
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Bluetooth adapter index
    #[arg(long, default_value = "0")]
    adapter: usize,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_company_id(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid company id '{}': {}", s, e))
}

impl Args {
    /// Layer command-line overrides on top of the file (or default) configuration
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => Config::new(),
        };

        if let Some(host) = self.host {
            config = config.with_host(host);
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(rp_id) = self.rp_id {
            config = config.with_rp_id(rp_id);
        }
        if self.public_url.is_some() {
            config = config.with_public_url(self.public_url);
        }
        if let Some(dbm) = self.rssi_threshold {
            config = config.with_rssi_threshold(dbm);
        }
        if let Some(hits) = self.consecutive_hits {
            config = config.with_consecutive_hits(hits);
        }
        if let Some(company_id) = self.company_id {
            config = config.with_company_id(company_id);
        }
        if let Some(secs) = self.dedupe_window {
            config = config.with_dedupe_window_secs(secs);
        }
        if self.session_ttl.is_some() {
            config = config.with_session_ttl(self.session_ttl);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("nearlink v{}", env!("CARGO_PKG_VERSION"));

    let replay = args.replay.clone();
    let adapter_index = args.adapter;
    let config = args.into_config()?;

    let registry = Arc::new(SessionRegistry::new());
    let state = Arc::new(AppState::from_config(config.clone(), registry.clone()));

    // Radio pipeline: source -> filter -> matcher
    let capacity = config.proximity.channel_capacity;
    let (sample_tx, sample_rx) = mpsc::channel::<AdvertisementSample>(capacity);
    let (event_tx, event_rx) = mpsc::channel::<ConfirmedEvent>(capacity);

    let filter_handle = tokio::spawn(run_filter(
        AdvertisementFilter::from_config(&config.proximity),
        sample_rx,
        event_tx,
    ));
    let matcher_handle = tokio::spawn(
        ProximityMatcher::new(registry.clone(), config.proximity.dedupe_window()).run(event_rx),
    );

    let company_id = config.proximity.company_id;
    let source_handle = match replay {
        Some(path) => tokio::spawn(async move {
            if let Err(e) = ReplaySource::new(company_id).run(&path, sample_tx).await {
                error!("Replay failed: {}", e);
            }
        }),
        None => spawn_ble_scanner(adapter_index, company_id, sample_tx),
    };

    info!(
        "Proximity check: RSSI >= {} dBm for {} consecutive samples",
        config.proximity.rssi_threshold, config.proximity.consecutive_hits
    );

    // Optional session expiry
    let sweep_handle = config.session_ttl().map(|ttl| {
        info!("Sessions expire after {} seconds", ttl.as_secs());
        let registry = registry.clone();
        tokio::spawn(async move {
            let period = (ttl / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                registry.purge_older_than(ttl).await;
            }
        })
    });

    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!("Starting server on {}...", addr);
    info!("");
    info!("  Linking URL: {}/link", config.server_url());
    info!("");
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    // Cleanup
    source_handle.abort();
    filter_handle.abort();
    matcher_handle.abort();
    if let Some(handle) = sweep_handle {
        handle.abort();
    }

    info!("Goodbye!");
    Ok(())
}

#[cfg(feature = "ble")]
fn spawn_ble_scanner(
    adapter_index: usize,
    company_id: u16,
    samples: mpsc::Sender<AdvertisementSample>,
) -> tokio::task::JoinHandle<()> {
    use nearlink_discovery::BleScanner;

    tokio::spawn(async move {
        let scanner = match BleScanner::new(adapter_index, company_id).await {
            Ok(scanner) => scanner,
            Err(e) => {
                error!("BLE: failed to open adapter {}: {}", adapter_index, e);
                return;
            }
        };

        // No automatic restart: linking stays refused until the process is restarted
        if let Err(e) = scanner.run(samples).await {
            error!("BLE: scanning halted: {}", e);
        }
    })
}

#[cfg(not(feature = "ble"))]
fn spawn_ble_scanner(
    _adapter_index: usize,
    _company_id: u16,
    samples: mpsc::Sender<AdvertisementSample>,
) -> tokio::task::JoinHandle<()> {
    warn!("Built without the `ble` feature and no --replay file given");
    warn!("No advertisements will be observed; every finish request will be refused");
    tokio::spawn(async move {
        // Hold the sender so the filter task stays up for the server's lifetime
        samples.closed().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_company_id() {
        assert_eq!(parse_company_id("0x1234"), Ok(0x1234));
        assert_eq!(parse_company_id("4660"), Ok(0x1234));
        assert!(parse_company_id("0xZZ").is_err());
        assert!(parse_company_id("70000").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "nearlink",
            "--port",
            "9000",
            "--rssi-threshold",
            "-62",
            "--company-id",
            "0x00ff",
            "--session-ttl",
            "300",
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.proximity.rssi_threshold, -62);
        assert_eq!(config.proximity.company_id, 0x00ff);
        assert_eq!(config.session_ttl(), Some(Duration::from_secs(300)));
        assert_eq!(config.proximity.consecutive_hits, 3);
    }

    #[test]
    fn test_cli_rejects_invalid_config() {
        let args = Args::parse_from(["nearlink", "--consecutive-hits", "0"]);
        assert!(args.into_config().is_err());
    }
}
