//! Configuration types for nearlink

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Signal strength (dBm) calibrated to roughly half a metre
pub const DEFAULT_RSSI_THRESHOLD: i16 = -58;

/// Back-to-back strong samples needed before a device counts as nearby
pub const DEFAULT_CONSECUTIVE_HITS: u32 = 3;

/// Manufacturer id under which the phone advertises its sid
pub const DEFAULT_COMPANY_ID: u16 = 0x1234;

/// External service that turns the linking payload into a QR image
pub const DEFAULT_QR_SERVICE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Tuning for the radio proximity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Minimum RSSI (dBm) for a sample to count as strong
    pub rssi_threshold: i16,
    /// Consecutive strong samples required to confirm an identifier
    pub consecutive_hits: u32,
    /// Manufacturer-specific data key carrying the identifier
    pub company_id: u16,
    /// Window during which repeated confirmations of one identifier are ignored
    pub dedupe_window_secs: u64,
    /// Capacity of the sample and event channels between scanner tasks
    pub channel_capacity: usize,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            rssi_threshold: DEFAULT_RSSI_THRESHOLD,
            consecutive_hits: DEFAULT_CONSECUTIVE_HITS,
            company_id: DEFAULT_COMPANY_ID,
            dedupe_window_secs: 5,
            channel_capacity: 256,
        }
    }
}

impl ProximityConfig {
    pub fn dedupe_window(&self) -> Duration {
        Duration::from_secs(self.dedupe_window_secs)
    }
}

/// Main configuration for nearlink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,
    /// Server port
    pub port: u16,
    /// Relying party id handed to the passkey ceremony
    pub rp_id: String,
    /// URL the phone should reach the server on (derived from host/port if None)
    pub public_url: Option<String>,
    /// Base URL of the QR image service
    pub qr_service_url: String,
    /// Drop sessions older than this; sessions never expire when None
    pub session_ttl_secs: Option<u64>,
    /// Radio proximity tuning
    pub proximity: ProximityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8889,
            rp_id: "localhost".to_string(),
            public_url: None,
            qr_service_url: DEFAULT_QR_SERVICE_URL.to_string(),
            session_ttl_secs: None,
            proximity: ProximityConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Builder pattern: set bind host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set relying party id
    pub fn with_rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.rp_id = rp_id.into();
        self
    }

    /// Builder pattern: set public URL
    pub fn with_public_url(mut self, url: Option<String>) -> Self {
        self.public_url = url;
        self
    }

    /// Builder pattern: set QR service URL
    pub fn with_qr_service_url(mut self, url: impl Into<String>) -> Self {
        self.qr_service_url = url.into();
        self
    }

    /// Builder pattern: set session time-to-live
    pub fn with_session_ttl(mut self, secs: Option<u64>) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    /// Builder pattern: set RSSI threshold
    pub fn with_rssi_threshold(mut self, dbm: i16) -> Self {
        self.proximity.rssi_threshold = dbm;
        self
    }

    /// Builder pattern: set required consecutive hits
    pub fn with_consecutive_hits(mut self, hits: u32) -> Self {
        self.proximity.consecutive_hits = hits;
        self
    }

    /// Builder pattern: set manufacturer company id
    pub fn with_company_id(mut self, company_id: u16) -> Self {
        self.proximity.company_id = company_id;
        self
    }

    /// Builder pattern: set dedupe window
    pub fn with_dedupe_window_secs(mut self, secs: u64) -> Self {
        self.proximity.dedupe_window_secs = secs;
        self
    }

    /// URL embedded in the linking payload
    pub fn server_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_secs.map(Duration::from_secs)
    }

    /// Reject settings that would make the proximity check meaningless
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.proximity.consecutive_hits == 0 {
            return Err(Error::Config(
                "consecutive_hits must be at least 1".to_string(),
            ));
        }
        if self.proximity.rssi_threshold >= 0 {
            return Err(Error::Config(format!(
                "rssi_threshold must be negative dBm, got {}",
                self.proximity.rssi_threshold
            )));
        }
        if self.proximity.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be non-zero".to_string()));
        }
        if self.session_ttl_secs == Some(0) {
            return Err(Error::Config("session_ttl_secs must be non-zero".to_string()));
        }
        Ok(())
    }
}
