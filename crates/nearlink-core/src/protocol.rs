//! Radio event types shared by the scanner and the session matcher

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single decoded advertisement as seen by the radio stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementSample {
    /// Bluetooth device address of the advertiser
    pub address: String,
    /// Broadcast identifier carried in the manufacturer data
    pub identifier: String,
    /// Received signal strength in dBm, if the stack reported one
    pub rssi: Option<i16>,
    /// When the sample was observed
    pub observed_at: DateTime<Utc>,
}

impl AdvertisementSample {
    /// Create a sample observed now
    pub fn new(address: impl Into<String>, identifier: impl Into<String>, rssi: Option<i16>) -> Self {
        Self {
            address: address.into(),
            identifier: identifier.into(),
            rssi,
            observed_at: Utc::now(),
        }
    }

    /// Builder pattern: override the observation time
    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

/// Emitted once an identifier has been seen close by for enough consecutive samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedEvent {
    /// The confirmed broadcast identifier
    pub identifier: String,
    /// Observation time of the sample that completed the streak
    pub observed_at: DateTime<Utc>,
}
