//! Debounced proximity detection
//!
//! Turns a noisy stream of RSSI samples into at most one [`ConfirmedEvent`] per
//! identifier. An identifier is confirmed once `consecutive_hits` samples in a row
//! reach the threshold; a single weak sample cancels the streak.

use nearlink_core::{AdvertisementSample, ConfirmedEvent, ProximityConfig};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-identifier hysteresis over RSSI samples
#[derive(Debug)]
pub struct AdvertisementFilter {
    threshold: i16,
    consecutive_hits: u32,
    /// Current streak of strong samples per identifier
    hits: HashMap<String, u32>,
    /// Identifiers that already fired. Never re-armed.
    confirmed: HashSet<String>,
}

impl AdvertisementFilter {
    pub fn new(threshold: i16, consecutive_hits: u32) -> Self {
        Self {
            threshold,
            consecutive_hits: consecutive_hits.max(1),
            hits: HashMap::new(),
            confirmed: HashSet::new(),
        }
    }

    pub fn from_config(config: &ProximityConfig) -> Self {
        Self::new(config.rssi_threshold, config.consecutive_hits)
    }

    /// Feed one sample; returns an event when this sample completes a streak
    pub fn observe(&mut self, sample: &AdvertisementSample) -> Option<ConfirmedEvent> {
        debug!(
            "adv addr={} rssi={:?} identifier={}",
            sample.address, sample.rssi, sample.identifier
        );

        let Some(rssi) = sample.rssi else {
            debug!("Dropping sample without RSSI for identifier={}", sample.identifier);
            return None;
        };

        if rssi < self.threshold {
            if let Some(count) = self.hits.get_mut(&sample.identifier) {
                *count = 0;
            }
            debug!("Weak signal ({} dBm) for identifier={}", rssi, sample.identifier);
            return None;
        }

        let count = self.hits.entry(sample.identifier.clone()).or_insert(0);
        *count = count.saturating_add(1);
        debug!(
            "Strong signal {} dBm for identifier={} ({}/{})",
            rssi, sample.identifier, count, self.consecutive_hits
        );

        if *count >= self.consecutive_hits && !self.confirmed.contains(&sample.identifier) {
            *count = 0;
            self.confirmed.insert(sample.identifier.clone());
            info!("Confirmed nearby (<0.5 m) identifier={}", sample.identifier);
            return Some(ConfirmedEvent {
                identifier: sample.identifier.clone(),
                observed_at: sample.observed_at,
            });
        }
        None
    }

    /// Current streak length for an identifier
    pub fn hit_count(&self, identifier: &str) -> u32 {
        self.hits.get(identifier).copied().unwrap_or(0)
    }

    pub fn is_confirmed(&self, identifier: &str) -> bool {
        self.confirmed.contains(identifier)
    }
}

/// Drive `filter` from a sample channel, publishing confirmations to `events`.
///
/// Returns when either the sample source or the event consumer goes away.
pub async fn run_filter(
    mut filter: AdvertisementFilter,
    mut samples: mpsc::Receiver<AdvertisementSample>,
    events: mpsc::Sender<ConfirmedEvent>,
) {
    info!(
        "Advertisement filter started: threshold={} dBm (~0.5 m), hits={}",
        filter.threshold, filter.consecutive_hits
    );

    while let Some(sample) = samples.recv().await {
        if let Some(event) = filter.observe(&sample) {
            if events.send(event).await.is_err() {
                warn!("Confirmed-event consumer closed, stopping filter");
                break;
            }
        }
    }

    info!("Advertisement filter stopped");
}
