//! Binds confirmed radio identifiers to linking sessions
//!
//! The phone advertises (a possibly truncated or padded copy of) the sid it read
//! from the QR code. Identifiers and sids are compared on their first six
//! characters, case-insensitively, in both directions.

use crate::registry::SessionRegistry;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use nearlink_core::ConfirmedEvent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Characters compared by [`prefix_match`]
pub const MATCH_PREFIX_LEN: usize = 6;

/// What happened to a confirmed identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Seen again inside the dedupe window; sessions were not scanned
    Duplicate,
    /// No session's sid overlaps the identifier
    NoMatch,
    /// This session is now proximity-confirmed
    Confirmed(SessionId),
}

/// Symmetric, case-insensitive six-character prefix match.
///
/// `a` and `b` match if either one starts with the first six characters of the
/// other. Empty strings never match.
pub fn prefix_match(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }

    let a_prefix: String = a.chars().take(MATCH_PREFIX_LEN).collect();
    let b_prefix: String = b.chars().take(MATCH_PREFIX_LEN).collect();
    a.starts_with(&b_prefix) || b.starts_with(&a_prefix)
}

/// Matches confirmed identifiers against active sessions
pub struct ProximityMatcher {
    registry: Arc<SessionRegistry>,
    dedupe_window: chrono::Duration,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl ProximityMatcher {
    pub fn new(registry: Arc<SessionRegistry>, dedupe_window: Duration) -> Self {
        Self {
            registry,
            dedupe_window: chrono::Duration::from_std(dedupe_window)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            last_seen: HashMap::new(),
        }
    }

    /// Handle one confirmed identifier.
    ///
    /// At most one session is confirmed per event, even if several could match.
    pub async fn handle(&mut self, event: &ConfirmedEvent) -> MatchOutcome {
        let identifier = event.identifier.trim().to_lowercase();

        if let Some(last) = self.last_seen.get(&identifier) {
            if event.observed_at - *last < self.dedupe_window {
                debug!("Ignoring repeat of identifier {} inside dedupe window", identifier);
                return MatchOutcome::Duplicate;
            }
        }
        self.last_seen.insert(identifier.clone(), event.observed_at);

        info!("Advertisement confirmed for identifier={}", identifier);

        let Some(id) = self
            .registry
            .find(|s| prefix_match(&identifier, &s.sid))
            .await
        else {
            warn!("No matching session found for identifier={}", identifier);
            return MatchOutcome::NoMatch;
        };

        match self.registry.update(&id, |s| s.confirm_proximity()).await {
            Some(_) => {
                info!("Proximity verified (<0.5 m) for session {}", id);
                MatchOutcome::Confirmed(id)
            }
            None => {
                // Purged between the scan and the update
                warn!("Session {} vanished before it could be confirmed", id);
                MatchOutcome::NoMatch
            }
        }
    }

    /// Consume confirmed identifiers until the sender side closes
    pub async fn run(mut self, mut events: mpsc::Receiver<ConfirmedEvent>) {
        info!("Proximity matcher started");
        while let Some(event) = events.recv().await {
            self.handle(&event).await;
        }
        info!("Proximity matcher stopped");
    }
}
