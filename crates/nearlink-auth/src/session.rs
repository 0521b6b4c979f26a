//! Linking sessions and their state machine
//!
//! A session moves `Created -> ProximityConfirmed -> Linked` and never backwards.
//! `Linked` can only be entered from `ProximityConfirmed`, so a linked session is
//! always a proximity-confirmed one.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Length of the public sid, in hex characters
pub const SID_LENGTH: usize = 12;

/// Errors raised while moving a session through the linking flow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Unknown session")]
    UnknownSession,
    #[error("BLE proximity not verified (<0.5 m required)")]
    ProximityNotVerified,
}

pub type LinkResult<T> = Result<T, LinkError>;

/// Unique identifier for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse either the hyphenated or the simple hex form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Where a session is in the linking flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Waiting for the phone to show up on the radio
    #[default]
    Created,
    /// The phone was seen within range
    ProximityConfirmed,
    /// The account is bound to this device
    Linked,
}

/// A pairing attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Short public identifier shown in the QR payload and advertised by the phone
    pub sid: String,
    /// Random value consumed by the passkey ceremony
    pub challenge: String,
    pub state: LinkState,
    /// Account bound at `Linked`
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session with a fresh sid and challenge
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            sid: generate_sid(),
            challenge: generate_challenge(),
            state: LinkState::Created,
            user_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn proximity_confirmed(&self) -> bool {
        matches!(self.state, LinkState::ProximityConfirmed | LinkState::Linked)
    }

    pub fn linked(&self) -> bool {
        self.state == LinkState::Linked
    }

    /// Record that the phone was seen nearby.
    ///
    /// Returns `true` if this call moved the session out of `Created`.
    pub fn confirm_proximity(&mut self) -> bool {
        if self.state == LinkState::Created {
            self.state = LinkState::ProximityConfirmed;
            true
        } else {
            false
        }
    }

    /// Bind `user_id` to this session.
    ///
    /// Refused unless proximity was confirmed first. Finishing an already linked
    /// session succeeds but keeps the originally bound account.
    pub fn finish(&mut self, user_id: &str) -> LinkResult<()> {
        match self.state {
            LinkState::Created => Err(LinkError::ProximityNotVerified),
            LinkState::ProximityConfirmed => {
                self.state = LinkState::Linked;
                self.user_id = Some(user_id.to_string());
                Ok(())
            }
            LinkState::Linked => Ok(()),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Short public id: the first 12 hex characters of a random UUID
pub fn generate_sid() -> String {
    let mut sid = Uuid::new_v4().simple().to_string();
    sid.truncate(SID_LENGTH);
    sid
}

/// 32 random bytes, URL-safe base64 without padding
pub fn generate_challenge() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_shape() {
        let session = Session::new();
        assert_eq!(session.sid.len(), SID_LENGTH);
        assert!(session.sid.chars().all(|c| c.is_ascii_hexdigit()));
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(session.challenge.len(), 43);
        assert_eq!(session.state, LinkState::Created);
        assert!(!session.proximity_confirmed());
        assert!(!session.linked());
        assert!(session.user_id.is_none());
    }

    #[test]
    fn test_session_id_roundtrip() {
        let id = SessionId::new();
        let shown = id.to_string();
        assert_eq!(shown.len(), 32);
        assert_eq!(SessionId::parse(&shown).unwrap(), id);
        assert!(SessionId::parse("not-a-session").is_err());
    }

    #[test]
    fn test_finish_requires_proximity() {
        let mut session = Session::new();
        assert_eq!(session.finish("alice"), Err(LinkError::ProximityNotVerified));
        assert!(!session.linked());
        assert!(session.user_id.is_none());
    }

    #[test]
    fn test_full_transition() {
        let mut session = Session::new();
        assert!(session.confirm_proximity());
        assert!(session.proximity_confirmed());
        assert!(!session.linked());

        session.finish("alice").unwrap();
        assert!(session.linked());
        assert!(session.proximity_confirmed());
        assert_eq!(session.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_no_backward_transitions() {
        let mut session = Session::new();
        session.confirm_proximity();
        session.finish("alice").unwrap();

        // Confirming again does not drop the session out of Linked
        assert!(!session.confirm_proximity());
        assert_eq!(session.state, LinkState::Linked);

        // A second finish keeps the first account
        session.finish("mallory").unwrap();
        assert_eq!(session.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_sids_are_distinct() {
        assert_ne!(generate_sid(), generate_sid());
        assert_ne!(generate_challenge(), generate_challenge());
    }
}
