//! nearlink Auth - Proximity-gated linking sessions
//!
//! Holds the linking sessions and decides when a session may be bound to an
//! account. A session can only be linked after the radio scanner has confirmed
//! the phone is within about half a metre.
//!
//! # Example
//!
//! ```no_run
//! use nearlink_auth::{LinkingManager, ProximityMatcher, SessionRegistry};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn example() {
//!     let registry = Arc::new(SessionRegistry::new());
//!     let manager = LinkingManager::new(
//!         registry.clone(),
//!         "localhost".to_string(),
//!         "http://localhost:8889".to_string(),
//!         "https://api.qrserver.com/v1/create-qr-code/".to_string(),
//!     );
//!
//!     let start = manager.start_linking().await;
//!     println!("Show QR for sid {}", start.sid);
//!
//!     // Confirmed identifiers from the scanner are fed to the matcher
//!     let matcher = ProximityMatcher::new(registry, Duration::from_secs(5));
//!     # let _ = matcher;
//! }
//! ```

pub mod linking;
pub mod proximity;
pub mod registry;
pub mod session;

pub use linking::{
    FinishRequest, FinishResponse, LinkStartResponse, LinkStatus, LinkingManager, PairParams,
    QrCodeData,
};
pub use proximity::{prefix_match, MatchOutcome, ProximityMatcher, MATCH_PREFIX_LEN};
pub use registry::SessionRegistry;
pub use session::{LinkError, LinkResult, LinkState, Session, SessionId, SID_LENGTH};
