//! nearlink Discovery
//!
//! Radio side of the proximity check:
//!
//! - **Decoding**: pulls the ASCII broadcast identifier out of manufacturer-specific
//!   advertisement data.
//! - **Filtering**: [`AdvertisementFilter`] debounces RSSI samples into a single
//!   confirmation per identifier.
//! - **Sources**: [`BleScanner`] (feature `ble`) listens to the real radio;
//!   [`ReplaySource`] feeds recorded advertisements from a JSON-lines file.
//!
//! Sources publish [`nearlink_core::AdvertisementSample`]s on an mpsc channel;
//! [`run_filter`] turns them into [`nearlink_core::ConfirmedEvent`]s on another.

mod advertisement;
mod error;
mod filter;
mod replay;
#[cfg(feature = "ble")]
mod scanner;

pub use advertisement::{decode_identifier, sample_from_manufacturer_data};
pub use error::{DiscoveryError, DiscoveryResult};
pub use filter::{run_filter, AdvertisementFilter};
pub use replay::{ReplayRecord, ReplaySource};
#[cfg(feature = "ble")]
pub use scanner::BleScanner;
