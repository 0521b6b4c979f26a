//! nearlink Core - Shared types and configuration
//!
//! This crate provides the foundational types used across all nearlink components:
//! the runtime [`Config`], the crate-wide [`Error`], and the radio events that flow
//! from the scanner to the session matcher.

pub mod config;
pub mod error;
pub mod protocol;

pub use config::{Config, ProximityConfig};
pub use error::{Error, Result};
pub use protocol::{AdvertisementSample, ConfirmedEvent};
