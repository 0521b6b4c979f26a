//! Discovery error types

use thiserror::Error;

/// Errors that can occur while scanning for advertisements
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Radio stack failure; scanning stops
    #[error("Scanner transport error: {0}")]
    Transport(String),

    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// Undecodable or incomplete advertisement; dropped, never surfaced
    #[error("Malformed advertisement: {0}")]
    MalformedAdvertisement(String),

    #[error("Invalid replay record on line {line}: {message}")]
    Replay { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

#[cfg(feature = "ble")]
impl From<btleplug::Error> for DiscoveryError {
    fn from(e: btleplug::Error) -> Self {
        DiscoveryError::Transport(e.to_string())
    }
}
