//! nearlink Server - Axum-based HTTP API
//!
//! This crate exposes the linking sessions to the desktop page and the phone.

pub mod http;
pub mod state;

pub use http::{create_router, ApiError};
pub use state::AppState;
