//! UserLab API Library
//!
//! HTTP surface over the billing engine: webhook intake, entitlement reads,
//! and the manual payment admin flow.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
