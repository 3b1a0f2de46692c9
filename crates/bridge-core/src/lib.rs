//! Shared types and low-level utilities used across the bridge crates.
pub mod error;
pub mod fields;
pub mod ids;
pub mod model;
pub mod time_utils;

pub use error::{BridgeError, BridgeResult};
pub use ids::{generate_event_id, RecentIdGuard, SequenceCounter};
pub use model::*;
pub use time_utils::{current_unix_timestamp_ms, now_iso8601};
