//! Presence and per-agent status reconciliation.
pub mod normalize;
pub mod tracker;

pub use normalize::{agent_id_from_session_key, normalize_agent_id};
pub use tracker::PresenceTracker;
