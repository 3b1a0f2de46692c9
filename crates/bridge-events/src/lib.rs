//! Event buffering, normalization, and derivation.
pub mod buffer;
pub mod derive;
pub mod normalize;

pub use buffer::EventBuffer;
pub use derive::derive_events;
pub use normalize::{
    build_primary_event, normalize_event_type, normalize_tool_status, resolve_agent_id,
    resolve_session_key,
};
