//! Shared data model, used by every bridge crate.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A canonical event ready to be ingested by the state store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEvent {
    pub event_id: String,
    pub event_type: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    pub timestamp: String,
    pub sequence: i64,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// Agent connectivity status, as materialized and posted to the state store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
    Busy,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusUpdate {
    pub agent_id: String,
    pub status: AgentStatus,
    pub last_seen: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_info: Option<Value>,
}

/// One connected device/agent entry inside a presence snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub entries: Vec<PresenceEntry>,
    pub observed_at: String,
}

/// Recent-activity bookkeeping used by the presence/status tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySnapshot {
    pub last_activity_ms: u64,
    pub session_key: Option<String>,
}

/// The command surface accepted by the control plane.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Pause,
    Resume,
    Redirect,
    Kill,
    Restart,
    Priority,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlTarget {
    Single(String),
    Bulk(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlPayload {
    pub target: ControlTarget,
    pub command: ControlCommand,
    pub params: serde_json::Map<String, Value>,
    pub request_id: Option<String>,
    pub requested_by: Option<String>,
}

/// An action the control plane issues against the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayAction {
    Send { session_key: String, message: Value },
    Call { method: String, params: Value },
}

/// Connection lifecycle states the gateway client can be in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GatewayReadyState {
    Idle,
    Opening,
    Authenticating,
    Connected,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConnectionState {
    pub connected: bool,
    pub ready_state: GatewayReadyState,
    pub reconnecting: bool,
    pub reconnect_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_disconnected_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for GatewayConnectionState {
    fn default() -> Self {
        Self {
            connected: false,
            ready_state: GatewayReadyState::Idle,
            reconnecting: false,
            reconnect_attempts: 0,
            last_connected_at: None,
            last_disconnected_at: None,
            last_error: None,
        }
    }
}

/// A pending notification, as reported by the state store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotification {
    pub id: String,
    pub recipient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_type: Option<String>,
    pub message: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<u64>,
}
