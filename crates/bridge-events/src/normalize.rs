use bridge_core::fields::{probe_str, probe_string};
use bridge_core::{generate_event_id, now_iso8601, BridgeEvent, SequenceCounter};
use serde_json::Value;

const AGENT_ID_KEYS: &[&str] = &["agentId", "agent_id", "deviceId", "runId", "sessionKey"];
const SESSION_KEY_KEYS: &[&str] = &["sessionKey", "session_key", "sessionId"];
const EVENT_ID_KEYS: &[&str] = &["eventId", "event_id"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "createdAt"];

/// Maps a raw gateway event name (plus, where relevant, its payload) onto a
/// canonical event type. See the derivation table for the full alias list.
pub fn normalize_event_type(raw_event: &str, payload: &Value) -> String {
    match raw_event {
        "session.start" | "session_start" => "session_start".to_string(),
        "session.end" | "session_end" => "session_end".to_string(),
        "tool.call.start" | "tool_call.started" | "tool_call.start" => "tool_call".to_string(),
        "tool.call.end" | "tool_call.completed" | "tool_result" => "tool_result".to_string(),
        "tool.call.error" => "tool_result".to_string(),
        "memory.operation" => "memory_operation".to_string(),
        "agent.thinking" | "agent.reasoning" | "reasoning" => "thinking".to_string(),
        other => {
            let _ = payload;
            other.to_string()
        }
    }
}

/// Normalizes a raw status string (e.g. from a `tool_call` delta) onto the
/// canonical set used by derived tool events.
pub fn normalize_tool_status(raw_status: Option<&str>, default_status: &str) -> String {
    match raw_status {
        Some("started" | "streaming") => "started".to_string(),
        Some("completed" | "success" | "ok") => "completed".to_string(),
        Some("failed" | "error") => "failed".to_string(),
        Some(other) => other.to_string(),
        None => default_status.to_string(),
    }
}

/// The `status` value implied by a raw event alias that normalizes onto
/// `tool_call`/`tool_result`, injected into the payload when absent.
fn implied_tool_status(raw_event: &str) -> Option<&'static str> {
    match raw_event {
        "tool.call.start" | "tool_call.started" | "tool_call.start" => Some("started"),
        "tool.call.end" | "tool_call.completed" | "tool_result" => Some("completed"),
        "tool.call.error" => Some("failed"),
        _ => None,
    }
}

/// Resolves the agent id for a primary event, defaulting presence frames to
/// `"system"` and anything else unresolvable to `"unknown"`.
pub fn resolve_agent_id(raw_event: &str, payload: &Value) -> String {
    if raw_event == "presence" {
        return "system".to_string();
    }
    probe_string(payload, AGENT_ID_KEYS).unwrap_or_else(|| "unknown".to_string())
}

pub fn resolve_session_key(payload: &Value) -> Option<String> {
    probe_string(payload, SESSION_KEY_KEYS)
}

/// Builds the primary `BridgeEvent` for one inbound gateway event frame.
pub fn build_primary_event(
    raw_event: &str,
    payload: Value,
    frame_seq: Option<i64>,
    counter: &SequenceCounter,
) -> BridgeEvent {
    let event_type = normalize_event_type(raw_event, &payload);
    let agent_id = resolve_agent_id(raw_event, &payload);
    let session_key = resolve_session_key(&payload);
    let event_id = probe_string(&payload, EVENT_ID_KEYS).unwrap_or_else(generate_event_id);
    let timestamp = probe_string(&payload, TIMESTAMP_KEYS).unwrap_or_else(now_iso8601);
    let run_id = probe_str(&payload, &["runId", "run_id"]).map(str::to_owned);
    let sequence = frame_seq.unwrap_or_else(|| counter.next());

    let mut payload = payload;
    if let Some(status) = implied_tool_status(raw_event) {
        if let Value::Object(map) = &mut payload {
            map.entry("status".to_string())
                .or_insert_with(|| Value::String(status.to_string()));
        }
    }

    BridgeEvent {
        event_id,
        event_type,
        agent_id,
        session_key,
        timestamp,
        sequence,
        payload,
        source_event_id: None,
        source_event_type: None,
        run_id,
    }
}
