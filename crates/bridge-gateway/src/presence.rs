use bridge_core::fields::probe_string;
use bridge_core::model::{PresenceEntry, PresenceSnapshot};
use bridge_core::now_iso8601;
use serde_json::Value;

const AGENT_ID_KEYS: &[&str] = &["agentId", "agent_id"];
const SESSION_KEY_KEYS: &[&str] = &["sessionKey", "session_key"];

/// Parses a `presence` event payload into a [`PresenceSnapshot`]. Accepts
/// camelCase or snake_case keys. Entries without a `deviceId` are dropped.
/// Returns `None` if `payload` is not an object or `entries` is not an array.
pub fn parse_presence_payload(payload: &Value) -> Option<PresenceSnapshot> {
    let entries_value = payload.get("entries")?.as_array()?;

    let entries = entries_value
        .iter()
        .filter_map(|raw| {
            let device_id = probe_string(raw, &["deviceId", "device_id"])?;
            if device_id.is_empty() {
                return None;
            }
            Some(PresenceEntry {
                device_id,
                agent_id: probe_string(raw, AGENT_ID_KEYS),
                session_key: probe_string(raw, SESSION_KEY_KEYS),
                roles: non_empty_strings(raw, "roles"),
                scopes: non_empty_strings(raw, "scopes"),
                connected_at: probe_string(raw, &["connectedAt", "connected_at"]),
                last_seen: probe_string(raw, &["lastSeen", "last_seen"]),
            })
        })
        .collect();

    Some(PresenceSnapshot {
        entries,
        observed_at: now_iso8601(),
    })
}

fn non_empty_strings(raw: &Value, key: &str) -> Option<Vec<String>> {
    let values: Vec<String> = raw
        .get(key)?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_owned))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}
