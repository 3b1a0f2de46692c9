use std::collections::HashSet;

use bridge_core::fields::{flatten_entries, probe, probe_f64, probe_string, probe_u64};
use bridge_core::{generate_event_id, BridgeEvent, SequenceCounter};
use serde_json::{json, Map, Value};

use crate::normalize::normalize_tool_status;

const TOOL_CALL_SLOTS: &[&str] = &[
    "tool",
    "toolCall",
    "tool_call",
    "toolResult",
    "tool_result",
    "toolCalls",
    "tool_calls",
    "toolResults",
    "tool_results",
];

const SESSION_SLOTS: &[&str] = &[
    "session",
    "sessionEvent",
    "session_event",
    "sessionInfo",
    "sessionMetrics",
    "sessionLifecycle",
];

const MEMORY_SLOTS: &[&str] = &["memoryOperation", "memoryOperations", "memoryEvent", "memoryEvents", "memoryOps", "memory"];

const DIAGNOSTIC_SLOTS: &[&str] = &["diagnostic", "diagnostics"];

const TOKEN_KEYS: &[&str] = &[
    "inputTokens",
    "input_tokens",
    "outputTokens",
    "output_tokens",
    "totalTokens",
    "total_tokens",
    "cacheReadTokens",
    "cache_read_tokens",
    "cacheWriteTokens",
    "cache_write_tokens",
    "durationMs",
    "duration_ms",
    "costUsd",
    "cost_usd",
    "model",
];

/// Derives zero or more secondary events from one `agent`-kind primary
/// event. Only frames whose raw event name is `"agent"` carry derivations.
pub fn derive_events(
    primary: &BridgeEvent,
    raw_event: &str,
    payload: &Value,
    counter: &SequenceCounter,
) -> Vec<BridgeEvent> {
    if raw_event != "agent" {
        return Vec::new();
    }

    let delta = payload.get("delta");
    let summary = payload.get("summary");
    let mut derived = Vec::new();
    let mut seen_tool_keys: HashSet<(String, String, String)> = HashSet::new();

    derive_tool_events(payload, delta, &mut derived, &mut seen_tool_keys, primary, counter);
    derive_thinking_event(payload, delta, &mut derived, primary, counter);
    derive_error_event(payload, delta, &mut derived, primary, counter);
    derive_token_usage_event(payload, summary, &mut derived, primary, counter);
    derive_session_events(payload, &mut derived, primary, counter);
    derive_memory_events(payload, &mut derived, primary, counter);
    derive_diagnostic_events(payload, &mut derived, primary, counter);

    derived
}

fn spawn(
    event_type: &str,
    fields: Value,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
    session_key_override: Option<String>,
) -> BridgeEvent {
    BridgeEvent {
        event_id: generate_event_id(),
        event_type: event_type.to_string(),
        agent_id: primary.agent_id.clone(),
        session_key: session_key_override.or_else(|| primary.session_key.clone()),
        timestamp: primary.timestamp.clone(),
        sequence: counter.next(),
        payload: fields,
        source_event_id: Some(primary.event_id.clone()),
        source_event_type: Some(primary.event_type.clone()),
        run_id: primary.run_id.clone(),
    }
}

fn classify_tool_entry(entry: &Value) -> Option<(&'static str, String)> {
    if let Some(explicit) = probe_string(entry, &["type"]) {
        return match explicit.as_str() {
            "tool_result" | "toolResult" => Some(("tool_result", normalize_tool_status(
                probe_string(entry, &["status"]).as_deref(),
                "completed",
            ))),
            "tool_call" | "toolCall" => Some(("tool_call", normalize_tool_status(
                probe_string(entry, &["status"]).as_deref(),
                "started",
            ))),
            _ => None,
        };
    }
    if let Some(status) = probe_string(entry, &["status"]) {
        return match status.as_str() {
            "completed" | "failed" | "success" | "error" => {
                Some(("tool_result", normalize_tool_status(Some(&status), "completed")))
            }
            "started" | "streaming" => {
                Some(("tool_call", normalize_tool_status(Some(&status), "started")))
            }
            _ => None,
        };
    }
    if probe(entry, &["toolOutput", "tool_output"]).is_some() {
        return Some(("tool_result", "completed".to_string()));
    }
    if probe(entry, &["toolInput", "tool_input"]).is_some() {
        return Some(("tool_call", "started".to_string()));
    }
    None
}

fn tool_entry_fields(entry: &Value, event_type: &str, status: &str) -> Value {
    let mut fields = Map::new();
    if let Some(name) = probe_string(entry, &["toolName", "tool_name"]) {
        fields.insert("toolName".into(), json!(name));
    }
    if let Some(id) = probe_string(entry, &["toolCallId", "tool_call_id"]) {
        fields.insert("toolCallId".into(), json!(id));
    }
    fields.insert("status".into(), json!(status));
    if event_type == "tool_call" {
        if let Some(input) = probe(entry, &["toolInput", "tool_input"]) {
            fields.insert("toolInput".into(), input.clone());
        }
    } else {
        if let Some(output) = probe(entry, &["toolOutput", "tool_output"]) {
            fields.insert("toolOutput".into(), output.clone());
        }
    }
    if let Some(duration) = probe_u64(entry, &["durationMs", "duration_ms"]) {
        fields.insert("durationMs".into(), json!(duration));
    }
    if let Some(error) = probe(entry, &["error"]) {
        fields.insert("error".into(), error.clone());
    }
    if let Some(stack) = probe_string(entry, &["stack"]) {
        fields.insert("stack".into(), json!(stack));
    }
    Value::Object(fields)
}

fn tool_dedup_key(entry_fields: &Value, event_type: &str, status: &str) -> (String, String, String) {
    let identity = entry_fields
        .get("toolCallId")
        .or_else(|| entry_fields.get("toolName"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    (event_type.to_string(), identity, status.to_string())
}

fn push_tool_event(
    event_type: &str,
    fields: Value,
    derived: &mut Vec<BridgeEvent>,
    seen: &mut HashSet<(String, String, String)>,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
) {
    let status = fields
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let key = tool_dedup_key(&fields, event_type, &status);
    if !seen.insert(key) {
        return;
    }
    derived.push(spawn(event_type, fields, primary, counter, None));
}

fn derive_tool_events(
    payload: &Value,
    delta: Option<&Value>,
    derived: &mut Vec<BridgeEvent>,
    seen: &mut HashSet<(String, String, String)>,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
) {
    if let Some(delta) = delta {
        match probe_string(delta, &["type"]).as_deref() {
            Some("tool_call") => {
                let fields = tool_entry_fields(delta, "tool_call", "started");
                push_tool_event("tool_call", fields, derived, seen, primary, counter);
            }
            Some("tool_result") => {
                let fields = tool_entry_fields(delta, "tool_result", "completed");
                push_tool_event("tool_result", fields, derived, seen, primary, counter);
            }
            _ => {}
        }
    }

    for entry in flatten_entries(payload, TOOL_CALL_SLOTS) {
        if let Some((event_type, status)) = classify_tool_entry(&entry) {
            let fields = tool_entry_fields(&entry, event_type, &status);
            push_tool_event(event_type, fields, derived, seen, primary, counter);
        }
    }
}

fn derive_thinking_event(
    payload: &Value,
    delta: Option<&Value>,
    derived: &mut Vec<BridgeEvent>,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
) {
    const THINKING_KEYS: &[&str] = &["thinking", "thought", "reasoning", "analysis"];

    let delta_is_thinking = delta
        .and_then(|d| probe_string(d, &["type"]))
        .map(|t| t == "thinking" || t == "reasoning")
        .unwrap_or(false);
    let has_thinking_text = probe(payload, THINKING_KEYS).is_some()
        || delta.map(|d| probe(d, THINKING_KEYS).is_some()).unwrap_or(false);
    let started_without_delta =
        delta.is_none() && probe_string(payload, &["status"]).as_deref() == Some("started");

    if !(delta_is_thinking || has_thinking_text || started_without_delta) {
        return;
    }

    let text = delta
        .and_then(|d| probe_string(d, THINKING_KEYS))
        .or_else(|| probe_string(payload, THINKING_KEYS))
        .unwrap_or_default();
    let status = delta
        .and_then(|d| probe_string(d, &["status"]))
        .or_else(|| probe_string(payload, &["status"]))
        .unwrap_or_else(|| "started".to_string());

    let mut fields = Map::new();
    fields.insert("status".into(), json!(status));
    fields.insert("thinking".into(), json!(text));
    if let Some(phase) = probe_string(payload, &["phase"]) {
        fields.insert("phase".into(), json!(phase));
    }
    if let Some(confidence) = probe_f64(payload, &["confidence"]) {
        fields.insert("confidence".into(), json!(confidence));
    }
    derived.push(spawn("thinking", Value::Object(fields), primary, counter, None));
}

fn derive_error_event(
    payload: &Value,
    delta: Option<&Value>,
    derived: &mut Vec<BridgeEvent>,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
) {
    let normalized_status = probe_string(payload, &["status"]);
    let is_error_status = normalized_status.as_deref() == Some("error")
        || normalize_tool_status(normalized_status.as_deref(), "") == "failed";

    let error_slot = probe(payload, &["error", "exception"])
        .or_else(|| delta.and_then(|d| probe(d, &["error", "exception"])));

    if !is_error_status && error_slot.is_none() {
        return;
    }

    let source = error_slot.cloned().unwrap_or(Value::Null);
    let mut fields = Map::new();
    if let Some(message) = probe_string(&source, &["message"]).or_else(|| probe_string(payload, &["message"])) {
        fields.insert("message".into(), json!(message));
    }
    if let Some(stack) = probe_string(&source, &["stack"]) {
        fields.insert("stack".into(), json!(stack));
    }
    if let Some(code) = probe(&source, &["code"]) {
        fields.insert("code".into(), code.clone());
    }
    if let Some(severity) = probe_string(&source, &["severity"]) {
        fields.insert("severity".into(), json!(severity));
    }
    if let Some(recoverable) = source.get("recoverable") {
        fields.insert("recoverable".into(), recoverable.clone());
    }
    if let Some(context) = probe(&source, &["context"]) {
        fields.insert("context".into(), context.clone());
    }
    derived.push(spawn("error", Value::Object(fields), primary, counter, None));
}

fn derive_token_usage_event(
    payload: &Value,
    summary: Option<&Value>,
    derived: &mut Vec<BridgeEvent>,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
) {
    let has_tokens = probe(payload, TOKEN_KEYS).is_some()
        || summary.map(|s| probe(s, TOKEN_KEYS).is_some()).unwrap_or(false);
    if !has_tokens {
        return;
    }

    let source = summary.unwrap_or(payload);
    let mut fields = Map::new();
    let input_tokens = probe_u64(source, &["inputTokens", "input_tokens"]);
    let output_tokens = probe_u64(source, &["outputTokens", "output_tokens"]);
    let mut total_tokens = probe_u64(source, &["totalTokens", "total_tokens"]);
    if total_tokens.is_none() {
        if let (Some(input), Some(output)) = (input_tokens, output_tokens) {
            total_tokens = Some(input + output);
        }
    }
    if let Some(v) = input_tokens {
        fields.insert("inputTokens".into(), json!(v));
    }
    if let Some(v) = output_tokens {
        fields.insert("outputTokens".into(), json!(v));
    }
    if let Some(v) = total_tokens {
        fields.insert("totalTokens".into(), json!(v));
    }
    if let Some(v) = probe_u64(source, &["cacheReadTokens", "cache_read_tokens"]) {
        fields.insert("cacheReadTokens".into(), json!(v));
    }
    if let Some(v) = probe_u64(source, &["cacheWriteTokens", "cache_write_tokens"]) {
        fields.insert("cacheWriteTokens".into(), json!(v));
    }
    if let Some(v) = probe_u64(source, &["durationMs", "duration_ms"]) {
        fields.insert("durationMs".into(), json!(v));
    }
    if let Some(v) = probe_f64(source, &["costUsd", "cost_usd"]) {
        fields.insert("costUsd".into(), json!(v));
    }
    if let Some(v) = probe_string(source, &["model"]) {
        fields.insert("model".into(), json!(v));
    }
    derived.push(spawn("token_usage", Value::Object(fields), primary, counter, None));
}

fn classify_session_entry(entry: &Value) -> Option<&'static str> {
    let hint = probe_string(entry, &["event", "eventType", "type", "status", "state", "phase"])
        .map(|h| h.to_lowercase());
    if let Some(hint) = hint {
        if ["start", "begin", "resume", "open"].iter().any(|needle| hint.contains(needle)) {
            return Some("session_start");
        }
        if ["end", "stop", "close", "finish", "complete", "terminate"]
            .iter()
            .any(|needle| hint.contains(needle))
        {
            return Some("session_end");
        }
    }
    if probe(entry, &["endedAt", "ended_at", "endTime", "end_time"]).is_some() {
        return Some("session_end");
    }
    if probe(entry, &["startedAt", "started_at", "startTime", "start_time"]).is_some() {
        return Some("session_start");
    }
    None
}

fn derive_session_events(
    payload: &Value,
    derived: &mut Vec<BridgeEvent>,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
) {
    for entry in flatten_entries(payload, SESSION_SLOTS) {
        let Some(event_type) = classify_session_entry(&entry) else {
            continue;
        };
        let session_key = probe_string(&entry, &["sessionKey", "session_key", "sessionId"]);
        derived.push(spawn(event_type, entry.clone(), primary, counter, session_key));
    }
}

fn derive_memory_events(
    payload: &Value,
    derived: &mut Vec<BridgeEvent>,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
) {
    for entry in flatten_entries(payload, MEMORY_SLOTS) {
        let looks_like_memory = probe(&entry, &["operation", "op", "action"]).is_some()
            || probe(&entry, &["success", "ok"]).is_some()
            || probe_string(&entry, &["eventType", "type"])
                .map(|t| t.to_lowercase().contains("memory"))
                .unwrap_or(false);
        if !looks_like_memory {
            continue;
        }
        derived.push(spawn("memory_operation", entry.clone(), primary, counter, None));
    }
}

fn derive_diagnostic_events(
    payload: &Value,
    derived: &mut Vec<BridgeEvent>,
    primary: &BridgeEvent,
    counter: &SequenceCounter,
) {
    for entry in flatten_entries(payload, DIAGNOSTIC_SLOTS) {
        derived.push(spawn("diagnostic", entry.clone(), primary, counter, None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::build_primary_event;

    fn primary_for(payload: Value) -> BridgeEvent {
        let counter = SequenceCounter::new();
        build_primary_event("agent", payload, None, &counter)
    }

    #[test]
    fn unit_derive_events_skips_non_agent_frames() {
        let counter = SequenceCounter::new();
        let primary = primary_for(json!({}));
        assert!(derive_events(&primary, "presence", &json!({}), &counter).is_empty());
    }

    #[test]
    fn functional_derive_tool_call_from_delta() {
        let counter = SequenceCounter::new();
        let payload = json!({"delta": {"type": "tool_call", "toolName": "search", "toolCallId": "call_1"}});
        let primary = primary_for(payload.clone());
        let derived = derive_events(&primary, "agent", &payload, &counter);
        assert_eq!(derived.len(), 1);
        assert_eq!(derived[0].event_type, "tool_call");
        assert_eq!(derived[0].payload["toolName"], "search");
        assert_eq!(derived[0].source_event_id, Some(primary.event_id.clone()));
    }

    #[test]
    fn regression_p3_tool_events_are_deduplicated() {
        let counter = SequenceCounter::new();
        let payload = json!({
            "delta": {"type": "tool_call", "toolName": "search", "toolCallId": "call_1", "status": "started"},
            "toolCalls": [{"toolCallId": "call_1", "toolName": "search", "status": "started"}],
        });
        let primary = primary_for(payload.clone());
        let derived = derive_events(&primary, "agent", &payload, &counter);
        assert_eq!(derived.len(), 1);
    }

    #[test]
    fn functional_derive_token_usage_computes_total_when_absent() {
        let counter = SequenceCounter::new();
        let payload = json!({"inputTokens": 10, "outputTokens": 5});
        let primary = primary_for(payload.clone());
        let derived = derive_events(&primary, "agent", &payload, &counter);
        let token_event = derived
            .iter()
            .find(|e| e.event_type == "token_usage")
            .expect("token usage event");
        assert_eq!(token_event.payload["totalTokens"], 15);
    }

    #[test]
    fn functional_derive_session_events_classifies_start_and_end() {
        let counter = SequenceCounter::new();
        let payload = json!({
            "session": [
                {"event": "session_start", "sessionKey": "agent:a1:main"},
                {"event": "session_end", "sessionKey": "agent:a1:main"},
            ]
        });
        let primary = primary_for(payload.clone());
        let derived = derive_events(&primary, "agent", &payload, &counter);
        let types: Vec<_> = derived.iter().map(|e| e.event_type.as_str()).collect();
        assert!(types.contains(&"session_start"));
        assert!(types.contains(&"session_end"));
    }

    #[test]
    fn functional_derive_memory_operation_from_flattened_slot() {
        let counter = SequenceCounter::new();
        let payload = json!({"memory": {"operation": "store", "key": "fact_1"}});
        let primary = primary_for(payload.clone());
        let derived = derive_events(&primary, "agent", &payload, &counter);
        assert!(derived.iter().any(|e| e.event_type == "memory_operation"));
    }

    #[test]
    fn functional_derive_error_event_from_status() {
        let counter = SequenceCounter::new();
        let payload = json!({"status": "error", "message": "boom"});
        let primary = primary_for(payload.clone());
        let derived = derive_events(&primary, "agent", &payload, &counter);
        let error_event = derived.iter().find(|e| e.event_type == "error").expect("error event");
        assert_eq!(error_event.payload["message"], "boom");
    }
}
