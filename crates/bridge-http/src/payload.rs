use bridge_core::model::{ControlCommand, ControlPayload, ControlTarget};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Parses a raw control request body into a [`ControlPayload`]. Accepts both
/// the flat `{command, agentId|agentIds, params, requestId}` shape and the
/// `agents.bulk` wrapper, which nests the real command under `params`.
pub fn parse_control_payload(body: &Value) -> Result<ControlPayload, ApiError> {
    let obj = body
        .as_object()
        .ok_or_else(|| ApiError::bad_request("body must be a JSON object"))?;

    let raw_command = obj
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("missing command"))?;
    let normalized = normalize_command_name(raw_command);

    if normalized == "agents.bulk" {
        return parse_bulk(obj);
    }

    let command = command_from_alias(&normalized)
        .ok_or_else(|| ApiError::bad_request(format!("unknown command '{raw_command}'")))?;

    let agent_ids = string_array(obj.get("agentIds"));
    let agent_id = obj.get("agentId").and_then(Value::as_str).map(str::to_string);
    let target = match (agent_id, agent_ids) {
        (_, Some(ids)) if !ids.is_empty() => ControlTarget::Bulk(ids),
        (Some(id), _) => ControlTarget::Single(id),
        _ => return Err(ApiError::bad_request("either agentId or agentIds is required")),
    };

    Ok(ControlPayload {
        target,
        command,
        params: object_field(obj, "params"),
        request_id: obj.get("requestId").and_then(Value::as_str).map(str::to_string),
        requested_by: obj.get("requestedBy").and_then(Value::as_str).map(str::to_string),
    })
}

fn parse_bulk(obj: &Map<String, Value>) -> Result<ControlPayload, ApiError> {
    let nested = obj
        .get("params")
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::bad_request("agents.bulk requires a nested params object"))?;

    let nested_command = nested
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("agents.bulk params missing command"))?;
    let command = command_from_alias(&normalize_command_name(nested_command))
        .ok_or_else(|| ApiError::bad_request(format!("unknown command '{nested_command}'")))?;

    let agent_ids = string_array(nested.get("agentIds"))
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| ApiError::bad_request("agents.bulk params missing agentIds"))?;

    Ok(ControlPayload {
        target: ControlTarget::Bulk(agent_ids),
        command,
        params: object_field(nested, "params"),
        request_id: nested.get("requestId").and_then(Value::as_str).map(str::to_string),
        requested_by: obj.get("requestedBy").and_then(Value::as_str).map(str::to_string),
    })
}

fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    value?.as_array().map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

fn object_field(obj: &Map<String, Value>, key: &str) -> Map<String, Value> {
    obj.get(key).and_then(Value::as_object).cloned().unwrap_or_default()
}

fn normalize_command_name(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

fn command_from_alias(name: &str) -> Option<ControlCommand> {
    match name {
        "pause" | "agent.pause" => Some(ControlCommand::Pause),
        "resume" | "agent.resume" => Some(ControlCommand::Resume),
        "redirect" | "agent.redirect" => Some(ControlCommand::Redirect),
        "kill" | "agent.kill" => Some(ControlCommand::Kill),
        "restart" | "agent.restart" => Some(ControlCommand::Restart),
        "priority" | "agent.priority" | "agent.priority.override" => Some(ControlCommand::Priority),
        _ => None,
    }
}
