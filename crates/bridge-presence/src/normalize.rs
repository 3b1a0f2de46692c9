use std::collections::HashMap;

/// Extracts the agent id from a session key of the shape
/// `agent:<agentId>:<role>`. Returns `None` for anything else.
pub fn agent_id_from_session_key(session_key: &str) -> Option<String> {
    let mut parts = session_key.split(':');
    if parts.next()? != "agent" {
        return None;
    }
    let id = parts.next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Normalizes a raw agent id: trims whitespace, applies an operator-supplied
/// alias substitution, else unwraps a `agent:<id>:...` session-key shape,
/// else keeps the trimmed value as-is.
pub fn normalize_agent_id(raw: &str, aliases: &HashMap<String, String>) -> String {
    let trimmed = raw.trim();
    if let Some(alias) = aliases.get(trimmed) {
        return alias.clone();
    }
    if let Some(id) = agent_id_from_session_key(trimmed) {
        return id;
    }
    trimmed.to_string()
}
