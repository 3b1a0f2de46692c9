use bridge_core::model::{ControlCommand, GatewayAction};
use serde_json::{json, Map, Value};

/// Translates a command into the ordered gateway actions that implement it.
/// Returns a validation message (never a gateway error) when required
/// parameters are missing.
pub fn translate_command(
    command: ControlCommand,
    session_key: &str,
    params: &Map<String, Value>,
) -> Result<Vec<GatewayAction>, String> {
    match command {
        ControlCommand::Pause => Ok(vec![send(session_key, "/stop")]),
        ControlCommand::Resume => {
            let text = params
                .get("text")
                .and_then(Value::as_str)
                .or_else(|| params.get("message").and_then(Value::as_str))
                .unwrap_or("Resume work");
            Ok(vec![GatewayAction::Call {
                method: "cron.wake".to_string(),
                params: json!({"text": text, "mode": "now"}),
            }])
        }
        ControlCommand::Redirect => {
            if let Some(payload) = params
                .get("taskPayload")
                .or_else(|| params.get("text"))
                .or_else(|| params.get("message"))
                .or_else(|| params.get("task"))
            {
                Ok(vec![send(session_key, stringify_if_needed(payload))])
            } else {
                let task_id = params
                    .get("taskId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "Missing task payload".to_string())?;
                let mut body = Map::new();
                body.insert("taskId".to_string(), Value::String(task_id.to_string()));
                if let Some(priority) = params.get("priority") {
                    body.insert("priority".to_string(), priority.clone());
                }
                Ok(vec![send(session_key, Value::Object(body).to_string())])
            }
        }
        ControlCommand::Kill => Ok(vec![send(session_key, "/stop"), send(session_key, "/reset")]),
        ControlCommand::Restart => Ok(vec![send(session_key, "/new")]),
        ControlCommand::Priority => {
            let priority = params
                .get("priority")
                .ok_or_else(|| "priority requires params.priority".to_string())?;
            Ok(vec![send(
                session_key,
                format!("/queue priority:{}", stringify_if_needed(priority)),
            )])
        }
    }
}

fn stringify_if_needed(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn send(session_key: &str, message: impl Into<String>) -> GatewayAction {
    GatewayAction::Send {
        session_key: session_key.to_string(),
        message: Value::String(message.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_pause_sends_stop() {
        let actions = translate_command(ControlCommand::Pause, "agent:a:main", &Map::new()).unwrap();
        assert_eq!(
            actions,
            vec![GatewayAction::Send {
                session_key: "agent:a:main".to_string(),
                message: Value::String("/stop".to_string()),
            }]
        );
    }

    #[test]
    fn functional_kill_sends_stop_then_reset_in_order() {
        let actions = translate_command(ControlCommand::Kill, "agent:a:main", &Map::new()).unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            GatewayAction::Send {
                session_key: "agent:a:main".to_string(),
                message: Value::String("/stop".to_string()),
            }
        );
        assert_eq!(
            actions[1],
            GatewayAction::Send {
                session_key: "agent:a:main".to_string(),
                message: Value::String("/reset".to_string()),
            }
        );
    }

    #[test]
    fn functional_redirect_prefers_task_payload_over_task_id() {
        let mut params = Map::new();
        params.insert("text".to_string(), Value::String("do this".to_string()));
        params.insert("taskId".to_string(), Value::String("task-1".to_string()));
        let actions = translate_command(ControlCommand::Redirect, "agent:a:main", &params).unwrap();
        assert_eq!(
            actions[0],
            GatewayAction::Send {
                session_key: "agent:a:main".to_string(),
                message: Value::String("do this".to_string()),
            }
        );
    }

    #[test]
    fn regression_redirect_requires_payload_or_task_id() {
        let result = translate_command(ControlCommand::Redirect, "agent:a:main", &Map::new());
        assert!(result.is_err());
    }

    #[test]
    fn regression_priority_requires_priority_param() {
        let result = translate_command(ControlCommand::Priority, "agent:a:main", &Map::new());
        assert!(result.is_err());
    }

    #[test]
    fn unit_priority_builds_queue_command() {
        let mut params = Map::new();
        params.insert("priority".to_string(), Value::String("high".to_string()));
        let actions = translate_command(ControlCommand::Priority, "agent:a:main", &params).unwrap();
        assert_eq!(
            actions[0],
            GatewayAction::Send {
                session_key: "agent:a:main".to_string(),
                message: Value::String("/queue priority:high".to_string()),
            }
        );
    }
}
