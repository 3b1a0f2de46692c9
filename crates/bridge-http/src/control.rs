use axum::extract::{Bytes, State};
use axum::http::HeaderMap;
use axum::Json;
use bridge_core::model::{AgentStatus, AgentStatusUpdate, ControlCommand, ControlTarget, GatewayAction};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;
use crate::{actions, auth, payload};

enum Outcome {
    Accepted,
    Rejected(String),
    Error(String),
}

pub async fn handle_control(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(configured) = state.control_secret.as_deref() else {
        return Err(ApiError::control_not_configured());
    };
    let presented = auth::presented_secret(&headers);
    if !auth::secret_matches(Some(configured), presented.as_deref()) {
        return Err(ApiError::unauthorized());
    }

    if body.len() > state.control_max_body_bytes {
        return Err(ApiError::payload_too_large(state.control_max_body_bytes));
    }

    let raw: Value = serde_json::from_slice(&body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;

    let control_payload = payload::parse_control_payload(&raw)?;

    let request_id = control_payload
        .request_id
        .clone()
        .unwrap_or_else(bridge_core::generate_event_id);
    let agent_ids = match &control_payload.target {
        ControlTarget::Single(id) => vec![id.clone()],
        ControlTarget::Bulk(ids) => ids.clone(),
    };

    let outcomes = futures_util::future::join_all(agent_ids.iter().map(|agent_id| {
        execute_for_agent(&state, agent_id, control_payload.command, &control_payload.params)
    }))
    .await;

    let (status, error) = summarize_outcomes(&outcomes);

    let mut body = json!({"requestId": request_id, "status": status});
    if let Some(message) = error {
        body["error"] = json!(message);
    }
    Ok(Json(body))
}

async fn execute_for_agent(
    state: &AppState,
    agent_id: &str,
    command: ControlCommand,
    params: &Map<String, Value>,
) -> Outcome {
    let session_key = params
        .get("sessionKey")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("agent:{agent_id}:main"));

    let gateway_actions = match actions::translate_command(command, &session_key, params) {
        Ok(actions) => actions,
        Err(message) => return Outcome::Rejected(message),
    };

    for action in gateway_actions {
        let result = match action {
            GatewayAction::Send { session_key, message } => state.gateway.send(&session_key, message).await,
            GatewayAction::Call { method, params } => state.gateway.request(&method, Some(params)).await,
        };
        if let Err(err) = result {
            return Outcome::Error(err.to_string());
        }
    }

    apply_status_side_effect(state, agent_id, command, &session_key).await;
    Outcome::Accepted
}

async fn apply_status_side_effect(
    state: &AppState,
    agent_id: &str,
    command: ControlCommand,
    session_key: &str,
) {
    let now = bridge_core::current_unix_timestamp_ms();
    let update = match command {
        ControlCommand::Pause => {
            state.presence.lock().await.pause(agent_id);
            Some(AgentStatus::Paused)
        }
        ControlCommand::Resume | ControlCommand::Redirect | ControlCommand::Restart => {
            state.presence.lock().await.clear_pause(agent_id);
            Some(AgentStatus::Busy)
        }
        ControlCommand::Kill | ControlCommand::Priority => None,
    };

    let Some(status) = update else { return };
    let record = AgentStatusUpdate {
        agent_id: agent_id.to_string(),
        status,
        last_seen: now,
        session_info: Some(json!({"sessionKey": session_key})),
    };
    if let Err(err) = state.store.update_agent_statuses(&[record]).await {
        warn!(error = %err, agent_id, "failed to post control status side effect");
    }
}

/// Aggregates per-target outcomes into a response status plus the first
/// rejection/error message, if any (rejections take priority over errors).
fn summarize_outcomes(outcomes: &[Outcome]) -> (&'static str, Option<String>) {
    if let Some(message) = outcomes.iter().find_map(|o| match o {
        Outcome::Rejected(message) => Some(message.clone()),
        _ => None,
    }) {
        return ("rejected", Some(message));
    }
    if let Some(message) = outcomes.iter().find_map(|o| match o {
        Outcome::Error(message) => Some(message.clone()),
        _ => None,
    }) {
        return ("error", Some(message));
    }
    ("accepted", None)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use bridge_gateway::{GatewayClient, GatewayClientConfig};
    use bridge_presence::PresenceTracker;
    use bridge_store::{StateStoreClient, StateStoreConfig};
    use http_body_util::BodyExt;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::*;

    fn test_state() -> AppState {
        let (gateway, _rx) = GatewayClient::new(GatewayClientConfig {
            url: "wss://example.invalid/gateway".to_string(),
            token: "tok".to_string(),
            client_id: "bridge".to_string(),
            client_version: "0.1.0".to_string(),
            reconnect_interval_ms: 1_000,
            max_reconnect_attempts: 0,
            request_timeout_ms: 5_000,
        });
        let store = StateStoreClient::new(StateStoreConfig {
            base_url: "https://store.invalid".to_string(),
            secret: "s3cr3t".to_string(),
            request_timeout_ms: 5_000,
        })
        .expect("store client");

        AppState {
            gateway: Arc::new(gateway),
            store: Arc::new(store),
            presence: Arc::new(Mutex::new(PresenceTracker::new(120_000))),
            control_secret: Some("s3cr3t".to_string()),
            control_max_body_bytes: 1_048_576,
        }
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/api/control", post(handle_control))
            .with_state(state)
    }

    #[tokio::test]
    async fn integration_redirect_missing_payload_is_rejected_with_error_message() {
        let body = json!({
            "agentId": "agent_1",
            "command": "agent.redirect",
            "params": {},
        });
        let response = app(test_state())
            .oneshot(
                Request::post("/api/control")
                    .header("content-type", "application/json")
                    .header("bridge-control-secret", "s3cr3t")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["status"], "rejected");
        assert_eq!(parsed["error"], "Missing task payload");
    }

    #[test]
    fn unit_summarize_outcomes_prefers_rejected_over_error() {
        let outcomes = vec![Outcome::Rejected("bad".into()), Outcome::Error("boom".into())];
        assert_eq!(
            summarize_outcomes(&outcomes),
            ("rejected", Some("bad".to_string()))
        );
    }

    #[test]
    fn unit_summarize_outcomes_error_when_any_failed() {
        let outcomes = vec![Outcome::Accepted, Outcome::Error("boom".into())];
        assert_eq!(
            summarize_outcomes(&outcomes),
            ("error", Some("boom".to_string()))
        );
    }

    #[test]
    fn unit_summarize_outcomes_accepted_when_all_ok() {
        let outcomes = vec![Outcome::Accepted, Outcome::Accepted];
        assert_eq!(summarize_outcomes(&outcomes), ("accepted", None));
    }
}
