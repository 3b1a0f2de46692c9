use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bridge_core::now_iso8601;
use serde_json::{json, Value};

use crate::auth;
use crate::state::AppState;

pub async fn handle_health(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let connection = state.gateway.connection_state().await;
    let mut gateway = serde_json::to_value(&connection).unwrap_or(Value::Null);
    let mut degraded = !connection.connected;

    let authorized = auth::secret_matches(
        state.control_secret.as_deref(),
        auth::presented_secret(&headers).as_deref(),
    );
    if authorized {
        match state.gateway.health_check().await {
            Ok(health) => {
                if let Some(obj) = gateway.as_object_mut() {
                    obj.insert("health".to_string(), health);
                }
            }
            Err(err) => {
                degraded = true;
                if let Some(obj) = gateway.as_object_mut() {
                    obj.insert("lastError".to_string(), Value::String(err.to_string()));
                }
            }
        }
    }

    let status = if degraded { "degraded" } else { "ok" };
    let code = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(json!({
            "status": status,
            "timestamp": now_iso8601(),
            "gateway": gateway,
        })),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use axum::Router;
    use bridge_gateway::{GatewayClient, GatewayClientConfig};
    use bridge_presence::PresenceTracker;
    use bridge_store::{StateStoreClient, StateStoreConfig};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::*;

    fn test_state(control_secret: Option<&str>) -> AppState {
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
            control_secret: control_secret.map(str::to_string),
            control_max_body_bytes: 1_048_576,
        }
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/api/health", get(handle_health))
            .with_state(state)
    }

    #[tokio::test]
    async fn integration_health_reports_degraded_before_gateway_connects() {
        let response = app(test_state(None))
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unit_health_does_not_attempt_deep_check_without_valid_secret() {
        let response = app(test_state(Some("s3cr3t")))
            .oneshot(
                Request::get("/api/health")
                    .header("bridge-control-secret", "wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
