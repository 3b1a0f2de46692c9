//! HTTP client for the state store: event ingest, status updates, agent
//! metadata sync, and the pending-notification queue.
use std::time::Duration;

use bridge_core::model::{AgentStatusUpdate, BridgeEvent, PendingNotification};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("state store returned {status}: {body}")]
    Remote { status: u16, body: String },
}

pub type StateStoreResult<T> = Result<T, StateStoreError>;

#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    pub base_url: String,
    pub secret: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct StateStoreClient {
    client: reqwest::Client,
    base_url: String,
}

impl StateStoreClient {
    pub fn new(config: StateStoreConfig) -> StateStoreResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = format!("Bearer {}", config.secret.trim());
        if let Ok(value) = HeaderValue::from_str(&auth_value) {
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn ingest_events(&self, events: &[BridgeEvent]) -> StateStoreResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        self.post_json("/events/ingest", events).await
    }

    pub async fn update_agent_statuses(
        &self,
        updates: &[AgentStatusUpdate],
    ) -> StateStoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        self.post_json("/agents/update-status", updates).await
    }

    pub async fn sync_agent_metadata(&self, records: &[Value]) -> StateStoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.post_json("/agents/metadata", records).await
    }

    pub async fn list_pending_notifications(
        &self,
        limit: usize,
        recipient_type: &str,
    ) -> StateStoreResult<Vec<PendingNotification>> {
        #[derive(Serialize)]
        struct Request<'a> {
            limit: usize,
            #[serde(rename = "recipientType")]
            recipient_type: &'a str,
        }
        self.post_json_with_response(
            "/notifications/pending",
            &Request {
                limit,
                recipient_type,
            },
        )
        .await
    }

    pub async fn mark_notification_delivered(
        &self,
        notification_id: &str,
        delivered_at: Option<&str>,
    ) -> StateStoreResult<()> {
        #[derive(Serialize)]
        struct Request<'a> {
            #[serde(rename = "notificationId")]
            notification_id: &'a str,
            #[serde(rename = "deliveredAt", skip_serializing_if = "Option::is_none")]
            delivered_at: Option<&'a str>,
        }
        self.post_json(
            "/notifications/mark-delivered",
            &Request {
                notification_id,
                delivered_at,
            },
        )
        .await
    }

    pub async fn record_notification_attempt(
        &self,
        notification_id: &str,
        error: Option<&str>,
    ) -> StateStoreResult<()> {
        #[derive(Serialize)]
        struct Request<'a> {
            #[serde(rename = "notificationId")]
            notification_id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a str>,
        }
        self.post_json(
            "/notifications/attempt",
            &Request {
                notification_id,
                error,
            },
        )
        .await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> StateStoreResult<()> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(StateStoreError::Remote {
            status: status.as_u16(),
            body: truncate(&body, 2048),
        })
    }

    async fn post_json_with_response<B: Serialize + ?Sized, R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> StateStoreResult<R> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StateStoreError::Remote {
                status: status.as_u16(),
                body: truncate(&text, 2048),
            });
        }
        serde_json::from_str(&text).map_err(|err| StateStoreError::Remote {
            status: status.as_u16(),
            body: format!("failed to decode response: {err}"),
        })
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if let Some(rewritten) = trimmed.strip_suffix(".cloud") {
        return format!("{rewritten}.site");
    }
    if let Some((prefix, rest)) = trimmed.split_once(".cloud/") {
        return format!("{prefix}.site/{rest}");
    }
    trimmed.to_string()
}

fn truncate(input: &str, max_len: usize) -> String {
    if input.len() <= max_len {
        input.to_string()
    } else {
        format!("{}...", &input[..max_len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::model::AgentStatus;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> StateStoreClient {
        StateStoreClient::new(StateStoreConfig {
            base_url: server.base_url(),
            secret: "s3cr3t".into(),
            request_timeout_ms: 5_000,
        })
        .expect("client")
    }

    #[test]
    fn unit_normalize_base_url_strips_trailing_slash() {
        assert_eq!(normalize_base_url("https://store.example/"), "https://store.example");
    }

    #[test]
    fn unit_normalize_base_url_rewrites_cloud_suffix() {
        assert_eq!(
            normalize_base_url("https://my-app.convex.cloud"),
            "https://my-app.convex.site"
        );
    }

    #[tokio::test]
    async fn functional_ingest_events_skips_request_when_empty() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/events/ingest");
            then.status(200);
        });
        let client = client_for(&server);
        client.ingest_events(&[]).await.expect("ok");
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn integration_update_agent_statuses_posts_body_and_auth_header() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/agents/update-status")
                .header("authorization", "Bearer s3cr3t");
            then.status(200);
        });
        let client = client_for(&server);
        let updates = vec![AgentStatusUpdate {
            agent_id: "agent_1".into(),
            status: AgentStatus::Online,
            last_seen: 1_000,
            session_info: None,
        }];
        client.update_agent_statuses(&updates).await.expect("ok");
        mock.assert();
    }

    #[tokio::test]
    async fn regression_non_2xx_response_surfaces_remote_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/events/ingest");
            then.status(500).body("boom");
        });
        let client = client_for(&server);
        let event = BridgeEvent {
            event_id: "evt_1".into(),
            event_type: "agent".into(),
            agent_id: "agent_1".into(),
            session_key: None,
            timestamp: "2026-01-01T00:00:00Z".into(),
            sequence: 1,
            payload: Value::Null,
            source_event_id: None,
            source_event_type: None,
            run_id: None,
        };
        let err = client.ingest_events(&[event]).await.unwrap_err();
        match err {
            StateStoreError::Remote { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Remote error, got {other:?}"),
        }
    }
}
