//! Wire framing for the gateway's full-duplex JSON protocol.
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 3;

/// One inbound frame. `type` is the wire discriminator; `res` is accepted
/// as an alias for `response` since the gateway has shipped both spellings.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayFrame {
    #[serde(rename = "response", alias = "res")]
    Response(ResponseFrame),
    #[serde(rename = "event")]
    Event(EventFrame),
    #[serde(rename = "hello-ok")]
    HelloOk(HelloFrame),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    pub ok: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default = "Value::default")]
    pub payload: Value,
    #[serde(default)]
    pub seq: Option<i64>,
    #[serde(default, rename = "stateVersion")]
    pub state_version: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HelloFrame {
    #[serde(default)]
    pub presence: Option<Value>,
    #[serde(default)]
    pub health: Option<Value>,
    #[serde(default)]
    pub features: Option<HelloFeatures>,
    #[serde(default)]
    pub snapshot: Option<HelloSnapshot>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HelloFeatures {
    #[serde(default)]
    pub methods: Option<Vec<String>>,
    #[serde(default)]
    pub events: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HelloSnapshot {
    #[serde(default)]
    pub presence: Option<Value>,
    #[serde(default)]
    pub health: Option<Value>,
}

impl HelloFrame {
    /// Returns the presence payload, preferring the top-level slot over the
    /// nested `snapshot.presence` slot.
    pub fn presence_payload(&self) -> Option<&Value> {
        self.presence
            .as_ref()
            .or_else(|| self.snapshot.as_ref().and_then(|s| s.presence.as_ref()))
    }

    pub fn health_payload(&self) -> Option<&Value> {
        self.health
            .as_ref()
            .or_else(|| self.snapshot.as_ref().and_then(|s| s.health.as_ref()))
    }
}

/// One outbound request frame.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl GatewayRequest {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            kind: "req",
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_response_frame_accepts_res_alias() {
        let raw = json!({"type": "res", "id": "req_1", "ok": true, "result": 1});
        let frame: GatewayFrame = serde_json::from_value(raw).expect("parse");
        assert!(matches!(frame, GatewayFrame::Response(_)));
    }

    #[test]
    fn unit_event_frame_defaults_missing_payload_to_null() {
        let raw = json!({"type": "event", "event": "heartbeat"});
        let frame: GatewayFrame = serde_json::from_value(raw).expect("parse");
        let GatewayFrame::Event(event) = frame else {
            panic!("expected event frame");
        };
        assert!(event.payload.is_null());
    }

    #[test]
    fn unit_hello_frame_prefers_top_level_presence_over_snapshot() {
        let frame = HelloFrame {
            presence: Some(json!({"entries": []})),
            snapshot: Some(HelloSnapshot {
                presence: Some(json!({"entries": [1]})),
                health: None,
            }),
            ..Default::default()
        };
        assert_eq!(frame.presence_payload(), Some(&json!({"entries": []})));
    }

    #[test]
    fn unit_gateway_request_serializes_type_tag() {
        let request = GatewayRequest::new("req_1", "connect", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "req");
    }
}
