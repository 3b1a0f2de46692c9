use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_core::now_iso8601;
use bridge_core::model::{GatewayConnectionState, GatewayReadyState, PresenceSnapshot};
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::backoff::{reconnect_attempts_exhausted, reconnect_delay_ms};
use crate::error::GatewayError;
use crate::pending::PendingRequestTable;
use crate::presence::parse_presence_payload;
use crate::protocol::{EventFrame, GatewayFrame, GatewayRequest, HelloFrame};
use crate::transport::{GatewayTransport, TransportMessage, WebSocketTransport};

const CHALLENGE_WAIT_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    pub url: String,
    pub token: String,
    pub client_id: String,
    pub client_version: String,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
    pub request_timeout_ms: u64,
}

/// Events the gateway client fans out to observers, in place of the
/// upstream implementation's dynamic named-callback registry.
#[derive(Debug, Clone)]
pub enum GatewayClientEvent {
    Connected(Box<HelloFrame>),
    Hello(Box<HelloFrame>),
    Event(Box<EventFrame>),
    Presence(Box<PresenceSnapshot>),
    Challenge(String),
    Disconnected,
    Error(String),
    Fatal(String),
}

type TransportFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Box<dyn GatewayTransport>, GatewayError>> + Send + Sync>;

pub struct GatewayClient {
    config: GatewayClientConfig,
    state: Arc<Mutex<GatewayConnectionState>>,
    pending: Arc<PendingRequestTable>,
    events_tx: broadcast::Sender<GatewayClientEvent>,
    writer: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    allow_reconnect: Arc<AtomicBool>,
}

impl GatewayClient {
    pub fn new(config: GatewayClientConfig) -> (Self, broadcast::Receiver<GatewayClientEvent>) {
        let (events_tx, events_rx) = broadcast::channel(256);
        let client = Self {
            config,
            state: Arc::new(Mutex::new(GatewayConnectionState::default())),
            pending: Arc::new(PendingRequestTable::new()),
            events_tx,
            writer: Arc::new(Mutex::new(None)),
            allow_reconnect: Arc::new(AtomicBool::new(true)),
        };
        (client, events_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayClientEvent> {
        self.events_tx.subscribe()
    }

    pub async fn connection_state(&self) -> GatewayConnectionState {
        self.state.lock().await.clone()
    }

    /// Starts the reconnect-driven connection loop using a real WebSocket
    /// transport, returning the background task handle.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let url = self.config.url.clone();
        let factory: TransportFactory = Arc::new(move || {
            let url = url.clone();
            Box::pin(async move {
                WebSocketTransport::connect(&url)
                    .await
                    .map(|t| Box::new(t) as Box<dyn GatewayTransport>)
            })
        });
        self.start_with_factory(factory)
    }

    /// Starts the connection loop against a caller-supplied transport
    /// factory, used in tests to inject a fake transport.
    pub fn start_with_factory(&self, factory: TransportFactory) -> tokio::task::JoinHandle<()> {
        let config = self.config.clone();
        let state = Arc::clone(&self.state);
        let pending = Arc::clone(&self.pending);
        let events_tx = self.events_tx.clone();
        let writer = Arc::clone(&self.writer);
        let allow_reconnect = Arc::clone(&self.allow_reconnect);

        tokio::spawn(async move {
            let mut attempts: u32 = 0;
            loop {
                if !allow_reconnect.load(Ordering::SeqCst) {
                    set_ready_state(&state, GatewayReadyState::Closed, false).await;
                    break;
                }

                match run_connection(&config, &factory, &pending, &events_tx, &state, &writer).await
                {
                    Ok(()) => {
                        debug!("gateway connection ended cleanly");
                    }
                    Err(err) => {
                        warn!(error = %err, "gateway connection attempt failed");
                        state.lock().await.last_error = Some(err.to_string());
                        let _ = events_tx.send(GatewayClientEvent::Error(err.to_string()));
                    }
                }

                pending.reject_all("connection closed").await;
                *writer.lock().await = None;
                let _ = events_tx.send(GatewayClientEvent::Disconnected);

                if !allow_reconnect.load(Ordering::SeqCst) {
                    set_ready_state(&state, GatewayReadyState::Closed, false).await;
                    break;
                }

                attempts += 1;
                if reconnect_attempts_exhausted(config.max_reconnect_attempts, attempts) {
                    error!("gateway max reconnect attempts exceeded");
                    let _ = events_tx.send(GatewayClientEvent::Fatal(
                        "max reconnect attempts exceeded".to_string(),
                    ));
                    set_ready_state(&state, GatewayReadyState::Closed, false).await;
                    break;
                }

                set_ready_state(&state, GatewayReadyState::Reconnecting, false).await;
                {
                    let mut guard = state.lock().await;
                    guard.reconnecting = true;
                    guard.reconnect_attempts = attempts;
                }
                let delay = reconnect_delay_ms(config.reconnect_interval_ms, attempts);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        })
    }

    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, GatewayError> {
        let writer = self.writer.lock().await.clone();
        let Some(writer) = writer else {
            return Err(GatewayError::NotConnected);
        };

        let id = self.pending.next_request_id();
        let rx = self.pending.install(id.clone()).await;
        let frame = GatewayRequest::new(id.clone(), method, params);
        let text = serde_json::to_string(&frame)
            .map_err(|err| GatewayError::Transport(err.to_string()))?;

        if writer.send(text).is_err() {
            self.pending.remove(&id).await;
            return Err(GatewayError::NotConnected);
        }

        match tokio::time::timeout(
            Duration::from_millis(self.config.request_timeout_ms),
            rx,
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(GatewayError::Transport("connection closed".to_string())),
            Err(_) => {
                self.pending.remove(&id).await;
                Err(GatewayError::Timeout(method.to_string()))
            }
        }
    }

    pub async fn send(&self, session_key: &str, message: Value) -> Result<Value, GatewayError> {
        self.request(
            "send",
            Some(json!({"sessionKey": session_key, "message": message})),
        )
        .await
    }

    pub async fn health_check(&self) -> Result<Value, GatewayError> {
        self.request("health", None).await
    }

    pub async fn close(&self) {
        self.allow_reconnect.store(false, Ordering::SeqCst);
        if let Some(writer) = self.writer.lock().await.take() {
            drop(writer);
        }
        self.pending.reject_all("connection closed").await;
        set_ready_state(&self.state, GatewayReadyState::Closed, false).await;
    }
}

async fn set_ready_state(
    state: &Arc<Mutex<GatewayConnectionState>>,
    ready_state: GatewayReadyState,
    connected: bool,
) {
    let mut guard = state.lock().await;
    guard.ready_state = ready_state;
    guard.connected = connected;
}

async fn run_connection(
    config: &GatewayClientConfig,
    factory: &TransportFactory,
    pending: &Arc<PendingRequestTable>,
    events_tx: &broadcast::Sender<GatewayClientEvent>,
    state: &Arc<Mutex<GatewayConnectionState>>,
    writer_slot: &Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
) -> Result<(), GatewayError> {
    set_ready_state(state, GatewayReadyState::Opening, false).await;
    let mut transport = (factory.as_ref())().await?;

    set_ready_state(state, GatewayReadyState::Authenticating, false).await;
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();
    *writer_slot.lock().await = Some(writer_tx);

    // Give the server up to CHALLENGE_WAIT_MS to push a connect.challenge
    // event before we send the connect request; either outcome proceeds.
    let challenge_deadline = tokio::time::sleep(Duration::from_millis(CHALLENGE_WAIT_MS));
    tokio::pin!(challenge_deadline);
    let nonce = tokio::select! {
        frame = transport.recv() => {
            match frame? {
                TransportMessage::Text(text) => {
                    if let Some(nonce) = try_capture_challenge(&text, events_tx) {
                        Some(nonce)
                    } else {
                        dispatch_frame(&text, pending, events_tx);
                        None
                    }
                }
                TransportMessage::Closed => return Ok(()),
            }
        }
        _ = &mut challenge_deadline => None,
    };
    let _ = nonce;

    let connect_id = pending.next_request_id();
    let connect_rx = pending.install(connect_id.clone()).await;
    let connect_params = json!({
        "minProtocol": crate::protocol::PROTOCOL_VERSION,
        "maxProtocol": crate::protocol::PROTOCOL_VERSION,
        "client": {
            "id": config.client_id,
            "version": config.client_version,
            "platform": "bridge",
            "mode": "operator",
        },
        "role": "operator",
        "scopes": ["operator.read"],
        "auth": {"token": config.token},
    });
    let connect_frame = GatewayRequest::new(connect_id.clone(), "connect", Some(connect_params));
    let connect_text = serde_json::to_string(&connect_frame)
        .map_err(|err| GatewayError::Transport(err.to_string()))?;
    transport.send_text(connect_text).await?;

    let hello = authenticate(&mut transport, pending, events_tx, connect_id, connect_rx).await?;
    let Some(hello) = hello else {
        return Ok(());
    };

    {
        let mut guard = state.lock().await;
        guard.connected = true;
        guard.ready_state = GatewayReadyState::Connected;
        guard.reconnecting = false;
        guard.reconnect_attempts = 0;
        guard.last_connected_at = Some(now_iso8601());
    }
    info!("gateway connected");
    let _ = events_tx.send(GatewayClientEvent::Connected(Box::new(hello.clone())));
    if let Some(presence_payload) = hello.presence_payload() {
        if let Some(snapshot) = parse_presence_payload(presence_payload) {
            let _ = events_tx.send(GatewayClientEvent::Presence(Box::new(snapshot)));
        }
    }

    let mut disconnect_error = None;
    loop {
        tokio::select! {
            frame = transport.recv() => {
                match frame? {
                    TransportMessage::Text(text) => dispatch_frame(&text, pending, events_tx),
                    TransportMessage::Closed => break,
                }
            }
            outbound = writer_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if let Err(err) = transport.send_text(text).await {
                            warn!(error = %err, "gateway write failed");
                            disconnect_error = Some(err.to_string());
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    {
        let mut guard = state.lock().await;
        guard.connected = false;
        guard.last_disconnected_at = Some(now_iso8601());
        if disconnect_error.is_some() {
            guard.last_error = disconnect_error;
        }
    }
    transport.close().await;
    Ok(())
}

/// Reads frames until either the `connect` response or a `hello-ok` frame
/// arrives, whichever comes first, per the protocol's two alternative
/// handshake shapes.
async fn authenticate(
    transport: &mut Box<dyn GatewayTransport>,
    pending: &Arc<PendingRequestTable>,
    events_tx: &broadcast::Sender<GatewayClientEvent>,
    connect_id: String,
    connect_rx: tokio::sync::oneshot::Receiver<crate::pending::PendingReply>,
) -> Result<Option<HelloFrame>, GatewayError> {
    tokio::pin!(connect_rx);
    loop {
        tokio::select! {
            reply = &mut connect_rx => {
                return match reply {
                    Ok(Ok(value)) => Ok(Some(extract_hello(&value))),
                    Ok(Err(err)) => Err(err),
                    Err(_) => Ok(None),
                };
            }
            frame = transport.recv() => {
                match frame? {
                    TransportMessage::Text(text) => {
                        if let Some(hello) = try_extract_hello_ok(&text) {
                            pending.remove(&connect_id).await;
                            return Ok(Some(hello));
                        }
                        if try_capture_challenge(&text, events_tx).is_none() {
                            dispatch_frame(&text, pending, events_tx);
                        }
                    }
                    TransportMessage::Closed => return Ok(None),
                }
            }
        }
    }
}

fn extract_hello(value: &Value) -> HelloFrame {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

fn try_extract_hello_ok(text: &str) -> Option<HelloFrame> {
    match serde_json::from_str::<GatewayFrame>(text).ok()? {
        GatewayFrame::HelloOk(hello) => Some(hello),
        _ => None,
    }
}

fn try_capture_challenge(
    text: &str,
    events_tx: &broadcast::Sender<GatewayClientEvent>,
) -> Option<String> {
    let frame = serde_json::from_str::<GatewayFrame>(text).ok()?;
    let GatewayFrame::Event(event) = frame else {
        return None;
    };
    if event.event != "connect.challenge" {
        return None;
    }
    let nonce = event.payload.get("nonce")?.as_str()?.to_string();
    let _ = events_tx.send(GatewayClientEvent::Challenge(nonce.clone()));
    Some(nonce)
}

fn dispatch_frame(
    text: &str,
    pending: &Arc<PendingRequestTable>,
    events_tx: &broadcast::Sender<GatewayClientEvent>,
) {
    let frame = match serde_json::from_str::<GatewayFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            let _ = events_tx.send(GatewayClientEvent::Error(format!("invalid frame: {err}")));
            return;
        }
    };

    match frame {
        GatewayFrame::Response(response) => {
            let pending = Arc::clone(pending);
            let id = response.id.clone();
            let reply = if response.ok {
                Ok(response.result.or(response.payload).unwrap_or(Value::Null))
            } else {
                let message = response
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "Gateway error".to_string());
                Err(GatewayError::Remote(message))
            };
            tokio::spawn(async move {
                pending.resolve(&id, reply).await;
            });
        }
        GatewayFrame::Event(event) => {
            if event.event == "presence" {
                if let Some(snapshot) = parse_presence_payload(&event.payload) {
                    let _ = events_tx.send(GatewayClientEvent::Presence(Box::new(snapshot)));
                }
            }
            let _ = events_tx.send(GatewayClientEvent::Event(Box::new(event)));
        }
        GatewayFrame::HelloOk(hello) => {
            let _ = events_tx.send(GatewayClientEvent::Hello(Box::new(hello)));
        }
    }
}
