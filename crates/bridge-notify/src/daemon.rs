use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_core::model::PresenceSnapshot;
use bridge_core::{current_unix_timestamp_ms, now_iso8601};
use bridge_gateway::{presence::parse_presence_payload, GatewayClient, GatewayClientEvent};
use bridge_presence::{agent_id_from_session_key, normalize_agent_id};
use bridge_store::{StateStoreClient, StateStoreError};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub poll_interval_ms: u64,
    pub poll_batch_size: usize,
    pub retry_backoff_ms: u64,
    pub agent_id_aliases: HashMap<String, String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            poll_batch_size: 25,
            retry_backoff_ms: 5_000,
            agent_id_aliases: HashMap::new(),
        }
    }
}

/// Independent notification delivery loop sharing a gateway client with the
/// orchestrator. Maintains its own `sessionsByAgent` map derived from
/// presence, separate from `bridge-presence`'s tracker.
pub struct NotifyDaemon {
    gateway: Arc<GatewayClient>,
    store: Arc<StateStoreClient>,
    config: NotifyConfig,
    sessions_by_agent: Arc<Mutex<HashMap<String, String>>>,
    polling: Arc<AtomicBool>,
}

impl NotifyDaemon {
    pub fn new(gateway: Arc<GatewayClient>, store: Arc<StateStoreClient>, config: NotifyConfig) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            store,
            config,
            sessions_by_agent: Arc::new(Mutex::new(HashMap::new())),
            polling: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Spawns the presence-observer task and the poll-timer task.
    pub fn start(self: &Arc<Self>) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
        (self.clone().spawn_event_observer(), self.clone().spawn_poll_timer())
    }

    fn spawn_event_observer(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut events = self.gateway.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(GatewayClientEvent::Connected(_)) => self.on_connected().await,
                    Ok(GatewayClientEvent::Presence(snapshot)) => self.apply_presence(&snapshot).await,
                    Ok(GatewayClientEvent::Disconnected) => {
                        self.sessions_by_agent.lock().await.clear();
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_poll_timer(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
            loop {
                ticker.tick().await;
                self.poll_once().await;
            }
        })
    }

    async fn on_connected(&self) {
        if let Err(err) = self
            .gateway
            .request("subscribe", Some(json!({"events": ["presence"]})))
            .await
        {
            warn!(error = %err, "notification daemon failed to subscribe to presence");
        }
        match self.gateway.request("system-presence", None).await {
            Ok(value) => self.seed_sessions(&value).await,
            Err(err) => warn!(error = %err, "notification daemon failed to seed system-presence"),
        }
    }

    async fn seed_sessions(&self, value: &Value) {
        if let Some(snapshot) = parse_presence_payload(value) {
            self.apply_presence(&snapshot).await;
        }
    }

    async fn apply_presence(&self, snapshot: &PresenceSnapshot) {
        let mut guard = self.sessions_by_agent.lock().await;
        guard.clear();
        for entry in &snapshot.entries {
            let Some(session_key) = entry.session_key.clone() else {
                continue;
            };
            let raw_id = agent_id_from_session_key(&session_key)
                .or_else(|| entry.agent_id.clone())
                .unwrap_or_else(|| entry.device_id.clone());
            let agent_id = normalize_agent_id(&raw_id, &self.config.agent_id_aliases);
            guard.insert(agent_id, session_key);
        }
    }

    /// Runs one poll cycle unless another is already in flight.
    pub async fn poll_once(&self) {
        if self.polling.swap(true, Ordering::SeqCst) {
            return;
        }
        let result = self.poll_inner().await;
        self.polling.store(false, Ordering::SeqCst);
        if let Err(err) = result {
            warn!(error = %err, "notification poll failed");
        }
    }

    async fn poll_inner(&self) -> Result<(), StateStoreError> {
        let pending = self
            .store
            .list_pending_notifications(self.config.poll_batch_size, "agent")
            .await?;
        if pending.is_empty() {
            return Ok(());
        }

        let now = current_unix_timestamp_ms();
        for notification in pending {
            if let Some(last_attempt) = notification.last_attempt_at {
                if now.saturating_sub(last_attempt) < self.config.retry_backoff_ms {
                    continue;
                }
            }

            let normalized = normalize_agent_id(&notification.recipient_id, &self.config.agent_id_aliases);
            let session_key = self.sessions_by_agent.lock().await.get(&normalized).cloned();
            let Some(session_key) = session_key else {
                continue;
            };

            match self.gateway.send(&session_key, notification.message.clone()).await {
                Ok(_) => {
                    info!(notification_id = %notification.id, "notification delivered");
                    if let Err(err) = self
                        .store
                        .mark_notification_delivered(&notification.id, Some(&now_iso8601()))
                        .await
                    {
                        warn!(error = %err, notification_id = %notification.id, "failed to mark notification delivered");
                    }
                }
                Err(err) => {
                    if let Err(store_err) = self
                        .store
                        .record_notification_attempt(&notification.id, Some(&err.to_string()))
                        .await
                    {
                        warn!(error = %store_err, notification_id = %notification.id, "failed to record notification attempt");
                    }
                }
            }
        }
        Ok(())
    }
}
