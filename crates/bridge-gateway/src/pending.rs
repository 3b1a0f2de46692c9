use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{oneshot, Mutex};

use crate::error::GatewayError;

pub type PendingReply = Result<serde_json::Value, GatewayError>;

/// Table of in-flight requests, keyed by request id. Installing an entry
/// happens under one lock acquisition so the receive loop can never observe
/// a half-installed entry (see the design note on per-request timeouts).
#[derive(Default)]
pub struct PendingRequestTable {
    next_id: AtomicU64,
    entries: Mutex<HashMap<String, oneshot::Sender<PendingReply>>>,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn next_request_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req_{n}")
    }

    pub async fn install(&self, id: String) -> oneshot::Receiver<PendingReply> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().await.insert(id, tx);
        rx
    }

    pub async fn resolve(&self, id: &str, reply: PendingReply) {
        if let Some(sender) = self.entries.lock().await.remove(id) {
            let _ = sender.send(reply);
        }
    }

    pub async fn remove(&self, id: &str) {
        self.entries.lock().await.remove(id);
    }

    /// Rejects every outstanding request with a terminal transport error,
    /// used on transport close and on explicit `close()`.
    pub async fn reject_all(&self, message: &str) {
        let mut entries = self.entries.lock().await;
        for (_, sender) in entries.drain() {
            let _ = sender.send(Err(GatewayError::Transport(message.to_string())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unit_next_request_id_is_monotonic() {
        let table = PendingRequestTable::new();
        assert_eq!(table.next_request_id(), "req_1");
        assert_eq!(table.next_request_id(), "req_2");
    }

    #[tokio::test]
    async fn functional_resolve_delivers_reply_to_installed_receiver() {
        let table = PendingRequestTable::new();
        let rx = table.install("req_1".to_string()).await;
        table.resolve("req_1", Ok(serde_json::json!(42))).await;
        let reply = rx.await.expect("channel alive").expect("ok reply");
        assert_eq!(reply, serde_json::json!(42));
    }

    #[tokio::test]
    async fn functional_reject_all_rejects_every_pending_entry() {
        let table = PendingRequestTable::new();
        let rx_a = table.install("req_1".to_string()).await;
        let rx_b = table.install("req_2".to_string()).await;
        table.reject_all("connection closed").await;
        assert!(rx_a.await.expect("channel alive").is_err());
        assert!(rx_b.await.expect("channel alive").is_err());
    }
}
