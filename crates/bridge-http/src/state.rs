use std::sync::Arc;

use bridge_gateway::GatewayClient;
use bridge_presence::PresenceTracker;
use bridge_store::StateStoreClient;
use tokio::sync::Mutex;

/// Shared state for the control plane and health endpoint routers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayClient>,
    pub store: Arc<StateStoreClient>,
    pub presence: Arc<Mutex<PresenceTracker>>,
    pub control_secret: Option<String>,
    pub control_max_body_bytes: usize,
}
