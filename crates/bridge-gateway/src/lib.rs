pub mod backoff;
pub mod client;
pub mod error;
pub mod pending;
pub mod presence;
pub mod protocol;
pub mod subscription;
pub mod transport;

pub use client::{GatewayClient, GatewayClientConfig, GatewayClientEvent};
pub use error::GatewayError;
pub use protocol::{
    EventFrame, GatewayFrame, GatewayRequest, HelloFeatures, HelloFrame, HelloSnapshot,
    ResponseErrorBody, ResponseFrame, PROTOCOL_VERSION,
};
pub use transport::{GatewayTransport, TransportMessage, WebSocketTransport};
