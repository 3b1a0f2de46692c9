use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("gateway request timeout: {0}")]
    Timeout(String),

    #[error("gateway error: {0}")]
    Remote(String),

    #[error("max reconnect attempts exceeded")]
    Fatal,
}
