use thiserror::Error;

/// Top-level error kind shared across the bridge, matching the error
/// taxonomy components are expected to classify their failures into.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl BridgeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Fatal(_))
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_is_fatal_only_true_for_fatal_variant() {
        assert!(BridgeError::Fatal("boom".into()).is_fatal());
        assert!(!BridgeError::Validation("boom".into()).is_fatal());
    }
}
