//! Session error types

use thiserror::Error;

use crate::engine::EngineError;

/// Unified error type for every session, channel, and sftp operation.
///
/// Callers must treat `WouldBlock` as retryable: it means "no data right
/// now", not failure. Everything else is a real fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Operation attempted on a closed or never-activated handle.
    #[error("Handle is not active")]
    NotActive,

    /// No data available yet; retry after more bytes arrive.
    #[error("Operation would block")]
    WouldBlock,

    /// Engine-reported failure, code passed through verbatim.
    #[error("SSH protocol error: {0}")]
    Protocol(i32),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Transport could not be prepared (bad endpoint parameters).
    #[error("Transport setup failed: {0}")]
    TransportFailed(String),

    /// Protocol engine refused to initialize.
    #[error("Engine initialization failed: {0}")]
    EngineInit(String),

    /// Operation not valid in the session's current state.
    #[error("Operation '{op}' invalid in state {state}")]
    InvalidState { op: &'static str, state: String },
}

impl Error {
    /// True for the one retryable variant.
    pub fn is_would_block(&self) -> bool {
        matches!(self, Error::WouldBlock)
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::WouldBlock => Error::WouldBlock,
            EngineError::Code(code) => Error::Protocol(code),
        }
    }
}

// Host frontends report errors as strings over their IPC boundary.
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_the_only_retryable_variant() {
        assert!(Error::WouldBlock.is_would_block());
        assert!(!Error::NotActive.is_would_block());
        assert!(!Error::Protocol(-7).is_would_block());
    }

    #[test]
    fn engine_codes_pass_through_verbatim() {
        assert_eq!(Error::from(EngineError::Code(-43)), Error::Protocol(-43));
        assert_eq!(Error::from(EngineError::WouldBlock), Error::WouldBlock);
    }
}
