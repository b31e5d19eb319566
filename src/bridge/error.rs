//! Bridge-level error taxonomy
//!
//! Four caller-visible classes: connection loss (fatal until the owner
//! restarts the bridge), protocol faults (logged, request rejected, bridge
//! keeps running), invalid-state misuse (synchronous rejection), and
//! engine-reported analysis failures (forwarded verbatim).

use crate::engine::EngineError;
use tower_lsp::jsonrpc;

/// Errors surfaced by the session, diagnostics, and translation layers
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The engine process is unreachable or has exited
    #[error("Engine connection error: {0}")]
    Connection(String),

    /// A message could not be correlated or was malformed
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The caller violated the open-before-use contract
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Domain-specific failure reported by the engine
    #[error("Analysis failure: {0}")]
    Analysis(String),

    /// The engine did not answer within the allowed window
    #[error("Request timed out")]
    Timeout,
}

impl BridgeError {
    /// Create an invalid-state error with context
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState(reason.into())
    }

    /// Create a protocol error with context
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }
}

impl From<EngineError> for BridgeError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::ConnectionClosed => {
                BridgeError::Connection("engine connection closed".to_string())
            }
            EngineError::Transport(message) => BridgeError::Connection(message),
            EngineError::Engine { message } => BridgeError::Analysis(message),
            EngineError::Timeout => BridgeError::Timeout,
            EngineError::Serialization(e) | EngineError::Deserialization(e) => {
                BridgeError::Protocol(e.to_string())
            }
            EngineError::MissingBody => {
                BridgeError::Protocol("missing body in successful response".to_string())
            }
        }
    }
}

impl From<BridgeError> for jsonrpc::Error {
    fn from(error: BridgeError) -> Self {
        let code = match &error {
            BridgeError::InvalidState(_) => jsonrpc::ErrorCode::InvalidRequest,
            BridgeError::Protocol(_) => jsonrpc::ErrorCode::ParseError,
            _ => jsonrpc::ErrorCode::InternalError,
        };
        jsonrpc::Error {
            code,
            message: error.to_string().into(),
            data: None,
        }
    }
}
