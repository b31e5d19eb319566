//! Error types for the engine command protocol

/// Errors surfaced by the command correlator
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),

    /// The engine answered with `success: false`; its message is forwarded
    /// verbatim and never swallowed
    #[error("Engine reported failure: {message}")]
    Engine { message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Connection to engine closed")]
    ConnectionClosed,

    #[error("Missing body in successful response")]
    MissingBody,
}

impl EngineError {
    /// Create an engine-reported failure with context
    pub fn engine_failure(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}
