use thiserror::Error;

/// Errors raised while encoding or decoding hub protocol records.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record is missing the message type")]
    MissingType,

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Invocation {target} is missing argument {index}")]
    MissingArgument { target: String, index: usize },
}
