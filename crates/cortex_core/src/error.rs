//! Error taxonomy for the cycle subsystem.
//!
//! Only [`CortexError::Boundary`] ever reaches the orchestrator as a failure.
//! Network and parse errors are absorbed inside the agent client, which
//! answers with the role's default value instead.

use thiserror::Error;

/// Failures raised by a reservoir engine through the boundary operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReservoirError {
    #[error("reservoir used before initialize")]
    NotInitialized,

    #[error("reservoir initialize({neuron_count}, {fanout}) returned false")]
    InitFailed { neuron_count: i32, fanout: i32 },

    #[error("reservoir {operation} failed: {message}")]
    Engine {
        operation: &'static str,
        message: String,
    },
}

impl ReservoirError {
    pub fn engine(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Engine {
            operation,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CortexError {
    /// Missing credential or agent id. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport, HTTP status or timeout failure of an agent tier.
    #[error("network error: {0}")]
    Network(String),

    /// No JSON object could be located in a tier's response text.
    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Boundary(#[from] ReservoirError),
}

impl From<reqwest::Error> for CortexError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CortexError::Network(format!("request timed out: {e}"))
        } else if e.is_decode() {
            CortexError::Parse(format!("response body is not JSON: {e}"))
        } else {
            CortexError::Network(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, CortexError>;
