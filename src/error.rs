use thiserror::Error;

/// Errors that can occur during channel RPC operations
#[derive(Error, Debug)]
pub enum RpcError {
    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The remote responder replied with an error message
    #[error("Error in method {method}: {message}")]
    Remote {
        /// Method name of the failed call
        method: String,
        /// Remote error message, or `"Unknown error"` when the reply carried none
        message: String,
        /// Remote stack trace, when the responder supplied one
        stack: Option<String>,
    },

    /// Transport failure (closed node, dropped reply slot, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// No listener exists for the requested destination
    #[error("no receiver for destination: {0}")]
    NoReceiver(String),

    /// Required configuration missing
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// Conflicting configuration options
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),
}

impl RpcError {
    /// Stack trace carried by a [`RpcError::Remote`] error.
    pub fn remote_stack(&self) -> Option<&str> {
        match self {
            RpcError::Remote { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for channel RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
