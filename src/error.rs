//! Error types for djinn

use thiserror::Error;

/// Result type alias for djinn operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in djinn
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Plugin {name} failed to initialize: {reason}")]
    Plugin { name: String, reason: String },

    #[error("Service {name} failed to initialize: {reason}")]
    Service { name: String, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Agent not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Wrap a failure with the name of the plugin it came from.
    pub fn plugin(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Plugin {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a failure with the name of the service it came from.
    pub fn service(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Service {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
