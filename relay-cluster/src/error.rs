//! Error types for relay cluster operations

use thiserror::Error;

/// Result type alias for relay cluster operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay cluster error types
#[derive(Error, Debug)]
pub enum RelayError {
    /// Region identifier outside the known catalog
    #[error("Invalid region: {0}")]
    RegionNotFound(String),

    /// Named region group that does not exist
    #[error("Unknown region group: {0}")]
    UnknownRegionGroup(String),

    /// Selection was requested while no node is online
    #[error("No nodes available")]
    NoNodesAvailable,

    /// Session requested on a node that is not ready
    #[error("Node {0} is offline")]
    NodeOffline(String),

    /// Session (player) operation failed
    #[error("Session error: {0}")]
    Session(String),

    /// Voice bridge operation failed
    #[error("Voice bridge error: {0}")]
    Voice(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error returned by a node hook.
///
/// Hook failures never propagate past the dispatcher; they are only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<RelayError> for HookError {
    fn from(err: RelayError) -> Self {
        Self(err.to_string())
    }
}
