//! Error types for kubegather

use thiserror::Error;

/// Main error type for kubegather
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Cannot get namespace {namespace:?}: {source}")]
    Namespace {
        namespace: String,
        source: kube::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue is closed")]
    ClosedQueue,

    #[error("Failed to gather (gather: {gather}, inspect: {inspect})")]
    Gather { gather: String, inspect: String },

    #[error("Remote execution error: {0}")]
    Remote(String),

    #[error("Timeout waiting for {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_yaml::Error> for GatherError {
    fn from(e: serde_yaml::Error) -> Self {
        GatherError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for GatherError {
    fn from(e: serde_json::Error) -> Self {
        GatherError::Serialization(e.to_string())
    }
}

/// Returns true if the error is a NotFound API response.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

/// Returns true if the error signals an expired list continuation. The server
/// invalidated its list snapshot and a fresh unpaginated list is required.
pub fn is_resource_expired(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 410)
}

/// Result type alias for kubegather
pub type Result<T> = std::result::Result<T, GatherError>;
