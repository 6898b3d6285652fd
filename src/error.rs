use std::time::Duration;

use thiserror::Error;
use warp::http::StatusCode;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Content-Type: {0:?} should be \"application/json\"")]
    ContentType(String),

    #[error("admission request body is empty")]
    EmptyBody,

    #[error("failed to parse admission request: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("admission request is empty")]
    MissingRequest,

    #[error("could not parse {role}namespace: {source}")]
    Namespace {
        /// Empty for the new object, `"old "` for the previous one.
        role: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not get in-cluster config: {0}")]
    ClusterConfig(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),
}

/// Short alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn cluster_config(msg: impl Into<String>) -> Self {
        Self::ClusterConfig(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// HTTP status the webhook answers with when this error aborts a request.
    ///
    /// Only request-malformed and cluster-config errors ever reach the HTTP
    /// layer; backend errors are absorbed by the orchestrator.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ContentType(_)
            | Self::EmptyBody
            | Self::Envelope(_)
            | Self::MissingRequest
            | Self::Namespace { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
