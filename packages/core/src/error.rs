//! Hub Error Types
//!
//! This module defines the single error type shared by the card adapters, the
//! write orchestrator and the indexing pipeline. Every variant maps onto an
//! HTTP-style status so that callers at the edge can render it without
//! inspecting the message text.

use thiserror::Error;

/// Errors raised while translating, writing or indexing documents
#[derive(Error, Debug)]
pub enum HubError {
    /// Malformed document or schema violation, reported with a JSON pointer
    #[error("{detail}")]
    Validation {
        status: u16,
        title: String,
        detail: String,
        pointer: Option<String>,
    },

    /// No data source with a writer is bound to the requested type
    #[error("\"{type_name}\" is not a writable type")]
    NotWritable { type_name: String },

    /// Resource lookup failed
    #[error("Not found: {detail}")]
    NotFound { detail: String },

    /// Request envelope is unusable
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Optimistic concurrency or uniqueness conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Schema could not be assembled from its models
    #[error("Schema error: {0}")]
    Schema(String),

    /// Indexing pass misuse or failure
    #[error("Indexing error: {0}")]
    Indexing(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure reported by a storage or plugin collaborator
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Create a 400 validation error pointing at the offending member
    pub fn validation(detail: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self::Validation {
            status: 400,
            title: "Validation error".to_string(),
            detail: detail.into(),
            pointer: Some(pointer.into()),
        }
    }

    /// Create a 400 validation error without a source pointer
    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::Validation {
            status: 400,
            title: "Validation error".to_string(),
            detail: detail.into(),
            pointer: None,
        }
    }

    /// Create a not writable error
    pub fn not_writable(type_name: impl Into<String>) -> Self {
        Self::NotWritable {
            type_name: type_name.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound {
            detail: detail.into(),
        }
    }

    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create an indexing error
    pub fn indexing(msg: impl Into<String>) -> Self {
        Self::Indexing(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// HTTP-style status for this error
    pub fn status(&self) -> u16 {
        match self {
            HubError::Validation { status, .. } => *status,
            HubError::NotWritable { .. } => 403,
            HubError::NotFound { .. } => 404,
            HubError::BadRequest(_) => 400,
            HubError::Conflict(_) => 409,
            HubError::Schema(_)
            | HubError::Indexing(_)
            | HubError::Config(_)
            | HubError::Io(_)
            | HubError::Serialization(_)
            | HubError::Backend(_) => 500,
        }
    }

    /// Short human-readable title suitable for an error document
    pub fn title(&self) -> &str {
        match self {
            HubError::Validation { title, .. } => title,
            HubError::NotWritable { .. } => "Not a writable type",
            HubError::NotFound { .. } => "Not found",
            HubError::BadRequest(_) => "Bad request",
            HubError::Conflict(_) => "Conflict",
            _ => "Internal error",
        }
    }

    /// JSON pointer to the member that caused a validation failure
    pub fn pointer(&self) -> Option<&str> {
        match self {
            HubError::Validation { pointer, .. } => pointer.as_deref(),
            _ => None,
        }
    }

    /// Whether this error is a 404, which existence checks tolerate
    pub fn is_not_found(&self) -> bool {
        self.status() == 404
    }
}
