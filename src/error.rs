//! Error types for ConnSync
//!
//! This module defines all error types used throughout the crate. None of
//! these ever escape the background monitor: they are logged there and the
//! loop carries on. The CLI commands surface them to the user.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ConnSync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error while reading or writing a local file
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Network-level failure talking to a remote endpoint
    #[error("Connection error to '{endpoint}': {message}")]
    Connection { endpoint: String, message: String },

    /// Remote endpoint answered with a non-success status
    #[error("Request to '{endpoint}' failed with status {status}")]
    HttpStatus { endpoint: String, status: u16 },

    /// Websocket protocol or transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Malformed envelope or change payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Catalog lookup or binding failed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Catalog has no source with the given id or name
    #[error("Catalog source not found: {0}")]
    SourceNotFound(String),

    /// Workspace storage failed
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A change-event handler failed
    #[error("Handler failed for '{id}': {message}")]
    Handler { id: String, message: String },

    /// Operation cancelled by shutdown
    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a connection error
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a handler failure for the given event id
    pub fn handler(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Check if this error is transient (retrying may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Connection { .. }
                | Self::HttpStatus { .. }
                | Self::WebSocket(_)
                | Self::Catalog(_)
                | Self::Workspace(_)
                | Self::Handler { .. }
        )
    }

    /// Check if this error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::HttpStatus { .. } | Self::WebSocket(_)
        )
    }
}

/// Result type alias for ConnSync operations
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        match err.status() {
            Some(status) => SyncError::HttpStatus {
                endpoint,
                status: status.as_u16(),
            },
            None => SyncError::Connection {
                endpoint,
                message: err.to_string(),
            },
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::WebSocket(err.to_string())
    }
}
