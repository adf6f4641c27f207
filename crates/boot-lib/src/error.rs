//! Error types for container lifecycle management
//!
//! Engine failures are classified into an [`ErrorKind`] at the engine
//! boundary. Manager operations wrap them into a [`ManagerError`] that names
//! the container type and the operation that failed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The container or image does not exist
    NotFound,
    /// The request conflicts with current engine state (name in use, container running)
    Conflict,
    /// The container is already in the requested state
    NotModified,
    /// The operation did not complete in time
    Timeout,
    /// The engine or registry rejected our credentials
    Permission,
    /// The engine could not be reached
    Transport,
    /// The operation was cancelled by shutdown
    Interrupted,
    /// Anything the engine reported that fits none of the above
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotModified => "not modified",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Permission => "permission denied",
            ErrorKind::Transport => "transport error",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Other => "engine error",
        };
        f.write_str(s)
    }
}

/// Failure reported by a [`ContainerEngine`](crate::engine::ContainerEngine)
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn interrupted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Interrupted, message)
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Manager operations that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateAndStart,
    Stop,
    Remove,
}

impl Operation {
    /// Label used for metrics and structured logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateAndStart => "create_and_start",
            Operation::Stop => "stop",
            Operation::Remove => "remove",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::CreateAndStart => "start",
            Operation::Stop => "stop",
            Operation::Remove => "remove",
        };
        f.write_str(s)
    }
}

/// A failed manager operation, wrapping the engine failure that caused it
#[derive(Debug, Error)]
#[error("cannot {operation} {container_type} container")]
pub struct ManagerError {
    /// Key of the container definition
    pub container_type: String,
    pub operation: Operation,
    #[source]
    pub source: EngineError,
}

impl ManagerError {
    pub fn new(container_type: impl Into<String>, operation: Operation, source: EngineError) -> Self {
        Self {
            container_type: container_type.into(),
            operation,
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Invalid container configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("container '{key}' is missing required setting '{field}'")]
    MissingField { key: String, field: &'static str },

    #[error("container name '{name}' is used by both '{first}' and '{second}'")]
    DuplicateContainerName {
        name: String,
        first: String,
        second: String,
    },

    #[error("unsupported docker host '{0}'")]
    InvalidHost(String),

    #[error("tls-verify is enabled but no cert-path is configured")]
    MissingCertPath,
}
