// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that fail an invocation or runtime startup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// No registry entry for the requested name.
    #[error("unable to find function with name: {0}")]
    FunctionNotFound(String),

    /// The registry document could not be read.
    #[error("failed to read function registry {}: {source}", path.display())]
    RegistryRead {
        /// Registry path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The registry document is not valid.
    #[error("failed to parse function registry {}: {source}", path.display())]
    RegistryParse {
        /// Registry path
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// The handler exited without printing framed output.
    #[error("unable to find output from handler")]
    NoOutputFound {
        /// Captured stderr of the handler
        stderr: String,
    },

    /// The handler reported an error through its framed output.
    #[error("{0}")]
    Handler(String),

    /// The handler process could not be started.
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        /// Command that was run
        command: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The handler outlived the invocation deadline and was killed.
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An incoming event could not be unwrapped.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The Lambda Runtime API could not be reached or rejected a request.
    #[error("runtime API error: {0}")]
    RuntimeApi(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RuntimeError {
    /// Stable error type reported to the Lambda service.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::FunctionNotFound(_) => "Runtime.FunctionNotFound",
            Self::RegistryRead { .. } | Self::RegistryParse { .. } => "Runtime.RegistryLoad",
            Self::NoOutputFound { .. } => "Runtime.NoOutputFound",
            Self::Handler(_) => "Handler.Error",
            Self::Spawn { .. } => "Runtime.Spawn",
            Self::Timeout(_) => "Runtime.Timeout",
            Self::Io(_) => "Runtime.Io",
            Self::Json(_) => "Runtime.InvalidJson",
            Self::InvalidEvent(_) => "Runtime.InvalidEvent",
            Self::RuntimeApi(_) => "Runtime.Api",
            Self::Config(_) => "Runtime.Config",
        }
    }
}
