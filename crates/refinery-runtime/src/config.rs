// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for refinery-runtime.

use std::env;
use std::path::PathBuf;

use crate::gateway::InvocationSource;

/// Registry location baked into function images.
pub const DEFAULT_FUNCTIONS_PATH: &str = "/var/runtime/functions.json";

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Host and port of the Lambda Runtime API
    pub runtime_api: String,
    /// Path of the function registry document (default: "/var/runtime/functions.json")
    pub functions_path: PathBuf,
    /// Function used when an event does not name one
    pub default_function: Option<String>,
    /// Shape of incoming events
    pub invocation_source: InvocationSource,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `AWS_LAMBDA_RUNTIME_API` - Runtime API address, set by the Lambda service
    ///
    /// # Optional Environment Variables
    /// - `REFINERY_FUNCTIONS_PATH` - Function registry document
    /// - `REFINERY_FUNCTION_NAME` - Default function name
    /// - `LAMBDA_CALLER` - `API_GATEWAY` for proxy events, anything else for direct events
    pub fn from_env() -> Result<Self, ConfigError> {
        let runtime_api = env::var("AWS_LAMBDA_RUNTIME_API")
            .map_err(|_| ConfigError::MissingEnvVar("AWS_LAMBDA_RUNTIME_API"))?;
        if runtime_api.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "AWS_LAMBDA_RUNTIME_API",
                reason: "must not be empty".to_string(),
            });
        }

        let functions_path = env::var("REFINERY_FUNCTIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_FUNCTIONS_PATH));

        let default_function = env::var("REFINERY_FUNCTION_NAME")
            .ok()
            .filter(|name| !name.is_empty());

        Ok(Self {
            runtime_api,
            functions_path,
            default_function,
            invocation_source: InvocationSource::from_env(),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// A variable is present but unusable.
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// What was wrong.
        reason: String,
    },
}
