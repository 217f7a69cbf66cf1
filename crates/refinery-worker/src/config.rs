// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for refinery-worker.

use std::env;
use std::time::Duration;

/// Default region for tenant clients.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Role created in every tenant account during onboarding.
pub const DEFAULT_IAM_ROLE_NAME: &str = "DO_NOT_DELETE_REFINERY_SYSTEM_ACCOUNT";

/// STS accepts session durations between 15 minutes and 12 hours.
const MIN_SESSION_SECS: u64 = 900;
const MAX_SESSION_SECS: u64 = 43_200;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Region every tenant client is bound to (default: "us-west-2")
    pub region: String,
    /// Role assumed inside each tenant account
    pub iam_role_name: String,
    /// Lifetime requested for delegated sessions (default: 3600s)
    pub session_duration: Duration,
    /// Subtracted from `session_duration` to get the client TTL (default: 600s)
    pub cache_safety_margin: Duration,
    /// Cache function clients too, instead of assuming fresh credentials per call (default: false)
    pub cache_function_clients: bool,
    /// Timeout applied to every outbound cloud request (default: 60s)
    pub request_timeout: Duration,
}

impl WorkerConfig {
    /// Create a configuration with default durations.
    pub fn new(region: impl Into<String>, iam_role_name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            iam_role_name: iam_role_name.into(),
            session_duration: Duration::from_secs(3600),
            cache_safety_margin: Duration::from_secs(600),
            cache_function_clients: false,
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `REFINERY_AWS_REGION` - Region (falls back to `AWS_REGION`, then "us-west-2")
    /// - `REFINERY_IAM_ROLE_NAME` - Tenant role name
    /// - `REFINERY_SESSION_DURATION_SECS` - Delegated session lifetime (900..=43200)
    /// - `REFINERY_CACHE_SAFETY_MARGIN_SECS` - Margin below the session lifetime
    /// - `REFINERY_CACHE_FUNCTION_CLIENTS` - Cache function clients (default: false)
    /// - `REFINERY_REQUEST_TIMEOUT_SECS` - Outbound request timeout
    pub fn from_env() -> Result<Self, ConfigError> {
        let region = env::var("REFINERY_AWS_REGION")
            .or_else(|_| env::var("AWS_REGION"))
            .unwrap_or_else(|_| DEFAULT_REGION.to_string());

        let iam_role_name = env::var("REFINERY_IAM_ROLE_NAME")
            .unwrap_or_else(|_| DEFAULT_IAM_ROLE_NAME.to_string());

        let mut config = Self::new(region, iam_role_name);

        if let Some(secs) = parse_secs("REFINERY_SESSION_DURATION_SECS")? {
            config.session_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs("REFINERY_CACHE_SAFETY_MARGIN_SECS")? {
            config.cache_safety_margin = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs("REFINERY_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.cache_function_clients = env::var("REFINERY_CACHE_FUNCTION_CLIENTS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        config.validate()?;
        Ok(config)
    }

    /// Set the delegated session lifetime.
    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    /// Set the safety margin subtracted from the session lifetime.
    pub fn with_cache_safety_margin(mut self, margin: Duration) -> Self {
        self.cache_safety_margin = margin;
        self
    }

    /// Enable or disable caching of function clients.
    pub fn with_cache_function_clients(mut self, enabled: bool) -> Self {
        self.cache_function_clients = enabled;
        self
    }

    /// Check the session window is accepted by STS and leaves a positive TTL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secs = self.session_duration.as_secs();
        if !(MIN_SESSION_SECS..=MAX_SESSION_SECS).contains(&secs) {
            return Err(ConfigError::InvalidValue {
                name: "REFINERY_SESSION_DURATION_SECS",
                reason: format!("{secs} is outside {MIN_SESSION_SECS}..={MAX_SESSION_SECS}"),
            });
        }
        if self.cache_safety_margin >= self.session_duration {
            return Err(ConfigError::InvalidValue {
                name: "REFINERY_CACHE_SAFETY_MARGIN_SECS",
                reason: "margin must be shorter than the session duration".to_string(),
            });
        }
        Ok(())
    }

    /// How long a cached client stays usable.
    pub fn client_ttl(&self) -> Duration {
        self.session_duration.saturating_sub(self.cache_safety_margin)
    }
}

fn parse_secs(name: &'static str) -> Result<Option<u64>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name,
                reason: format!("expected seconds, got {raw:?}"),
            }),
        Err(_) => Ok(None),
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
        /// Why it was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttl_is_fifty_minutes() {
        let config = WorkerConfig::new("us-west-2", "role");
        assert_eq!(config.client_ttl(), Duration::from_secs(3000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_margin_longer_than_session_rejected() {
        let config = WorkerConfig::new("us-west-2", "role")
            .with_session_duration(Duration::from_secs(900))
            .with_cache_safety_margin(Duration::from_secs(900));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name: "REFINERY_CACHE_SAFETY_MARGIN_SECS", .. })
        ));
    }

    #[test]
    fn test_session_outside_sts_bounds_rejected() {
        let config =
            WorkerConfig::new("us-west-2", "role").with_session_duration(Duration::from_secs(60));
        assert!(config.validate().is_err());
    }
}
