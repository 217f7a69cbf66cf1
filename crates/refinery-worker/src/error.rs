// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity error types.
//!
//! An `ActivityError` is a hard failure: the workflow engine treats it as a
//! failed activity and applies its own retry policy. Application errors
//! reported by a tenant function are NOT errors here; they come back as a
//! [`crate::types::BlockResult`] with `is_error` set.

use thiserror::Error;

use crate::cloud::{CloudError, ResourceKind};
use crate::config::ConfigError;

/// Result type using ActivityError
pub type Result<T> = std::result::Result<T, ActivityError>;

/// Errors that fail an activity call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActivityError {
    /// Assuming the tenant role failed. Never cached.
    #[error("failed to assume role for tenant {tenant_id}: {source}")]
    Credentials {
        /// Tenant whose role could not be assumed
        tenant_id: String,
        /// Underlying cloud error
        source: CloudError,
    },

    /// A client could not be built from a fresh session.
    #[error("failed to build {kind} client for tenant {tenant_id}: {source}")]
    ClientConstruction {
        /// Requested resource kind
        kind: ResourceKind,
        /// Tenant the session belongs to
        tenant_id: String,
        /// Underlying cloud error
        source: CloudError,
    },

    /// The cache handed back a client of another kind.
    #[error("expected a {expected} client, got {actual}")]
    ClientKindMismatch {
        /// Kind the caller asked for
        expected: ResourceKind,
        /// Kind actually stored
        actual: ResourceKind,
    },

    /// The invocation call itself failed (network, permission, throttling).
    #[error("invocation of {resource_id} failed: {source}")]
    Transport {
        /// Target resource
        resource_id: String,
        /// Underlying cloud error
        source: CloudError,
    },

    /// Writing the audit record failed, including fetching the store client.
    #[error("audit write failed: {0}")]
    Audit(#[source] CloudError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ActivityError {
    /// Whether the engine may reasonably retry the activity.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Credentials { source, .. }
            | Self::Transport { source, .. }
            | Self::Audit(source) => source.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttled_invocation_is_retryable() {
        let err = ActivityError::Transport {
            resource_id: "arn:aws:lambda:us-west-2:1:function:f".to_string(),
            source: CloudError::Service {
                service: "lambda",
                status: 429,
                code: "TooManyRequestsException".to_string(),
                message: "Rate exceeded".to_string(),
            },
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("function:f"));
    }

    #[test]
    fn test_access_denied_is_not_retryable() {
        let err = ActivityError::Credentials {
            tenant_id: "111122223333".to_string(),
            source: CloudError::Service {
                service: "sts",
                status: 403,
                code: "AccessDenied".to_string(),
                message: "nope".to_string(),
            },
        };
        assert!(!err.is_retryable());
    }
}
