// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloud provider seam.
//!
//! Activities never talk to a cloud SDK directly. They go through
//! [`CloudProvider`], which assumes a tenant-scoped role and builds one client
//! per [`ResourceKind`] from the resulting [`DelegatedSession`].
//!
//! Providers are PURE API adapters - they do not cache anything. Caching and
//! stampede protection live in [`crate::client_cache::ClientCache`].

pub mod aws;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use mock::MockCloud;

/// Errors from cloud API calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CloudError {
    /// The request never produced a response (connect, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The service answered with an error status.
    #[error("{service} returned {status} {code}: {message}")]
    Service {
        /// Signing name of the service (e.g. "sts").
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Provider error code (e.g. "AccessDenied").
        code: String,
        /// Provider error message.
        message: String,
    },

    /// The service answered successfully but the body could not be understood.
    #[error("Invalid response from {service}: {message}")]
    InvalidResponse {
        /// Signing name of the service.
        service: &'static str,
        /// What was wrong.
        message: String,
    },

    /// The request could not be signed.
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

impl CloudError {
    /// Whether a later attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudError::Http(_) => true,
            CloudError::Service { status, code, .. } => {
                *status >= 500 || *status == 429 || code.contains("Throttl")
            }
            _ => false,
        }
    }
}

/// Category of external target a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Function-execution service (Lambda)
    Function,
    /// Object storage (S3), used for audit records
    ObjectStorage,
    /// Pub/sub topic (SNS)
    Topic,
    /// Message queue (SQS)
    Queue,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Function => write!(f, "lambda"),
            ResourceKind::ObjectStorage => write!(f, "s3"),
            ResourceKind::Topic => write!(f, "sns"),
            ResourceKind::Queue => write!(f, "sqs"),
        }
    }
}

/// Access key material. `Debug` never prints the secret parts.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token (present for assumed-role credentials)
    pub session_token: Option<String>,
}

impl Credentials {
    /// Create long-lived credentials without a session token.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Temporary credentials scoped to one tenant.
///
/// Never cached on its own; only the client built from it is.
#[derive(Debug, Clone)]
pub struct DelegatedSession {
    /// Tenant (account) the role lives in
    pub tenant_id: String,
    /// Region clients built from this session are bound to
    pub region: String,
    /// Assumed-role credentials
    pub credentials: Credentials,
    /// When the provider stops accepting these credentials
    pub expiration: DateTime<Utc>,
}

/// Result of a synchronous function invocation.
#[derive(Debug, Clone, Default)]
pub struct InvokeOutput {
    /// HTTP status reported by the function service
    pub status_code: u16,
    /// Raw, untrusted response payload
    pub payload: Vec<u8>,
    /// Set when the function itself failed ("Handled" / "Unhandled")
    pub function_error: Option<String>,
    /// Base64-encoded tail of the execution log
    pub log_result: Option<String>,
}

/// Function-execution client.
#[async_trait]
pub trait FunctionClient: Send + Sync {
    /// Invoke a function synchronously, requesting the log tail.
    async fn invoke(&self, function_name: &str, payload: Vec<u8>) -> Result<InvokeOutput, CloudError>;
}

/// Object storage client.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write one object.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), CloudError>;
}

/// Topic client.
#[async_trait]
pub trait TopicClient: Send + Sync {
    /// Publish a message, returning the provider-assigned message id.
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<String, CloudError>;
}

/// Queue client.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Send a message, returning the provider-assigned message id.
    async fn send_message(&self, queue_url: &str, body: &str) -> Result<String, CloudError>;
}

/// Trait for cloud providers.
///
/// One constructor per [`ResourceKind`]; [`CachedClient::connect`] picks the
/// right one.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider identifier (e.g. "aws", "mock")
    fn provider_type(&self) -> &'static str;

    /// Assume the tenant-scoped role for `tenant_id`.
    async fn assume_role(
        &self,
        tenant_id: &str,
        duration: Duration,
    ) -> Result<DelegatedSession, CloudError>;

    /// Build a function client from a session.
    fn function_client(
        &self,
        session: DelegatedSession,
    ) -> Result<Arc<dyn FunctionClient>, CloudError>;

    /// Build an object storage client from a session.
    fn object_store(&self, session: DelegatedSession) -> Result<Arc<dyn ObjectStore>, CloudError>;

    /// Build a topic client from a session.
    fn topic_client(&self, session: DelegatedSession) -> Result<Arc<dyn TopicClient>, CloudError>;

    /// Build a queue client from a session.
    fn queue_client(&self, session: DelegatedSession) -> Result<Arc<dyn QueueClient>, CloudError>;
}

/// A client for exactly one resource kind.
#[derive(Clone)]
pub enum CachedClient {
    /// Function-execution client
    Function(Arc<dyn FunctionClient>),
    /// Object storage client
    ObjectStorage(Arc<dyn ObjectStore>),
    /// Topic client
    Topic(Arc<dyn TopicClient>),
    /// Queue client
    Queue(Arc<dyn QueueClient>),
}

impl CachedClient {
    /// Build the client variant matching `kind`.
    pub fn connect(
        kind: ResourceKind,
        provider: &dyn CloudProvider,
        session: DelegatedSession,
    ) -> Result<Self, CloudError> {
        Ok(match kind {
            ResourceKind::Function => CachedClient::Function(provider.function_client(session)?),
            ResourceKind::ObjectStorage => {
                CachedClient::ObjectStorage(provider.object_store(session)?)
            }
            ResourceKind::Topic => CachedClient::Topic(provider.topic_client(session)?),
            ResourceKind::Queue => CachedClient::Queue(provider.queue_client(session)?),
        })
    }

    /// Resource kind of this client.
    pub fn kind(&self) -> ResourceKind {
        match self {
            CachedClient::Function(_) => ResourceKind::Function,
            CachedClient::ObjectStorage(_) => ResourceKind::ObjectStorage,
            CachedClient::Topic(_) => ResourceKind::Topic,
            CachedClient::Queue(_) => ResourceKind::Queue,
        }
    }
}

impl fmt::Debug for CachedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CachedClient({})", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "super-secret".to_string(),
            session_token: Some("token-value".to_string()),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("AKIDEXAMPLE"));
        assert!(!printed.contains("super-secret"));
        assert!(!printed.contains("token-value"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CloudError::Http("connection reset".to_string()).is_retryable());
        assert!(
            CloudError::Service {
                service: "lambda",
                status: 429,
                code: "TooManyRequestsException".to_string(),
                message: "Rate exceeded".to_string(),
            }
            .is_retryable()
        );
        assert!(
            CloudError::Service {
                service: "sns",
                status: 400,
                code: "Throttling".to_string(),
                message: "Rate exceeded".to_string(),
            }
            .is_retryable()
        );
        assert!(
            !CloudError::Service {
                service: "sts",
                status: 403,
                code: "AccessDenied".to_string(),
                message: "not authorized".to_string(),
            }
            .is_retryable()
        );
        assert!(
            !CloudError::InvalidResponse {
                service: "sts",
                message: "missing Credentials".to_string(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Function.to_string(), "lambda");
        assert_eq!(ResourceKind::ObjectStorage.to_string(), "s3");
        assert_eq!(ResourceKind::Topic.to_string(), "sns");
        assert_eq!(ResourceKind::Queue.to_string(), "sqs");
    }
}
