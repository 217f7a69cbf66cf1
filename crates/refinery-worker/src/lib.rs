// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Refinery Worker - Block Activities
//!
//! The workflow engine runs a graph of blocks; every block that touches a
//! tenant resource is executed through one of the activities in this crate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Workflow engine                        │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ invoke_function / publish_to_topic / send_to_queue
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Activities                            │
//! │   ┌────────────┐     ┌─────────────┐     ┌──────────────┐    │
//! │   │ Classifier │     │ AuditLogger │────▶│ ClientCache  │    │
//! │   └────────────┘     └─────────────┘     └──────┬───────┘    │
//! └─────────────────────────────────────────────────┼────────────┘
//!                                                   │ assume_role + connect
//!                                                   ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │             CloudProvider (AwsProvider / MockCloud)          │
//! │               STS · Lambda · S3 · SNS · SQS                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Activities
//!
//! | Activity | Target | Result `data` | Audited |
//! |----------|--------|---------------|---------|
//! | `invoke_function` | function ARN | function result | yes |
//! | `publish_to_topic` | topic ARN | message id | no |
//! | `send_to_queue` | queue URL | message id | no |
//!
//! Hard failures (role assumption, transport, audit write) are returned as
//! [`ActivityError`] for the engine's retry policy. Function-reported errors
//! are returned as a [`BlockResult`] with `is_error` set.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `REFINERY_AWS_REGION` | No | `AWS_REGION`, then `us-west-2` | Region for tenant clients |
//! | `REFINERY_IAM_ROLE_NAME` | No | `DO_NOT_DELETE_REFINERY_SYSTEM_ACCOUNT` | Role assumed in tenant accounts |
//! | `REFINERY_SESSION_DURATION_SECS` | No | `3600` | Delegated session lifetime |
//! | `REFINERY_CACHE_SAFETY_MARGIN_SECS` | No | `600` | Subtracted from the session lifetime for the client TTL |
//! | `REFINERY_CACHE_FUNCTION_CLIENTS` | No | `false` | Cache function clients |
//! | `REFINERY_REQUEST_TIMEOUT_SECS` | No | `60` | Outbound request timeout |
//! | `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` | For `AwsProvider` | - | Worker credentials |
//! | `AWS_SESSION_TOKEN` | No | - | Session token for the worker credentials |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use refinery_worker::{Activities, ClientCache, SystemClock, WorkerConfig};
//! use refinery_worker::cloud::aws::AwsProvider;
//!
//! let config = WorkerConfig::from_env()?;
//! let provider = Arc::new(AwsProvider::from_env(&config)?);
//! let cache = Arc::new(ClientCache::new(&config, provider));
//! let activities = Activities::new(cache, Arc::new(SystemClock));
//!
//! let result = activities.invoke_function(&info, &params).await?;
//! ```

#![deny(missing_docs)]

/// Activity entry points.
pub mod activities;

/// Audit records written for every function invocation.
pub mod audit;

/// Function response decoding and log filtering.
pub mod classifier;

/// Per-tenant client cache.
pub mod client_cache;

/// Time sources.
pub mod clock;

/// Cloud provider seam, AWS backend and mock.
pub mod cloud;

/// Configuration from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// Activity inputs and outputs.
pub mod types;

pub use activities::Activities;
pub use audit::{AuditLogger, AuditRecord, LogType};
pub use classifier::{ClassifiedResponse, ClassifyError, classify};
pub use client_cache::ClientCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use cloud::{CachedClient, CloudError, CloudProvider, MockCloud, ResourceKind};
pub use config::{ConfigError, WorkerConfig};
pub use error::{ActivityError, Result};
pub use types::{ActivityInfo, BlockResult, BlockType, InvocationParams};
