// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Refinery Runtime - Custom Function Runtime
//!
//! Runs inside a function image. Each invocation is resolved against a static
//! registry and executed as a handler subprocess that prints its result
//! between `<REFINERY_OUTPUT_CUSTOM_RUNTIME>` markers.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐  next / response / error  ┌──────────────────────┐
//! │ Lambda Runtime API │◀─────────────────────────▶│   RuntimeApiClient   │
//! └────────────────────┘                           └──────────┬───────────┘
//!                                                             │ payload
//!                                                             ▼
//!                                                  ┌──────────────────────┐
//!                                                  │ gateway (Direct/API) │
//!                                                  └──────────┬───────────┘
//!                                                             │ InvokeEvent
//!                                                             ▼
//! ┌────────────────────┐        lookup             ┌──────────────────────┐
//! │  FunctionRegistry  │◀──────────────────────────│   RuntimeExecutor    │
//! └────────────────────┘                           └──────────┬───────────┘
//!                                                             │ stdin JSON / stdout markers
//!                                                             ▼
//!                                                  ┌──────────────────────┐
//!                                                  │   handler process    │
//!                                                  └──────────────────────┘
//! ```
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `AWS_LAMBDA_RUNTIME_API` | Yes | - | Runtime API `host:port` |
//! | `REFINERY_FUNCTIONS_PATH` | No | `/var/runtime/functions.json` | Function registry document |
//! | `REFINERY_FUNCTION_NAME` | No | - | Function for events that name none |
//! | `LAMBDA_CALLER` | No | - | `API_GATEWAY` for gateway proxy events |

#![deny(missing_docs)]

/// Configuration from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// Subprocess execution.
pub mod exec;

/// Registry-driven function executor.
pub mod executor;

/// Direct and gateway entry points.
pub mod gateway;

/// Lambda Runtime API client.
pub mod lambda_api;

/// Wire types and output framing.
pub mod protocol;

/// Function registry.
pub mod registry;

pub use config::{ConfigError, RuntimeConfig};
pub use error::{Result, RuntimeError};
pub use exec::{ExecResult, ExecTask};
pub use executor::RuntimeExecutor;
pub use gateway::{InvocationSource, handle_payload};
pub use lambda_api::{Invocation, RuntimeApiClient, serve_next};
pub use protocol::{HandlerResponse, InvokeEvent, InvokeFunctionRequest, InvokeResponse};
pub use registry::{FunctionRegistry, FunctionSpec};
