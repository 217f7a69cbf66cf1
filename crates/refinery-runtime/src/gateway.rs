// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invocation entry points.
//!
//! A function is either invoked directly with an [`InvokeEvent`] or sits
//! behind an HTTP gateway, which wraps the same event as a string `body` and
//! expects `{statusCode, body}` back. The shape is chosen once per process
//! from `LAMBDA_CALLER`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, RuntimeError};
use crate::executor::RuntimeExecutor;
use crate::protocol::InvokeEvent;

/// Shape of the events this process receives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvocationSource {
    /// Raw [`InvokeEvent`] payloads
    #[default]
    Direct,
    /// Gateway proxy events carrying the event in `body`
    ApiGateway,
}

impl InvocationSource {
    /// Select the source from a `LAMBDA_CALLER` value.
    pub fn from_caller(caller: Option<&str>) -> Self {
        match caller {
            Some("API_GATEWAY") => Self::ApiGateway,
            _ => Self::Direct,
        }
    }

    /// Select the source from the `LAMBDA_CALLER` environment variable.
    pub fn from_env() -> Self {
        Self::from_caller(std::env::var("LAMBDA_CALLER").ok().as_deref())
    }
}

/// Gateway proxy request. Only the body is used.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayRequest {
    /// Request body
    #[serde(default)]
    pub body: Option<String>,
    /// Whether `body` is base64
    #[serde(default)]
    pub is_base64_encoded: bool,
}

/// Gateway proxy response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewayResponse {
    /// HTTP status
    pub status_code: u16,
    /// Response body
    pub body: String,
}

impl ApiGatewayRequest {
    /// Decode the wrapped event.
    pub fn event(&self) -> Result<InvokeEvent> {
        let body = self.body.as_deref().unwrap_or_default();
        if self.is_base64_encoded {
            let decoded = STANDARD
                .decode(body)
                .map_err(|e| RuntimeError::InvalidEvent(format!("body is not base64: {e}")))?;
            Ok(serde_json::from_slice(&decoded)?)
        } else {
            Ok(serde_json::from_str(body)?)
        }
    }
}

/// Decode one payload, run it and encode the response for `source`.
pub async fn handle_payload(
    executor: &RuntimeExecutor,
    source: InvocationSource,
    payload: &[u8],
    deadline: Option<Duration>,
) -> Result<Value> {
    match source {
        InvocationSource::Direct => {
            let event: InvokeEvent = serde_json::from_slice(payload)?;
            let response = executor.handle(event, deadline).await?;
            Ok(serde_json::to_value(response)?)
        }
        InvocationSource::ApiGateway => {
            let request: ApiGatewayRequest = serde_json::from_slice(payload)?;
            let response = executor.handle(request.event()?, deadline).await?;
            let wrapped = ApiGatewayResponse {
                status_code: 200,
                body: serde_json::to_string(&response)?,
            };
            Ok(serde_json::to_value(wrapped)?)
        }
    }
}
