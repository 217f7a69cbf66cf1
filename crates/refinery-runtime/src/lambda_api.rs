// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the Lambda Runtime API.
//!
//! ```text
//! GET  /2018-06-01/runtime/invocation/next
//! POST /2018-06-01/runtime/invocation/{request_id}/response
//! POST /2018-06-01/runtime/invocation/{request_id}/error
//! POST /2018-06-01/runtime/init/error
//! ```

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{Result, RuntimeError};
use crate::executor::RuntimeExecutor;
use crate::gateway::{InvocationSource, handle_payload};

const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";
const DEADLINE_HEADER: &str = "Lambda-Runtime-Deadline-Ms";
const ERROR_TYPE_HEADER: &str = "Lambda-Runtime-Function-Error-Type";

/// One invocation handed out by the Runtime API.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Request id used to post the outcome
    pub request_id: String,
    /// Time left before the service gives up on this invocation
    pub deadline: Option<Duration>,
    /// Raw event payload
    pub payload: Vec<u8>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDocument<'a> {
    error_message: String,
    error_type: &'a str,
}

/// HTTP client for the Runtime API.
#[derive(Debug, Clone)]
pub struct RuntimeApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl RuntimeApiClient {
    /// Client for the API at `runtime_api` (`host:port`).
    pub fn new(runtime_api: &str) -> Result<Self> {
        // next_invocation long-polls, so no request timeout
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RuntimeError::RuntimeApi(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: format!("http://{runtime_api}/2018-06-01/runtime"),
        })
    }

    /// Block until the next invocation is available.
    pub async fn next_invocation(&self) -> Result<Invocation> {
        let url = format!("{}/invocation/next", self.base_url);
        let response = self.http.get(&url).send().await.map_err(api_error)?;
        if !response.status().is_success() {
            return Err(RuntimeError::RuntimeApi(format!(
                "next invocation returned {}",
                response.status()
            )));
        }

        let headers = response.headers();
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RuntimeError::RuntimeApi(format!("missing {REQUEST_ID_HEADER}")))?
            .to_string();
        let deadline = headers
            .get(DEADLINE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .map(remaining_until);

        let payload = response.bytes().await.map_err(api_error)?.to_vec();
        debug!(request_id = %request_id, deadline = ?deadline, "Received invocation");

        Ok(Invocation {
            request_id,
            deadline,
            payload,
        })
    }

    /// Report a successful invocation.
    pub async fn post_response(&self, request_id: &str, body: &Value) -> Result<()> {
        let url = format!("{}/invocation/{}/response", self.base_url, request_id);
        self.post(&url, body, None).await
    }

    /// Report a failed invocation.
    pub async fn post_error(&self, request_id: &str, error: &RuntimeError) -> Result<()> {
        let url = format!("{}/invocation/{}/error", self.base_url, request_id);
        let document = ErrorDocument {
            error_message: error.to_string(),
            error_type: error.error_type(),
        };
        self.post(&url, &document, Some(error.error_type())).await
    }

    /// Report a failure to initialize. The service then restarts the process.
    pub async fn post_init_error(&self, error: &RuntimeError) -> Result<()> {
        let url = format!("{}/init/error", self.base_url);
        let document = ErrorDocument {
            error_message: error.to_string(),
            error_type: error.error_type(),
        };
        self.post(&url, &document, Some(error.error_type())).await
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        error_type: Option<&str>,
    ) -> Result<()> {
        let mut request = self.http.post(url).json(body);
        if let Some(error_type) = error_type {
            request = request.header(ERROR_TYPE_HEADER, error_type);
        }
        let response = request.send().await.map_err(api_error)?;
        if !response.status().is_success() {
            return Err(RuntimeError::RuntimeApi(format!(
                "POST {url} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Fetch one invocation, run it and post its outcome.
///
/// Errors from the function itself are posted to the API and do not fail this
/// call; only Runtime API failures do.
pub async fn serve_next(
    client: &RuntimeApiClient,
    executor: &RuntimeExecutor,
    source: InvocationSource,
) -> Result<()> {
    let invocation = client.next_invocation().await?;
    let request_id = invocation.request_id.as_str();

    match handle_payload(executor, source, &invocation.payload, invocation.deadline).await {
        Ok(body) => {
            client.post_response(request_id, &body).await?;
            info!(request_id, "Invocation succeeded");
        }
        Err(e) => {
            error!(request_id, error = %e, error_type = e.error_type(), "Invocation failed");
            client.post_error(request_id, &e).await?;
        }
    }
    Ok(())
}

fn remaining_until(deadline_ms: i64) -> Duration {
    let left = deadline_ms.saturating_sub(Utc::now().timestamp_millis());
    Duration::from_millis(u64::try_from(left).unwrap_or(0))
}

fn api_error(e: reqwest::Error) -> RuntimeError {
    RuntimeError::RuntimeApi(e.to_string())
}
