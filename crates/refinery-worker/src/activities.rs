// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity entry points, one per resource kind.
//!
//! Each entry point follows the same template: fetch a tenant client, invoke,
//! classify, log, and return a [`BlockResult`]. Only function invocations are
//! audited; they run arbitrary tenant code.

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditLogger, LogType};
use crate::classifier::{self, EMPTY_OBJECT};
use crate::client_cache::ClientCache;
use crate::clock::Clock;
use crate::error::{ActivityError, Result};
use crate::types::{ActivityInfo, BlockResult, BlockType, InvocationParams};

/// Activity entry points shared by every worker task.
pub struct Activities {
    cache: Arc<ClientCache>,
    audit: AuditLogger,
}

impl Activities {
    /// Create the entry points over a shared client cache.
    pub fn new(cache: Arc<ClientCache>, clock: Arc<dyn Clock>) -> Self {
        let audit = AuditLogger::new(cache.clone(), clock);
        Self { cache, audit }
    }

    /// The client cache backing these activities.
    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Invoke a tenant function synchronously and audit the outcome.
    ///
    /// A failed invocation call is a hard error (after a best-effort
    /// `EXCEPTION` record). A payload that cannot be decoded is returned
    /// verbatim. A function-reported error comes back with `is_error` set.
    /// Both cases return the caller's backpack exactly as given.
    #[instrument(
        skip(self, info, params),
        fields(run_id = %info.run_id, tenant_id = %params.account_id, resource_id = %params.resource_id)
    )]
    pub async fn invoke_function(
        &self,
        info: &ActivityInfo,
        params: &InvocationParams,
    ) -> Result<BlockResult> {
        let client = self.cache.function_client(&params.account_id).await?;
        let input = classifier::compute_input(&params.data, &params.backpack);

        let output = match client.invoke(&params.resource_id, input).await {
            Ok(output) => output,
            Err(source) => {
                error!(error = %source, "Function invocation failed");
                if let Err(audit_error) = self
                    .audit
                    .write(
                        info,
                        params,
                        LogType::Exception,
                        &source.to_string(),
                        EMPTY_OBJECT,
                        &or_empty(&params.backpack),
                    )
                    .await
                {
                    warn!(error = %audit_error, "Failed to audit failed invocation");
                }
                return Err(ActivityError::Transport {
                    resource_id: params.resource_id.clone(),
                    source,
                });
            }
        };

        let raw = String::from_utf8_lossy(&output.payload).into_owned();
        let mut log_type = LogType::Success;
        let mut program_output = classifier::filter_log_output(output.log_result.as_deref());

        // on any fallback path the caller's backpack is returned untouched
        let (data, backpack, error_text) = match classifier::classify(&output.payload) {
            Err(e) => {
                warn!(error = %e, payload = %raw, "Unable to decode function response, using raw payload");
                if output.function_error.is_some() {
                    log_type = LogType::Exception;
                    info!(function_error = ?output.function_error, "Function failed with an undecodable payload");
                }
                (raw, params.backpack.clone(), output.function_error.clone())
            }
            Ok(response) if response.is_error() || output.function_error.is_some() => {
                log_type = LogType::Exception;
                if response.is_error() {
                    program_output = response.error_report();
                }
                let text = response
                    .error_text()
                    .map(str::to_string)
                    .or(output.function_error.clone());
                info!(error_text = ?text, "Function reported an error");
                // the failed handler's backpack is not trusted
                (raw, params.backpack.clone(), text)
            }
            Ok(response) => (response.result, response.backpack, None),
        };

        self.audit
            .write(info, params, log_type, &program_output, &data, &or_empty(&backpack))
            .await?;

        Ok(BlockResult {
            data,
            backpack,
            block_type: BlockType::Lambda,
            is_error: log_type == LogType::Exception,
            error_text,
        })
    }

    /// Publish the block input to a topic.
    #[instrument(
        skip(self, info, params),
        fields(run_id = %info.run_id, tenant_id = %params.account_id, resource_id = %params.resource_id)
    )]
    pub async fn publish_to_topic(
        &self,
        info: &ActivityInfo,
        params: &InvocationParams,
    ) -> Result<BlockResult> {
        let client = self.cache.topic_client(&params.account_id).await?;
        let message_id = client
            .publish(&params.resource_id, &params.data)
            .await
            .map_err(|source| ActivityError::Transport {
                resource_id: params.resource_id.clone(),
                source,
            })?;

        info!(message_id = %message_id, "Published to topic");
        Ok(message_result(message_id, params, BlockType::Topic))
    }

    /// Send the block input to a queue.
    #[instrument(
        skip(self, info, params),
        fields(run_id = %info.run_id, tenant_id = %params.account_id, resource_id = %params.resource_id)
    )]
    pub async fn send_to_queue(
        &self,
        info: &ActivityInfo,
        params: &InvocationParams,
    ) -> Result<BlockResult> {
        let client = self.cache.queue_client(&params.account_id).await?;
        let message_id = client
            .send_message(&params.resource_id, &params.data)
            .await
            .map_err(|source| ActivityError::Transport {
                resource_id: params.resource_id.clone(),
                source,
            })?;

        info!(message_id = %message_id, "Sent to queue");
        Ok(message_result(message_id, params, BlockType::Queue))
    }
}

fn message_result(message_id: String, params: &InvocationParams, block_type: BlockType) -> BlockResult {
    BlockResult {
        data: message_id,
        backpack: params.backpack.clone(),
        block_type,
        is_error: false,
        error_text: None,
    }
}

fn or_empty(payload: &str) -> String {
    if payload.trim().is_empty() {
        EMPTY_OBJECT.to_string()
    } else {
        payload.to_string()
    }
}
