// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process executor: one event in, one handler subprocess, one response out.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, RuntimeError};
use crate::exec::ExecTask;
use crate::protocol::{
    HandlerResponse, InvokeEvent, InvokeFunctionRequest, InvokeResponse, output_spans,
};
use crate::registry::{FunctionRegistry, FunctionSpec};

/// Runs registered functions as handler subprocesses.
#[derive(Debug, Clone)]
pub struct RuntimeExecutor {
    registry: Arc<FunctionRegistry>,
    default_function: Option<String>,
}

impl RuntimeExecutor {
    /// Create an executor. `default_function` serves events that name none.
    pub fn new(registry: Arc<FunctionRegistry>, default_function: Option<String>) -> Self {
        Self {
            registry,
            default_function,
        }
    }

    /// The registry this executor resolves names against.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    fn resolve(&self, event: &InvokeEvent) -> Result<(String, &FunctionSpec)> {
        let name = event
            .function_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or(self.default_function.as_deref())
            .unwrap_or_default()
            .to_string();
        let spec = self.registry.get(&name)?;
        Ok((name, spec))
    }

    /// Run the function an event targets and return its result.
    ///
    /// `deadline` bounds the handler subprocess; it is killed when exceeded.
    #[instrument(skip(self, event), fields(function = tracing::field::Empty))]
    pub async fn handle(
        &self,
        event: InvokeEvent,
        deadline: Option<Duration>,
    ) -> Result<InvokeResponse> {
        let (name, spec) = self.resolve(&event)?;
        tracing::Span::current().record("function", name.as_str());

        let request = InvokeFunctionRequest {
            block_input: event.block_input,
            backpack: event.backpack,
            import_path: spec.import_path.clone(),
            function_name: spec.function_name.clone(),
        };

        let output = ExecTask::new(&spec.command)
            .arg(&spec.handler)
            .cwd(spec.work_dir.clone())
            .envs(spec.env.clone())
            .stdin(serde_json::to_vec(&request)?)
            .timeout(deadline)
            .execute()
            .await?;

        if !output.success() {
            warn!(
                exit_code = ?output.exit_code,
                stderr = %output.stderr,
                "Handler exited unsuccessfully"
            );
        }

        let spans = output_spans(&output.stdout);
        let Some(span) = spans.first() else {
            error!(stderr = %output.stderr, "Handler printed no framed output");
            return Err(RuntimeError::NoOutputFound {
                stderr: output.stderr,
            });
        };
        if spans.len() > 1 {
            warn!(spans = spans.len(), "Handler printed several framed outputs, using the first");
        }

        let response: HandlerResponse = serde_json::from_str(span)?;
        if let Some(message) = response.error_text() {
            info!(error = %message, "Handler reported an error");
            return Err(RuntimeError::Handler(message));
        }

        Ok(InvokeResponse {
            result: response.result,
            backpack: response.backpack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_function() {
        let executor = RuntimeExecutor::new(Arc::new(FunctionRegistry::default()), None);
        let err = executor
            .handle(
                InvokeEvent {
                    function_name: Some("missing".to_string()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::FunctionNotFound(ref name) if name == "missing"));
    }

    #[tokio::test]
    async fn test_default_function_is_used_when_event_names_none() {
        let executor = RuntimeExecutor::new(
            Arc::new(FunctionRegistry::default()),
            Some("fallback".to_string()),
        );
        let err = executor
            .handle(InvokeEvent::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::FunctionNotFound(ref name) if name == "fallback"));
    }
}
