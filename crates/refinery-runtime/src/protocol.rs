// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire types shared by the runtime and its handlers.
//!
//! Handlers receive an [`InvokeFunctionRequest`] as JSON on stdin and answer by
//! printing one framed span anywhere in stdout:
//!
//! ```text
//! <REFINERY_OUTPUT_CUSTOM_RUNTIME>{"result": ..., "backpack": ..., "error": ""}</REFINERY_OUTPUT_CUSTOM_RUNTIME>
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

/// Tag name framing handler output.
pub const OUTPUT_MARKER: &str = "REFINERY_OUTPUT_CUSTOM_RUNTIME";

static OUTPUT_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?s)<{OUTPUT_MARKER}>(.*?)</{OUTPUT_MARKER}>"))
        .expect("output marker pattern is a valid regex")
});

/// Event delivered to the runtime for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeEvent {
    /// Block input
    #[serde(default)]
    pub block_input: Value,
    /// Workflow backpack
    #[serde(default)]
    pub backpack: Value,
    /// Registry name of the function to run; the runtime default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
}

/// Request written to the handler's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeFunctionRequest {
    /// Block input
    pub block_input: Value,
    /// Workflow backpack
    pub backpack: Value,
    /// Module holding the user function
    pub import_path: String,
    /// User function to call
    pub function_name: String,
}

/// Framed response printed by the handler. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    /// Result of the user function
    #[serde(default)]
    pub result: Value,
    /// Backpack after the user function ran
    #[serde(default)]
    pub backpack: Value,
    /// Error raised by the user function
    #[serde(default)]
    pub error: Value,
}

impl HandlerResponse {
    /// Error text, if the handler reported a non-empty error.
    pub fn error_text(&self) -> Option<String> {
        match &self.error {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Response returned to the caller of the function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeResponse {
    /// Result of the user function
    pub result: Value,
    /// Backpack after the user function ran
    pub backpack: Value,
}

/// Every framed span in `stdout`, in order.
pub fn output_spans(stdout: &str) -> Vec<&str> {
    OUTPUT_SPAN
        .captures_iter(stdout)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
        .collect()
}
