// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity inputs and outputs.

use serde::{Deserialize, Serialize};

/// Parameters of one activity call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationParams {
    /// Tenant (account) that owns the target resource
    pub account_id: String,
    /// Function ARN, topic ARN, or queue URL
    pub resource_id: String,
    /// Block input, serialized
    #[serde(default)]
    pub data: String,
    /// Workflow-scoped state threaded between blocks, serialized
    #[serde(default)]
    pub backpack: String,
    /// Project the workflow belongs to
    pub project_id: String,
    /// Bucket receiving audit records
    pub log_bucket: String,
}

impl InvocationParams {
    /// Last `:`-separated segment of the resource id (the function name for an ARN).
    pub fn short_resource_name(&self) -> &str {
        self.resource_id
            .rsplit(':')
            .next()
            .unwrap_or(&self.resource_id)
    }
}

/// Execution context supplied by the workflow engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    /// Workflow id
    pub workflow_id: String,
    /// Workflow run id
    pub run_id: String,
    /// Activity id within the run
    pub activity_id: String,
    /// Attempt number, starting at 1
    pub attempt: u32,
}

/// Resource kind tag carried by a [`BlockResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    /// Function invocation
    Lambda,
    /// Topic publish
    Topic,
    /// Queue send
    Queue,
}

/// Canonical output of an activity call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockResult {
    /// Result payload
    pub data: String,
    /// Context payload to hand to the next block
    pub backpack: String,
    /// Which kind of resource produced this result
    pub block_type: BlockType,
    /// Set when the resource reported an application error
    pub is_error: bool,
    /// Human-readable error text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(resource_id: &str) -> InvocationParams {
        InvocationParams {
            account_id: "111122223333".to_string(),
            resource_id: resource_id.to_string(),
            data: String::new(),
            backpack: String::new(),
            project_id: "project".to_string(),
            log_bucket: "logs".to_string(),
        }
    }

    #[test]
    fn test_short_resource_name() {
        assert_eq!(
            params("arn:aws:lambda:us-west-2:111122223333:function:my-fn").short_resource_name(),
            "my-fn"
        );
        assert_eq!(params("plain-name").short_resource_name(), "plain-name");
    }

    #[test]
    fn test_block_result_serialization() {
        let result = BlockResult {
            data: "{}".to_string(),
            backpack: "{}".to_string(),
            block_type: BlockType::Lambda,
            is_error: false,
            error_text: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["block_type"], "lambda");
        assert!(json.get("error_text").is_none());
    }
}
