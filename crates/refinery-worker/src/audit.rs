// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Audit records for function invocations.
//!
//! Every function invocation leaves one immutable JSON object in the tenant's
//! log bucket under
//!
//! ```text
//! {project}/dt={YYYY-MM-DD-HH-MM}/{run_id}/{LOG_TYPE}~{name}~{record_id}~{unix_ts}
//! ```
//!
//! The `dt=` shard is the current UTC time truncated to five minutes, so
//! records partition by coarse time window and sort within it.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::client_cache::ClientCache;
use crate::clock::Clock;
use crate::error::{ActivityError, Result};
use crate::types::{ActivityInfo, InvocationParams};

/// Outcome an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    /// The function returned normally
    Success,
    /// The invocation failed or the function reported an error
    Exception,
}

impl LogType {
    /// Upper-case name used in keys and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Success => "SUCCESS",
            LogType::Exception => "EXCEPTION",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Object key the record is stored under
    #[serde(skip)]
    pub key: String,
    /// Record id
    pub id: String,
    /// Workflow run id
    pub execution_pipeline_id: String,
    /// Project id
    pub project_id: String,
    /// Full resource id
    pub arn: String,
    /// Short resource name
    pub function_name: String,
    /// Short resource name (kept for existing log readers)
    pub name: String,
    /// Outcome
    #[serde(rename = "type")]
    pub log_type: LogType,
    /// Unix seconds, as a string
    pub timestamp: String,
    /// Filtered log output or error report
    pub program_output: String,
    /// Backpack after the invocation
    pub backpack: String,
    /// Block input
    pub input_data: String,
    /// Result payload
    pub return_data: String,
}

/// Five-minute UTC shard, `YYYY-MM-DD-HH-MM`.
pub fn time_shard(now: DateTime<Utc>) -> String {
    format!("{}-{:02}", now.format("%Y-%m-%d-%H"), now.minute() / 5 * 5)
}

/// Writes audit records through the tenant's object store client.
pub struct AuditLogger {
    cache: Arc<ClientCache>,
    clock: Arc<dyn Clock>,
}

impl AuditLogger {
    /// Create a logger that fetches object store clients from `cache`.
    pub fn new(cache: Arc<ClientCache>, clock: Arc<dyn Clock>) -> Self {
        Self { cache, clock }
    }

    /// Build and store one record. A failed write is returned, not retried.
    ///
    /// Any cloud failure on this path, including fetching the object store
    /// client, surfaces as [`ActivityError::Audit`].
    pub async fn write(
        &self,
        info: &ActivityInfo,
        params: &InvocationParams,
        log_type: LogType,
        program_output: &str,
        result: &str,
        backpack: &str,
    ) -> Result<AuditRecord> {
        let now = self.clock.now();
        let name = params.short_resource_name().to_string();
        let id = Uuid::new_v4().to_string();
        let timestamp = now.timestamp();

        let key = format!(
            "{}/dt={}/{}/{}~{}~{}~{}",
            params.project_id,
            time_shard(now),
            info.run_id,
            log_type,
            name,
            id,
            timestamp
        );

        let record = AuditRecord {
            key,
            id,
            execution_pipeline_id: info.run_id.clone(),
            project_id: params.project_id.clone(),
            arn: params.resource_id.clone(),
            function_name: name.clone(),
            name,
            log_type,
            timestamp: timestamp.to_string(),
            program_output: program_output.to_string(),
            backpack: backpack.to_string(),
            input_data: params.data.clone(),
            return_data: result.to_string(),
        };

        let body = serde_json::to_vec(&record)?;
        let store = self
            .cache
            .object_store(&params.account_id)
            .await
            .map_err(into_audit_error)?;
        store
            .put_object(&params.log_bucket, &record.key, body)
            .await
            .map_err(ActivityError::Audit)?;

        debug!(
            bucket = %params.log_bucket,
            key = %record.key,
            log_type = %log_type,
            "Wrote audit record"
        );
        Ok(record)
    }
}

fn into_audit_error(err: ActivityError) -> ActivityError {
    match err {
        ActivityError::Credentials { source, .. }
        | ActivityError::ClientConstruction { source, .. } => ActivityError::Audit(source),
        other => other,
    }
}
