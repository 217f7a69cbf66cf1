// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Refinery Runtime - bootstrap binary for custom function images.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use refinery_runtime::{
    FunctionRegistry, RuntimeApiClient, RuntimeConfig, RuntimeExecutor, serve_next,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "refinery_runtime=info".into()),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = RuntimeConfig::from_env()?;
    let client = RuntimeApiClient::new(&config.runtime_api)?;

    let registry = match FunctionRegistry::load(&config.functions_path) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to load function registry");
            if let Err(report_error) = client.post_init_error(&e).await {
                error!(error = %report_error, "Failed to report init error");
            }
            return Err(e.into());
        }
    };

    info!(
        runtime_api = %config.runtime_api,
        functions = registry.len(),
        default_function = ?config.default_function,
        source = ?config.invocation_source,
        "Starting Refinery Runtime"
    );

    let executor = RuntimeExecutor::new(Arc::new(registry), config.default_function.clone());
    loop {
        if let Err(e) = serve_next(&client, &executor, config.invocation_source).await {
            error!(error = %e, "Runtime API request failed");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}
