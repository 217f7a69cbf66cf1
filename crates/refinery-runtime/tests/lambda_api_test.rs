// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime API client tests against a mock API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use refinery_runtime::{
    FunctionRegistry, FunctionSpec, InvocationSource, RuntimeApiClient, RuntimeError,
    RuntimeExecutor, serve_next,
};

fn client(server: &MockServer) -> RuntimeApiClient {
    RuntimeApiClient::new(&server.address().to_string()).unwrap()
}

async fn mount_next(server: &MockServer, request_id: &str, body: serde_json::Value) {
    let deadline = Utc::now().timestamp_millis() + 60_000;
    Mock::given(method("GET"))
        .and(path("/2018-06-01/runtime/invocation/next"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Lambda-Runtime-Aws-Request-Id", request_id)
                .insert_header("Lambda-Runtime-Deadline-Ms", deadline.to_string().as_str())
                .set_body_json(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_next_invocation() {
    let server = MockServer::start().await;
    mount_next(&server, "req-1", json!({"block_input": {"a": 1}})).await;

    let invocation = client(&server).next_invocation().await.unwrap();

    assert_eq!(invocation.request_id, "req-1");
    let deadline = invocation.deadline.unwrap();
    assert!(deadline > Duration::from_secs(50) && deadline <= Duration::from_secs(60));
    let payload: serde_json::Value = serde_json::from_slice(&invocation.payload).unwrap();
    assert_eq!(payload, json!({"block_input": {"a": 1}}));
}

#[tokio::test]
async fn test_next_invocation_without_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2018-06-01/runtime/invocation/next"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    let err = client(&server).next_invocation().await.unwrap_err();
    assert!(matches!(err, RuntimeError::RuntimeApi(_)));
}

#[tokio::test]
async fn test_post_error_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/invocation/req-2/error"))
        .and(header("Lambda-Runtime-Function-Error-Type", "Handler.Error"))
        .and(body_json(json!({
            "errorMessage": "KeyError: name",
            "errorType": "Handler.Error",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .post_error("req-2", &RuntimeError::Handler("KeyError: name".to_string()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_post_init_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/init/error"))
        .and(header("Lambda-Runtime-Function-Error-Type", "Runtime.RegistryLoad"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let err = FunctionRegistry::load("/nonexistent/functions.json").unwrap_err();
    client(&server).post_init_error(&err).await.unwrap();
}

#[tokio::test]
async fn test_rejected_post_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/invocation/req-3/response"))
        .respond_with(ResponseTemplate::new(413))
        .mount(&server)
        .await;

    let err = client(&server)
        .post_response("req-3", &json!({"result": "x"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("413"));
}

#[tokio::test]
async fn test_serve_next_posts_function_not_found() {
    let server = MockServer::start().await;
    mount_next(&server, "req-4", json!({"function_name": "nope"})).await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/invocation/req-4/error"))
        .and(body_json(json!({
            "errorMessage": "unable to find function with name: nope",
            "errorType": "Runtime.FunctionNotFound",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let executor = RuntimeExecutor::new(Arc::new(FunctionRegistry::default()), None);
    serve_next(&client(&server), &executor, InvocationSource::Direct)
        .await
        .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_serve_next_posts_handler_result() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("handler.sh");
    std::fs::write(
        &script,
        r#"cat > /dev/null
echo '<REFINERY_OUTPUT_CUSTOM_RUNTIME>{"result":{"ok":true},"backpack":{"n":1}}</REFINERY_OUTPUT_CUSTOM_RUNTIME>'
"#,
    )
    .unwrap();
    let registry = FunctionRegistry::from_specs([(
        "main".to_string(),
        FunctionSpec {
            command: "sh".to_string(),
            handler: script.display().to_string(),
            import_path: "handler".to_string(),
            function_name: "main".to_string(),
            work_dir: None,
            env: HashMap::new(),
        },
    )]);
    let executor = RuntimeExecutor::new(Arc::new(registry), Some("main".to_string()));

    let server = MockServer::start().await;
    mount_next(&server, "req-5", json!({"block_input": {}})).await;
    Mock::given(method("POST"))
        .and(path("/2018-06-01/runtime/invocation/req-5/response"))
        .and(body_json(json!({"result": {"ok": true}, "backpack": {"n": 1}})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    serve_next(&client(&server), &executor, InvocationSource::Direct)
        .await
        .unwrap();
}
