// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lambda, S3, SNS and SQS clients.

use async_trait::async_trait;
use reqwest::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

use super::{AwsHttp, form_body, form_headers, xml_text};
use crate::cloud::{CloudError, FunctionClient, InvokeOutput, ObjectStore, QueueClient, TopicClient};

fn join_path(endpoint: &Url, segments: &[&str]) -> Url {
    let mut path = endpoint.path().trim_end_matches('/').to_string();
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }
    let mut url = endpoint.clone();
    url.set_path(&path);
    url
}

fn header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn message_id(
    service: &'static str,
    response: reqwest::Response,
) -> Result<String, CloudError> {
    let text = response
        .text()
        .await
        .map_err(|e| CloudError::Http(e.to_string()))?;
    let doc = roxmltree::Document::parse(&text).map_err(|e| CloudError::InvalidResponse {
        service,
        message: e.to_string(),
    })?;
    xml_text(&doc, "MessageId")
        .map(str::to_string)
        .ok_or_else(|| CloudError::InvalidResponse {
            service,
            message: "missing MessageId".to_string(),
        })
}

/// Lambda `Invoke` client.
pub(super) struct LambdaClient {
    http: Arc<AwsHttp>,
    endpoint: Url,
}

impl LambdaClient {
    pub(super) fn new(http: Arc<AwsHttp>, endpoint: Url) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl FunctionClient for LambdaClient {
    async fn invoke(&self, function_name: &str, payload: Vec<u8>) -> Result<InvokeOutput, CloudError> {
        let name = urlencoding::encode(function_name);
        let url = join_path(&self.endpoint, &["2015-03-31", "functions", &name, "invocations"]);
        let headers = BTreeMap::from([
            (
                "x-amz-invocation-type".to_string(),
                "RequestResponse".to_string(),
            ),
            ("x-amz-log-type".to_string(), "Tail".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ]);

        let response = self
            .http
            .send("lambda", Method::POST, url, headers, payload)
            .await?;

        let status_code = response.status().as_u16();
        let function_error = header(&response, "x-amz-function-error");
        let log_result = header(&response, "x-amz-log-result");
        let payload = response
            .bytes()
            .await
            .map_err(|e| CloudError::Http(e.to_string()))?
            .to_vec();

        Ok(InvokeOutput {
            status_code,
            payload,
            function_error,
            log_result,
        })
    }
}

/// S3 `PutObject` client (path-style addressing).
pub(super) struct S3Client {
    http: Arc<AwsHttp>,
    endpoint: Url,
}

impl S3Client {
    pub(super) fn new(http: Arc<AwsHttp>, endpoint: Url) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), CloudError> {
        let mut segments = vec![urlencoding::encode(bucket).into_owned()];
        segments.extend(key.split('/').map(|s| urlencoding::encode(s).into_owned()));
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let url = join_path(&self.endpoint, &segments);
        let headers = BTreeMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]);

        self.http
            .send("s3", Method::PUT, url, headers, body)
            .await?;
        Ok(())
    }
}

/// SNS `Publish` client.
pub(super) struct SnsClient {
    http: Arc<AwsHttp>,
    endpoint: Url,
}

impl SnsClient {
    pub(super) fn new(http: Arc<AwsHttp>, endpoint: Url) -> Self {
        Self { http, endpoint }
    }
}

#[async_trait]
impl TopicClient for SnsClient {
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<String, CloudError> {
        let body = form_body(&[
            ("Action", "Publish"),
            ("Version", "2010-03-31"),
            ("TopicArn", topic_arn),
            ("Message", message),
        ]);
        let response = self
            .http
            .send("sns", Method::POST, self.endpoint.clone(), form_headers(), body)
            .await?;
        message_id("sns", response).await
    }
}

/// SQS `SendMessage` client. Requests go to the queue URL itself.
pub(super) struct SqsClient {
    http: Arc<AwsHttp>,
}

impl SqsClient {
    pub(super) fn new(http: Arc<AwsHttp>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl QueueClient for SqsClient {
    async fn send_message(&self, queue_url: &str, body: &str) -> Result<String, CloudError> {
        let url = Url::parse(queue_url).map_err(|e| CloudError::Other(format!(
            "invalid queue URL {queue_url}: {e}"
        )))?;
        let form = form_body(&[
            ("Action", "SendMessage"),
            ("Version", "2012-11-05"),
            ("MessageBody", body),
        ]);
        let response = self
            .http
            .send("sqs", Method::POST, url, form_headers(), form)
            .await?;
        message_id("sqs", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path_keeps_encoded_segments() {
        let endpoint = Url::parse("https://lambda.us-west-2.amazonaws.com/").unwrap();
        let name = urlencoding::encode("arn:aws:lambda:us-west-2:1:function:f");
        let url = join_path(&endpoint, &["2015-03-31", "functions", &name, "invocations"]);
        assert_eq!(
            url.path(),
            "/2015-03-31/functions/arn%3Aaws%3Alambda%3Aus-west-2%3A1%3Afunction%3Af/invocations"
        );
    }

    #[test]
    fn test_join_path_under_base_path() {
        let endpoint = Url::parse("http://127.0.0.1:4566/aws/").unwrap();
        let url = join_path(&endpoint, &["bucket", "project", "dt%3D2024-01-01-00-00"]);
        assert_eq!(url.path(), "/aws/bucket/project/dt%3D2024-01-01-00-00");
    }
}
