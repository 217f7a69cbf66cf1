// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AWS implementation of [`CloudProvider`].
//!
//! Talks to the STS, Lambda, S3, SNS and SQS HTTP APIs directly with SigV4
//! signed requests. Base credentials (the worker's own IAM user) are only used
//! to call `sts:AssumeRole`; every tenant client is built from the assumed
//! role's temporary credentials.
//!
//! Endpoints default to the public regional endpoints. `with_endpoint` points
//! every service at one base URL (local stacks, tests).

mod services;
pub mod sigv4;
mod sts;

use async_trait::async_trait;
use reqwest::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use self::services::{LambdaClient, S3Client, SnsClient, SqsClient};
use self::sigv4::{SignableRequest, SigningParams};
use crate::cloud::{
    CloudError, CloudProvider, Credentials, DelegatedSession, FunctionClient, ObjectStore,
    QueueClient, TopicClient,
};
use crate::config::{ConfigError, WorkerConfig};

/// Signed HTTP transport bound to one set of credentials.
#[derive(Debug, Clone)]
pub(crate) struct AwsHttp {
    http: reqwest::Client,
    credentials: Credentials,
    region: String,
}

impl AwsHttp {
    /// Sign and send a request, turning error statuses into [`CloudError::Service`].
    pub(crate) async fn send(
        &self,
        service: &'static str,
        method: Method,
        url: Url,
        headers: BTreeMap<String, String>,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, CloudError> {
        let mut signable = SignableRequest {
            method: method.as_str(),
            url: &url,
            headers,
            body: &body,
        };
        sigv4::sign(
            &mut signable,
            &SigningParams {
                credentials: &self.credentials,
                region: &self.region,
                service,
                time: chrono::Utc::now(),
            },
        )?;

        let mut request = self.http.request(method.clone(), url.clone());
        for (name, value) in &signable.headers {
            // reqwest derives Host from the URL
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        debug!(service, method = %method, url = %url, "Sending AWS request");

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| CloudError::Http(e.to_string()))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(':').next().unwrap_or(v).to_string());
        let text = response.text().await.unwrap_or_default();
        let (code, message) = parse_error_body(&text);

        Err(CloudError::Service {
            service,
            status,
            code: error_type.or(code).unwrap_or_else(|| "Unknown".to_string()),
            message: message.unwrap_or(text),
        })
    }
}

/// Pull `Code`/`Message` out of an XML (query, S3) or JSON (Lambda) error body.
fn parse_error_body(body: &str) -> (Option<String>, Option<String>) {
    if let Ok(doc) = roxmltree::Document::parse(body) {
        return (
            xml_text(&doc, "Code").map(str::to_string),
            xml_text(&doc, "Message").map(str::to_string),
        );
    }
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| json.get(*n).and_then(|v| v.as_str()))
                .map(str::to_string)
        };
        return (field(&["__type", "Type", "code"]), field(&["message", "Message"]));
    }
    (None, None)
}

/// Text of the first element named `tag`, ignoring namespaces.
pub(crate) fn xml_text<'a>(doc: &'a roxmltree::Document<'_>, tag: &str) -> Option<&'a str> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
        .and_then(|n| n.text())
}

/// Form-encode query-protocol parameters.
pub(crate) fn form_body(params: &[(&str, &str)]) -> Vec<u8> {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
        .into_bytes()
}

pub(crate) fn form_headers() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "content-type".to_string(),
        "application/x-www-form-urlencoded; charset=utf-8".to_string(),
    )])
}

/// AWS cloud provider.
pub struct AwsProvider {
    base: AwsHttp,
    iam_role_name: String,
    endpoint_override: Option<Url>,
}

impl AwsProvider {
    /// Create a provider from worker configuration and the worker's own credentials.
    pub fn new(config: &WorkerConfig, credentials: Credentials) -> Result<Self, CloudError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CloudError::Http(e.to_string()))?;

        Ok(Self {
            base: AwsHttp {
                http,
                credentials,
                region: config.region.clone(),
            },
            iam_role_name: config.iam_role_name.clone(),
            endpoint_override: None,
        })
    }

    /// Create a provider using `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.
    pub fn from_env(config: &WorkerConfig) -> Result<Self, ConfigError> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| ConfigError::MissingEnvVar("AWS_ACCESS_KEY_ID"))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("AWS_SECRET_ACCESS_KEY"))?;
        let mut credentials = Credentials::new(access_key_id, secret_access_key);
        credentials.session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Self::new(config, credentials).map_err(|e| ConfigError::InvalidValue {
            name: "AWS_ACCESS_KEY_ID",
            reason: e.to_string(),
        })
    }

    /// Send every service call to `endpoint` instead of the regional endpoints.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, CloudError> {
        let url = Url::parse(endpoint)
            .map_err(|e| CloudError::Other(format!("invalid endpoint {endpoint}: {e}")))?;
        self.endpoint_override = Some(url);
        Ok(self)
    }

    fn endpoint(&self, service: &str, region: &str) -> Result<Url, CloudError> {
        if let Some(url) = &self.endpoint_override {
            return Ok(url.clone());
        }
        let raw = format!("https://{service}.{region}.amazonaws.com/");
        Url::parse(&raw).map_err(|e| CloudError::Other(format!("invalid endpoint {raw}: {e}")))
    }

    fn role_arn(&self, tenant_id: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", tenant_id, self.iam_role_name)
    }

    fn session_http(&self, session: DelegatedSession) -> Arc<AwsHttp> {
        Arc::new(AwsHttp {
            http: self.base.http.clone(),
            credentials: session.credentials,
            region: session.region,
        })
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn provider_type(&self) -> &'static str {
        "aws"
    }

    async fn assume_role(
        &self,
        tenant_id: &str,
        duration: Duration,
    ) -> Result<DelegatedSession, CloudError> {
        let endpoint = self.endpoint("sts", &self.base.region)?;
        let role_arn = self.role_arn(tenant_id);
        let session_name = format!("{}-{}", tenant_id, uuid::Uuid::new_v4());

        let credentials = sts::assume_role(
            &self.base,
            endpoint,
            &role_arn,
            &session_name,
            duration.as_secs(),
        )
        .await?;

        Ok(DelegatedSession {
            tenant_id: tenant_id.to_string(),
            region: self.base.region.clone(),
            credentials: credentials.credentials,
            expiration: credentials.expiration,
        })
    }

    fn function_client(
        &self,
        session: DelegatedSession,
    ) -> Result<Arc<dyn FunctionClient>, CloudError> {
        let endpoint = self.endpoint("lambda", &session.region)?;
        Ok(Arc::new(LambdaClient::new(self.session_http(session), endpoint)))
    }

    fn object_store(&self, session: DelegatedSession) -> Result<Arc<dyn ObjectStore>, CloudError> {
        let endpoint = self.endpoint("s3", &session.region)?;
        Ok(Arc::new(S3Client::new(self.session_http(session), endpoint)))
    }

    fn topic_client(&self, session: DelegatedSession) -> Result<Arc<dyn TopicClient>, CloudError> {
        let endpoint = self.endpoint("sns", &session.region)?;
        Ok(Arc::new(SnsClient::new(self.session_http(session), endpoint)))
    }

    fn queue_client(&self, session: DelegatedSession) -> Result<Arc<dyn QueueClient>, CloudError> {
        Ok(Arc::new(SqsClient::new(self.session_http(session))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_error_body() {
        let body = r#"<ErrorResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <Error>
    <Type>Sender</Type>
    <Code>AccessDenied</Code>
    <Message>User is not authorized to perform: sts:AssumeRole</Message>
  </Error>
  <RequestId>4a1c0c6e</RequestId>
</ErrorResponse>"#;
        let (code, message) = parse_error_body(body);
        assert_eq!(code.as_deref(), Some("AccessDenied"));
        assert_eq!(
            message.as_deref(),
            Some("User is not authorized to perform: sts:AssumeRole")
        );
    }

    #[test]
    fn test_parse_json_error_body() {
        let body = r#"{"Type":"User","message":"Function not found: arn:aws:lambda:us-west-2:1:function:x"}"#;
        let (code, message) = parse_error_body(body);
        assert_eq!(code.as_deref(), Some("User"));
        assert!(message.unwrap().starts_with("Function not found"));
    }

    #[test]
    fn test_form_body_encodes_values() {
        let body = form_body(&[("Action", "Publish"), ("Message", "a b&c")]);
        assert_eq!(String::from_utf8(body).unwrap(), "Action=Publish&Message=a%20b%26c");
    }

    #[test]
    fn test_role_arn_format() {
        let config = WorkerConfig::new("us-west-2", "REFINERY_ROLE");
        let provider = AwsProvider::new(&config, Credentials::new("AKID", "SECRET")).unwrap();
        assert_eq!(
            provider.role_arn("123456789012"),
            "arn:aws:iam::123456789012:role/REFINERY_ROLE"
        );
    }
}
