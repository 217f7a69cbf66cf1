// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! STS `AssumeRole` over the query protocol.

use chrono::{DateTime, Utc};
use reqwest::Method;
use tracing::info;
use url::Url;

use super::{AwsHttp, form_body, form_headers, xml_text};
use crate::cloud::{CloudError, Credentials};

const SERVICE: &str = "sts";

/// Temporary credentials and their expiry.
pub(super) struct AssumedCredentials {
    pub credentials: Credentials,
    pub expiration: DateTime<Utc>,
}

pub(super) async fn assume_role(
    http: &AwsHttp,
    endpoint: Url,
    role_arn: &str,
    session_name: &str,
    duration_secs: u64,
) -> Result<AssumedCredentials, CloudError> {
    let duration = duration_secs.to_string();
    let body = form_body(&[
        ("Action", "AssumeRole"),
        ("Version", "2011-06-15"),
        ("RoleArn", role_arn),
        ("RoleSessionName", session_name),
        ("DurationSeconds", &duration),
    ]);

    let response = http
        .send(SERVICE, Method::POST, endpoint, form_headers(), body)
        .await?;
    let text = response
        .text()
        .await
        .map_err(|e| CloudError::Http(e.to_string()))?;

    let assumed = parse_assume_role_response(&text)?;
    info!(role_arn, expiration = %assumed.expiration, "Assumed tenant role");
    Ok(assumed)
}

fn parse_assume_role_response(body: &str) -> Result<AssumedCredentials, CloudError> {
    let invalid = |message: String| CloudError::InvalidResponse {
        service: SERVICE,
        message,
    };

    let doc = roxmltree::Document::parse(body).map_err(|e| invalid(e.to_string()))?;
    let field = |tag: &'static str| {
        xml_text(&doc, tag)
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("missing {tag}")))
    };

    let access_key_id = field("AccessKeyId")?;
    let secret_access_key = field("SecretAccessKey")?;
    let session_token = field("SessionToken")?;
    let expiration = field("Expiration")?;
    let expiration = DateTime::parse_from_rfc3339(&expiration)
        .map_err(|e| invalid(format!("bad Expiration {expiration:?}: {e}")))?
        .with_timezone(&Utc);

    Ok(AssumedCredentials {
        credentials: Credentials {
            access_key_id,
            secret_access_key,
            session_token: Some(session_token),
        },
        expiration,
    })
}
