// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

use crate::cloud::{CloudError, Credentials};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// A request about to be sent, with headers keyed by lowercase name.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    /// HTTP method
    pub method: &'a str,
    /// Full request URL, path segments already percent-encoded
    pub url: &'a Url,
    /// Headers to sign; signing adds `host`, `x-amz-date`, and friends
    pub headers: BTreeMap<String, String>,
    /// Request body
    pub body: &'a [u8],
}

/// Scope the signature is computed for.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    /// Credentials used to derive the signing key
    pub credentials: &'a Credentials,
    /// Region of the endpoint
    pub region: &'a str,
    /// Signing name of the service ("sts", "lambda", "s3", ...)
    pub service: &'a str,
    /// Request time
    pub time: DateTime<Utc>,
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CloudError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| CloudError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// URI-encode with the unreserved set AWS expects (`A-Za-z0-9-_.~`).
fn aws_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// S3 signs the path as sent; every other service encodes each segment again.
fn canonical_uri(url: &Url, service: &str) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    if service == "s3" {
        return path.to_string();
    }
    path.split('/').map(aws_encode).collect::<Vec<_>>().join("/")
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (aws_encode(&k), aws_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(url: &Url) -> Result<String, CloudError> {
    let host = url
        .host_str()
        .ok_or_else(|| CloudError::Signing(format!("URL has no host: {url}")))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Sign `request` in place, adding the `authorization` header.
pub fn sign(request: &mut SignableRequest<'_>, params: &SigningParams<'_>) -> Result<(), CloudError> {
    let amz_date = params.time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = params.time.format("%Y%m%d").to_string();
    let payload_hash = sha256_hex(request.body);

    request
        .headers
        .insert("host".to_string(), host_header(request.url)?);
    request
        .headers
        .insert("x-amz-date".to_string(), amz_date.clone());
    if params.service == "s3" {
        request
            .headers
            .insert("x-amz-content-sha256".to_string(), payload_hash.clone());
    }
    if let Some(token) = &params.credentials.session_token {
        request
            .headers
            .insert("x-amz-security-token".to_string(), token.clone());
    }

    let mut canonical_headers = String::new();
    for (name, value) in &request.headers {
        canonical_headers.push_str(&name.to_ascii_lowercase());
        canonical_headers.push(':');
        canonical_headers.push_str(value.trim());
        canonical_headers.push('\n');
    }
    let signed_headers = request
        .headers
        .keys()
        .map(|k| k.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        canonical_uri(request.url, params.service),
        canonical_query(request.url),
        canonical_headers,
        signed_headers,
        payload_hash
    );

    let scope = format!("{date}/{}/{}/aws4_request", params.region, params.service);
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        sha256_hex(canonical_request.as_bytes())
    );

    let secret = format!("AWS4{}", params.credentials.secret_access_key);
    let k_date = hmac(secret.as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, params.region.as_bytes())?;
    let k_service = hmac(&k_region, params.service.as_bytes())?;
    let k_signing = hmac(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes())?);

    request.headers.insert(
        "authorization".to_string(),
        format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            params.credentials.access_key_id
        ),
    );
    Ok(())
}
