// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decoding of function invocation payloads.
//!
//! Function payloads are untrusted and loosely shaped. Decoding is two-stage:
//!
//! 1. If the bytes are a JSON string, unwrap it once (functions that
//!    double-encode their output).
//! 2. Decode the result as a JSON object and pick the recognized fields.
//!
//! `result` and `backpack` always come out as serialized JSON text; a field
//! that is absent, `null` or empty becomes [`EMPTY_OBJECT`], so callers never
//! distinguish "missing" from "empty".

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use thiserror::Error;

/// Canonical empty payload.
pub const EMPTY_OBJECT: &str = "{}";

/// Infrastructure lines the function service adds to every log tail.
const LOG_BOILERPLATE: [&str; 4] = [
    "START RequestId: ",
    "END RequestId: ",
    "REPORT RequestId: ",
    "XRAY TraceId: ",
];

/// The payload could not be decoded into a response object.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Not JSON at all
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but not an object
    #[error("payload is a JSON {0}, expected an object")]
    NotAnObject(&'static str),
}

/// Canonical view of a function response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedResponse {
    /// Result payload, serialized
    pub result: String,
    /// Backpack returned by the function, serialized
    pub backpack: String,
    /// Error type reported by the function
    pub error_type: Option<String>,
    /// Error message reported by the function
    pub error_message: Option<String>,
    /// Stack trace lines reported by the function
    pub error_trace: Vec<String>,
}

impl Default for ClassifiedResponse {
    fn default() -> Self {
        Self {
            result: EMPTY_OBJECT.to_string(),
            backpack: EMPTY_OBJECT.to_string(),
            error_type: None,
            error_message: None,
            error_trace: Vec::new(),
        }
    }
}

impl ClassifiedResponse {
    /// Whether the function reported an application error.
    pub fn is_error(&self) -> bool {
        self.error_message.is_some() || self.error_type.is_some()
    }

    /// Human-readable error text: the message, else the type.
    pub fn error_text(&self) -> Option<&str> {
        self.error_message
            .as_deref()
            .or(self.error_type.as_deref())
    }

    /// Type, message and trace, one per line.
    pub fn error_report(&self) -> String {
        let mut lines = vec![
            self.error_type.clone().unwrap_or_default(),
            self.error_message.clone().unwrap_or_default(),
        ];
        lines.extend(self.error_trace.iter().cloned());
        lines.join("\n")
    }
}

/// Decode a raw invocation payload.
pub fn classify(raw: &[u8]) -> Result<ClassifiedResponse, ClassifyError> {
    let unwrapped: Option<String> = serde_json::from_slice(raw).ok();
    let value: Value = match &unwrapped {
        Some(inner) => serde_json::from_str(inner)?,
        None => serde_json::from_slice(raw)?,
    };

    let fields = match value {
        Value::Object(map) => map,
        other => return Err(ClassifyError::NotAnObject(json_type(&other))),
    };

    Ok(ClassifiedResponse {
        result: payload_field(&fields, "result"),
        backpack: payload_field(&fields, "backpack"),
        error_type: text_field(&fields, "errorType"),
        error_message: text_field(&fields, "errorMessage"),
        error_trace: trace_field(&fields),
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn payload_field(fields: &Map<String, Value>, name: &str) -> String {
    match fields.get(name) {
        None | Some(Value::Null) => EMPTY_OBJECT.to_string(),
        Some(Value::String(s)) if s.is_empty() => EMPTY_OBJECT.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn text_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn trace_field(fields: &Map<String, Value>) -> Vec<String> {
    let trace = fields.get("stackTrace").or_else(|| fields.get("errorTrace"));
    match trace {
        Some(Value::Array(lines)) => lines
            .iter()
            .map(|line| match line {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => s.lines().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Decode a base64 log tail and drop the service's boilerplate lines.
///
/// Every kept line is terminated with `\n`. Undecodable input yields an empty
/// string.
pub fn filter_log_output(log_result: Option<&str>) -> String {
    let Some(encoded) = log_result else {
        return String::new();
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return String::new();
    };

    let text = String::from_utf8_lossy(&decoded);
    let mut output = String::with_capacity(text.len());
    for line in text.lines() {
        if LOG_BOILERPLATE.iter().any(|prefix| line.starts_with(prefix)) {
            continue;
        }
        output.push_str(line);
        output.push('\n');
    }
    output
}

/// Build the `{"block_input", "backpack"}` request sent to a function.
///
/// Values that parse as JSON are embedded as-is; anything else is embedded as
/// a JSON string. Empty values become `{}`.
pub fn compute_input(data: &str, backpack: &str) -> Vec<u8> {
    serde_json::json!({
        "block_input": embed(data),
        "backpack": embed(backpack),
    })
    .to_string()
    .into_bytes()
}

fn embed(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_input_is_stable() {
        let classified =
            classify(br#"{"result":"{}","backpack":"{}","errorMessage":""}"#).unwrap();
        assert_eq!(classified.result, "{}");
        assert_eq!(classified.backpack, "{}");
        assert!(!classified.is_error());
    }

    #[test]
    fn test_double_encoded_payload_is_unwrapped() {
        let raw = br#""{\"result\":\"{\\\"a\\\":1}\"}""#;
        let classified = classify(raw).unwrap();
        assert_eq!(classified.result, r#"{"a":1}"#);
        assert_eq!(classified.backpack, EMPTY_OBJECT);
    }

    #[test]
    fn test_structured_fields_are_serialized() {
        let classified = classify(br#"{"result":{"x":[1,2]},"backpack":{"n":3}}"#).unwrap();
        assert_eq!(classified.result, r#"{"x":[1,2]}"#);
        assert_eq!(classified.backpack, r#"{"n":3}"#);
    }

    #[test]
    fn test_missing_and_null_fields_default_to_empty_object() {
        let classified = classify(br#"{"result":null,"unrelated":true}"#).unwrap();
        assert_eq!(classified, ClassifiedResponse::default());
    }

    #[test]
    fn test_error_fields() {
        let classified = classify(
            br#"{"errorMessage":"boom","errorType":"ValueError","stackTrace":["a.py:1","b.py:2"],"backpack":{"x":1}}"#,
        )
        .unwrap();
        assert!(classified.is_error());
        assert_eq!(classified.error_text(), Some("boom"));
        assert_eq!(classified.error_report(), "ValueError\nboom\na.py:1\nb.py:2");
    }

    #[test]
    fn test_error_type_alone_is_an_error() {
        let classified = classify(br#"{"errorType":"Runtime.ExitError"}"#).unwrap();
        assert!(classified.is_error());
        assert_eq!(classified.error_text(), Some("Runtime.ExitError"));
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        assert!(matches!(classify(b"not json"), Err(ClassifyError::Json(_))));
        assert!(matches!(
            classify(b"[1,2]"),
            Err(ClassifyError::NotAnObject("array"))
        ));
        assert!(matches!(classify(br#""plain text""#), Err(ClassifyError::Json(_))));
    }

    #[test]
    fn test_filter_log_output() {
        let log = "START RequestId: 1 Version: $LATEST\n\
                   hello\n\
                   XRAY TraceId: 1-abc\n\
                   world\n\
                   END RequestId: 1\n\
                   REPORT RequestId: 1 Duration: 1.00 ms\n";
        let encoded = STANDARD.encode(log);
        assert_eq!(filter_log_output(Some(&encoded)), "hello\nworld\n");
    }

    #[test]
    fn test_filter_log_output_undecodable() {
        assert_eq!(filter_log_output(Some("%%% not base64")), "");
        assert_eq!(filter_log_output(None), "");
    }

    #[test]
    fn test_compute_input() {
        let input: Value = serde_json::from_slice(&compute_input(r#"{"a":1}"#, "")).unwrap();
        assert_eq!(input, serde_json::json!({"block_input": {"a": 1}, "backpack": {}}));

        let input: Value = serde_json::from_slice(&compute_input("raw text", r#"{"b":2}"#)).unwrap();
        assert_eq!(
            input,
            serde_json::json!({"block_input": "raw text", "backpack": {"b": 2}})
        );
    }
}
