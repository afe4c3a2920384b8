//! Backend payload normalization
//!
//! Client request bodies are projected onto a fixed whitelist of fields.
//! Unknown fields are dropped, whitelisted fields that are missing or not
//! strings become `null`, and only a body that is not a JSON object is
//! rejected.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a request body could not be normalized
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("request body must be a JSON object")]
    NotAnObject,
}

/// Body posted to `{backend}/runner`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerPayload {
    pub action: String,
    pub code: Option<String>,
    pub language_version: Option<String>,
    pub candidate_id: Option<String>,
    pub candidate_name: Option<String>,
    pub candidate_email: Option<String>,
    pub assignment_id: Option<String>,
    pub assignment_name: Option<String>,
}

/// Whitelisted request fields, version 1 of the intake schema
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFields {
    #[serde(default, deserialize_with = "lenient_string")]
    code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    language_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    candidate_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    candidate_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    candidate_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    assignment_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    assignment_name: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

impl RunnerPayload {
    /// Normalizes a raw client request body for `action`
    pub fn from_request(action: &str, body: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(PayloadError::NotAnObject);
        }

        let fields: RequestFields = serde_json::from_value(value)?;

        Ok(Self {
            action: action.trim().to_string(),
            code: fields.code,
            language_version: fields.language_version,
            candidate_id: fields.candidate_id,
            candidate_name: fields.candidate_name,
            candidate_email: fields.candidate_email,
            assignment_id: fields.assignment_id,
            assignment_name: fields.assignment_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_projects_whitelisted_fields() {
        let body = br#"{"code":"print(1)","languageVersion":"3.12","candidateId":"c-1","extra":42}"#;
        let payload = RunnerPayload::from_request(" compile ", body).unwrap();

        assert_eq!(payload.action, "compile");
        assert_eq!(payload.code.as_deref(), Some("print(1)"));
        assert_eq!(payload.language_version.as_deref(), Some("3.12"));
        assert_eq!(payload.candidate_id.as_deref(), Some("c-1"));
        assert_eq!(payload.assignment_name, None);
    }

    #[test]
    fn test_missing_fields_serialize_as_null() {
        let payload = RunnerPayload::from_request("run", b"{}").unwrap();
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            value,
            json!({
                "action": "run",
                "code": null,
                "languageVersion": null,
                "candidateId": null,
                "candidateName": null,
                "candidateEmail": null,
                "assignmentId": null,
                "assignmentName": null
            })
        );
    }

    #[test]
    fn test_non_string_values_are_treated_as_missing() {
        let body = br#"{"code":123,"candidateName":{"first":"a"},"assignmentId":null}"#;
        let payload = RunnerPayload::from_request("analyse", body).unwrap();
        assert_eq!(payload.code, None);
        assert_eq!(payload.candidate_name, None);
        assert_eq!(payload.assignment_id, None);
    }

    #[test]
    fn test_rejects_malformed_bodies() {
        assert!(matches!(
            RunnerPayload::from_request("run", b"{not json"),
            Err(PayloadError::InvalidJson(_))
        ));
        assert!(matches!(
            RunnerPayload::from_request("run", b"[1,2]"),
            Err(PayloadError::NotAnObject)
        ));
        assert!(RunnerPayload::from_request("run", b"").is_err());
    }
}
