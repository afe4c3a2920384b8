//! Work message carried by the jobs queue

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::operation::Operation;

/// Queue payload pointing at a job record.
///
/// Never a copy of job data, so it can be delivered and processed any
/// number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMessage {
    #[serde(alias = "Operation")]
    pub operation: Operation,
    #[serde(alias = "JobId")]
    pub job_id: Uuid,
}

impl WorkMessage {
    pub fn new(operation: Operation, job_id: Uuid) -> Self {
        Self { operation, job_id }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let id = Uuid::new_v4();
        let json = String::from_utf8(WorkMessage::new(Operation::Run, id).to_bytes().unwrap()).unwrap();
        assert_eq!(json, format!(r#"{{"operation":"run","jobId":"{}"}}"#, id));
    }

    #[test]
    fn test_accepts_pascal_case_keys_and_simple_ids() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"Operation":"compile","JobId":"{}"}}"#, id.simple());
        let msg = WorkMessage::from_bytes(raw.as_bytes()).unwrap();
        assert_eq!(msg, WorkMessage::new(Operation::Compile, id));
    }

    #[test]
    fn test_rejects_structurally_invalid_messages() {
        assert!(WorkMessage::from_bytes(b"not json").is_err());
        assert!(WorkMessage::from_bytes(br#"{"operation":"compile"}"#).is_err());
        assert!(WorkMessage::from_bytes(br#"{"operation":"deploy","jobId":"x"}"#).is_err());
    }
}
