//! Task and result envelopes.
//!
//! Field names are lowercase on the wire; PascalCase and upper-case
//! spellings are accepted on input so peers using other naming conventions
//! can still talk to us.

use netbridge_core::correlation::CorrelationId;
use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};

/// A unit of work sent from the coordinator to one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope<P> {
    #[serde(alias = "Id", alias = "ID")]
    pub id: CorrelationId,
    #[serde(alias = "Payload", alias = "PAYLOAD")]
    pub payload: P,
}

impl<P> TaskEnvelope<P> {
    pub const fn new(id: CorrelationId, payload: P) -> Self {
        Self { id, payload }
    }
}

/// What a worker's handler produced.
///
/// Serialized as `{"status":"completed","value":R}` or
/// `{"status":"failed","value":"message"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum TaskOutcome<R> {
    #[serde(alias = "Completed", alias = "COMPLETED")]
    Completed(R),
    #[serde(alias = "Failed", alias = "FAILED")]
    Failed(String),
}

impl<R> TaskOutcome<R> {
    pub fn into_result(self) -> Result<R, String> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(message) => Err(message),
        }
    }
}

/// A worker's answer to exactly one [`TaskEnvelope`], matched by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope<R> {
    #[serde(alias = "Id", alias = "ID")]
    pub id: CorrelationId,
    #[serde(alias = "Result", alias = "RESULT")]
    pub result: TaskOutcome<R>,
}

impl<R> ResultEnvelope<R> {
    pub const fn completed(id: CorrelationId, value: R) -> Self {
        Self {
            id,
            result: TaskOutcome::Completed(value),
        }
    }

    pub fn failed(id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            id,
            result: TaskOutcome::Failed(message.into()),
        }
    }
}

#[derive(Deserialize)]
struct Header {
    #[serde(alias = "Id", alias = "ID")]
    id: CorrelationId,
}

/// Read only the correlation id of an envelope body, ignoring its payload.
///
/// Used to attribute frames whose payload does not match the expected type.
pub fn peek_id(body: &[u8]) -> Result<CorrelationId, CodecError> {
    codec::decode_payload::<Header>(body).map(|h| h.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_envelope_shape() {
        let id = CorrelationId::next();
        let envelope = TaskEnvelope::new(id, json!({"op": "add", "a": 1, "b": 2}));
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({"id": id.to_string(), "payload": {"op": "add", "a": 1, "b": 2}})
        );
    }

    #[test]
    fn test_result_envelope_shape() {
        let id = CorrelationId::next();

        let ok = serde_json::to_value(ResultEnvelope::completed(id, 42)).unwrap();
        assert_eq!(
            ok,
            json!({"id": id.to_string(), "result": {"status": "completed", "value": 42}})
        );

        let failed = serde_json::to_value(ResultEnvelope::<i32>::failed(id, "division by zero"))
            .unwrap();
        assert_eq!(
            failed,
            json!({"id": id.to_string(), "result": {"status": "failed", "value": "division by zero"}})
        );
    }

    #[test]
    fn test_accepts_pascal_case() {
        let id = CorrelationId::next();
        let text = format!(r#"{{"Id":"{id}","Result":{{"status":"Completed","value":7}}}}"#);
        let envelope: ResultEnvelope<i32> = serde_json::from_str(&text).unwrap();
        assert_eq!(envelope, ResultEnvelope::completed(id, 7));

        let text = format!(r#"{{"ID":"{id}","Payload":[1,2]}}"#);
        let task: TaskEnvelope<Vec<u8>> = serde_json::from_str(&text).unwrap();
        assert_eq!(task.payload, vec![1, 2]);
    }

    #[test]
    fn test_peek_id_ignores_payload_type() {
        let id = CorrelationId::next();
        let frame = codec::encode(&ResultEnvelope::completed(id, "not a number")).unwrap();
        assert_eq!(peek_id(&frame[codec::HEADER_LEN..]).unwrap(), id);
        assert!(codec::decode::<ResultEnvelope<u64>>(&frame).is_err());
    }

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(TaskOutcome::Completed(1).into_result(), Ok(1));
        assert_eq!(
            TaskOutcome::<i32>::Failed("boom".into()).into_result(),
            Err("boom".to_string())
        );
    }
}
