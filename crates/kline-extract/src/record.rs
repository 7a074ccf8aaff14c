//! Keyed API records.

use crate::error::{ExtractError, ExtractResult};
use serde_json::{Map, Value};

/// One API record with its integer id split out.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: u64,
    /// The full JSON object, `id` included.
    pub payload: Map<String, Value>,
}

impl Record {
    pub fn into_value(self) -> Value {
        Value::Object(self.payload)
    }
}

impl TryFrom<Value> for Record {
    type Error = ExtractError;

    fn try_from(value: Value) -> ExtractResult<Self> {
        let payload = match value {
            Value::Object(payload) => payload,
            other => {
                return Err(ExtractError::InvalidResponse(format!(
                    "expected a JSON object, got {other}"
                )))
            }
        };
        let id = payload
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                ExtractError::InvalidResponse("record without a non-negative integer id".to_string())
            })?;
        Ok(Self { id, payload })
    }
}

/// Max id of a batch, `None` when empty.
pub fn max_id(records: &[Record]) -> Option<u64> {
    records.iter().map(|r| r.id).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_object() {
        let record = Record::try_from(json!({"id": 201, "price": "142.1"})).unwrap();
        assert_eq!(record.id, 201);
        assert_eq!(record.payload["price"], "142.1");
    }

    #[test]
    fn test_record_requires_integer_id() {
        for value in [json!({"price": "1"}), json!({"id": "7"}), json!({"id": -3}), json!([1, 2])] {
            assert!(matches!(
                Record::try_from(value),
                Err(ExtractError::InvalidResponse(_))
            ));
        }
    }
}
