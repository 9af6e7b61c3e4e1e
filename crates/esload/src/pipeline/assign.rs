//! Identifier assignment for raw records.
//!
//! Every record either carries its id in a designated field (promoted out of
//! the field map) or receives the next value of a monotonic counter. The
//! reserved `_id` field is never promoted implicitly: unless it is the
//! designated id field it is dropped from the record, matching what the
//! store would otherwise reject as a metafield collision.

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::ingestion::RawRecord;

/// Field name colliding with the store's built-in document id.
pub const RESERVED_ID_FIELD: &str = "_id";

/// The unit of data loaded into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: RawRecord,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignError {
    #[error("id field `{field}` missing from record")]
    MissingIdField { field: String },
    #[error("id field `{field}` holds a {kind} value, expected a scalar")]
    UnsupportedIdValue { field: String, kind: &'static str },
    #[error("id field `{field}` is empty")]
    EmptyId { field: String },
}

/// Assigns document ids, owning the counter state for one run.
#[derive(Debug)]
pub struct IdAssigner {
    id_field: Option<String>,
    next_id: u64,
}

impl IdAssigner {
    pub fn new(id_field: Option<String>, start_from: u64) -> Self {
        Self {
            id_field,
            next_id: start_from,
        }
    }

    /// Turn a raw record into a [`Document`].
    ///
    /// The counter advances only after a successful assignment, so counter
    /// ids stay contiguous: a skipped record never burns a value.
    pub fn assign(&mut self, mut record: RawRecord) -> Result<Document, AssignError> {
        match &self.id_field {
            Some(field) => {
                let value = record
                    .remove(field)
                    .ok_or_else(|| AssignError::MissingIdField {
                        field: field.clone(),
                    })?;
                let id = coerce_id(field, value)?;
                if field.as_str() != RESERVED_ID_FIELD {
                    record.remove(RESERVED_ID_FIELD);
                }
                Ok(Document { id, fields: record })
            }
            None => {
                record.remove(RESERVED_ID_FIELD);
                let id = self.next_id.to_string();
                self.next_id += 1;
                Ok(Document { id, fields: record })
            }
        }
    }
}

/// Scalar-to-string coercion used only for identifier extraction.
fn coerce_id(field: &str, value: JsonValue) -> Result<String, AssignError> {
    let kind = match value {
        JsonValue::String(id) => {
            return if id.trim().is_empty() {
                Err(AssignError::EmptyId {
                    field: field.to_string(),
                })
            } else {
                Ok(id)
            };
        }
        JsonValue::Number(n) => return Ok(n.to_string()),
        JsonValue::Bool(b) => return Ok(b.to_string()),
        JsonValue::Null => "null",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    };
    Err(AssignError::UnsupportedIdValue {
        field: field.to_string(),
        kind,
    })
}
