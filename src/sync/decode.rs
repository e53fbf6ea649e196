//! Strict decoding of raw snapshot documents into tasks.
//!
//! Each field has one enumerated action for when it is absent or has the
//! wrong type. Violations that cannot be defaulted always drop the document:
//! an empty id, a blank title, or an owner other than the subscribed one.

use crate::error::{Result, SyncError};
use crate::types::{
    Document, Task, Timestamp, FIELD_CREATED_AT, FIELD_DESCRIPTION, FIELD_OWNER_ID, FIELD_TITLE,
    FIELD_UPDATED_AT,
};
use serde_json::Value;
use std::collections::HashSet;

/// What to do with a field that is absent or unparseable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingField {
    /// Drop the whole document.
    Drop,
    /// Substitute the field's default.
    Default,
}

/// Per-field decode actions.
///
/// Defaults:
/// - `title`: drop
/// - `description`: default to `""`
/// - `created_at`: default to [`Timestamp::ZERO`]
/// - `updated_at`: default to the creation time
/// - `owner_id`: default to the subscribed owner
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodePolicy {
    pub title: MissingField,
    pub description: MissingField,
    pub created_at: MissingField,
    pub updated_at: MissingField,
    pub owner_id: MissingField,
}

impl Default for DecodePolicy {
    fn default() -> Self {
        Self {
            title: MissingField::Drop,
            description: MissingField::Default,
            created_at: MissingField::Default,
            updated_at: MissingField::Default,
            owner_id: MissingField::Default,
        }
    }
}

impl DecodePolicy {
    /// Drop any document with a missing field.
    pub fn strict() -> Self {
        Self {
            title: MissingField::Drop,
            description: MissingField::Drop,
            created_at: MissingField::Drop,
            updated_at: MissingField::Drop,
            owner_id: MissingField::Drop,
        }
    }
}

/// A document rejected during decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedDocument {
    pub id: String,
    pub reason: String,
}

/// Outcome of decoding one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Decoded tasks in delivery order.
    pub tasks: Vec<Task>,
    pub dropped: Vec<DroppedDocument>,
}

/// Decode every document of a snapshot for `owner_id`.
///
/// Later duplicates of an id are dropped. Dropped documents are logged.
pub fn decode_snapshot(documents: Vec<Document>, owner_id: &str, policy: &DecodePolicy) -> DecodeReport {
    let mut report = DecodeReport::default();
    let mut seen = HashSet::new();

    for document in documents {
        let id = document.id.clone();
        let decoded = if seen.contains(&id) {
            Err(SyncError::Decode("duplicate id in snapshot".into()))
        } else {
            decode_document(document, owner_id, policy)
        };

        match decoded {
            Ok(task) => {
                seen.insert(id);
                report.tasks.push(task);
            }
            Err(e) => {
                tracing::warn!(task_id = %id, owner = %owner_id, error = %e, "Dropping snapshot document");
                report.dropped.push(DroppedDocument {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    report
}

/// Decode a single document.
pub fn decode_document(document: Document, owner_id: &str, policy: &DecodePolicy) -> Result<Task> {
    if document.id.is_empty() {
        return Err(SyncError::Decode("empty id".into()));
    }
    let fields = &document.fields;

    let title = match fields.get(FIELD_TITLE).and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => or_default(policy.title, FIELD_TITLE, String::new())?,
    };
    if title.trim().is_empty() {
        return Err(SyncError::Decode("blank title".into()));
    }

    let description = match fields.get(FIELD_DESCRIPTION).and_then(Value::as_str) {
        Some(d) => d.to_string(),
        None => or_default(policy.description, FIELD_DESCRIPTION, String::new())?,
    };

    let owner = match fields.get(FIELD_OWNER_ID).and_then(Value::as_str) {
        Some(o) if o != owner_id => {
            return Err(SyncError::Decode(format!("owned by {}", o)));
        }
        Some(o) => o.to_string(),
        None => or_default(policy.owner_id, FIELD_OWNER_ID, owner_id.to_string())?,
    };

    let created_at = match fields.get(FIELD_CREATED_AT).and_then(Timestamp::from_value) {
        Some(ts) => ts,
        None => or_default(policy.created_at, FIELD_CREATED_AT, Timestamp::ZERO)?,
    };

    let updated_at = match fields.get(FIELD_UPDATED_AT).and_then(Timestamp::from_value) {
        Some(ts) => ts.max(created_at),
        None => or_default(policy.updated_at, FIELD_UPDATED_AT, created_at)?,
    };

    Ok(Task {
        id: document.id,
        title,
        description,
        created_at,
        updated_at,
        owner_id: owner,
    })
}

fn or_default<T>(action: MissingField, field: &str, default: T) -> Result<T> {
    match action {
        MissingField::Default => Ok(default),
        MissingField::Drop => Err(SyncError::Decode(format!("missing or invalid {}", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn document(id: &str, fields: Value) -> Document {
        match fields {
            Value::Object(map) => Document::new(id, map),
            _ => Document::new(id, Map::new()),
        }
    }

    #[test]
    fn test_full_document_decodes() {
        let doc = document(
            "a",
            json!({
                "title": "Ship",
                "description": "it",
                "createdAt": {"seconds": 10, "nanoseconds": 0},
                "updatedAt": {"seconds": 12, "nanoseconds": 0},
                "ownerId": "u1"
            }),
        );
        let task = decode_document(doc, "u1", &DecodePolicy::default()).unwrap();

        assert_eq!(task.title, "Ship");
        assert_eq!(task.created_at, Timestamp(10_000_000));
        assert_eq!(task.updated_at, Timestamp(12_000_000));
    }

    #[test]
    fn test_defaults_applied() {
        let doc = document("a", json!({"title": "Only title"}));
        let task = decode_document(doc, "u1", &DecodePolicy::default()).unwrap();

        assert_eq!(task.description, "");
        assert_eq!(task.created_at, Timestamp::ZERO);
        assert_eq!(task.updated_at, Timestamp::ZERO);
        assert_eq!(task.owner_id, "u1");
    }

    #[test]
    fn test_unparseable_created_at_is_zero() {
        let doc = document("a", json!({"title": "t", "createdAt": "not a time"}));
        let task = decode_document(doc, "u1", &DecodePolicy::default()).unwrap();
        assert_eq!(task.created_at, Timestamp::ZERO);
    }

    #[test]
    fn test_updated_before_created_is_clamped() {
        let doc = document(
            "a",
            json!({"title": "t", "createdAt": {"seconds": 20}, "updatedAt": {"seconds": 5}}),
        );
        let task = decode_document(doc, "u1", &DecodePolicy::default()).unwrap();
        assert_eq!(task.updated_at, task.created_at);
    }

    #[test]
    fn test_foreign_owner_dropped() {
        let doc = document("a", json!({"title": "t", "ownerId": "u2"}));
        assert!(decode_document(doc, "u1", &DecodePolicy::default()).is_err());
    }

    #[test]
    fn test_missing_or_blank_title_dropped() {
        let policy = DecodePolicy::default();
        assert!(decode_document(document("a", json!({})), "u1", &policy).is_err());
        assert!(decode_document(document("a", json!({"title": "  "})), "u1", &policy).is_err());
        assert!(decode_document(document("a", json!({"title": 7})), "u1", &policy).is_err());
    }

    #[test]
    fn test_strict_policy_drops_missing_timestamp() {
        let doc = document("a", json!({"title": "t", "description": "", "ownerId": "u1"}));
        assert!(decode_document(doc, "u1", &DecodePolicy::strict()).is_err());
    }

    #[test]
    fn test_snapshot_report_and_duplicates() {
        let docs = vec![
            document("a", json!({"title": "first"})),
            document("", json!({"title": "no id"})),
            document("a", json!({"title": "again"})),
            document("b", json!({"title": "second"})),
        ];
        let report = decode_snapshot(docs, "u1", &DecodePolicy::default());

        let ids: Vec<&str> = report.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(report.tasks[0].title, "first");
        assert_eq!(report.dropped.len(), 2);
    }
}
