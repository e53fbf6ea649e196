//! Core types for task synchronization.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wire name of the owner field.
pub const FIELD_OWNER_ID: &str = "ownerId";
/// Wire name of the title field.
pub const FIELD_TITLE: &str = "title";
/// Wire name of the description field.
pub const FIELD_DESCRIPTION: &str = "description";
/// Wire name of the creation timestamp.
pub const FIELD_CREATED_AT: &str = "createdAt";
/// Wire name of the last-mutation timestamp.
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// Microseconds since Unix epoch.
///
/// On the wire this is the store-native `{seconds, nanoseconds}` shape.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "WireTimestamp", into = "WireTimestamp")]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The epoch. Documents without a usable creation time sort as this.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }

    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis.saturating_mul(1000))
    }

    pub fn as_millis(self) -> i64 {
        self.0.div_euclid(1000)
    }

    /// Parse a timestamp field out of a raw document.
    ///
    /// Accepts the native `{seconds, nanoseconds}` object or a bare integer
    /// of milliseconds. Anything else is unparseable.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(obj) => {
                let seconds = obj.get("seconds")?.as_i64()?;
                let nanos = match obj.get("nanoseconds") {
                    Some(n) => n.as_i64()?,
                    None => 0,
                };
                Some(Timestamp::from(WireTimestamp {
                    seconds,
                    nanoseconds: nanos,
                }))
            }
            Value::Number(n) => n.as_i64().map(Timestamp::from_millis),
            _ => None,
        }
    }

    /// Native wire form of this timestamp.
    pub fn to_value(self) -> Value {
        let wire = WireTimestamp::from(self);
        serde_json::json!({ "seconds": wire.seconds, "nanoseconds": wire.nanoseconds })
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

#[derive(Serialize, Deserialize)]
struct WireTimestamp {
    seconds: i64,
    #[serde(default)]
    nanoseconds: i64,
}

impl From<WireTimestamp> for Timestamp {
    fn from(w: WireTimestamp) -> Self {
        Timestamp(
            w.seconds
                .saturating_mul(1_000_000)
                .saturating_add(w.nanoseconds / 1000),
        )
    }
}

impl From<Timestamp> for WireTimestamp {
    fn from(t: Timestamp) -> Self {
        WireTimestamp {
            seconds: t.0.div_euclid(1_000_000),
            nanoseconds: t.0.rem_euclid(1_000_000) * 1000,
        }
    }
}

/// Tag identifying one subscription session.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gen({})", self.0)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_profile(mut self, display_name: impl Into<String>, email: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self.email = Some(email.into());
        self
    }
}

/// A task as held in the local cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Opaque id (assigned by the store).
    pub id: String,
    pub title: String,
    pub description: String,
    /// Set once at creation.
    pub created_at: Timestamp,
    /// Bumped on every mutation.
    pub updated_at: Timestamp,
    /// Identity that created the task.
    pub owner_id: String,
}

/// Validated input for creating a task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
}

impl NewTask {
    /// Trim both fields and reject a blank title.
    pub fn new(title: &str, description: &str) -> Result<Self> {
        Ok(Self {
            title: validate_title(title)?,
            description: description.trim().to_string(),
        })
    }

    /// Fields written to the store for this task.
    pub fn to_fields(&self, owner_id: &str, now: Timestamp) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(FIELD_TITLE.into(), Value::String(self.title.clone()));
        fields.insert(
            FIELD_DESCRIPTION.into(),
            Value::String(self.description.clone()),
        );
        fields.insert(FIELD_CREATED_AT.into(), now.to_value());
        fields.insert(FIELD_UPDATED_AT.into(), now.to_value());
        fields.insert(FIELD_OWNER_ID.into(), Value::String(owner_id.to_string()));
        fields
    }
}

/// Partial update of a task's editable fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl TaskUpdate {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            description: None,
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            title: None,
            description: Some(description.into()),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Trimmed copy of this update. Fails if nothing is supplied or the
    /// supplied title is blank.
    pub fn validate(&self) -> Result<TaskUpdate> {
        if self.title.is_none() && self.description.is_none() {
            return Err(SyncError::InvalidInput("update names no fields".into()));
        }
        Ok(TaskUpdate {
            title: self.title.as_deref().map(validate_title).transpose()?,
            description: self.description.as_deref().map(|d| d.trim().to_string()),
        })
    }

    /// Only the supplied fields, plus a refreshed `updatedAt`.
    pub fn to_fields(&self, now: Timestamp) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(ref title) = self.title {
            fields.insert(FIELD_TITLE.into(), Value::String(title.clone()));
        }
        if let Some(ref description) = self.description {
            fields.insert(FIELD_DESCRIPTION.into(), Value::String(description.clone()));
        }
        fields.insert(FIELD_UPDATED_AT.into(), now.to_value());
        fields
    }
}

fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidInput("title must not be blank".into()));
    }
    Ok(trimmed.to_string())
}

/// A raw document as delivered by the remote store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Encode a task in its wire shape.
    pub fn from_task(task: &Task) -> Result<Self> {
        let mut fields = match serde_json::to_value(task)? {
            Value::Object(map) => map,
            other => {
                return Err(SyncError::Serialization(format!(
                    "task encoded as non-object: {}",
                    other
                )))
            }
        };
        fields.remove("id");
        Ok(Self {
            id: task.id.clone(),
            fields,
        })
    }

    /// Owner of this document, if the field is a string.
    pub fn owner_id(&self) -> Option<&str> {
        self.fields.get(FIELD_OWNER_ID).and_then(Value::as_str)
    }

    /// Creation time, if present and parseable.
    pub fn created_at(&self) -> Option<Timestamp> {
        self.fields.get(FIELD_CREATED_AT).and_then(Timestamp::from_value)
    }
}

/// Sort direction for an ordered query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering clause of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    /// Newest first.
    pub fn created_desc() -> Self {
        Self {
            field: FIELD_CREATED_AT.to_string(),
            direction: Direction::Descending,
        }
    }
}

/// Owner-scoped query against a collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskQuery {
    pub collection: String,
    pub owner_id: String,
    /// None = unordered (the store picks the order).
    pub order: Option<OrderBy>,
}

impl TaskQuery {
    pub fn owned_by(collection: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            owner_id: owner_id.into(),
            order: None,
        }
    }

    pub fn ordered(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    pub fn is_ordered(&self) -> bool {
        self.order.is_some()
    }
}
