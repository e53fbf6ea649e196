//! In-process remote store.
//!
//! Holds documents per collection and re-runs every registered query after
//! each committed write, delivering a full snapshot to the listener.

use crate::error::{Result, SyncError};
use crate::types::{Direction, Document, TaskQuery, Timestamp, FIELD_OWNER_ID};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::{Listener, ListenerRegistration, RemoteStore, StreamEvent, WriteAck, WriteOp};

/// Error reported for ordered queries when no ordering index exists.
const MISSING_INDEX_MESSAGE: &str = "The query requires an index";

/// Configuration for a [`MemoryStore`].
#[derive(Clone, Debug)]
pub struct MemoryStoreConfig {
    /// Fail ordered queries as if the server-side index were missing.
    pub require_ordering_index: bool,

    /// Length of generated document ids (hex characters, max 64).
    /// Default: 20
    pub id_length: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            require_ordering_index: false,
            id_length: 20,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ListenerId(u64);

struct ListenerEntry {
    query: TaskQuery,
    listener: Arc<Listener>,
}

/// Injected failures.
#[derive(Default)]
struct Faults {
    next_write: Option<String>,
    unordered_queries: Option<String>,
}

struct Inner {
    config: MemoryStoreConfig,
    require_ordering_index: AtomicBool,
    /// Documents by collection, then by id (id order is the unordered order).
    collections: RwLock<HashMap<String, BTreeMap<String, Map<String, Value>>>>,
    listeners: RwLock<HashMap<ListenerId, ListenerEntry>>,
    next_listener: AtomicU64,
    next_document: AtomicU64,
    faults: Mutex<Faults>,
}

/// Authoritative in-memory document store.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                require_ordering_index: AtomicBool::new(config.require_ordering_index),
                config,
                collections: RwLock::new(HashMap::new()),
                listeners: RwLock::new(HashMap::new()),
                next_listener: AtomicU64::new(1),
                next_document: AtomicU64::new(1),
                faults: Mutex::new(Faults::default()),
            }),
        }
    }

    /// Toggle whether ordered queries are servable.
    pub fn set_require_ordering_index(&self, required: bool) {
        self.inner
            .require_ordering_index
            .store(required, Ordering::SeqCst);
    }

    /// Reject the next write with `message`.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.inner.faults.lock().next_write = Some(message.into());
    }

    /// Fail every unordered subscription with `message` (None to clear).
    pub fn fail_unordered_queries(&self, message: Option<String>) {
        self.inner.faults.lock().unordered_queries = message;
    }

    /// Report a stream error to every listener scoped to `owner_id`.
    /// Those listeners are detached afterwards.
    pub fn emit_error(&self, owner_id: &str, message: &str) {
        let failed: Vec<Arc<Listener>> = {
            let mut listeners = self.inner.listeners.write();
            let ids: Vec<ListenerId> = listeners
                .iter()
                .filter(|(_, entry)| entry.query.owner_id == owner_id)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| listeners.remove(&id))
                .map(|entry| entry.listener)
                .collect()
        };

        for listener in failed {
            listener(StreamEvent::Error(message.to_string()));
        }
    }

    /// Insert a document as-is (no validation) and notify listeners.
    pub fn insert_document(&self, collection: &str, document: Document) {
        self.inner
            .collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(document.id, document.fields);
        self.inner.notify(collection);
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone()))
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.inner
            .collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl Inner {
    /// Run a query against current contents.
    fn evaluate(&self, query: &TaskQuery) -> Vec<Document> {
        let collections = self.collections.read();
        let Some(docs) = collections.get(&query.collection) else {
            return Vec::new();
        };

        let owned = docs.iter().filter(|(_, fields)| {
            fields.get(FIELD_OWNER_ID).and_then(Value::as_str) == Some(query.owner_id.as_str())
        });

        match query.order {
            None => owned
                .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                .collect(),
            Some(ref order) => {
                // Documents without the ordering field are not part of an
                // ordered result.
                let mut keyed: Vec<(Timestamp, Document)> = owned
                    .filter_map(|(id, fields)| {
                        let key = fields.get(&order.field).and_then(Timestamp::from_value)?;
                        Some((key, Document::new(id.clone(), fields.clone())))
                    })
                    .collect();
                keyed.sort_by(|(a, da), (b, db)| match order.direction {
                    Direction::Ascending => a.cmp(b).then_with(|| da.id.cmp(&db.id)),
                    Direction::Descending => b.cmp(a).then_with(|| da.id.cmp(&db.id)),
                });
                keyed.into_iter().map(|(_, doc)| doc).collect()
            }
        }
    }

    /// Deliver fresh snapshots to every listener on `collection`.
    fn notify(&self, collection: &str) {
        let targets: Vec<(TaskQuery, Arc<Listener>)> = self
            .listeners
            .read()
            .values()
            .filter(|entry| entry.query.collection == collection)
            .map(|entry| (entry.query.clone(), Arc::clone(&entry.listener)))
            .collect();

        for (query, listener) in targets {
            let snapshot = self.evaluate(&query);
            listener(StreamEvent::Snapshot(snapshot));
        }
    }

    fn generate_id(&self, collection: &str) -> String {
        let counter = self.next_document.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        hasher.update(collection.as_bytes());
        hasher.update(counter.to_le_bytes());
        hasher.update(Timestamp::now().0.to_le_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..self.config.id_length.min(digest.len())].to_string()
    }
}

impl RemoteStore for MemoryStore {
    fn subscribe(&self, query: TaskQuery, listener: Listener) -> Result<ListenerRegistration> {
        if query.is_ordered() && self.inner.require_ordering_index.load(Ordering::SeqCst) {
            listener(StreamEvent::Error(MISSING_INDEX_MESSAGE.to_string()));
            return Ok(ListenerRegistration::detached());
        }
        if !query.is_ordered() {
            let fault = self.inner.faults.lock().unordered_queries.clone();
            if let Some(message) = fault {
                listener(StreamEvent::Error(message));
                return Ok(ListenerRegistration::detached());
            }
        }

        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        let listener = Arc::new(listener);
        self.inner.listeners.write().insert(
            id,
            ListenerEntry {
                query: query.clone(),
                listener: Arc::clone(&listener),
            },
        );

        // Initial snapshot.
        listener(StreamEvent::Snapshot(self.inner.evaluate(&query)));

        let inner = Arc::downgrade(&self.inner);
        Ok(ListenerRegistration::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.listeners.write().remove(&id);
            }
        }))
    }

    fn write(&self, op: WriteOp) -> Result<WriteAck> {
        if let Some(message) = self.inner.faults.lock().next_write.take() {
            return Err(SyncError::WriteFailure(message));
        }

        let (collection, ack) = match op {
            WriteOp::Create { collection, fields } => {
                let id = self.inner.generate_id(&collection);
                self.inner
                    .collections
                    .write()
                    .entry(collection.clone())
                    .or_default()
                    .insert(id.clone(), fields);
                (collection, WriteAck { id })
            }
            WriteOp::Update {
                collection,
                id,
                fields,
            } => {
                {
                    let mut collections = self.inner.collections.write();
                    let existing = collections
                        .get_mut(&collection)
                        .and_then(|docs| docs.get_mut(&id))
                        .ok_or_else(|| SyncError::NotFound(id.clone()))?;
                    existing.extend(fields);
                }
                (collection, WriteAck { id })
            }
            WriteOp::Delete { collection, id } => {
                if let Some(docs) = self.inner.collections.write().get_mut(&collection) {
                    docs.remove(&id);
                }
                (collection, WriteAck { id })
            }
        };

        self.inner.notify(&collection);
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewTask, OrderBy, FIELD_CREATED_AT, FIELD_TITLE};
    use serde_json::json;

    fn recorder() -> (Listener, Arc<Mutex<Vec<StreamEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (Box::new(move |event| sink.lock().push(event)), events)
    }

    fn doc(id: &str, owner: &str, created_millis: Option<i64>) -> Document {
        let mut fields = Map::new();
        fields.insert(FIELD_TITLE.into(), json!(id));
        fields.insert(FIELD_OWNER_ID.into(), json!(owner));
        if let Some(ms) = created_millis {
            fields.insert(FIELD_CREATED_AT.into(), Timestamp::from_millis(ms).to_value());
        }
        Document::new(id, fields)
    }

    fn ids(event: &StreamEvent) -> Vec<String> {
        match event {
            StreamEvent::Snapshot(docs) => docs.iter().map(|d| d.id.clone()).collect(),
            StreamEvent::Error(e) => panic!("Expected snapshot, got error {}", e),
        }
    }

    #[test]
    fn test_initial_snapshot_filters_owner() {
        let store = MemoryStore::default();
        store.insert_document("tasks", doc("a", "u1", Some(1)));
        store.insert_document("tasks", doc("b", "u2", Some(2)));

        let (listener, events) = recorder();
        let _reg = store
            .subscribe(TaskQuery::owned_by("tasks", "u1"), listener)
            .unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(ids(&events[0]), vec!["a"]);
    }

    #[test]
    fn test_ordered_query_sorts_and_skips_missing_field() {
        let store = MemoryStore::default();
        store.insert_document("tasks", doc("old", "u1", Some(1)));
        store.insert_document("tasks", doc("new", "u1", Some(3)));
        store.insert_document("tasks", doc("none", "u1", None));

        let (listener, events) = recorder();
        let query = TaskQuery::owned_by("tasks", "u1").ordered(OrderBy::created_desc());
        let _reg = store.subscribe(query, listener).unwrap();

        assert_eq!(ids(&events.lock()[0]), vec!["new", "old"]);
    }

    #[test]
    fn test_missing_index_fails_ordered_query() {
        let store = MemoryStore::new(MemoryStoreConfig {
            require_ordering_index: true,
            ..Default::default()
        });

        let (listener, events) = recorder();
        let query = TaskQuery::owned_by("tasks", "u1").ordered(OrderBy::created_desc());
        let reg = store.subscribe(query, listener).unwrap();

        assert!(!reg.is_active());
        assert_eq!(store.listener_count(), 0);
        assert!(matches!(events.lock()[0], StreamEvent::Error(_)));
    }

    #[test]
    fn test_write_notifies_and_remove_detaches() {
        let store = MemoryStore::default();
        let (listener, events) = recorder();
        let reg = store
            .subscribe(TaskQuery::owned_by("tasks", "u1"), listener)
            .unwrap();

        let fields = NewTask::new("Write code", "").unwrap().to_fields("u1", Timestamp::now());
        let ack = store
            .write(WriteOp::Create {
                collection: "tasks".into(),
                fields,
            })
            .unwrap();
        assert_eq!(ack.id.len(), 20);
        assert_eq!(ids(&events.lock()[1]), vec![ack.id.clone()]);

        reg.remove();
        assert_eq!(store.listener_count(), 0);

        store
            .write(WriteOp::Delete {
                collection: "tasks".into(),
                id: ack.id,
            })
            .unwrap();
        assert_eq!(events.lock().len(), 2);
    }

    #[test]
    fn test_update_unknown_document_fails() {
        let store = MemoryStore::default();
        let result = store.write(WriteOp::Update {
            collection: "tasks".into(),
            id: "missing".into(),
            fields: Map::new(),
        });
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }

    #[test]
    fn test_fail_next_write_is_one_shot() {
        let store = MemoryStore::default();
        store.fail_next_write("permission denied");

        let op = WriteOp::Delete {
            collection: "tasks".into(),
            id: "x".into(),
        };
        assert_eq!(
            store.write(op.clone()),
            Err(SyncError::WriteFailure("permission denied".into()))
        );
        assert!(store.write(op).is_ok());
    }

    #[test]
    fn test_emit_error_detaches_owner_listeners() {
        let store = MemoryStore::default();
        let (l1, e1) = recorder();
        let (l2, e2) = recorder();
        let _r1 = store.subscribe(TaskQuery::owned_by("tasks", "u1"), l1).unwrap();
        let _r2 = store.subscribe(TaskQuery::owned_by("tasks", "u2"), l2).unwrap();

        store.emit_error("u1", "unavailable");

        assert_eq!(store.listener_count(), 1);
        assert!(matches!(e1.lock().last(), Some(StreamEvent::Error(_))));
        assert!(matches!(e2.lock().last(), Some(StreamEvent::Snapshot(_))));
    }
}
