//! Create, update and delete entry points.
//!
//! Writes go straight to the remote store. The cache is never edited here;
//! a successful write shows up through the next snapshot. A rejected write
//! is surfaced as the cache's fatal error.

use crate::cache::LocalStateCache;
use crate::error::{Result, SyncError};
use crate::identity::IdentityProvider;
use crate::remote::{RemoteStore, WriteAck, WriteOp};
use crate::types::{Identity, NewTask, TaskUpdate, Timestamp};
use std::sync::Arc;

/// Issues task writes on behalf of the signed-in identity.
pub struct MutationGateway {
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    cache: Arc<LocalStateCache>,
    collection: String,
}

impl MutationGateway {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        cache: Arc<LocalStateCache>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            identity,
            cache,
            collection: collection.into(),
        }
    }

    /// Write a new task owned by the current identity.
    pub fn create(&self, title: &str, description: &str) -> Result<WriteAck> {
        let identity = self.require_identity()?;
        let task = NewTask::new(title, description)?;
        let fields = task.to_fields(&identity.uid, Timestamp::now());

        self.submit(WriteOp::Create {
            collection: self.collection.clone(),
            fields,
        })
    }

    /// Write the supplied fields and a fresh `updatedAt`.
    pub fn update(&self, id: &str, update: &TaskUpdate) -> Result<WriteAck> {
        self.require_identity()?;
        let update = update.validate()?;

        self.submit(WriteOp::Update {
            collection: self.collection.clone(),
            id: id.to_string(),
            fields: update.to_fields(Timestamp::now()),
        })
    }

    /// Remove a task from the store.
    pub fn delete(&self, id: &str) -> Result<WriteAck> {
        self.require_identity()?;

        self.submit(WriteOp::Delete {
            collection: self.collection.clone(),
            id: id.to_string(),
        })
    }

    fn require_identity(&self) -> Result<Identity> {
        self.identity.current().ok_or(SyncError::Unauthenticated)
    }

    fn submit(&self, op: WriteOp) -> Result<WriteAck> {
        let kind = op.kind();
        self.cache.clear_error();

        match self.remote.write(op) {
            Ok(ack) => {
                tracing::debug!(task_id = %ack.id, kind, "Write committed");
                Ok(ack)
            }
            Err(e) => {
                let message = match e {
                    SyncError::WriteFailure(message) => message,
                    other => other.to_string(),
                };
                tracing::error!(kind, error = %message, "Write rejected");
                self.cache.record_write_failure(&message);
                Err(SyncError::WriteFailure(message))
            }
        }
    }
}
