//! Identity provider interface.
//!
//! The provider owns the signed-in session. Consumers read the current
//! identity and receive a change notification whenever it changes.

use crate::types::Identity;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;

/// A transition of the signed-in identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityChange {
    pub previous: Option<Identity>,
    pub current: Option<Identity>,
}

/// Receiver side of identity change notifications.
pub struct IdentityWatch {
    pub receiver: Receiver<IdentityChange>,
}

impl IdentityWatch {
    /// Try to receive a change (non-blocking).
    pub fn try_recv(&self) -> Result<IdentityChange, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<IdentityChange, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Source of the signed-in identity.
pub trait IdentityProvider: Send + Sync {
    /// The identity currently signed in, if any.
    fn current(&self) -> Option<Identity>;

    /// Register for change notifications.
    fn watch(&self) -> IdentityWatch;
}

/// A settable identity provider.
pub struct SessionIdentity {
    current: RwLock<Option<Identity>>,
    watchers: RwLock<Vec<Sender<IdentityChange>>>,
}

impl SessionIdentity {
    /// Start signed out.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            watchers: RwLock::new(Vec::new()),
        }
    }

    /// Start signed in as `identity`.
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
            watchers: RwLock::new(Vec::new()),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        self.set(Some(identity));
    }

    pub fn sign_out(&self) {
        self.set(None);
    }

    /// Replace the identity. Setting the same identity again is not a change.
    pub fn set(&self, identity: Option<Identity>) {
        let previous = {
            let mut current = self.current.write();
            if *current == identity {
                return;
            }
            std::mem::replace(&mut *current, identity.clone())
        };

        let change = IdentityChange {
            previous,
            current: identity,
        };

        // Watchers whose receiver is gone are dropped.
        self.watchers
            .write()
            .retain(|sender| sender.send(change.clone()).is_ok());
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Option<Identity> {
        self.current.read().clone()
    }

    fn watch(&self) -> IdentityWatch {
        let (sender, receiver) = unbounded();
        self.watchers.write().push(sender);
        IdentityWatch { receiver }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_notifies_watchers() {
        let session = SessionIdentity::new();
        let watch = session.watch();

        session.sign_in(Identity::new("u1"));

        let change = watch.try_recv().unwrap();
        assert_eq!(change.previous, None);
        assert_eq!(change.current, Some(Identity::new("u1")));
        assert_eq!(session.current(), Some(Identity::new("u1")));
    }

    #[test]
    fn test_same_identity_is_not_a_change() {
        let session = SessionIdentity::signed_in(Identity::new("u1"));
        let watch = session.watch();

        session.sign_in(Identity::new("u1"));
        assert!(watch.try_recv().is_err());
    }

    #[test]
    fn test_dropped_watchers_are_pruned() {
        let session = SessionIdentity::new();
        let watch = session.watch();
        let _kept = session.watch();
        drop(watch);

        session.sign_in(Identity::new("u1"));
        assert_eq!(session.watcher_count(), 1);
    }
}
