//! Subscription lifecycle for one owner at a time.

use crate::cache::LocalStateCache;
use crate::error::SyncError;
use crate::remote::{Listener, ListenerRegistration, RemoteStore, StreamEvent};
use crate::tasks::SyncConfig;
use crate::types::{Document, Generation, Identity, OrderBy, TaskQuery};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use super::decode::decode_snapshot;
use super::fallback::{FallbackController, Mode};

/// Which of a session's two queries produced an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Channel {
    Primary,
    Fallback,
}

/// A stream event tagged with the session that subscribed for it.
#[derive(Debug)]
struct Tagged {
    generation: Generation,
    channel: Channel,
    event: StreamEvent,
}

/// Internal session state.
struct Session {
    generation: Generation,
    owner: String,
    controller: FallbackController,
    primary: Option<ListenerRegistration>,
    fallback: Option<ListenerRegistration>,
}

impl Session {
    fn cancel(&mut self) {
        if let Some(registration) = self.primary.take() {
            registration.remove();
        }
        if let Some(registration) = self.fallback.take() {
            registration.remove();
        }
    }
}

/// Owns the live query and feeds its snapshots into the cache.
///
/// Listeners only enqueue events; nothing touches the cache until
/// [`pump`](Self::pump) runs on the owning thread. Each session has its own
/// generation, and events from any other generation are discarded there.
pub struct SubscriptionManager {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<LocalStateCache>,
    config: SyncConfig,
    inbox_tx: Sender<Tagged>,
    inbox_rx: Receiver<Tagged>,
    /// Last generation handed out.
    generation: Generation,
    session: Option<Session>,
}

impl SubscriptionManager {
    pub fn new(remote: Arc<dyn RemoteStore>, cache: Arc<LocalStateCache>, config: SyncConfig) -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        Self {
            remote,
            cache,
            config,
            inbox_tx,
            inbox_rx,
            generation: Generation::default(),
            session: None,
        }
    }

    /// Subscribe to `identity`'s tasks, newest first.
    ///
    /// Any existing session is stopped first, so at most one session is
    /// ever live. The cache is empty and loading until the first snapshot.
    pub fn start(&mut self, identity: &Identity) -> Generation {
        self.stop();

        self.generation = self.generation.next();
        let generation = self.generation;
        self.cache.activate(generation);
        self.session = Some(Session {
            generation,
            owner: identity.uid.clone(),
            controller: FallbackController::new(),
            primary: None,
            fallback: None,
        });
        tracing::info!(%generation, owner = %identity.uid, "Starting task subscription");

        let query = TaskQuery::owned_by(&self.config.collection, &identity.uid)
            .ordered(OrderBy::created_desc());
        let listener = self.listener(generation, Channel::Primary);
        match self.remote.subscribe(query, listener) {
            Ok(registration) => {
                if let Some(session) = self.session.as_mut() {
                    session.primary = Some(registration);
                }
            }
            Err(e) => {
                self.on_primary_error(generation, &e.to_string());
            }
        }

        generation
    }

    /// Cancel the current session's queries. Events already queued for it
    /// will be discarded. Calling this with no session is a no-op.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::info!(generation = %session.generation, owner = %session.owner, "Stopping task subscription");
            session.cancel();
            self.cache.deactivate();
        }
    }

    /// Apply an identity transition: stop the old session, then start one
    /// for the new identity or clear the cache if there is none.
    pub fn on_identity_changed(&mut self, old: Option<&Identity>, new: Option<&Identity>) {
        match new {
            Some(identity) => {
                let unchanged = old.map(|o| &o.uid) == Some(&identity.uid)
                    && self.owner() == Some(identity.uid.as_str());
                if unchanged {
                    return;
                }
                self.stop();
                self.start(identity);
            }
            None => {
                self.stop();
                self.cache.clear();
            }
        }
    }

    /// Apply every queued event. Returns how many were applied (not discarded).
    pub fn pump(&mut self) -> usize {
        // Handling an event may enqueue more (the fallback's first snapshot).
        let mut applied = 0;
        while let Ok(tagged) = self.inbox_rx.try_recv() {
            if self.process(tagged) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait up to `timeout` for an event, then apply everything queued.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.inbox_rx.recv_timeout(timeout) {
            Ok(first) => usize::from(self.process(first)) + self.pump(),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Mode of the current session.
    pub fn mode(&self) -> Option<Mode> {
        self.session.as_ref().map(|s| s.controller.mode())
    }

    /// Generation of the current session.
    pub fn generation(&self) -> Option<Generation> {
        self.session.as_ref().map(|s| s.generation)
    }

    /// Owner of the current session.
    pub fn owner(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.owner.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    fn listener(&self, generation: Generation, channel: Channel) -> Listener {
        let inbox = self.inbox_tx.clone();
        Box::new(move |event| {
            // The manager may already be gone; nothing to deliver to then.
            let _ = inbox.send(Tagged {
                generation,
                channel,
                event,
            });
        })
    }

    fn process(&mut self, tagged: Tagged) -> bool {
        let Tagged {
            generation,
            channel,
            event,
        } = tagged;

        let Some(session) = self.session.as_ref() else {
            tracing::debug!(%generation, "Discarding event with no active session");
            return false;
        };
        if session.generation != generation {
            tracing::debug!(%generation, current = %session.generation, "Discarding stale event");
            return false;
        }

        let mode = session.controller.mode();
        match (channel, event) {
            (Channel::Primary, StreamEvent::Snapshot(docs)) if mode == Mode::Primary => {
                self.apply(generation, docs)
            }
            (Channel::Fallback, StreamEvent::Snapshot(docs)) if mode == Mode::Degraded => {
                self.apply(generation, docs)
            }
            (Channel::Primary, StreamEvent::Error(message)) => {
                self.on_primary_error(generation, &message)
            }
            (Channel::Fallback, StreamEvent::Error(message)) => {
                self.on_fallback_error(generation, &message)
            }
            (channel, _) => {
                tracing::debug!(%generation, ?channel, %mode, "Discarding event from closed query");
                false
            }
        }
    }

    fn apply(&self, generation: Generation, docs: Vec<Document>) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        let report = decode_snapshot(docs, &session.owner, &self.config.decode_policy);
        let records = session.controller.order(report.tasks);
        self.cache.apply_snapshot(generation, records)
    }

    /// Returns false if the error was ignored.
    fn on_primary_error(&mut self, generation: Generation, message: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let failure = SyncError::StreamOrderingFailure(message.to_string());
        if !session.controller.on_primary_error() {
            tracing::debug!(%generation, error = %failure, "Ignoring ordered query error outside primary mode");
            return false;
        }
        tracing::warn!(%generation, owner = %session.owner, error = %failure, "Falling back to unordered subscription");

        if let Some(registration) = session.primary.take() {
            registration.remove();
        }
        let owner = session.owner.clone();
        self.cache
            .set_warning(generation, &self.config.degraded_warning);

        let query = TaskQuery::owned_by(&self.config.collection, owner);
        let listener = self.listener(generation, Channel::Fallback);
        match self.remote.subscribe(query, listener) {
            Ok(registration) => {
                if let Some(session) = self.session.as_mut() {
                    session.fallback = Some(registration);
                }
            }
            Err(e) => {
                self.on_fallback_error(generation, &e.to_string());
            }
        }
        true
    }

    /// Returns false if the error was ignored.
    fn on_fallback_error(&mut self, generation: Generation, message: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.controller.on_fallback_error() {
            return false;
        }
        let failure = SyncError::StreamFatalFailure(message.to_string());
        tracing::error!(%generation, owner = %session.owner, error = %failure, "Unordered subscription failed");

        if let Some(registration) = session.fallback.take() {
            registration.remove();
        }
        self.cache.apply_error(generation, message, true)
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
