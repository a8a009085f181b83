//! ConnectionRegistry: the set of live terminal sessions.
//!
//! The registry is the only state shared across connections.  Every
//! operation takes `&self` and is safe to call from any number of tasks at
//! once.
//!
//! # Iteration semantics
//!
//! [`ConnectionRegistry::for_each`] copies the current handles out under a
//! read lock and releases the lock before calling back.  A handle added or
//! removed while the callback runs is either in the snapshot or not; no
//! handle is ever visited twice in one pass.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::domain::SessionId;

/// One encoded outbound frame, shared by every recipient of a broadcast.
pub type Frame = Arc<[u8]>;

/// Failure to hand a frame to one connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection's writer has already shut down.
    #[error("session {0} is closed")]
    Closed(SessionId),

    /// The connection's outbound queue is full; the terminal is not reading.
    #[error("session {0} outbound queue is full")]
    Backpressure(SessionId),

    #[error("transport error: {0}")]
    Transport(String),
}

/// The send capability the transport exposes for one live connection.
///
/// `send` queues the frame and returns immediately; it never waits for the
/// bytes to reach the wire.
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionHandle: Send + Sync {
    fn id(&self) -> &SessionId;

    fn send(&self, frame: Frame) -> Result<(), SendError>;
}

/// Thread-safe set of live connection handles, keyed by session id.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<dyn ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `handle`.  Returns `false` and keeps the existing entry if a
    /// handle with the same id is already registered.
    pub fn add(&self, handle: Arc<dyn ConnectionHandle>) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let id = handle.id().clone();
        if sessions.contains_key(&id) {
            debug!("session {id} already registered; ignoring duplicate add");
            return false;
        }
        sessions.insert(id, handle);
        true
    }

    /// Removes the handle for `id`.  Returns `false` if it was not present.
    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<dyn ConnectionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a point-in-time copy of all registered handles.
    pub fn snapshot(&self) -> Vec<Arc<dyn ConnectionHandle>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Calls `f` once for every handle in a snapshot of the registry.
    ///
    /// The lock is not held while `f` runs, so `f` may itself add or remove
    /// sessions.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<dyn ConnectionHandle>),
    {
        for handle in self.snapshot() {
            f(&handle);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
