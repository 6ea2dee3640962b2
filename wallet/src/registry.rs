//! # Session Registry
//!
//! Owns every in-progress payment build. Callers never hold an entry
//! directly; they [`acquire`](SessionRegistry::acquire) a [`SessionLease`]
//! that binds the entry's concurrency slot and data lock for the duration
//! of one operation.
//!
//! ## Locking
//!
//! Two levels, never nested in the other direction:
//!
//! - `entries`: one `parking_lot::Mutex` over the map, held for
//!   insert/remove/lookup only.
//! - per entry: the slot (ordering of operations) and a
//!   `tokio::sync::Mutex<SessionData>` (visibility of data). The data
//!   guard is owned by the lease and released when the lease drops, on
//!   every exit path.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as DataMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::DATA_LOCK_TIMEOUT;
use crate::error::BuildError;
use crate::session::SessionData;
use crate::slot::{ConcurrencySlot, SlotContext};
use crate::types::{BuildPaymentId, SessionId};

// ---------------------------------------------------------------------------
// SessionEntry
// ---------------------------------------------------------------------------

/// Record of one in-progress payment build.
#[derive(Debug)]
pub struct SessionEntry {
    id: BuildPaymentId,
    stopped: AtomicBool,
    slot: ConcurrencySlot,
    data: Arc<DataMutex<SessionData>>,
}

impl SessionEntry {
    fn new(id: BuildPaymentId) -> Self {
        Self {
            id,
            stopped: AtomicBool::new(false),
            slot: ConcurrencySlot::new(),
            data: Arc::new(DataMutex::new(SessionData::default())),
        }
    }

    /// The build this entry belongs to.
    pub fn id(&self) -> BuildPaymentId {
        self.id
    }

    /// Whether the entry has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.slot.shutdown();
    }
}

// ---------------------------------------------------------------------------
// SessionLease
// ---------------------------------------------------------------------------

/// Exclusive access to one session for one operation.
///
/// Holds the slot context and the data lock. Dropping the lease releases
/// the lock.
pub struct SessionLease {
    entry: Arc<SessionEntry>,
    ctx: SlotContext,
    data: OwnedMutexGuard<SessionData>,
}

impl SessionLease {
    /// The build this lease is for.
    pub fn id(&self) -> BuildPaymentId {
        self.entry.id
    }

    /// The operation's execution context.
    pub fn ctx(&self) -> &SlotContext {
        &self.ctx
    }

    /// The session's data.
    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// The session's data, mutably.
    pub fn data_mut(&mut self) -> &mut SessionData {
        &mut self.data
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("bid", &self.entry.id)
            .field("ctx", &self.ctx)
            .field("data", &*self.data)
            .finish()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        trace!(bid = %self.entry.id, session_id = self.ctx.session_id(), "released payment build");
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Table of all live payment builds.
#[derive(Debug)]
pub struct SessionRegistry {
    entries: Mutex<HashMap<BuildPaymentId, Arc<SessionEntry>>>,
    lock_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DATA_LOCK_TIMEOUT)
    }
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            lock_timeout,
        }
    }

    /// Registers a new payment build.
    pub fn start(&self) -> BuildPaymentId {
        let id = BuildPaymentId::new();
        self.entries
            .lock()
            .insert(id, Arc::new(SessionEntry::new(id)));
        debug!(bid = %id, "started payment build");
        id
    }

    /// Stops and unregisters a build. Cancels whatever operation holds its
    /// slot. Unknown IDs are ignored; returns whether the build existed.
    pub fn stop(&self, id: BuildPaymentId) -> bool {
        let removed = self.entries.lock().remove(&id);
        match removed {
            Some(entry) => {
                entry.stop();
                debug!(bid = %id, "stopped payment build");
                true
            }
            None => false,
        }
    }

    fn lookup(&self, id: BuildPaymentId) -> Result<Arc<SessionEntry>, BuildError> {
        self.entries
            .lock()
            .get(&id)
            .filter(|entry| !entry.is_stopped())
            .cloned()
            .ok_or(BuildError::SessionNotFound(id))
    }

    /// Acquires a build for one operation.
    ///
    /// Claims the entry's slot (preempting an older operation), then waits
    /// for the data lock, giving up on cancellation or after the configured
    /// timeout.
    pub async fn acquire(
        &self,
        id: BuildPaymentId,
        session_id: SessionId,
        parent: &CancellationToken,
    ) -> Result<SessionLease, BuildError> {
        let entry = self.lookup(id)?;
        let ctx = entry.slot.use_slot(parent, session_id);
        ctx.err()?;

        let lock = Arc::clone(&entry.data).lock_owned();
        let data = tokio::select! {
            _ = ctx.cancelled() => return Err(BuildError::Cancelled),
            res = tokio::time::timeout(self.lock_timeout, lock) => {
                res.map_err(|_| BuildError::LockTimeout(id))?
            }
        };

        // Stopped while we waited.
        if entry.is_stopped() {
            return Err(BuildError::SessionNotFound(id));
        }

        trace!(bid = %id, session_id, "acquired payment build");
        Ok(SessionLease { entry, ctx, data })
    }

    /// Copies a build's state without claiming its slot.
    pub async fn inspect(&self, id: BuildPaymentId) -> Result<SessionData, BuildError> {
        let entry = self.lookup(id)?;
        let data = tokio::time::timeout(self.lock_timeout, entry.data.lock())
            .await
            .map_err(|_| BuildError::LockTimeout(id))?;
        Ok(data.clone())
    }

    /// Stops every build.
    pub fn clear(&self) {
        let drained: Vec<_> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.stop();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "cleared payment builds");
        }
    }

    /// Number of live builds.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no build is live.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
