//! Per-record registry of in-flight decrypt operations.
//!
//! A second `decrypt` for a record that already has one running joins the
//! running operation instead of starting its own. The registry only holds
//! weak references: if every caller drops out, the operation is dropped with
//! them and the next caller starts afresh.

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use payveil_core::{LifecycleError, RecordId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub(crate) type DecryptOutput = Result<u64, LifecycleError>;
type DecryptFuture = BoxFuture<'static, DecryptOutput>;

#[derive(Default)]
pub(crate) struct InFlightDecrypts {
    next_ticket: AtomicU64,
    entries: Mutex<HashMap<RecordId, (u64, WeakShared<DecryptFuture>)>>,
}

/// Whether the caller started the operation or joined an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Started,
    Joined,
}

impl InFlightDecrypts {
    /// Join the running operation for `id`, or start one with `start`.
    ///
    /// `start` receives the registration guard; the operation future must own
    /// it so the entry disappears exactly when the operation does.
    pub(crate) fn join_or_start<F>(
        self: &Arc<Self>,
        id: &RecordId,
        start: F,
    ) -> (Shared<DecryptFuture>, Admission)
    where
        F: FnOnce(InFlightGuard) -> DecryptFuture,
    {
        // Built before taking the lock: dropping an unused candidate runs its
        // guard, which needs the lock.
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1;
        let guard = InFlightGuard {
            registry: Arc::downgrade(self),
            id: id.clone(),
            ticket,
        };
        let candidate = start(guard).shared();

        let mut entries = self.entries.lock();
        if let Some(running) = entries.get(id).and_then(|(_, weak)| weak.upgrade()) {
            drop(entries);
            drop(candidate);
            return (running, Admission::Joined);
        }
        if let Some(weak) = candidate.downgrade() {
            entries.insert(id.clone(), (ticket, weak));
        }
        drop(entries);
        (candidate, Admission::Started)
    }

    /// Number of registered operations.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn release(&self, id: &RecordId, ticket: u64) {
        let mut entries = self.entries.lock();
        if entries.get(id).is_some_and(|(owner, _)| *owner == ticket) {
            entries.remove(id);
        }
    }
}

/// Removes its registry entry when the owning operation completes or is dropped.
pub(crate) struct InFlightGuard {
    registry: Weak<InFlightDecrypts>,
    id: RecordId,
    ticket: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.release(&self.id, self.ticket);
        }
    }
}
