//! Signal/slot system for Canopy.
//!
//! Signals are the notification primitive behind every observable model and
//! collection. When a signal is emitted, every connected slot runs
//! synchronously on the emitting thread, in connection order, before
//! [`Signal::emit`] returns.
//!
//! A slot is connected for as long as its [`ConnectionId`] is not passed to
//! [`Signal::disconnect`], or for the lifetime of a [`ConnectionGuard`].
//!
//! # Failure Isolation
//!
//! Slots connected with [`Signal::try_connect`] may fail. A failing slot never
//! stops the remaining slots from running; once every slot has run, the first
//! failure is handed back to the emitter as a [`ListenerFailure`].
//!
//! # Re-entrancy
//!
//! The connection list is snapshotted before any slot runs and no lock is
//! held while slots execute, so a slot may connect, disconnect or emit on the
//! same signal.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use canopy_core::Signal;
//!
//! let renamed = Signal::<(String, String)>::new();
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = log.clone();
//! let id = renamed.connect(move |(old, new)| sink.lock().push(format!("{old} -> {new}")));
//!
//! renamed.emit(("draft".into(), "final".into())).unwrap();
//! renamed.disconnect(id);
//! renamed.emit(("final".into(), "gone".into())).unwrap();
//!
//! assert_eq!(*log.lock(), ["draft -> final"]);
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// Handle to one connected slot.
    pub struct ConnectionId;
}

/// Error type returned by fallible slots.
pub type SlotError = Box<dyn StdError + Send + Sync + 'static>;

type Slot<Args> = Arc<dyn Fn(&Args) -> Result<(), SlotError> + Send + Sync>;

/// Internal storage for a single connection.
struct Connection<Args> {
    slot: Slot<Args>,
    /// Connection order; slot keys are reused so they cannot order delivery.
    seq: u64,
}

struct Connections<Args> {
    slots: SlotMap<ConnectionId, Connection<Args>>,
    next_seq: u64,
}

impl<Args> Connections<Args> {
    fn insert(&mut self, slot: Slot<Args>) -> ConnectionId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(Connection { slot, seq })
    }

    fn snapshot(&self) -> Vec<Slot<Args>> {
        let mut ordered: Vec<_> = self.slots.values().map(|c| (c.seq, c.slot.clone())).collect();
        ordered.sort_unstable_by_key(|(seq, _)| *seq);
        ordered.into_iter().map(|(_, slot)| slot).collect()
    }
}

/// One or more slots failed while a signal was being emitted.
///
/// Carries the first failure in connection order and the total number of
/// slots that failed during that emission.
#[derive(Clone, thiserror::Error)]
#[error("{failed} listener(s) failed, first error: {first}")]
pub struct ListenerFailure {
    first: Arc<dyn StdError + Send + Sync + 'static>,
    failed: usize,
}

impl ListenerFailure {
    /// The first error raised during the emission.
    pub fn first(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.first
    }

    /// How many slots failed.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Attempt to downcast the first error to a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.first.downcast_ref::<E>()
    }
}

impl fmt::Debug for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerFailure")
            .field("first", &self.first.to_string())
            .field("failed", &self.failed)
            .finish()
    }
}

/// A notification channel carrying `Args` by reference to every slot.
///
/// Models expose one through [`crate::ModelBase`]; collections expose one for
/// their structural events.
pub struct Signal<Args> {
    connections: Arc<Mutex<Connections<Args>>>,
    blocked: AtomicBool,
}

impl<Args: 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Arc::new(Mutex::new(Connections {
                slots: SlotMap::with_key(),
                next_seq: 0,
            })),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot that cannot fail.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.try_connect(move |args| {
            slot(args);
            Ok(())
        })
    }

    /// Connect a slot that may fail.
    ///
    /// A failure does not prevent later slots from running; it is reported
    /// back to the emitter once all slots have run.
    pub fn try_connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) -> Result<(), SlotError> + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Remove a slot. `false` if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().slots.remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().slots.clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().slots.len()
    }

    /// Block signal emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots in connection order.
    ///
    /// Every slot runs even if an earlier one fails. Returns the first
    /// failure, if any, after the last slot has returned.
    #[tracing::instrument(skip_all, target = "canopy_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) -> Result<(), ListenerFailure> {
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "signal blocked, skipping emit");
            return Ok(());
        }

        let slots = self.connections.lock().snapshot();
        tracing::trace!(target: targets::SIGNAL, connection_count = slots.len(), "emitting signal");

        let mut first: Option<SlotError> = None;
        let mut failed = 0;
        for slot in slots {
            if let Err(err) = slot(&args) {
                tracing::warn!(target: targets::SIGNAL, error = %err, "listener failed");
                failed += 1;
                first.get_or_insert(err);
            }
        }

        match first {
            None => Ok(()),
            Some(err) => Err(ListenerFailure {
                first: Arc::from(err),
                failed,
            }),
        }
    }

    /// Connect a slot with automatic disconnection when the guard is dropped.
    ///
    /// The guard only holds a weak handle to the connection list, so it may
    /// safely outlive the signal.
    pub fn connect_scoped<F>(&self, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = self.connect(slot);
        self.guard(id)
    }

    /// Fallible variant of [`connect_scoped`](Self::connect_scoped).
    pub fn try_connect_scoped<F>(&self, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) -> Result<(), SlotError> + Send + Sync + 'static,
    {
        let id = self.try_connect(slot);
        self.guard(id)
    }

    fn guard(&self, id: ConnectionId) -> ConnectionGuard<Args> {
        ConnectionGuard {
            connections: Arc::downgrade(&self.connections),
            id,
        }
    }
}

impl<Args> fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("connections", &self.connections.lock().slots.len())
            .field("blocked", &self.blocked.load(Ordering::SeqCst))
            .finish()
    }
}

/// Keeps a slot connected until dropped.
///
/// The guard holds the signal weakly; dropping it after the signal is gone
/// does nothing. Collections use guards to watch the fields of the elements
/// they hold.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use canopy_core::Signal;
///
/// let saved = Signal::<()>::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let guard = {
///     let seen = seen.clone();
///     saved.connect_scoped(move |_| {
///         seen.fetch_add(1, Ordering::Relaxed);
///     })
/// };
/// saved.emit(()).unwrap();
/// drop(guard);
/// saved.emit(()).unwrap();
/// assert_eq!(seen.load(Ordering::Relaxed), 1);
/// assert_eq!(saved.connection_count(), 0);
/// ```
pub struct ConnectionGuard<Args> {
    connections: Weak<Mutex<Connections<Args>>>,
    id: ConnectionId,
}

impl<Args> ConnectionGuard<Args> {
    /// The ID of the guarded connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let Some(connections) = self.connections.upgrade() {
            connections.lock().slots.remove(self.id);
        }
    }
}

static_assertions::assert_impl_all!(Signal<String>: Send, Sync);
static_assertions::assert_impl_all!(ListenerFailure: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, thiserror::Error)]
    #[error("boom {0}")]
    struct Boom(i32);

    fn recorder<T>(signal: &Signal<T>) -> (ConnectionId, Arc<Mutex<Vec<T>>>)
    where
        T: Clone + Send + 'static,
    {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = signal.connect(move |value: &T| sink.lock().push(value.clone()));
        (id, seen)
    }

    #[test]
    fn test_emit_reaches_every_slot() {
        let signal = Signal::<&'static str>::new();
        let (_, first) = recorder(&signal);
        let (_, second) = recorder(&signal);

        signal.emit("added").unwrap();
        signal.emit("removed").unwrap();

        assert_eq!(*first.lock(), ["added", "removed"]);
        assert_eq!(*second.lock(), *first.lock());
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let signal = Signal::<u8>::new();
        let (id, seen) = recorder(&signal);

        signal.emit(1).unwrap();
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(2).unwrap();

        assert_eq!(*seen.lock(), [1]);
    }

    #[test]
    fn test_blocked_signal_is_silent() {
        let signal = Signal::<u8>::new();
        let (_, seen) = recorder(&signal);
        signal.try_connect(|_| Err(Box::new(Boom(0)) as SlotError));

        signal.set_blocked(true);
        assert!(signal.is_blocked());
        assert!(signal.emit(1).is_ok());
        signal.set_blocked(false);

        assert!(signal.emit(2).is_err());
        assert_eq!(*seen.lock(), [2]);
    }

    #[test]
    fn test_delivery_follows_connection_order_after_slot_reuse() {
        let signal = Signal::<()>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = order.clone();
            signal.connect(move |_| order.lock().push("first"))
        };
        {
            let order = order.clone();
            signal.connect(move |_| order.lock().push("second"));
        }
        signal.disconnect(first);
        {
            // Reuses the freed slot but must still run last.
            let order = order.clone();
            signal.connect(move |_| order.lock().push("third"));
        }

        signal.emit(()).unwrap();
        assert_eq!(*order.lock(), vec!["second", "third"]);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let signal = Signal::<i32>::new();
        let ran = Arc::new(AtomicUsize::new(0));

        signal.try_connect(|&n| Err(Box::new(Boom(n)) as SlotError));
        {
            let ran = ran.clone();
            signal.connect(move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        signal.try_connect(|&n| Err(Box::new(Boom(n + 1)) as SlotError));

        let failure = signal.emit(7).unwrap_err();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(failure.failed(), 2);
        assert_eq!(failure.downcast_ref::<Boom>().map(|b| b.0), Some(7));
        assert_eq!(failure.first().to_string(), "boom 7");
    }

    #[test]
    fn test_reentrant_connect_during_emit() {
        let signal = Arc::new(Signal::<i32>::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        {
            let weak = Arc::downgrade(&signal);
            let late_calls = late_calls.clone();
            signal.connect(move |_| {
                if let Some(signal) = weak.upgrade() {
                    let late_calls = late_calls.clone();
                    signal.connect(move |_| {
                        late_calls.fetch_add(1, Ordering::SeqCst);
                    });
                }
            });
        }

        // The slot added during emission is not part of the snapshot.
        signal.emit(1).unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(signal.connection_count(), 2);

        signal.emit(2).unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_disconnect_during_emit() {
        let signal = Arc::new(Signal::<()>::new());
        let id = Arc::new(Mutex::new(None));

        {
            let weak = Arc::downgrade(&signal);
            let id_slot = id.clone();
            let conn = signal.connect(move |_| {
                if let (Some(signal), Some(id)) = (weak.upgrade(), *id_slot.lock()) {
                    signal.disconnect(id);
                }
            });
            *id.lock() = Some(conn);
        }

        signal.emit(()).unwrap();
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_disconnect_all_and_scoped_guards() {
        let signal = Signal::<u8>::new();
        let (_, seen) = recorder(&signal);
        let guard = signal.connect_scoped(|_| {});
        let guard_id = guard.id();
        assert_eq!(signal.connection_count(), 2);

        drop(guard);
        assert_eq!(signal.connection_count(), 1);
        assert!(!signal.disconnect(guard_id));

        signal.disconnect_all();
        signal.emit(9).unwrap();
        assert_eq!(signal.connection_count(), 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_scoped_fallible_slot() {
        let signal = Signal::<i32>::new();
        {
            let _guard = signal.try_connect_scoped(|&n| Err(Box::new(Boom(n)) as SlotError));
            assert_eq!(signal.emit(3).unwrap_err().failed(), 1);
        }
        assert!(signal.emit(4).is_ok());
    }

    #[test]
    fn test_guard_outliving_signal() {
        let guard = {
            let signal = Signal::<i32>::new();
            signal.connect_scoped(|_| {})
        };
        drop(guard);
    }
}
