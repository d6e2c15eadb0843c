//! One-shot event channels.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_RECEIVER_ID: AtomicU64 = AtomicU64::new(0);

/// The type signature for a signal receiver callback.
///
/// Receivers must be `Send + Sync` so that units can be shared across threads.
pub type SignalReceiver<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A signal that can be connected to and dispatched.
///
/// Each signal carries a payload type `T`. Receivers are called in the order
/// they were connected.
///
/// # Examples
///
/// ```
/// use formunit_signals::Signal;
/// use std::sync::Arc;
///
/// let touched: Signal<usize> = Signal::new();
///
/// touched.connect("logger", Arc::new(|index: &usize| {
///     println!("slot {index} touched");
/// }));
///
/// assert_eq!(touched.send(&3), 1);
/// ```
pub struct Signal<T: 'static> {
    receivers: RwLock<Vec<(String, SignalReceiver<T>)>>,
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

impl<T: 'static> Signal<T> {
    /// Creates a new signal with no connected receivers.
    pub fn new() -> Self {
        Self {
            receivers: RwLock::new(Vec::new()),
        }
    }

    /// Connects a receiver to this signal.
    ///
    /// The `receiver_id` is used to identify the receiver for later disconnection.
    /// If a receiver with the same ID is already connected, it is replaced.
    pub fn connect(&self, receiver_id: impl Into<String>, callback: SignalReceiver<T>) {
        let id = receiver_id.into();
        let mut receivers = self.receivers.write().expect("signal lock poisoned");

        if let Some(entry) = receivers.iter_mut().find(|(rid, _)| *rid == id) {
            entry.1 = callback;
        } else {
            receivers.push((id, callback));
        }
    }

    /// Connects a receiver under a freshly generated ID and returns that ID.
    pub fn subscribe(&self, callback: SignalReceiver<T>) -> String {
        let id = format!(
            "receiver-{}",
            NEXT_RECEIVER_ID.fetch_add(1, Ordering::Relaxed)
        );
        self.connect(id.clone(), callback);
        id
    }

    /// Disconnects the receiver with the given ID.
    ///
    /// Returns `true` if a receiver was found and removed.
    pub fn disconnect(&self, receiver_id: &str) -> bool {
        let mut receivers = self.receivers.write().expect("signal lock poisoned");
        let len_before = receivers.len();
        receivers.retain(|(id, _)| id != receiver_id);
        receivers.len() < len_before
    }

    /// Sends the signal to all connected receivers and returns how many ran.
    ///
    /// The receiver list is snapshotted first, so receivers may connect,
    /// disconnect or send on this signal again without deadlocking.
    pub fn send(&self, payload: &T) -> usize {
        let snapshot: Vec<SignalReceiver<T>> = self
            .receivers
            .read()
            .expect("signal lock poisoned")
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in &snapshot {
            callback(payload);
        }
        snapshot.len()
    }

    /// Returns the number of connected receivers.
    pub fn receiver_count(&self) -> usize {
        self.receivers.read().expect("signal lock poisoned").len()
    }
}
