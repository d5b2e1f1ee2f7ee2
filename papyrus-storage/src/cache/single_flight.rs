//! Per-key single-flight execution.
//!
//! At most one computation per key runs at a time inside this process.
//! Callers arriving while it runs subscribe to its outcome instead of starting
//! their own. The computation is spawned onto the runtime, so a caller that
//! stops waiting does not cancel it for the others.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

type Slot<V> = (u64, watch::Receiver<Option<V>>);

/// Deduplicates concurrent computations by key.
pub struct SingleFlight<K, V> {
    flights: Arc<DashMap<K, Slot<V>>>,
    next_id: Arc<AtomicU64>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of keys with a computation currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Run `make()` for `key`, or join the run already in progress.
    ///
    /// `make` is only invoked by the caller that starts the flight. Returns
    /// `None` if the flight ended without publishing a value (the spawned task
    /// panicked or the runtime shut down).
    pub async fn run<F, Fut>(&self, key: K, make: F) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (mut rx, leader) = match self.flights.entry(key.clone()) {
            Entry::Occupied(slot) => (slot.get().1.clone(), None),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                slot.insert((id, rx.clone()));
                (rx, Some((id, tx)))
            }
        };

        if let Some((id, tx)) = leader {
            let fut = make();
            let guard = FlightGuard {
                flights: Arc::clone(&self.flights),
                key,
                id,
            };
            tokio::spawn(async move {
                let value = fut.await;
                // Unregister before publishing so that callers arriving after
                // the outcome is known start a fresh flight.
                drop(guard);
                let _ = tx.send(Some(value));
            });
        }

        let outcome = rx.wait_for(Option::is_some).await.ok()?;
        outcome.clone()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for SingleFlight<K, V> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

/// Removes the flight's map entry when the spawned task finishes or unwinds.
struct FlightGuard<K: Eq + Hash, V> {
    flights: Arc<DashMap<K, Slot<V>>>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash, V> Drop for FlightGuard<K, V> {
    fn drop(&mut self) {
        self.flights.remove_if(&self.key, |_, slot| slot.0 == self.id);
    }
}
