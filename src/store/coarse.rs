use super::{check_delta, Store};
use crate::error::{Result, StoreError};
use crate::wire::{counter_from_bytes, counter_to_bytes};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A store shard with a single reader-writer lock over the whole map.
///
/// Reads share the lock; `set` and `add` take it exclusively. Waiters park on
/// a per-key gate (a mutex/condvar pair) kept in a side map. The gate for a
/// key is installed lazily by the first waiter; the install is a check-then-act
/// under the side map's own lock, and the waiter re-checks the value map while
/// holding the gate mutex before parking. A publisher drops the write lock
/// first and then broadcasts under the gate mutex, so the re-check and the
/// broadcast cannot interleave into a missed wake-up.
#[derive(Clone, Default)]
pub struct CoarseStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    values: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    gates: Mutex<HashMap<Vec<u8>, Arc<Gate>>>,
}

#[derive(Default)]
struct Gate {
    lock: Mutex<()>,
    published: Condvar,
}

impl CoarseStore {
    /// creates an empty shard
    pub fn new() -> CoarseStore {
        CoarseStore {
            inner: Arc::new(Inner::default()),
        }
    }

    // broadcast the key's gate if one was ever installed.
    // Must not be called while holding the value-map lock.
    fn notify(&self, key: &[u8]) {
        let gate = self.inner.gates.lock().get(key).cloned();
        if let Some(gate) = gate {
            let _parked = gate.lock.lock();
            gate.published.notify_all();
        }
    }
}

impl Store for CoarseStore {
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.inner.values.write().insert(key.to_vec(), value);
        self.notify(key);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .values
            .read()
            .get(key)
            .cloned()
            .ok_or(StoreError::KeyNotFound)
    }

    fn add(&self, key: &[u8], delta: i64) -> Result<i64> {
        let incr = check_delta(delta)?;
        let next = {
            let mut values = self.inner.values.write();
            let prev = values.get(key).map_or(0, |v| counter_from_bytes(v));
            let next = prev.wrapping_add(incr);
            values.insert(key.to_vec(), counter_to_bytes(next).to_vec());
            next
        };
        self.notify(key);
        Ok(next as i64)
    }

    fn wait(&self, key: &[u8]) -> Result<()> {
        loop {
            if self.inner.values.read().contains_key(key) {
                return Ok(());
            }

            // another waiter may have installed the gate between our value
            // check and this lookup, hence get-or-insert under the side lock
            let gate = self
                .inner
                .gates
                .lock()
                .entry(key.to_vec())
                .or_insert_with(|| Arc::new(Gate::default()))
                .clone();

            let mut parked = gate.lock.lock();
            if self.inner.values.read().contains_key(key) {
                return Ok(());
            }
            gate.published.wait(&mut parked);
        }
    }
}
