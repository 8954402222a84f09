use super::{check_delta, Store};
use crate::error::{Result, StoreError};
use crate::wire::{counter_from_bytes, counter_to_bytes};
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// A store shard built on a concurrent hash map with one lock per entry.
///
/// Each entry guards its `(valid, value)` pair with its own mutex and carries
/// a condition variable for waiters. Operations on distinct keys never
/// contend, which makes this the highest-throughput variant when the keyspace
/// is wide. A waiter is a thread parked on the entry's condition variable;
/// `set` and `add` broadcast after mutating so every waiter re-checks the
/// `valid` flag and returns.
#[derive(Clone, Default)]
pub struct ConcurrentStore {
    entries: Arc<DashMap<Vec<u8>, Arc<Entry>>>,
}

#[derive(Default)]
struct Entry {
    state: Mutex<EntryState>,
    published: Condvar,
}

#[derive(Default)]
struct EntryState {
    valid: bool,
    value: Vec<u8>,
}

impl ConcurrentStore {
    /// creates an empty shard
    pub fn new() -> ConcurrentStore {
        ConcurrentStore {
            entries: Arc::new(DashMap::new()),
        }
    }

    // get-or-create; the map guarantees exactly one entry per key even under
    // racing creators. The map guard is dropped before the entry lock is
    // taken so map access and entry access never nest.
    fn entry(&self, key: &[u8]) -> Arc<Entry> {
        if let Some(entry) = self.entries.get(key) {
            return entry.value().clone();
        }
        self.entries
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(Entry::default()))
            .value()
            .clone()
    }
}

impl Store for ConcurrentStore {
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        let entry = self.entry(key);
        let mut state = entry.state.lock();
        state.value = value;
        state.valid = true;
        entry.published.notify_all();
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        // a lookup, not a get-or-create: get never materializes an entry
        let entry = match self.entries.get(key) {
            Some(entry) => entry.value().clone(),
            None => return Err(StoreError::KeyNotFound),
        };
        let state = entry.state.lock();
        if !state.valid {
            return Err(StoreError::KeyNotFound);
        }
        Ok(state.value.clone())
    }

    fn add(&self, key: &[u8], delta: i64) -> Result<i64> {
        let incr = check_delta(delta)?;
        let entry = self.entry(key);
        let mut state = entry.state.lock();
        let prev = if state.valid {
            counter_from_bytes(&state.value)
        } else {
            0
        };
        let next = prev.wrapping_add(incr);
        state.value = counter_to_bytes(next).to_vec();
        state.valid = true;
        entry.published.notify_all();
        Ok(next as i64)
    }

    fn wait(&self, key: &[u8]) -> Result<()> {
        let entry = self.entry(key);
        let mut state = entry.state.lock();
        while !state.valid {
            entry.published.wait(&mut state);
        }
        Ok(())
    }
}
