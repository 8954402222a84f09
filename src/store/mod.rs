//! This module provides the backend store implementations that hold the
//! rendezvous state of one shard.
//!
//! All three backends expose the same four operations and the same observable
//! semantics; they differ only in how they serialize concurrent access:
//!
//! * [`ChannelStore`] funnels every request through a bounded queue to a
//!   single owner thread, so the map itself needs no locks.
//! * [`ConcurrentStore`] keeps a lock-free map of entries, each guarded by
//!   its own mutex and condition variable.
//! * [`CoarseStore`] guards the whole map with one reader-writer lock.

use crate::Result;

/// A trait for the four operations of a rendezvous store shard.
///
/// Handles are cheap to clone; every clone operates on the same shared state.
pub trait Store: Clone + Send + Sync + 'static {
    /// Replaces the value stored under `key` and wakes every waiter parked
    /// on it.
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Returns the value stored under `key` without blocking.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KeyNotFound` if no value has been published for
    /// `key`, including when the entry exists only because waiters are parked
    /// on it.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Treats the value under `key` as a little-endian `u64` counter (0 when
    /// unset), adds `delta`, stores the result, and wakes every waiter parked
    /// on the key. Returns the new counter value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidArgument` if `delta` is negative.
    fn add(&self, key: &[u8], delta: i64) -> Result<i64>;

    /// Blocks until a value has been published for `key`. Returns immediately
    /// if one already has.
    fn wait(&self, key: &[u8]) -> Result<()>;
}

mod channel;
mod coarse;
mod concurrent;

pub use self::channel::ChannelStore;
pub use self::coarse::CoarseStore;
pub use self::concurrent::ConcurrentStore;

// shared guard for the one argument every backend rejects
pub(crate) fn check_delta(delta: i64) -> Result<u64> {
    if delta < 0 {
        return Err(crate::StoreError::InvalidArgument(format!(
            "increment must be non-negative, got {}",
            delta
        )));
    }
    Ok(delta as u64)
}

#[cfg(test)]
mod tests;
