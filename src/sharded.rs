use crate::error::{Result, StoreError};
use crate::store::Store;
use xxhash_rust::xxh64::xxh64;

/// Routes every key to exactly one of `N` independent backend shards.
///
/// A key's shard is `xxh64(key) mod N`, fixed for the lifetime of the server;
/// the single-shard case skips hashing entirely. Shards share nothing, so
/// operations on keys in different shards carry no ordering relation to each
/// other.
#[derive(Clone)]
pub struct ShardedStore<S> {
    shards: Vec<S>,
}

impl<S: Store> ShardedStore<S> {
    /// wraps the given backend instances. At least one shard is required.
    pub fn new(shards: Vec<S>) -> Result<ShardedStore<S>> {
        if shards.is_empty() {
            return Err(StoreError::InvalidArgument(
                "a sharded store needs at least one shard".to_string(),
            ));
        }
        Ok(ShardedStore { shards })
    }

    pub(crate) fn shard_index(&self, key: &[u8]) -> usize {
        if self.shards.len() == 1 {
            return 0;
        }
        (xxh64(key, 0) % self.shards.len() as u64) as usize
    }

    fn shard(&self, key: &[u8]) -> &S {
        &self.shards[self.shard_index(key)]
    }

    /// routes a `set` to the key's shard
    pub fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.shard(key).set(key, value)
    }

    /// routes a `get` to the key's shard
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.shard(key).get(key)
    }

    /// routes an `add` to the key's shard
    pub fn add(&self, key: &[u8], delta: i64) -> Result<i64> {
        self.shard(key).add(key, delta)
    }

    /// waits for every key in input order, each on its own shard
    pub fn wait(&self, keys: &[Vec<u8>]) -> Result<()> {
        for key in keys {
            self.shard(key).wait(key)?;
        }
        Ok(())
    }
}
