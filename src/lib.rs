#![deny(missing_docs)]
//! # rstore
//! A multi-threaded rendezvous key-value store for distributed training jobs.
//!
//! Worker processes connect over long-lived TCP connections to one server
//! instance to exchange small opaque values, publish readiness markers, and
//! run counter-based barriers: each peer increments a shared counter to claim
//! a rank, the last arrival publishes a final key, and everyone else blocks
//! on it. The store is in-memory, plaintext, and lives exactly as long as the
//! job it coordinates.
//!
//! Keys are routed to one of N independent backend shards by hash. Three
//! interchangeable backends realize the same `set`/`get`/`add`/`wait`
//! contract with different concurrency disciplines: a channel-serialized
//! owner thread ([`ChannelStore`]), per-entry locking ([`ConcurrentStore`]),
//! and one coarse lock over the whole map ([`CoarseStore`]).

pub use client::StoreClient;
pub use error::{Result, StoreError};
pub use server::StoreServer;
pub use sharded::ShardedStore;
pub use store::{ChannelStore, CoarseStore, ConcurrentStore, Store};

mod client;
mod error;
mod server;
mod sharded;
mod store;
pub mod thread_pool;
pub mod wire;
