//! This module provides the thread pools that run connection handlers.
//!
//! A handler can block indefinitely inside a `wait`, so the default choice is
//! [`NaiveThreadPool`], which dedicates a thread to every connection.
//! [`SharedQueueThreadPool`] bounds the number of handler threads instead and
//! is only safe when the operator knows the bound exceeds the number of
//! concurrently parked waiters.

use crate::Result;

/// A trait for spawning connection handlers onto pooled threads
pub trait ThreadPool {
    /// creates a pool with the given number of `threads`
    fn new(threads: u32) -> Result<Self>
    where
        Self: Sized;

    /// Spawns a function into the thread pool.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

mod naive;
mod shared_queue;

pub use self::naive::NaiveThreadPool;
pub use self::shared_queue::SharedQueueThreadPool;
