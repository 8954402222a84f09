use super::ThreadPool;
use crate::Result;
use std::thread;

/// a thread-pool that is not actually a pool: it starts a fresh thread for
/// every spawned job. One connection, one thread; a handler parked in a long
/// `wait` never starves the others.
pub struct NaiveThreadPool;

impl ThreadPool for NaiveThreadPool {
    fn new(_threads: u32) -> Result<Self> {
        Ok(NaiveThreadPool)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        thread::spawn(job);
    }
}
