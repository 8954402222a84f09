use super::ThreadPool;
use crate::Result;
use crossbeam::channel::{self, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, error};

type Handler = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool realizing the server's thread cap.
///
/// Connection handlers queue on a crossbeam MPMC channel and the pooled
/// threads drain it, so at most `threads` connections are serviced at once;
/// the rest sit in the queue until a thread frees up.
///
/// Two properties matter for this store in particular:
///
/// * A handler parked in a long `wait` occupies its thread until the key is
///   published. The cap must therefore stay above the number of concurrently
///   parked waiters, or the connection that would publish the key can never
///   be scheduled.
/// * A handler that panics is caught and logged; the thread moves on to the
///   next queued connection, so one poisoned connection cannot shrink the
///   pool.
pub struct SharedQueueThreadPool {
    handlers: Sender<Handler>,
}

impl ThreadPool for SharedQueueThreadPool {
    /// starts `threads` handler threads, all draining the same queue
    fn new(threads: u32) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<Handler>();
        for i in 0..threads {
            let handlers = rx.clone();
            thread::Builder::new()
                .name(format!("handler-{}", i))
                .spawn(move || {
                    // iteration ends when the pool, the only sender, is dropped
                    for handler in handlers.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(handler)).is_err() {
                            error!("connection handler panicked");
                        }
                    }
                    debug!("handler pool dropped, thread exiting");
                })?;
        }
        Ok(SharedQueueThreadPool { handlers: tx })
    }

    /// Queues a connection handler onto the pool.
    ///
    /// # Panics
    ///
    /// Panics if every handler thread has exited, which only happens when
    /// the pool was created with zero threads.
    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handlers
            .send(Box::new(job))
            .expect("no handler threads are running");
    }
}
