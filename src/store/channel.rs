use super::{check_delta, Store};
use crate::error::{Result, StoreError};
use crate::wire::{counter_from_bytes, counter_to_bytes};
use crossbeam::channel::{self, Receiver, Sender};
use std::collections::HashMap;
use std::thread;
use tracing::debug;

// capacity of the request queue feeding the owner thread
const REQUEST_QUEUE_DEPTH: usize = 1024;

/// A store shard that serializes all access through a single owner thread.
///
/// Every operation is a message on a bounded MPSC channel carrying a
/// single-slot reply channel. The owner thread is the only code that touches
/// the map, so the map needs no synchronization at all. A waiter is simply a
/// reply sender stashed in its entry until the next publish on that key.
///
/// `set` is fire-and-forget: the handle enqueues the request and returns
/// without reading the reply, trading error visibility for throughput.
#[derive(Clone)]
pub struct ChannelStore {
    requests: Sender<Request>,
}

struct Request {
    command: Command,
    reply: Sender<Reply>,
}

enum Command {
    Set { key: Vec<u8>, value: Vec<u8> },
    Get { key: Vec<u8> },
    Add { key: Vec<u8>, incr: u64 },
    Wait { key: Vec<u8> },
}

enum Response {
    Done,
    Value(Vec<u8>),
    Counter(u64),
}

type Reply = Result<Response>;

#[derive(Default)]
struct Entry {
    valid: bool,
    value: Vec<u8>,
    waiters: Vec<Sender<Reply>>,
}

impl ChannelStore {
    /// creates the shard and starts its owner thread.
    /// The thread exits once every handle to the shard has been dropped.
    pub fn new() -> ChannelStore {
        let (tx, rx) = channel::bounded(REQUEST_QUEUE_DEPTH);
        thread::spawn(move || owner_loop(rx));
        ChannelStore { requests: tx }
    }

    fn submit(&self, command: Command) -> Result<Receiver<Reply>> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.requests
            .send(Request {
                command,
                reply: reply_tx,
            })
            .map_err(|_| StoreError::Internal("store owner thread is not running".to_string()))?;
        Ok(reply_rx)
    }

    fn round_trip(&self, command: Command) -> Result<Response> {
        let reply = self.submit(command)?;
        reply
            .recv()
            .map_err(|_| StoreError::Internal("store owner thread is not running".to_string()))?
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for ChannelStore {
    fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        // the reply slot is dropped unread; the owner's send into it fails
        // silently and the operation is complete from the caller's view
        self.submit(Command::Set {
            key: key.to_vec(),
            value,
        })?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.round_trip(Command::Get { key: key.to_vec() })? {
            Response::Value(value) => Ok(value),
            _ => Err(StoreError::Internal("unexpected reply to get".to_string())),
        }
    }

    fn add(&self, key: &[u8], delta: i64) -> Result<i64> {
        let incr = check_delta(delta)?;
        match self.round_trip(Command::Add {
            key: key.to_vec(),
            incr,
        })? {
            Response::Counter(value) => Ok(value as i64),
            _ => Err(StoreError::Internal("unexpected reply to add".to_string())),
        }
    }

    fn wait(&self, key: &[u8]) -> Result<()> {
        match self.round_trip(Command::Wait { key: key.to_vec() })? {
            Response::Done => Ok(()),
            _ => Err(StoreError::Internal("unexpected reply to wait".to_string())),
        }
    }
}

/// the owner loop: sole reader of the request queue and sole owner of the map
fn owner_loop(requests: Receiver<Request>) {
    let mut entries: HashMap<Vec<u8>, Entry> = HashMap::new();

    for request in requests.iter() {
        match request.command {
            Command::Get { key } => {
                let reply = match entries.get(&key) {
                    Some(entry) if entry.valid => Ok(Response::Value(entry.value.clone())),
                    _ => Err(StoreError::KeyNotFound),
                };
                let _ = request.reply.send(reply);
            }

            Command::Set { key, value } => {
                let entry = entries.entry(key).or_default();
                entry.value = value;
                entry.valid = true;
                wake_waiters(entry);
                let _ = request.reply.send(Ok(Response::Done));
            }

            Command::Add { key, incr } => {
                let entry = entries.entry(key).or_default();
                let prev = if entry.valid {
                    counter_from_bytes(&entry.value)
                } else {
                    0
                };
                let next = prev.wrapping_add(incr);
                entry.value = counter_to_bytes(next).to_vec();
                entry.valid = true;
                wake_waiters(entry);
                let _ = request.reply.send(Ok(Response::Counter(next)));
            }

            Command::Wait { key } => {
                let entry = entries.entry(key).or_default();
                if entry.valid {
                    let _ = request.reply.send(Ok(Response::Done));
                } else {
                    entry.waiters.push(request.reply);
                }
            }
        }
    }

    debug!("request queue closed, store owner exiting");
}

fn wake_waiters(entry: &mut Entry) {
    for waiter in entry.waiters.drain(..) {
        // a failed send means the waiter's connection was torn down; its
        // reply slot went with it, so there is nothing to leak
        let _ = waiter.send(Ok(Response::Done));
    }
}
