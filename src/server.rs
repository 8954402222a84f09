use crate::error::{Result, StoreError};
use crate::sharded::ShardedStore;
use crate::store::Store;
use crate::thread_pool::ThreadPool;
use crate::wire::{self, Opcode, STOP_WAITING, VALIDATION_MAGIC};
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

/// A TCP server multiplexing many long-lived peer connections over a sharded
/// rendezvous store.
///
/// A fixed set of accept workers pulls connections from the listener in
/// parallel; every accepted connection is handed to the [`ThreadPool`] and
/// runs a read-dispatch-respond-flush loop until the peer hangs up or sends
/// something the protocol rejects. All request failures are isolated to
/// their own connection: the wire format has no error frame, so the handler
/// simply drops the connection and logs.
///
/// # Example
/// Serve a single channel-backed shard with 4 accept workers:
/// ```no_run
/// use rstore::thread_pool::{NaiveThreadPool, ThreadPool};
/// use rstore::{ChannelStore, Result, ShardedStore, StoreServer};
/// # fn main() -> Result<()> {
/// let store = ShardedStore::new(vec![ChannelStore::new()])?;
/// let server = StoreServer::new(store, NaiveThreadPool::new(0)?, 4);
/// server.run("0.0.0.0:19503")?;
/// # Ok(())
/// # }
/// ```
pub struct StoreServer<S: Store, P: ThreadPool> {
    /// the sharded store requests are dispatched to
    store: ShardedStore<S>,
    /// runs one handler loop per live connection
    pool: P,
    /// degree of accept-loop parallelism
    accept_workers: usize,
}

impl<S: Store, P: ThreadPool + Send + Sync + 'static> StoreServer<S, P> {
    /// Create a new `StoreServer` over the given store, handler pool, and
    /// number of accept workers (at least one).
    pub fn new(store: ShardedStore<S>, pool: P, accept_workers: usize) -> Self {
        StoreServer {
            store,
            pool,
            accept_workers: accept_workers.max(1),
        }
    }

    /// binds a listener on `addr` and serves until an accept worker fails
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        self.run_on(listener)
    }

    /// serves on an already-bound listener.
    /// The first accept failure is returned once the workers have stopped.
    pub fn run_on(self, listener: TcpListener) -> Result<()> {
        info!("Listening on {}", listener.local_addr()?);

        let workers = self.accept_workers;
        let server = Arc::new(self);
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let listener = listener.try_clone()?;
            let server = Arc::clone(&server);
            let handle = thread::Builder::new()
                .name(format!("accept-{}", i))
                .spawn(move || server.accept_loop(listener))?;
            handles.push(handle);
        }

        let mut result = Ok(());
        for handle in handles {
            let worker_result = handle
                .join()
                .map_err(|_| StoreError::Internal("accept worker panicked".to_string()))?;
            if result.is_ok() {
                result = worker_result;
            }
        }
        result
    }

    fn accept_loop(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, _) = listener.accept()?;
            let store = self.store.clone();
            self.pool.spawn(move || {
                if let Err(e) = serve(store, stream) {
                    if e.is_disconnect() {
                        debug!("client went away mid-request: {}", e);
                    } else {
                        error!("Error on serving client: {:?}", e);
                    }
                }
            });
        }
    }
}

/// Runs the command loop for one connection: read a request, dispatch it to
/// the store, write the response if the request has one, flush, repeat.
/// Returns `Ok(())` on a clean close, the offending error otherwise.
fn serve<S: Store>(store: ShardedStore<S>, tcp: TcpStream) -> Result<()> {
    let peer_addr = tcp.peer_addr()?;
    tcp.set_nodelay(true)?;
    let mut reader = BufReader::new(&tcp);
    let mut writer = BufWriter::new(&tcp);
    let mut validated = false;

    debug!("accepted connection from {}", peer_addr);

    loop {
        let cmd = match wire::read_u8(&mut reader) {
            Ok(cmd) => cmd,
            Err(e) if e.is_disconnect() => {
                debug!("client {} disconnected", peer_addr);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        process_command(&store, cmd, &mut reader, &mut writer, &mut validated)?;
        writer.flush()?;
    }
}

/// decodes and executes a single request.
/// Any error terminates the connection; there is no per-request error frame.
fn process_command<S: Store, R: Read, W: Write>(
    store: &ShardedStore<S>,
    cmd: u8,
    reader: &mut R,
    writer: &mut W,
    validated: &mut bool,
) -> Result<()> {
    let opcode = Opcode::from_u8(cmd)
        .ok_or_else(|| StoreError::InvalidArgument(format!("unknown command {}", cmd)))?;

    if !*validated && opcode != Opcode::Validate {
        return Err(StoreError::Protocol(format!(
            "{:?} request before validation",
            opcode
        )));
    }

    match opcode {
        Opcode::Validate => {
            let magic = wire::read_u32(reader)?;
            if magic != VALIDATION_MAGIC {
                return Err(StoreError::InvalidArgument(format!(
                    "invalid magic number {:x}",
                    magic
                )));
            }
            *validated = true;
            Ok(())
        }

        Opcode::Ping => {
            let nonce = wire::read_u32(reader)?;
            wire::write_u32(writer, nonce)
        }

        Opcode::Set => {
            let key = wire::read_bytes(reader)?;
            let value = wire::read_bytes(reader)?;
            store.set(&key, value)
        }

        Opcode::Get => {
            let key = wire::read_bytes(reader)?;
            let value = store.get(&key)?;
            wire::write_bytes(writer, &value)
        }

        Opcode::Add => {
            let key = wire::read_bytes(reader)?;
            let delta = wire::read_i64(reader)?;
            let value = store.add(&key, delta)?;
            wire::write_i64(writer, value)
        }

        Opcode::Wait => {
            let keys = wire::read_bytes_list(reader)?;
            store.wait(&keys)?;
            wire::write_u8(writer, STOP_WAITING)
        }

        other => Err(StoreError::InvalidArgument(format!(
            "unimplemented command {:?}",
            other
        ))),
    }
}
