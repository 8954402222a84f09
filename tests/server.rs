//! End-to-end tests that boot a real server on an ephemeral port and drive it
//! over TCP, both through the client library and through raw frames.

use rstore::thread_pool::{NaiveThreadPool, ThreadPool};
use rstore::wire::{self, Opcode, STOP_WAITING, VALIDATION_MAGIC};
use rstore::{
    ChannelStore, CoarseStore, ConcurrentStore, ShardedStore, Store, StoreClient, StoreServer,
};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const WAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// boots a server over the given shards and returns its address
fn start_server<S: Store>(shards: Vec<S>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let store = ShardedStore::new(shards).unwrap();
    let server = StoreServer::new(store, NaiveThreadPool::new(0).unwrap(), 2);
    thread::spawn(move || server.run_on(listener));
    addr
}

fn start_channel_server() -> SocketAddr {
    start_server(vec![ChannelStore::new()])
}

fn connect(addr: SocketAddr) -> StoreClient {
    StoreClient::connect(&addr.to_string()).unwrap()
}

/// opens a raw connection and performs the VALIDATE handshake
fn raw_validated(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_nodelay(true).unwrap();
    wire::write_u8(&mut stream, Opcode::Validate as u8).unwrap();
    wire::write_u32(&mut stream, VALIDATION_MAGIC).unwrap();
    stream
}

/// asserts that the server has closed its side of `stream`
fn assert_closed(stream: &mut TcpStream) {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    assert!(wire::read_u8(stream).is_err());
}

#[test]
fn ping_echoes_the_nonce() {
    let addr = start_channel_server();
    let mut stream = raw_validated(addr);

    wire::write_u8(&mut stream, Opcode::Ping as u8).unwrap();
    wire::write_u32(&mut stream, 0x1122_3344).unwrap();
    assert_eq!(wire::read_u32(&mut stream).unwrap(), 0x1122_3344);
}

#[test]
fn set_then_get_round_trips_on_the_wire() {
    let addr = start_channel_server();
    let mut stream = raw_validated(addr);

    wire::write_u8(&mut stream, Opcode::Set as u8).unwrap();
    wire::write_bytes(&mut stream, b"k").unwrap();
    wire::write_bytes(&mut stream, b"hello").unwrap();

    // wait first so the read cannot race the set
    wire::write_u8(&mut stream, Opcode::Wait as u8).unwrap();
    wire::write_bytes_list(&mut stream, &[&b"k"[..]]).unwrap();
    assert_eq!(wire::read_u8(&mut stream).unwrap(), STOP_WAITING);

    wire::write_u8(&mut stream, Opcode::Get as u8).unwrap();
    wire::write_bytes(&mut stream, b"k").unwrap();
    // the value arrives as a u64 length followed by the raw payload
    assert_eq!(wire::read_u64(&mut stream).unwrap(), 5);
    let mut value = [0u8; 5];
    std::io::Read::read_exact(&mut stream, &mut value).unwrap();
    assert_eq!(&value, b"hello");
}

#[test]
fn client_set_then_get() {
    let addr = start_channel_server();
    let mut client = connect(addr);

    client.set(b"k", b"hello").unwrap();
    assert_eq!(client.get(b"k").unwrap(), b"hello");
}

#[test]
fn add_returns_the_running_total() {
    let addr = start_channel_server();
    let mut client = connect(addr);

    assert_eq!(client.add(b"c", 5).unwrap(), 5);
    assert_eq!(client.add(b"c", 0).unwrap(), 5);
    assert_eq!(client.add(b"c", 7).unwrap(), 12);
}

#[test]
fn get_blocks_until_published() {
    let addr = start_channel_server();

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut client = connect(addr);
        let value = client.get(b"late").unwrap();
        done_tx.send(value).unwrap();
    });

    thread::sleep(Duration::from_millis(100));
    assert!(done_rx.try_recv().is_err());

    connect(addr).set(b"late", b"v").unwrap();
    assert_eq!(done_rx.recv_timeout(WAKE_TIMEOUT).unwrap(), b"v");
}

#[test]
fn set_wakes_every_waiting_connection() {
    let addr = start_channel_server();

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let (done_tx, done_rx) = mpsc::channel();
            thread::spawn(move || {
                let mut client = connect(addr);
                client.wait(&[&b"k"[..]]).unwrap();
                done_tx.send(()).unwrap();
            });
            done_rx
        })
        .collect();
    thread::sleep(Duration::from_millis(100));

    let mut publisher = connect(addr);
    publisher.set(b"k", b"v").unwrap();

    for waiter in waiters {
        waiter.recv_timeout(WAKE_TIMEOUT).unwrap();
    }
    assert_eq!(publisher.get(b"k").unwrap(), b"v");
}

#[test]
fn barrier_ranks_are_a_permutation() {
    let addr = start_channel_server();
    const WORLD_SIZE: u64 = 3;

    let (rank_tx, rank_rx) = mpsc::channel();
    for _ in 0..WORLD_SIZE {
        let rank_tx = rank_tx.clone();
        thread::spawn(move || {
            let mut client = connect(addr);
            let rank = client.barrier(b"B", WORLD_SIZE).unwrap();
            rank_tx.send(rank).unwrap();
        });
    }

    let mut ranks: Vec<u64> = (0..WORLD_SIZE)
        .map(|_| rank_rx.recv_timeout(WAKE_TIMEOUT).unwrap())
        .collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![1, 2, 3]);
}

#[test]
fn shards_count_independently() {
    let addr = start_server((0..4).map(|_| ChannelStore::new()).collect::<Vec<_>>());
    let keys: Vec<Vec<u8>> = (0..16).map(|i| format!("key/{}", i).into_bytes()).collect();

    let handles: Vec<_> = keys
        .iter()
        .map(|key| {
            let key = key.clone();
            thread::spawn(move || {
                let mut client = connect(addr);
                for _ in 0..25 {
                    client.add(&key, 4).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut client = connect(addr);
    for key in &keys {
        assert_eq!(client.add(key, 0).unwrap(), 100);
    }
}

#[test]
fn wait_spanning_shards_covers_every_key() {
    let addr = start_server((0..4).map(|_| ChannelStore::new()).collect::<Vec<_>>());

    let keys: Vec<Vec<u8>> = (0..8).map(|i| format!("key/{}", i).into_bytes()).collect();
    let (done_tx, done_rx) = mpsc::channel();
    {
        let keys = keys.clone();
        thread::spawn(move || {
            let mut client = connect(addr);
            let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
            client.wait(&refs).unwrap();
            done_tx.send(()).unwrap();
        });
    }
    thread::sleep(Duration::from_millis(100));
    assert!(done_rx.try_recv().is_err());

    let mut publisher = connect(addr);
    for key in &keys {
        publisher.set(key, b"v").unwrap();
    }
    done_rx.recv_timeout(WAKE_TIMEOUT).unwrap();
}

#[test]
fn unknown_opcode_closes_only_that_connection() {
    let addr = start_channel_server();

    let mut bystander = connect(addr);
    bystander.set(b"k", b"v").unwrap();

    let mut stream = raw_validated(addr);
    wire::write_u8(&mut stream, 99).unwrap();
    assert_closed(&mut stream);

    // the other connection keeps working
    assert_eq!(bystander.get(b"k").unwrap(), b"v");
}

#[test]
fn reserved_opcode_closes_the_connection() {
    let addr = start_channel_server();
    let mut stream = raw_validated(addr);

    wire::write_u8(&mut stream, Opcode::DeleteKey as u8).unwrap();
    wire::write_bytes(&mut stream, b"k").unwrap();
    assert_closed(&mut stream);
}

#[test]
fn request_before_validate_closes_the_connection() {
    let addr = start_channel_server();
    let mut stream = TcpStream::connect(addr).unwrap();

    wire::write_u8(&mut stream, Opcode::Ping as u8).unwrap();
    wire::write_u32(&mut stream, 7).unwrap();
    assert_closed(&mut stream);
}

#[test]
fn bad_magic_closes_the_connection() {
    let addr = start_channel_server();
    let mut stream = TcpStream::connect(addr).unwrap();

    wire::write_u8(&mut stream, Opcode::Validate as u8).unwrap();
    wire::write_u32(&mut stream, 0xDEAD_BEEF).unwrap();
    assert_closed(&mut stream);
}

#[test]
fn get_of_a_missing_key_closes_the_connection() {
    let addr = start_channel_server();
    let mut stream = raw_validated(addr);

    // the raw GET skips the client library's pre-wait, so the miss is
    // observable; there is no error frame, the server just hangs up
    wire::write_u8(&mut stream, Opcode::Get as u8).unwrap();
    wire::write_bytes(&mut stream, b"missing").unwrap();
    assert_closed(&mut stream);
}

#[test]
fn negative_add_closes_the_connection() {
    let addr = start_channel_server();
    let mut stream = raw_validated(addr);

    wire::write_u8(&mut stream, Opcode::Add as u8).unwrap();
    wire::write_bytes(&mut stream, b"c").unwrap();
    wire::write_i64(&mut stream, -4).unwrap();
    assert_closed(&mut stream);
}

#[test]
fn every_backend_serves_the_same_protocol() {
    let addrs = vec![
        start_server(vec![ChannelStore::new()]),
        start_server(vec![ConcurrentStore::new()]),
        start_server(vec![CoarseStore::new()]),
    ];

    for addr in addrs {
        let mut client = connect(addr);
        client.set(b"k", b"hello").unwrap();
        assert_eq!(client.get(b"k").unwrap(), b"hello");
        assert_eq!(client.add(b"c", 3).unwrap(), 3);
        client.wait(&[&b"k"[..], &b"c"[..]]).unwrap();
    }
}
