//! Contract tests run against every backend variant: same observable
//! semantics, three concurrency disciplines.

use super::*;
use crate::wire::counter_from_bytes;
use crate::StoreError;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const WAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// parks a waiter on `key` in its own thread; the returned channel fires once
/// the waiter unblocks
fn spawn_waiter<S: Store>(store: &S, key: &[u8]) -> mpsc::Receiver<()> {
    let store = store.clone();
    let key = key.to_vec();
    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        store.wait(&key).unwrap();
        let _ = done_tx.send(());
    });
    done_rx
}

fn set_then_get<S: Store>(store: S) {
    store.set(b"k", b"hello".to_vec()).unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"hello");
}

fn set_replaces_value<S: Store>(store: S) {
    store.set(b"k", b"one".to_vec()).unwrap();
    store.set(b"k", b"two".to_vec()).unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"two");
}

fn set_is_idempotent<S: Store>(store: S) {
    store.set(b"k", b"v".to_vec()).unwrap();
    store.set(b"k", b"v".to_vec()).unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"v");
}

fn get_missing_key_fails<S: Store>(store: S) {
    match store.get(b"nope") {
        Err(StoreError::KeyNotFound) => {}
        other => panic!("expected KeyNotFound, got {:?}", other),
    }
}

fn empty_key_and_value_are_legal<S: Store>(store: S) {
    store.set(b"", Vec::new()).unwrap();
    assert_eq!(store.get(b"").unwrap(), Vec::<u8>::new());
    // an empty value is distinguishable from absence
    assert!(matches!(store.get(b"other"), Err(StoreError::KeyNotFound)));
}

fn waiters_do_not_publish_a_value<S: Store>(store: S) {
    let done = spawn_waiter(&store, b"k");
    thread::sleep(Duration::from_millis(50));
    // the parked waiter must not make the key readable
    assert!(matches!(store.get(b"k"), Err(StoreError::KeyNotFound)));
    store.set(b"k", b"v".to_vec()).unwrap();
    done.recv_timeout(WAKE_TIMEOUT).unwrap();
}

fn add_starts_from_zero<S: Store>(store: S) {
    assert_eq!(store.add(b"c", 7).unwrap(), 7);
}

fn add_accumulates<S: Store>(store: S) {
    let mut total = 0;
    for delta in [1, 2, 3, 10, 0, 100] {
        total += delta;
        assert_eq!(store.add(b"c", delta).unwrap(), total);
    }
    assert_eq!(counter_from_bytes(&store.get(b"c").unwrap()), total as u64);
}

fn add_negative_delta_fails<S: Store>(store: S) {
    match store.add(b"c", -1) {
        Err(StoreError::InvalidArgument(_)) => {}
        other => panic!("expected InvalidArgument, got {:?}", other),
    }
    // the failed add must not have materialized a counter
    assert!(matches!(store.get(b"c"), Err(StoreError::KeyNotFound)));
}

fn add_treats_non_counter_value_as_zero<S: Store>(store: S) {
    store.set(b"c", b"hello".to_vec()).unwrap();
    assert_eq!(store.add(b"c", 5).unwrap(), 5);
}

fn wait_returns_immediately_when_set<S: Store>(store: S) {
    store.set(b"k", b"v".to_vec()).unwrap();
    store.wait(b"k").unwrap();
}

fn set_wakes_all_waiters<S: Store>(store: S) {
    let first = spawn_waiter(&store, b"k");
    let second = spawn_waiter(&store, b"k");
    thread::sleep(Duration::from_millis(50));

    store.set(b"k", b"v".to_vec()).unwrap();

    first.recv_timeout(WAKE_TIMEOUT).unwrap();
    second.recv_timeout(WAKE_TIMEOUT).unwrap();
    assert_eq!(store.get(b"k").unwrap(), b"v");
}

fn add_wakes_waiters<S: Store>(store: S) {
    let done = spawn_waiter(&store, b"c");
    thread::sleep(Duration::from_millis(50));

    // delta 0 publishes the counter and must still wake
    assert_eq!(store.add(b"c", 0).unwrap(), 0);
    done.recv_timeout(WAKE_TIMEOUT).unwrap();
}

fn waiters_on_distinct_keys_are_independent<S: Store>(store: S) {
    let a = spawn_waiter(&store, b"a");
    let b = spawn_waiter(&store, b"b");
    thread::sleep(Duration::from_millis(50));

    store.set(b"b", b"v".to_vec()).unwrap();
    b.recv_timeout(WAKE_TIMEOUT).unwrap();
    assert!(a.try_recv().is_err());

    store.set(b"a", b"v".to_vec()).unwrap();
    a.recv_timeout(WAKE_TIMEOUT).unwrap();
}

fn concurrent_adds_sum<S: Store>(store: S) {
    const THREADS: u64 = 8;
    const INCREMENTS: u64 = 100;

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    store.add(b"total", 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = THREADS * INCREMENTS;
    assert_eq!(counter_from_bytes(&store.get(b"total").unwrap()), expected);
    assert_eq!(store.add(b"total", 0).unwrap() as u64, expected);
}

macro_rules! backend_contract {
    ($backend:ident, $ctor:expr) => {
        mod $backend {
            use super::*;

            #[test]
            fn set_then_get() {
                super::set_then_get($ctor);
            }

            #[test]
            fn set_replaces_value() {
                super::set_replaces_value($ctor);
            }

            #[test]
            fn set_is_idempotent() {
                super::set_is_idempotent($ctor);
            }

            #[test]
            fn get_missing_key_fails() {
                super::get_missing_key_fails($ctor);
            }

            #[test]
            fn empty_key_and_value_are_legal() {
                super::empty_key_and_value_are_legal($ctor);
            }

            #[test]
            fn waiters_do_not_publish_a_value() {
                super::waiters_do_not_publish_a_value($ctor);
            }

            #[test]
            fn add_starts_from_zero() {
                super::add_starts_from_zero($ctor);
            }

            #[test]
            fn add_accumulates() {
                super::add_accumulates($ctor);
            }

            #[test]
            fn add_negative_delta_fails() {
                super::add_negative_delta_fails($ctor);
            }

            #[test]
            fn add_treats_non_counter_value_as_zero() {
                super::add_treats_non_counter_value_as_zero($ctor);
            }

            #[test]
            fn wait_returns_immediately_when_set() {
                super::wait_returns_immediately_when_set($ctor);
            }

            #[test]
            fn set_wakes_all_waiters() {
                super::set_wakes_all_waiters($ctor);
            }

            #[test]
            fn add_wakes_waiters() {
                super::add_wakes_waiters($ctor);
            }

            #[test]
            fn waiters_on_distinct_keys_are_independent() {
                super::waiters_on_distinct_keys_are_independent($ctor);
            }

            #[test]
            fn concurrent_adds_sum() {
                super::concurrent_adds_sum($ctor);
            }
        }
    };
}

backend_contract!(channel, ChannelStore::new());
backend_contract!(concurrent, ConcurrentStore::new());
backend_contract!(coarse, CoarseStore::new());
