//! Lock behaviour across real OS threads.

mod common;

use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use nd_common::types::WriteNumber;
use nd_core::NodeType;

use common::{memory_session, FileNode, FILE_HASH};

/// Readers never block each other: every reader holds its lock at the same
/// time as all the others.
#[test]
fn test_readers_share_the_lock() {
    let (nd, _) = memory_session();
    let readers = 4;
    let barrier = Arc::new(Barrier::new(readers));

    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let nd = Arc::clone(&nd);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let _read = nd.acquire_read_lock();
                // Deadlocks unless all readers are inside at once.
                barrier.wait();
                assert!(nd.holds_read_lock());
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("reader thread");
    }
    assert!(!nd.database().is_locked());
}

/// A writer waits for readers, and readers wait for a writer.
#[test]
fn test_writer_excludes_readers() {
    let (nd, _) = memory_session();
    let (events_tx, events_rx) = mpsc::channel();

    let write = nd.acquire_write_lock();
    let reader = {
        let nd = Arc::clone(&nd);
        let events_tx = events_tx.clone();
        thread::spawn(move || {
            let _read = nd.acquire_read_lock();
            events_tx
                .send(nd.write_number().expect("write number"))
                .expect("send");
        })
    };

    assert!(events_rx.recv_timeout(Duration::from_millis(100)).is_err());
    write.release().expect("release");

    // The reader only gets in after the transaction completed.
    let seen = events_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("reader ran");
    assert_eq!(seen, WriteNumber::new(1));
    reader.join().expect("reader thread");
}

/// Writers are serialized: concurrent read-modify-write transactions never
/// lose an update, and each one bumps the write number once.
#[test]
fn test_writers_are_serialized() {
    let (nd, _) = memory_session();
    let address = {
        let _write = nd.acquire_write_lock();
        nd.create::<FileNode>().expect("create").address()
    };

    let threads = 4;
    let rounds = 25;
    let start = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let nd = Arc::clone(&nd);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..rounds {
                    let write = nd.acquire_write_lock();
                    let file = nd.load::<FileNode>(address).expect("load").expect("some");
                    let count = file.node().get_long(&FILE_HASH).expect("get");
                    thread::yield_now();
                    file.node().put_long(&FILE_HASH, count + 1).expect("put");
                    write.release().expect("release");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread");
    }

    let _read = nd.acquire_read_lock();
    let file = nd.load::<FileNode>(address).expect("load").expect("some");
    let total = (threads * rounds) as u64;
    assert_eq!(file.node().get_long(&FILE_HASH).expect("get"), total);
    assert_eq!(
        nd.write_number().expect("write number"),
        WriteNumber::new(total + 1)
    );
}

/// A reader sees one consistent write number for as long as it holds its
/// lock, even while a writer is queued.
#[test]
fn test_write_number_stable_under_read_lock() {
    let (nd, _) = memory_session();
    let read = nd.acquire_read_lock();
    let before = nd.write_number().expect("write number");

    let (done_tx, done_rx) = mpsc::channel();
    let writer = {
        let nd = Arc::clone(&nd);
        thread::spawn(move || {
            nd.acquire_write_lock().release().expect("release");
            done_tx.send(()).expect("send");
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(nd.write_number().expect("write number"), before);
    read.release();

    done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("writer ran");
    writer.join().expect("writer thread");
    assert_eq!(nd.write_number().expect("write number"), before.next());
}

/// A queued writer does not stop a new reader from joining readers that
/// already hold the lock.
#[test]
fn test_reader_not_blocked_by_queued_writer() {
    let (nd, _) = memory_session();
    let first = nd.acquire_read_lock();

    let (written_tx, written_rx) = mpsc::channel();
    let writer = {
        let nd = Arc::clone(&nd);
        thread::spawn(move || {
            nd.acquire_write_lock().release().expect("release");
            written_tx.send(()).expect("send");
        })
    };
    // Let the writer start waiting.
    thread::sleep(Duration::from_millis(100));
    assert!(written_rx.try_recv().is_err());

    let (read_tx, read_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let second = {
        let nd = Arc::clone(&nd);
        thread::spawn(move || {
            let _read = nd.acquire_read_lock();
            read_tx.send(()).expect("send");
            // Hold the lock until the main thread has checked.
            let _ = done_rx.recv_timeout(Duration::from_secs(5));
        })
    };

    read_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second reader joined while the writer was queued");
    assert!(written_rx.try_recv().is_err());

    done_tx.send(()).expect("send");
    second.join().expect("second reader thread");
    first.release();

    written_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("writer ran");
    writer.join().expect("writer thread");
}

/// The storage stays marked locked while any thread holds a lock, however
/// acquires and releases interleave.
#[test]
fn test_storage_locked_while_any_lock_held() {
    let (nd, _) = memory_session();
    let threads = 4;
    let rounds = 500;
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let nd = Arc::clone(&nd);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for round in 0..rounds {
                    if (i + round) % 10 == 0 {
                        let write = nd.acquire_write_lock();
                        assert!(nd.database().is_locked());
                        write.release().expect("release");
                    } else {
                        let read = nd.acquire_read_lock();
                        assert!(nd.database().is_locked());
                        thread::yield_now();
                        assert!(nd.database().is_locked());
                        read.release();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("locking thread");
    }
    assert!(!nd.database().is_locked());
}
