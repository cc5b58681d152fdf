/*!
 * Queue introspection tests
 */

use crate::common::eventually;
use ai_os_sync::{Mutex, ReadWriteLock, ReentrantLock, ThreadHandle};
use pretty_assertions::assert_eq;
use std::sync::{mpsc, Arc};
use std::thread;

#[test]
fn test_queued_threads_longest_waiting_first() {
    let mutex = Arc::new(Mutex::new());
    mutex.lock().unwrap();

    let mut expected = Vec::new();
    let mut handles = Vec::new();
    for index in 0..4 {
        let (tx, rx) = mpsc::channel();
        let m = mutex.clone();
        handles.push(
            thread::Builder::new()
                .name(format!("queued-{index}"))
                .spawn(move || {
                    tx.send(ThreadHandle::current()).unwrap();
                    m.lock().unwrap();
                    m.unlock().unwrap();
                })
                .unwrap(),
        );
        let handle = rx.recv().unwrap();
        assert!(eventually(|| mutex.sync().is_queued(&handle)));
        expected.push(handle);
    }

    let sync = mutex.sync();
    assert_eq!(sync.queued_threads(), expected);
    assert_eq!(sync.exclusive_queued_threads(), expected);
    assert_eq!(sync.shared_queued_threads(), Vec::new());
    assert_eq!(sync.first_queued_thread(), Some(expected[0].clone()));
    assert_eq!(sync.queue_length(), 4);
    assert!(sync.has_queued_predecessors());
    assert!(sync.has_contended());
    assert_eq!(sync.to_string(), "Synchronizer[State = 1, nonempty queue]");

    let names: Vec<_> = sync
        .queued_threads()
        .iter()
        .map(|t| t.name().map(str::to_owned))
        .collect();
    assert_eq!(
        names,
        (0..4).map(|i| Some(format!("queued-{i}"))).collect::<Vec<_>>()
    );

    mutex.unlock().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(sync.queue_length(), 0);
    assert_eq!(sync.first_queued_thread(), None);
    assert_eq!(sync.to_string(), "Synchronizer[State = 0, empty queue]");
}

#[test]
fn test_mixed_mode_snapshots() {
    let lock = Arc::new(ReadWriteLock::new());
    lock.write_lock().unwrap();

    let spawn_queued = |write: bool| {
        let (tx, rx) = mpsc::channel();
        let l = lock.clone();
        let handle = thread::spawn(move || {
            tx.send(ThreadHandle::current()).unwrap();
            if write {
                l.write_lock().unwrap();
                l.write_unlock().unwrap();
            } else {
                l.read_lock().unwrap();
                l.read_unlock().unwrap();
            }
        });
        let thread = rx.recv().unwrap();
        assert!(eventually(|| lock.sync().is_queued(&thread)));
        (handle, thread)
    };

    let (reader_join, reader) = spawn_queued(false);
    let (writer_join, writer) = spawn_queued(true);

    let sync = lock.sync();
    assert!(!sync.apparently_first_queued_is_exclusive());
    assert_eq!(sync.shared_queued_threads(), vec![reader.clone()]);
    assert_eq!(sync.exclusive_queued_threads(), vec![writer.clone()]);
    assert_eq!(sync.queued_threads(), vec![reader, writer]);

    lock.write_unlock().unwrap();
    reader_join.join().unwrap();
    writer_join.join().unwrap();
    assert_eq!(sync.queue_length(), 0);
}

#[test]
fn test_uncontended_lock_never_initializes_queue() {
    let lock = ReentrantLock::new();
    for _ in 0..10 {
        lock.lock().unwrap();
        lock.unlock().unwrap();
    }
    assert!(!lock.sync().has_contended());
    assert!(!lock.has_queued_threads());
    assert!(!lock.sync().has_queued_predecessors());
}
