/*!
 * Shared mode integration tests
 * Semaphore bound, latch, read/write lock, and a model-checked permit sequence
 */

use crate::common::eventually;
use ai_os_sync::{CountDownLatch, ReadWriteLock, Semaphore, SyncError, ThreadHandle};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_semaphore_admits_exactly_k_holders() {
    const PERMITS: usize = 3;
    let sem = Arc::new(Semaphore::new(PERMITS as i64));
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (entered_tx, entered_rx) = mpsc::channel();
    let (leave_tx, leave_rx) = mpsc::channel::<()>();
    let leave_rx = Arc::new(parking_lot::Mutex::new(leave_rx));

    let handles: Vec<_> = (0..PERMITS + 2)
        .map(|_| {
            let (sem, inside, peak) = (sem.clone(), inside.clone(), peak.clone());
            let (entered_tx, leave_rx) = (entered_tx.clone(), leave_rx.clone());
            thread::spawn(move || {
                sem.acquire().unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                entered_tx.send(()).unwrap();
                leave_rx.lock().recv().unwrap();
                inside.fetch_sub(1, Ordering::SeqCst);
                sem.release().unwrap();
            })
        })
        .collect();

    // Exactly K get in, the other two queue
    for _ in 0..PERMITS {
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    assert!(eventually(|| sem.queue_length() == 2));
    assert_eq!(inside.load(Ordering::SeqCst), PERMITS);
    assert_eq!(sem.available_permits(), 0);

    for _ in 0..PERMITS + 2 {
        leave_tx.send(()).unwrap();
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), PERMITS);
    assert_eq!(sem.available_permits(), PERMITS as i64);
}

#[test]
fn test_concurrent_releases_wake_every_waiter() {
    // Two single-permit releases racing each other must not strand either
    // parked waiter, whichever of them observes the new head
    for _ in 0..100 {
        let sem = Arc::new(Semaphore::new(0));
        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let sem = sem.clone();
                thread::spawn(move || sem.try_acquire_for(Duration::from_secs(5)).unwrap())
            })
            .collect();
        assert!(eventually(|| sem.queue_length() == 2));

        let start = Arc::new(Barrier::new(2));
        let releasers: Vec<_> = (0..2)
            .map(|_| {
                let (sem, start) = (sem.clone(), start.clone());
                thread::spawn(move || {
                    start.wait();
                    sem.release()
                })
            })
            .collect();

        for releaser in releasers {
            releaser.join().unwrap().unwrap();
        }
        for waiter in waiters {
            assert!(waiter.join().unwrap(), "a waiter missed its wake-up");
        }
        assert_eq!(sem.available_permits(), 0);
        assert_eq!(sem.queue_length(), 0);
    }
}

#[test]
fn test_fair_semaphore_blocks_bargers() {
    let fair = Arc::new(Semaphore::with_fairness(0, true));
    let s = fair.clone();
    let big = thread::spawn(move || s.acquire_many(2));
    assert!(eventually(|| fair.queue_length() == 1));

    // One permit is not enough for the queued thread, and a fair newcomer
    // may not take it from under it
    fair.release().unwrap();
    assert!(!fair.try_acquire_for(Duration::ZERO).unwrap());
    // An explicit barging attempt ignores the policy
    assert!(fair.try_acquire());
    fair.release_many(2).unwrap();
    big.join().unwrap().unwrap();
    assert_eq!(fair.available_permits(), 0);
}

#[test]
fn test_interrupted_semaphore_acquire() {
    let sem = Arc::new(Semaphore::new(0));
    let (tx, rx) = mpsc::channel();
    let s = sem.clone();
    let waiter = thread::spawn(move || {
        tx.send(ThreadHandle::current()).unwrap();
        s.acquire()
    });

    let target = rx.recv().unwrap();
    assert!(eventually(|| sem.sync().is_queued(&target)));
    target.interrupt();
    assert_eq!(waiter.join().unwrap(), Err(SyncError::Interrupted));
    assert_eq!(sem.queue_length(), 0);
    assert_eq!(sem.available_permits(), 0);
}

#[test]
fn test_count_down_latch_gate() {
    let start_gate = Arc::new(CountDownLatch::new(1));
    let done = Arc::new(CountDownLatch::new(4));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let (start_gate, done) = (start_gate.clone(), done.clone());
            thread::spawn(move || {
                start_gate.wait().unwrap();
                done.count_down().unwrap();
            })
        })
        .collect();

    assert!(eventually(|| start_gate.sync().queue_length() == 4));
    assert_eq!(done.count(), 4);
    start_gate.count_down().unwrap();
    assert!(done.wait_timeout(Duration::from_secs(5)).unwrap());
    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_rwlock_concurrent_readers() {
    let lock = Arc::new(ReadWriteLock::new());
    let all_inside = Arc::new(CountDownLatch::new(3));

    // Each reader waits for the others while holding the read lock, which
    // only finishes if the three hold it together
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let (lock, all_inside) = (lock.clone(), all_inside.clone());
            thread::spawn(move || {
                lock.read_lock().unwrap();
                all_inside.count_down().unwrap();
                assert!(all_inside.wait_timeout(Duration::from_secs(5)).unwrap());
                lock.read_unlock().unwrap();
            })
        })
        .collect();

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(lock.read_lock_count(), 0);
}

#[test]
fn test_rwlock_writer_excludes_readers() {
    let lock = Arc::new(ReadWriteLock::new());
    let reader_in = Arc::new(AtomicBool::new(false));
    lock.write_lock().unwrap();

    let (l, flag) = (lock.clone(), reader_in.clone());
    let reader = thread::spawn(move || {
        l.read_lock().unwrap();
        flag.store(true, Ordering::SeqCst);
        l.read_unlock().unwrap();
    });

    assert!(eventually(|| lock.sync().queue_length() == 1));
    assert!(!reader_in.load(Ordering::SeqCst));
    assert!(lock.is_write_locked_by_current_thread());

    lock.write_unlock().unwrap();
    reader.join().unwrap();
    assert!(reader_in.load(Ordering::SeqCst));
}

#[derive(Debug, Clone)]
enum PermitOp {
    TryAcquire(u32),
    Release(u32),
    Drain,
}

fn permit_op() -> impl Strategy<Value = PermitOp> {
    prop_oneof![
        (0u32..4).prop_map(PermitOp::TryAcquire),
        (0u32..4).prop_map(PermitOp::Release),
        Just(PermitOp::Drain),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_semaphore_matches_counter_model(
        initial in 0i64..6,
        ops in prop::collection::vec(permit_op(), 0..40),
    ) {
        let sem = Semaphore::new(initial);
        let mut model = initial;

        for op in ops {
            match op {
                PermitOp::TryAcquire(n) => {
                    let expected = model >= i64::from(n);
                    prop_assert_eq!(sem.try_acquire_many(n), expected);
                    if expected {
                        model -= i64::from(n);
                    }
                }
                PermitOp::Release(n) => {
                    sem.release_many(n).unwrap();
                    model += i64::from(n);
                }
                PermitOp::Drain => {
                    prop_assert_eq!(sem.drain_permits(), model);
                    model = 0;
                }
            }
            prop_assert_eq!(sem.available_permits(), model);
        }
        prop_assert!(!sem.has_queued_threads());
    }
}
