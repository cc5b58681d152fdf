/*!
 * Condition integration tests
 */

use crate::common::eventually;
use ai_os_sync::{ConditionObject, Mutex, ReadWriteLock, ReentrantLock, SyncError, ThreadHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn waiting_on(lock: &ReentrantLock, cond: &ConditionObject, count: usize) -> bool {
    eventually(|| {
        lock.lock().unwrap();
        let listed = cond.wait_queue_length(lock.sync()).unwrap();
        lock.unlock().unwrap();
        listed == count
    })
}

#[test]
fn test_misuse_without_holding() {
    let mutex = Mutex::new();
    let cond = mutex.new_condition();
    for result in [
        cond.wait(mutex.sync()),
        cond.wait_uninterruptibly(mutex.sync()),
        cond.signal(mutex.sync()),
        cond.signal_all(mutex.sync()),
    ] {
        assert!(matches!(result, Err(SyncError::IllegalMonitorState(_))));
    }
    assert!(matches!(
        cond.wait_timeout(mutex.sync(), Duration::from_millis(1)),
        Err(SyncError::IllegalMonitorState(_))
    ));
}

#[test]
fn test_condition_held_by_other_thread_is_misuse() {
    let lock = Arc::new(ReentrantLock::new());
    let cond = Arc::new(lock.new_condition());
    lock.lock().unwrap();

    let (l, c) = (lock.clone(), cond.clone());
    let result = thread::spawn(move || c.signal(l.sync())).join().unwrap();
    assert!(matches!(result, Err(SyncError::IllegalMonitorState(_))));
    lock.unlock().unwrap();
}

#[test]
fn test_condition_bound_to_creator() {
    let first = ReentrantLock::new();
    let second = ReentrantLock::new();
    let cond = first.new_condition();
    assert!(first.sync().owns(&cond));
    assert!(!second.sync().owns(&cond));

    second.lock().unwrap();
    assert_eq!(second.sync().has_waiters(&cond), Err(SyncError::ForeignCondition));
    assert_eq!(cond.wait(second.sync()), Err(SyncError::ForeignCondition));
    // The failed wait must not have released anything
    assert!(second.is_held_by_current_thread());
    second.unlock().unwrap();
}

#[test]
fn test_signal_without_waiters_is_noop() {
    let lock = ReentrantLock::new();
    let cond = lock.new_condition();
    lock.lock().unwrap();
    cond.signal(lock.sync()).unwrap();
    cond.signal_all(lock.sync()).unwrap();
    assert!(!cond.has_waiters(lock.sync()).unwrap());
    lock.unlock().unwrap();
}

#[test]
fn test_signal_wakes_in_fifo_order() {
    let lock = Arc::new(ReentrantLock::new());
    let cond = Arc::new(lock.new_condition());
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for id in 0..3 {
        let (l, c, o) = (lock.clone(), cond.clone(), order.clone());
        handles.push(thread::spawn(move || {
            l.lock().unwrap();
            c.wait(l.sync()).unwrap();
            o.lock().push(id);
            l.unlock().unwrap();
        }));
        assert!(waiting_on(&lock, &cond, id + 1));
    }

    for released in 1..=3 {
        lock.lock().unwrap();
        cond.signal(lock.sync()).unwrap();
        lock.unlock().unwrap();
        assert!(eventually(|| order.lock().len() == released));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[test]
fn test_wait_restores_reentrant_hold_count() {
    let lock = Arc::new(ReentrantLock::new());
    let cond = Arc::new(lock.new_condition());

    let (l, c) = (lock.clone(), cond.clone());
    let waiter = thread::spawn(move || {
        l.lock().unwrap();
        l.lock().unwrap();
        l.lock().unwrap();
        c.wait(l.sync()).unwrap();
        let holds = l.hold_count();
        for _ in 0..holds {
            l.unlock().unwrap();
        }
        holds
    });

    assert!(waiting_on(&lock, &cond, 1));
    lock.lock().unwrap();
    // The waiter gave up all three holds
    assert_eq!(lock.hold_count(), 1);
    cond.signal(lock.sync()).unwrap();
    lock.unlock().unwrap();
    assert_eq!(waiter.join().unwrap(), 3);
}

#[test]
fn test_interrupted_wait_throws_after_reacquiring() {
    let lock = Arc::new(ReentrantLock::new());
    let cond = Arc::new(lock.new_condition());

    let (l, c) = (lock.clone(), cond.clone());
    let waiter = thread::spawn(move || {
        l.lock().unwrap();
        let result = c.wait(l.sync());
        let held = l.is_held_by_current_thread();
        l.unlock().unwrap();
        (result, held)
    });

    assert!(waiting_on(&lock, &cond, 1));
    lock.lock().unwrap();
    let target = lock.sync().waiting_threads(&cond).unwrap().remove(0);
    target.interrupt();
    thread::sleep(Duration::from_millis(20));
    // Interrupted waiter has moved itself to the lock queue but cannot run yet
    assert!(lock.sync().is_queued(&target));
    assert!(!cond.has_waiters(lock.sync()).unwrap());
    lock.unlock().unwrap();

    let (result, held) = waiter.join().unwrap();
    assert_eq!(result, Err(SyncError::Interrupted));
    assert!(held);
}

#[test]
fn test_uninterruptible_wait_defers_interrupt() {
    let lock = Arc::new(ReentrantLock::new());
    let cond = Arc::new(lock.new_condition());

    let (l, c) = (lock.clone(), cond.clone());
    let waiter = thread::spawn(move || {
        l.lock().unwrap();
        c.wait_uninterruptibly(l.sync()).unwrap();
        let flagged = ThreadHandle::interrupted();
        l.unlock().unwrap();
        flagged
    });

    assert!(waiting_on(&lock, &cond, 1));
    lock.lock().unwrap();
    let target = cond.waiting_threads(lock.sync()).unwrap().remove(0);
    lock.unlock().unwrap();

    target.interrupt();
    thread::sleep(Duration::from_millis(20));
    // Still waiting for a signal despite the interrupt
    assert!(waiting_on(&lock, &cond, 1));

    lock.lock().unwrap();
    cond.signal(lock.sync()).unwrap();
    lock.unlock().unwrap();
    assert!(waiter.join().unwrap());
}

#[test]
fn test_timed_waits_report_timeout() {
    let lock = ReentrantLock::new();
    let cond = lock.new_condition();
    lock.lock().unwrap();

    let start = Instant::now();
    let remaining = cond.wait_nanos(lock.sync(), 20_000_000).unwrap();
    assert!(remaining <= 0);
    assert!(start.elapsed() >= Duration::from_millis(20));

    assert!(!cond
        .wait_until(lock.sync(), Instant::now() + Duration::from_millis(10))
        .unwrap());
    assert!(lock.is_held_by_current_thread());
    assert_eq!(cond.wait_queue_length(lock.sync()).unwrap(), 0);
    lock.unlock().unwrap();
}

#[test]
fn test_timed_wait_signalled_in_time() {
    let lock = Arc::new(ReentrantLock::new());
    let cond = Arc::new(lock.new_condition());

    let (l, c) = (lock.clone(), cond.clone());
    let waiter = thread::spawn(move || {
        l.lock().unwrap();
        let signalled = c.wait_timeout(l.sync(), Duration::from_secs(10)).unwrap();
        l.unlock().unwrap();
        signalled
    });

    assert!(waiting_on(&lock, &cond, 1));
    lock.lock().unwrap();
    cond.signal_all(lock.sync()).unwrap();
    lock.unlock().unwrap();
    assert!(waiter.join().unwrap());
}

#[test]
fn test_write_lock_condition() {
    let lock = Arc::new(ReadWriteLock::new());
    let cond = Arc::new(lock.new_condition());
    let woken = Arc::new(AtomicUsize::new(0));

    let (l, c, w) = (lock.clone(), cond.clone(), woken.clone());
    let waiter = thread::spawn(move || {
        l.write_lock().unwrap();
        c.wait(l.sync()).unwrap();
        w.fetch_add(1, Ordering::SeqCst);
        l.write_unlock().unwrap();
    });

    assert!(eventually(|| {
        lock.write_lock().unwrap();
        let waiting = cond.has_waiters(lock.sync()).unwrap();
        if waiting {
            cond.signal(lock.sync()).unwrap();
        }
        lock.write_unlock().unwrap();
        waiting
    }));
    waiter.join().unwrap();
    assert_eq!(woken.load(Ordering::SeqCst), 1);

    // Readers do not hold the lock exclusively
    lock.read_lock().unwrap();
    assert!(matches!(cond.signal(lock.sync()), Err(SyncError::IllegalMonitorState(_))));
    lock.read_unlock().unwrap();
}
