/*!
 * Cancellation integration tests
 * Mixed timeout/interrupt cancellation must not strand surviving waiters
 */

use crate::common::eventually;
use ai_os_sync::{Mutex, Semaphore, SyncError, ThreadHandle};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Survivor,
    TimesOut,
    Interrupted,
}

fn run_mixed_cancellation(seed: u64) {
    const WAITERS: usize = 12;
    const CANCELLING: usize = 6;

    let mut rng = StdRng::seed_from_u64(seed);
    let cancelling: Vec<usize> = sample(&mut rng, WAITERS, CANCELLING).into_vec();
    let interrupted: HashSet<usize> = cancelling.iter().copied().take(CANCELLING / 2).collect();
    let roles: Vec<Role> = (0..WAITERS)
        .map(|i| {
            if interrupted.contains(&i) {
                Role::Interrupted
            } else if cancelling.contains(&i) {
                Role::TimesOut
            } else {
                Role::Survivor
            }
        })
        .collect();

    let mutex = Arc::new(Mutex::new());
    let acquired = Arc::new(AtomicUsize::new(0));
    let gave_up = Arc::new(AtomicUsize::new(0));
    mutex.lock().unwrap();

    let (tx, rx) = mpsc::channel();
    let handles: Vec<_> = roles
        .iter()
        .copied()
        .map(|role| {
            let (mutex, acquired, tx) = (mutex.clone(), acquired.clone(), tx.clone());
            let gave_up = gave_up.clone();
            thread::spawn(move || {
                tx.send((role, ThreadHandle::current())).unwrap();
                drop(tx);
                let got = match role {
                    Role::Survivor => {
                        mutex.lock().unwrap();
                        true
                    }
                    Role::TimesOut => mutex.try_lock_for(Duration::from_millis(100)).unwrap(),
                    Role::Interrupted => match mutex.lock_interruptibly() {
                        Ok(()) => true,
                        Err(err) => {
                            assert_eq!(err, SyncError::Interrupted);
                            false
                        }
                    },
                };
                if got {
                    acquired.fetch_add(1, Ordering::SeqCst);
                    mutex.unlock().unwrap();
                } else {
                    gave_up.fetch_add(1, Ordering::SeqCst);
                }
                (role, got)
            })
        })
        .collect();
    drop(tx);

    // One bounded read per waiter: a waiter that never reports fails the
    // test instead of hanging it
    let threads: Vec<_> = (0..WAITERS)
        .map(|_| {
            rx.recv_timeout(Duration::from_secs(5))
                .expect("every waiter reports its handle")
        })
        .collect();

    // Interrupts may land before or after the target queued; both cancel
    for (role, handle) in &threads {
        if *role == Role::Interrupted {
            handle.interrupt();
        }
    }

    // Let the interrupted and timed waiters give up while the lock is held
    assert!(eventually(|| {
        gave_up.load(Ordering::SeqCst) == CANCELLING
            && threads
                .iter()
                .all(|(role, handle)| mutex.sync().is_queued(handle) == (*role == Role::Survivor))
    }));
    assert_eq!(mutex.sync().queue_length(), WAITERS - CANCELLING);
    mutex.unlock().unwrap();

    for handle in handles {
        let (role, got) = handle.join().unwrap();
        match role {
            Role::Survivor => assert!(got),
            Role::TimesOut | Role::Interrupted => assert!(!got),
        }
    }
    assert_eq!(acquired.load(Ordering::SeqCst), WAITERS - CANCELLING);
    assert_eq!(mutex.sync().queue_length(), 0);
    assert!(!mutex.is_locked());
}

#[test]
fn test_mixed_cancellation_survivors_all_acquire() {
    for seed in 0..4 {
        run_mixed_cancellation(seed);
    }
}

#[test]
fn test_cancellation_while_lock_changes_hands() {
    // Timed waiters race releases instead of a quiet, held lock
    let sem = Arc::new(Semaphore::new(1));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let (sem, completed) = (sem.clone(), completed.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    if i % 2 == 0 {
                        if sem.try_acquire_for(Duration::from_micros(50)).unwrap() {
                            sem.release().unwrap();
                        }
                    } else {
                        sem.acquire_uninterruptibly().unwrap();
                        sem.release().unwrap();
                    }
                }
                completed.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(completed.load(Ordering::SeqCst), 8);
    assert_eq!(sem.available_permits(), 1);
    assert_eq!(sem.queue_length(), 0);
}
