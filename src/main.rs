/*!
 * AI-OS Sync - Stress Runner
 *
 * Soak test for the queued synchronizer:
 * - Mutual exclusion under contention
 * - Semaphore permit bound
 * - Mixed timeout/interrupt cancellation
 * - Condition hand-off on a bounded buffer
 */

use ai_os_sync::monitoring::{init_tracing, span_operation};
use ai_os_sync::{Mutex, ReentrantLock, Semaphore, SyncError, ThreadHandle};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, Copy)]
struct StressConfig {
    threads: usize,
    iterations: usize,
}

impl StressConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            threads: env_or("SYNC_STRESS_THREADS", 8)?.max(2),
            iterations: env_or("SYNC_STRESS_ITERATIONS", 10_000)?,
        })
    }
}

fn env_or(key: &str, default: usize) -> Result<usize> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a positive integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Serialize)]
struct WorkloadReport {
    workload: &'static str,
    threads: usize,
    operations: usize,
    elapsed_ms: u128,
    passed: bool,
}

/// Counter that is only correct if the lock around it really excludes
struct Unguarded(UnsafeCell<usize>);

// SAFETY: every access happens while holding the workload's lock
unsafe impl Sync for Unguarded {}

fn mutual_exclusion(config: StressConfig) -> Result<WorkloadReport> {
    let span = span_operation("mutual_exclusion", Duration::from_secs(30));
    let start = Instant::now();
    let lock = Arc::new(ReentrantLock::new());
    let counter = Arc::new(Unguarded(UnsafeCell::new(0)));

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let (lock, counter) = (lock.clone(), counter.clone());
            thread::spawn(move || -> Result<(), SyncError> {
                for _ in 0..config.iterations {
                    lock.lock()?;
                    // SAFETY: protected by `lock`
                    unsafe { *counter.0.get() += 1 };
                    lock.unlock()?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => bail!("mutual exclusion worker panicked"),
        }
    }

    let expected = config.threads * config.iterations;
    // SAFETY: all workers joined
    let total = unsafe { *counter.0.get() };
    span.record_items_processed(total as u64);
    Ok(WorkloadReport {
        workload: "mutual_exclusion",
        threads: config.threads,
        operations: expected,
        elapsed_ms: start.elapsed().as_millis(),
        passed: total == expected,
    })
}

fn semaphore_bound(config: StressConfig) -> Result<WorkloadReport> {
    let _span = span_operation("semaphore_bound", Duration::from_secs(30));
    let start = Instant::now();
    let permits = (config.threads / 2).max(1);
    let sem = Arc::new(Semaphore::new(permits as i64));
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let (sem, inside, peak) = (sem.clone(), inside.clone(), peak.clone());
            thread::spawn(move || -> Result<(), SyncError> {
                for _ in 0..config.iterations {
                    sem.acquire_uninterruptibly()?;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    inside.fetch_sub(1, Ordering::SeqCst);
                    sem.release()?;
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => bail!("semaphore worker panicked"),
        }
    }

    let observed = peak.load(Ordering::SeqCst);
    info!(permits, observed, "semaphore peak concurrency");
    Ok(WorkloadReport {
        workload: "semaphore_bound",
        threads: config.threads,
        operations: config.threads * config.iterations,
        elapsed_ms: start.elapsed().as_millis(),
        passed: observed <= permits && sem.available_permits() == permits as i64,
    })
}

/// Every third waiter times out, every third is interrupted, the rest must
/// get the lock once it is released
fn cancellation(config: StressConfig) -> Result<WorkloadReport> {
    let _span = span_operation("cancellation", Duration::from_secs(30));
    let start = Instant::now();
    let rounds = (config.iterations / 100).max(1);
    let mut passed = true;

    for _ in 0..rounds {
        let mutex = Arc::new(Mutex::new());
        mutex.lock()?;

        let (tx, rx) = mpsc::channel();
        let handles: Vec<_> = (0..config.threads)
            .map(|i| {
                let (mutex, tx) = (mutex.clone(), tx.clone());
                thread::spawn(move || -> Result<bool, SyncError> {
                    let _ = tx.send((i, ThreadHandle::current()));
                    let acquired = match i % 3 {
                        0 => mutex.try_lock_for(Duration::from_millis(1))?,
                        1 => match mutex.lock_interruptibly() {
                            Ok(()) => true,
                            Err(SyncError::Interrupted) => false,
                            Err(err) => return Err(err),
                        },
                        _ => {
                            mutex.lock()?;
                            true
                        }
                    };
                    if acquired {
                        mutex.unlock()?;
                    }
                    Ok(acquired || i % 3 != 2)
                })
            })
            .collect();
        drop(tx);

        for (i, handle) in rx.iter().take(config.threads) {
            if i % 3 == 1 {
                handle.interrupt();
            }
        }
        thread::sleep(Duration::from_millis(2));
        mutex.unlock()?;

        for handle in handles {
            match handle.join() {
                Ok(result) => passed &= result?,
                Err(_) => bail!("cancellation worker panicked"),
            }
        }
        passed &= !mutex.is_locked() && mutex.sync().queue_length() == 0;
    }

    Ok(WorkloadReport {
        workload: "cancellation",
        threads: config.threads,
        operations: rounds * config.threads,
        elapsed_ms: start.elapsed().as_millis(),
        passed,
    })
}

/// Producers and consumers on a bounded buffer with two conditions
fn condition_handoff(config: StressConfig) -> Result<WorkloadReport> {
    const CAPACITY: usize = 4;

    struct Buffer {
        lock: ReentrantLock,
        items: parking_lot::Mutex<VecDeque<usize>>,
        not_full: ai_os_sync::ConditionObject,
        not_empty: ai_os_sync::ConditionObject,
    }

    let _span = span_operation("condition_handoff", Duration::from_secs(30));
    let start = Instant::now();
    let lock = ReentrantLock::new();
    let buffer = Arc::new(Buffer {
        not_full: lock.new_condition(),
        not_empty: lock.new_condition(),
        items: parking_lot::Mutex::new(VecDeque::new()),
        lock,
    });

    let pairs = config.threads / 2;
    let per_producer = config.iterations;
    let mut handles = Vec::with_capacity(pairs * 2);

    for _ in 0..pairs {
        let b = buffer.clone();
        handles.push(thread::spawn(move || -> Result<usize, SyncError> {
            for item in 0..per_producer {
                b.lock.lock()?;
                while b.items.lock().len() >= CAPACITY {
                    b.not_full.wait_uninterruptibly(b.lock.sync())?;
                }
                b.items.lock().push_back(item);
                b.not_empty.signal(b.lock.sync())?;
                b.lock.unlock()?;
            }
            Ok(0)
        }));

        let b = buffer.clone();
        handles.push(thread::spawn(move || -> Result<usize, SyncError> {
            let mut taken = 0;
            while taken < per_producer {
                b.lock.lock()?;
                // Lock held, so the buffer mutex is never contended
                while b.items.lock().pop_front().is_none() {
                    b.not_empty.wait_uninterruptibly(b.lock.sync())?;
                }
                taken += 1;
                b.not_full.signal(b.lock.sync())?;
                b.lock.unlock()?;
            }
            Ok(taken)
        }));
    }

    let mut consumed = 0;
    for handle in handles {
        match handle.join() {
            Ok(result) => consumed += result?,
            Err(_) => bail!("condition worker panicked"),
        }
    }

    Ok(WorkloadReport {
        workload: "condition_handoff",
        threads: pairs * 2,
        operations: pairs * per_producer,
        elapsed_ms: start.elapsed().as_millis(),
        passed: consumed == pairs * per_producer,
    })
}

fn main() -> Result<()> {
    init_tracing();

    let config = StressConfig::from_env()?;
    info!(threads = config.threads, iterations = config.iterations, "sync stress starting");

    let reports = [
        mutual_exclusion(config)?,
        semaphore_bound(config)?,
        cancellation(config)?,
        condition_handoff(config)?,
    ];

    let mut failed = 0;
    for report in &reports {
        let json = serde_json::to_string(report).context("failed to serialize report")?;
        if report.passed {
            info!(report = %json, "workload passed");
        } else {
            error!(report = %json, "workload failed");
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} workloads failed", reports.len());
    }
    info!("all workloads passed");
    Ok(())
}
