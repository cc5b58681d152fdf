/*!
 * Queued Synchronizer Framework
 *
 * Building blocks for blocking locks, semaphores, latches and friends:
 * one word of strategy-defined state plus a FIFO wait queue that parks and
 * wakes contending threads.
 *
 * # Architecture
 *
 * A concrete primitive implements [`Strategy`] (the non-blocking "try" hooks)
 * and wraps a [`Synchronizer`], which supplies the blocking, interruptible and
 * timed variants, wake-up propagation for shared mode, cancellation, and
 * condition queues.
 *
 * # Performance
 *
 * - Uncontended acquire/release never touches the queue
 * - Queue is lock-free (CAS on tail, plain store on head by the winner)
 * - Each thread parks on its own address, never a global lock
 * - Barging by default; strategies opt into FIFO via
 *   [`Synchronizer::has_queued_predecessors`]
 */

mod cancel;
mod condition;
mod config;
mod exclusive;
mod node;
mod shared;
mod state;
mod synchronizer;
mod thread;
mod traits;

pub use condition::ConditionObject;
pub use config::SyncConfig;
pub use node::Mode;
pub use state::StateCell;
pub use synchronizer::Synchronizer;
pub use thread::ThreadHandle;
pub use traits::Strategy;
