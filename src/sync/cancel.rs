/*!
 * Acquire Cancellation
 *
 * Unlinks a queued node whose thread gave up (timeout, interrupt, or a
 * failing hook). Cancellation never blocks and never strands the rest of the
 * queue: if the node cannot be spliced out safely its successor is woken so
 * it can skip over the cancelled node on its own.
 */

use super::node::{cas_link, Node, CANCELLED, SIGNAL};
use super::synchronizer::Synchronizer;
use super::traits::Strategy;
use std::sync::Arc;
use tracing::trace;

impl<S: Strategy> Synchronizer<S> {
    /// Cancel an ongoing acquire attempt for `node`
    ///
    /// Idempotent: a node already CANCELLED is left alone.
    pub(crate) fn cancel_acquire(&self, node: &Arc<Node>) {
        if node.is_cancelled() {
            return;
        }
        node.clear_thread();

        // Skip cancelled predecessors. The node is still queued and the head
        // is never CANCELLED, so every step here has a predecessor to load.
        let mut pred = node.predecessor();
        while pred.is_cancelled() {
            pred = pred.predecessor();
            node.prev.store(Some(pred.clone()));
        }

        // Snapshot for the CASes below; if they fail someone else already
        // fixed up pred.next (another cancel or a signal) and we are done.
        let pred_next = pred.next.load_full();

        // From here on other threads skip past us. Before this we were
        // immune to interference from them.
        node.set_status(CANCELLED);

        if self.is_tail(node) && cas_link(&self.tail, Some(node), Some(pred.clone())) {
            // Removed from the tail: truncate pred's forward hint
            cas_link(&pred.next, pred_next.as_ref(), None);
            trace!(sync = self.id(), "cancelled tail node");
            return;
        }

        // If the successor needs a signal, try to hand it pred's; otherwise
        // wake it up so it propagates past us itself.
        let pred_will_signal = !self.is_head(&pred) && {
            let status = pred.status();
            status == SIGNAL || (status <= 0 && pred.cas_status(status, SIGNAL))
        } && pred.has_thread();

        if pred_will_signal {
            if let Some(next) = node.next.load_full() {
                if !next.is_cancelled() {
                    cas_link(&pred.next, pred_next.as_ref(), Some(next));
                }
            }
            trace!(sync = self.id(), "cancelled node spliced out");
        } else {
            self.unpark_successor(node);
            trace!(sync = self.id(), "cancelled node woke its successor");
        }

        node.next.store(None);
    }
}
