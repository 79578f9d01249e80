use std::collections::HashMap;

use crate::normalize::EventArgs;

/// An on-chain purchase log waiting out its confirmation depth.
#[derive(Debug, Clone)]
pub struct ObservedPurchase {
    pub tx_hash: String,
    pub block_seen: u64,
    pub args: EventArgs,
}

/// Holds observed purchase logs until enough subsequent blocks have elapsed,
/// then releases them for announcement. Entries are transient: the pending
/// set is not persisted across restarts, a fresh subscription re-observes
/// anything still unconfirmed.
///
/// Owned by a single task; both triggers (new log, new block) reach it from
/// the same loop.
#[derive(Debug)]
pub struct ConfirmationTracker {
    confirmations: u64,
    pending: HashMap<String, ObservedPurchase>,
}

impl ConfirmationTracker {
    pub fn new(confirmations: u64) -> Self {
        Self {
            confirmations,
            pending: HashMap::new(),
        }
    }

    /// Records a log at the block it appeared in. Re-observing the same
    /// transaction replaces the earlier entry.
    pub fn observe_log(&mut self, tx_hash: String, block_seen: u64, args: EventArgs) {
        self.pending.insert(
            tx_hash.clone(),
            ObservedPurchase {
                tx_hash,
                block_seen,
                args,
            },
        );
    }

    /// Releases every entry whose confirmation depth has been reached at
    /// `height`. Released entries leave the pending set permanently; each
    /// on-chain event gets at most one announcement attempt.
    pub fn observe_block(&mut self, height: u64) -> Vec<ObservedPurchase> {
        let ready: Vec<String> = self
            .pending
            .values()
            .filter(|p| height.saturating_sub(p.block_seen) >= self.confirmations)
            .map(|p| p.tx_hash.clone())
            .collect();
        ready
            .into_iter()
            .filter_map(|tx_hash| self.pending.remove(&tx_hash))
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> EventArgs {
        let mut args = EventArgs::default();
        args.push("buyer", "0xabc");
        args.push("amountToken", "1000");
        args
    }

    #[test]
    fn releases_exactly_at_confirmation_depth() {
        let mut tracker = ConfirmationTracker::new(5);
        tracker.observe_log("0xtx1".into(), 100, args());

        assert!(tracker.observe_block(101).is_empty());
        assert!(tracker.observe_block(104).is_empty());
        let released = tracker.observe_block(105);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].tx_hash, "0xtx1");
        assert_eq!(released[0].block_seen, 100);
        assert_eq!(tracker.pending_len(), 0);
    }

    #[test]
    fn released_entries_do_not_come_back() {
        let mut tracker = ConfirmationTracker::new(2);
        tracker.observe_log("0xtx1".into(), 10, args());
        assert_eq!(tracker.observe_block(12).len(), 1);
        assert!(tracker.observe_block(13).is_empty());
    }

    #[test]
    fn entries_are_evaluated_independently() {
        let mut tracker = ConfirmationTracker::new(3);
        tracker.observe_log("0xtx1".into(), 10, args());
        tracker.observe_log("0xtx2".into(), 12, args());

        let released = tracker.observe_block(13);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].tx_hash, "0xtx1");
        assert_eq!(tracker.pending_len(), 1);

        let released = tracker.observe_block(15);
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].tx_hash, "0xtx2");
    }

    #[test]
    fn zero_confirmations_release_immediately() {
        let mut tracker = ConfirmationTracker::new(0);
        tracker.observe_log("0xtx1".into(), 10, args());
        assert_eq!(tracker.observe_block(10).len(), 1);
    }

    #[test]
    fn reobserved_transaction_replaces_earlier_entry() {
        let mut tracker = ConfirmationTracker::new(5);
        tracker.observe_log("0xtx1".into(), 10, args());
        tracker.observe_log("0xtx1".into(), 12, args());
        assert!(tracker.observe_block(15).is_empty());
        assert_eq!(tracker.observe_block(17).len(), 1);
    }
}
