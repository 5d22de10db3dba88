//! Per-node bookkeeping of application sequence numbers.
//!
//! The ledger of a node holds the packets *that node* generated and, keyed by
//! the same seqnums, the times they arrived at the root. Both sides are hash
//! maps so duplicate detection and delay matching are O(1).

use std::collections::HashMap;

use super::types::{Seqnum, TimestampMs};

/// Result of recording a generated packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Recorded,
    /// Seqnum already sent; the first timestamp is kept
    Duplicate,
}

/// Result of recording a packet arrival at the root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Delivered { delay_ms: i64 },
    /// Seqnum already received; the first arrival is kept
    Duplicate,
    /// No matching sent record
    Unmatched,
}

#[derive(Debug, Clone, Default)]
pub struct SequenceLedger {
    sent: HashMap<Seqnum, TimestampMs>,
    received: HashMap<Seqnum, TimestampMs>,
    delays: Vec<i64>,
}

impl SequenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&mut self, seqnum: Seqnum, ts: TimestampMs) -> SendOutcome {
        if self.sent.contains_key(&seqnum) {
            return SendOutcome::Duplicate;
        }
        self.sent.insert(seqnum, ts);
        SendOutcome::Recorded
    }

    pub fn record_received(&mut self, seqnum: Seqnum, ts: TimestampMs) -> ReceiveOutcome {
        if self.received.contains_key(&seqnum) {
            return ReceiveOutcome::Duplicate;
        }
        let Some(&sent_ts) = self.sent.get(&seqnum) else {
            return ReceiveOutcome::Unmatched;
        };
        self.received.insert(seqnum, ts);
        let delay_ms = ts.saturating_sub(sent_ts);
        self.delays.push(delay_ms);
        ReceiveOutcome::Delivered { delay_ms }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    /// End-to-end delays in reception order, ms
    pub fn delays(&self) -> &[i64] {
        &self.delays
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_matching() {
        let mut ledger = SequenceLedger::new();
        assert_eq!(ledger.record_sent(1, 100), SendOutcome::Recorded);
        assert_eq!(ledger.record_sent(2, 200), SendOutcome::Recorded);
        assert_eq!(
            ledger.record_received(2, 230),
            ReceiveOutcome::Delivered { delay_ms: 30 }
        );
        assert_eq!(
            ledger.record_received(1, 110),
            ReceiveOutcome::Delivered { delay_ms: 10 }
        );
        // Reception order, not seqnum order
        assert_eq!(ledger.delays(), &[30, 10]);
        assert_eq!(ledger.sent_count(), 2);
        assert_eq!(ledger.received_count(), 2);
    }

    #[test]
    fn test_first_write_wins() {
        let mut ledger = SequenceLedger::new();
        ledger.record_sent(7, 1000);
        assert_eq!(ledger.record_sent(7, 5000), SendOutcome::Duplicate);
        assert_eq!(ledger.sent_count(), 1);

        // Measured from the first send
        assert_eq!(
            ledger.record_received(7, 1040),
            ReceiveOutcome::Delivered { delay_ms: 40 }
        );
        assert_eq!(ledger.record_received(7, 9000), ReceiveOutcome::Duplicate);
        assert_eq!(ledger.received_count(), 1);
        assert_eq!(ledger.delays(), &[40]);
    }

    #[test]
    fn test_unmatched_receive() {
        let mut ledger = SequenceLedger::new();
        ledger.record_sent(1, 0);
        assert_eq!(ledger.record_received(99, 10), ReceiveOutcome::Unmatched);
        assert_eq!(ledger.received_count(), 0);
        assert!(ledger.delays().is_empty());
        // A later matching send does not retroactively count the receive
        ledger.record_sent(99, 20);
        assert_eq!(ledger.received_count(), 0);
        assert_eq!(
            ledger.record_received(99, 30),
            ReceiveOutcome::Delivered { delay_ms: 10 }
        );
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut ledger = SequenceLedger::new();
        ledger.record_sent(1, i64::MIN);
        assert_eq!(
            ledger.record_received(1, i64::MAX),
            ReceiveOutcome::Delivered { delay_ms: i64::MAX }
        );
    }
}
