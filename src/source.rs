//! Packet source trait shared by the network receiver and the mock source

use crate::Result;
use crate::types::{EncodedPacket, SourceDescriptor, StreamHandle};

/// Trait for encoded packet producers
///
/// The pipeline depends only on this contract, so a live network source and
/// a scripted mock are interchangeable.
#[async_trait::async_trait]
pub trait PacketSource: Send + 'static {
    /// Open a stream from the described source.
    ///
    /// Returns:
    /// - `Ok(handle)` - stream negotiated
    /// - `Err(SourceUnavailable)` - source unreachable on this attempt (retryable)
    /// - `Err(Protocol)` - source reachable but speaking something else
    async fn connect(&mut self, descriptor: &SourceDescriptor) -> Result<StreamHandle>;

    /// Pull the next packet for `handle`.
    ///
    /// Returns:
    /// - `Ok(packet)` - next packet, stamped with its arrival time
    /// - `Err(StreamEnded)` - clean end of stream, or the handle was cancelled
    /// - `Err(TransientIo)` - read hiccup, worth retrying
    /// - any other error - the stream is unusable
    async fn next_packet(&mut self, handle: &StreamHandle) -> Result<EncodedPacket>;
}

#[async_trait::async_trait]
impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    async fn connect(&mut self, descriptor: &SourceDescriptor) -> Result<StreamHandle> {
        (**self).connect(descriptor).await
    }

    async fn next_packet(&mut self, handle: &StreamHandle) -> Result<EncodedPacket> {
        (**self).next_packet(handle).await
    }
}

/// Outcome of checking one sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Exactly the expected sequence number
    InOrder,
    /// Packets were skipped; `missing` of them will never arrive
    Gap { expected: u64, missing: u64 },
    /// Duplicate or reordered packet older than one already seen
    Stale { expected: u64 },
}

/// Tracks the expected sequence number of one stream
///
/// Detects gaps but does not reconstruct lost packets.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    expected: Option<u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `sequence` against the expected value and advance.
    ///
    /// Stale packets do not move the counter.
    pub fn observe(&mut self, sequence: u64) -> SequenceCheck {
        let Some(expected) = self.expected else {
            self.expected = Some(sequence.wrapping_add(1));
            return SequenceCheck::InOrder;
        };

        if sequence == expected {
            self.expected = Some(sequence.wrapping_add(1));
            SequenceCheck::InOrder
        } else if sequence > expected {
            self.expected = Some(sequence.wrapping_add(1));
            SequenceCheck::Gap { expected, missing: sequence - expected }
        } else {
            SequenceCheck::Stale { expected }
        }
    }

    /// Next sequence number the tracker expects
    pub fn expected(&self) -> Option<u64> {
        self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_packet_sets_baseline() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(100), SequenceCheck::InOrder);
        assert_eq!(tracker.expected(), Some(101));
    }

    #[test]
    fn gaps_and_stale_packets() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(0), SequenceCheck::InOrder);
        assert_eq!(tracker.observe(1), SequenceCheck::InOrder);
        assert_eq!(tracker.observe(4), SequenceCheck::Gap { expected: 2, missing: 2 });
        assert_eq!(tracker.observe(3), SequenceCheck::Stale { expected: 5 });
        assert_eq!(tracker.observe(5), SequenceCheck::InOrder);
    }

    proptest! {
        #[test]
        fn prop_missing_counts_sum_to_skipped(steps in prop::collection::vec(1u64..5, 1..50)) {
            let mut tracker = SequenceTracker::new();
            let mut sequence = 0u64;
            let mut missing_total = 0u64;
            tracker.observe(sequence);
            for step in &steps {
                sequence += step;
                if let SequenceCheck::Gap { missing, .. } = tracker.observe(sequence) {
                    missing_total += missing;
                }
            }
            let expected_missing: u64 = steps.iter().map(|s| s - 1).sum();
            prop_assert_eq!(missing_total, expected_missing);
        }
    }
}
