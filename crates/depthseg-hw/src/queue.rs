//! Non-blocking output queues.

use crate::device::DeviceError;
use depthseg_core::TimestampedMessage;
use std::collections::VecDeque;

/// One named device output.
pub trait OutputQueue: Send {
    fn name(&self) -> &str;

    /// Whether a message can be popped right now. Never blocks.
    fn has_data(&mut self) -> bool;

    /// Take the oldest message. Fails with `QueueEmpty` when `has_data` is false.
    fn pop(&mut self) -> Result<TimestampedMessage, DeviceError>;

    /// Messages discarded because the consumer fell behind.
    fn dropped(&self) -> u64 {
        0
    }
}

/// Bounded FIFO that drops its oldest entry on overflow.
pub struct MessageQueue {
    name: String,
    max_size: usize,
    items: VecDeque<TimestampedMessage>,
    dropped: u64,
}

impl MessageQueue {
    pub fn new(name: impl Into<String>, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            name: name.into(),
            max_size,
            items: VecDeque::with_capacity(max_size),
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: TimestampedMessage) {
        if self.items.len() == self.max_size {
            self.items.pop_front();
            self.dropped += 1;
            tracing::trace!(
                queue = %self.name,
                dropped = self.dropped,
                "queue full, dropped oldest"
            );
        }
        self.items.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl OutputQueue for MessageQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_data(&mut self) -> bool {
        !self.items.is_empty()
    }

    fn pop(&mut self) -> Result<TimestampedMessage, DeviceError> {
        self.items
            .pop_front()
            .ok_or_else(|| DeviceError::QueueEmpty(self.name.clone()))
    }

    fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depthseg_core::{NnOutput, Payload};
    use std::time::Duration;

    fn msg(seq: u64) -> TimestampedMessage {
        TimestampedMessage::new(
            Duration::from_millis(seq * 33),
            seq,
            Payload::Segmentation(NnOutput { layer: vec![] }),
        )
    }

    #[test]
    fn test_fifo_order() {
        let mut q = MessageQueue::new("nn", 4);
        assert!(!q.has_data());
        q.push(msg(0));
        q.push(msg(1));
        assert!(q.has_data());
        assert_eq!(q.pop().unwrap().sequence, 0);
        assert_eq!(q.pop().unwrap().sequence, 1);
        assert!(matches!(q.pop(), Err(DeviceError::QueueEmpty(name)) if name == "nn"));
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut q = MessageQueue::new("color", 4);
        for seq in 0..6 {
            q.push(msg(seq));
        }
        assert_eq!(q.len(), 4);
        assert_eq!(q.dropped(), 2);
        assert_eq!(q.pop().unwrap().sequence, 2);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut q = MessageQueue::new("depth", 0);
        q.push(msg(0));
        q.push(msg(1));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap().sequence, 1);
    }
}
