//! Bounded per-room message log
//!
//! Append-only FIFO: once capacity is reached the oldest entry is evicted
//! on every push. Entries are never mutated or reordered after insertion.

use std::collections::VecDeque;

use crate::protocol::events::Message;

/// Bounded ordered log of recent messages
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    messages: VecDeque<Message>,
    capacity: usize,
}

impl MessageBuffer {
    /// Create a buffer holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entry when full. O(1) amortized.
    /// A zero-capacity buffer retains nothing.
    pub fn push(&mut self, message: Message) {
        if self.capacity == 0 {
            return;
        }
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    /// Most recent `limit` messages, oldest-first within the returned slice
    pub fn tail(&self, limit: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(limit);
        self.messages.iter().skip(skip).cloned().collect()
    }

    /// Number of retained messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events::MessageKind;

    fn message(n: usize) -> Message {
        Message::user(
            format!("msg_{}_{}", n, n),
            "alice".to_string(),
            format!("message {}", n),
            n as u64,
        )
    }

    #[test]
    fn test_append_within_capacity() {
        let mut buffer = MessageBuffer::new(10);
        for n in 0..5 {
            buffer.push(message(n));
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.tail(10).len(), 5);
    }

    #[test]
    fn test_eviction_drops_oldest_first() {
        let mut buffer = MessageBuffer::new(100);
        for n in 0..101 {
            buffer.push(message(n));
        }

        // A limit above capacity still yields at most capacity entries.
        let tail = buffer.tail(200);
        assert_eq!(tail.len(), 100);
        assert_eq!(tail[0].content, "message 1");
        assert_eq!(tail[99].content, "message 100");

        // Order preserved end to end
        for (i, msg) in tail.iter().enumerate() {
            assert_eq!(msg.content, format!("message {}", i + 1));
        }
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut buffer = MessageBuffer::new(0);
        for n in 0..10 {
            buffer.push(message(n));
        }
        assert!(buffer.is_empty());
        assert!(buffer.tail(10).is_empty());
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut buffer = MessageBuffer::new(3);
        for n in 0..10 {
            buffer.push(message(n));
            assert!(buffer.len() <= 3);
        }
        let tail = buffer.tail(10);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].content, "message 7");
        assert_eq!(tail[2].content, "message 9");
    }

    #[test]
    fn test_tail_is_oldest_first_slice_of_newest() {
        let mut buffer = MessageBuffer::new(100);
        for n in 0..30 {
            buffer.push(message(n));
        }

        let tail = buffer.tail(10);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0].content, "message 20");
        assert_eq!(tail[9].content, "message 29");
    }

    #[test]
    fn test_messages_are_immutable_copies() {
        let mut buffer = MessageBuffer::new(10);
        buffer.push(message(0));

        let mut tail = buffer.tail(10);
        tail[0].content = "mutated".to_string();
        tail[0].kind = MessageKind::System;

        assert_eq!(buffer.tail(10)[0].content, "message 0");
    }
}
