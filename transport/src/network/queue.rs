#![deny(unsafe_code)]
//! Fixed-capacity outbound message queue
//!
//! Messages handed to the adapter are copied into a ring of `DEPTH` slots of
//! `CAPACITY` bytes each, so the send path never allocates. Only the head slot
//! is ever partially sent; `sent` tracks how far it got.

use heapless::{Deque, Vec};

use super::error::QueueError;

/// Owned copy of a caller buffer awaiting transmission
#[derive(Debug)]
pub struct PendingMessage<C, const CAPACITY: usize> {
    data: Vec<u8, CAPACITY>,
    sent: usize,
    context: C,
}

impl<C, const CAPACITY: usize> PendingMessage<C, CAPACITY> {
    /// Total message length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Bytes not yet accepted by the transport
    pub fn remaining(&self) -> usize {
        self.data.len() - self.sent
    }

    /// Unsent tail of the message
    pub fn unsent(&self) -> &[u8] {
        &self.data[self.sent..]
    }

    /// Record `n` more bytes as sent; returns what is still outstanding
    pub fn advance(&mut self, n: usize) -> usize {
        self.sent = (self.sent + n).min(self.data.len());
        self.remaining()
    }

    /// Release the message, keeping only its completion context
    pub fn into_context(self) -> C {
        self.context
    }
}

/// FIFO of pending messages
#[derive(Debug)]
pub struct OutboundQueue<C, const DEPTH: usize, const CAPACITY: usize> {
    slots: Deque<PendingMessage<C, CAPACITY>, DEPTH>,
}

impl<C, const DEPTH: usize, const CAPACITY: usize> OutboundQueue<C, DEPTH, CAPACITY> {
    /// Empty queue
    pub const fn new() -> Self {
        Self {
            slots: Deque::new(),
        }
    }

    /// Copy `bytes` into the tail slot
    ///
    /// # Errors
    ///
    /// `EmptyMessage` for a zero-length buffer, `MessageTooLarge` when it does
    /// not fit one slot, `Full` when every slot is taken. The queue is left
    /// untouched on error.
    pub fn push(&mut self, bytes: &[u8], context: C) -> Result<(), QueueError> {
        if bytes.is_empty() {
            return Err(QueueError::EmptyMessage);
        }
        if self.slots.is_full() {
            return Err(QueueError::Full);
        }
        let data = Vec::from_slice(bytes).map_err(|_| QueueError::MessageTooLarge)?;

        self.slots
            .push_back(PendingMessage {
                data,
                sent: 0,
                context,
            })
            .map_err(|_| QueueError::Full)
    }

    /// Message currently being sent
    pub fn front_mut(&mut self) -> Option<&mut PendingMessage<C, CAPACITY>> {
        self.slots.front_mut()
    }

    /// Remove the head once it is fully sent or cancelled
    pub fn pop_front(&mut self) -> Option<PendingMessage<C, CAPACITY>> {
        self.slots.pop_front()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Unsent bytes of the head message, `0` when empty
    pub fn head_remaining(&self) -> usize {
        self.slots.front().map_or(0, PendingMessage::remaining)
    }
}

impl<C, const DEPTH: usize, const CAPACITY: usize> Default for OutboundQueue<C, DEPTH, CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
