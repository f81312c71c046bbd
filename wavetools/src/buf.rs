//! Per-board circular event queues

use thiserror::Error;

use crate::Event;

/// Default number of slots in a board's event queue. One slot is always
/// wasted to tell full apart from empty, so the queue holds at most
/// `EVT_BUF_SIZE - 1` live events.
pub const EVT_BUF_SIZE: usize = 2000;

/// Recoverable queue conditions. Callers treat these as control flow
/// ("nothing to synchronize yet"), never as fatal.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Error)]
pub enum QueueError {
    #[error("queue is full")]
    BufferFull,
    #[error("queue is empty")]
    BufferEmpty,
    #[error("slot {0} is outside the live region")]
    InvalidPosition(usize),
    #[error("scan cursor reached the write head")]
    EndOfQueue,
}

/// Cursor arithmetic for a single-producer/single-consumer circular queue.
/// Pure index bookkeeping: `head` is the next write slot, `tail` the oldest
/// unread slot, `cursor` a re-scan pointer that never consumes. Empty is
/// `head == tail`; full is `head + 1 == tail` (mod capacity).
#[derive(Clone, Copy, Debug)]
pub struct RingBuffer {
    head: usize,
    tail: usize,
    cursor: usize,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 2, "a queue needs at least one usable slot");
        RingBuffer {
            head: 0,
            tail: 0,
            cursor: 0,
            capacity,
        }
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.cursor = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        (self.head + 1) % self.capacity == self.tail
    }

    pub fn used_space(&self) -> usize {
        (self.head + self.capacity - self.tail) % self.capacity
    }

    pub fn free_space(&self) -> usize {
        self.capacity - 1 - self.used_space()
    }

    /// Occupancy as a percentage of the usable capacity
    pub fn occupancy(&self) -> f64 {
        100.0 * self.used_space() as f64 / (self.capacity - 1) as f64
    }

    /// Slot index the next event should be written to. Does not advance
    /// `head`; the caller writes first, then calls [`commit_writes`].
    ///
    /// [`commit_writes`]: RingBuffer::commit_writes
    pub fn write_slot(&self) -> Result<usize, QueueError> {
        if self.is_full() {
            return Err(QueueError::BufferFull);
        }
        Ok(self.head)
    }

    /// Advance `head` by up to `n` slots, stopping early at full.
    /// Returns the number of slots actually committed.
    pub fn commit_writes(&mut self, n: usize) -> usize {
        let mut committed = 0;
        for _ in 0..n {
            if self.is_full() {
                break;
            }
            self.head = (self.head + 1) % self.capacity;
            committed += 1;
        }
        committed
    }

    /// Slot index of the oldest unread event, without consuming it
    pub fn oldest(&self) -> Result<usize, QueueError> {
        if self.is_empty() {
            return Err(QueueError::BufferEmpty);
        }
        Ok(self.tail)
    }

    /// Advance `tail` by up to `n` slots, stopping early at empty.
    /// Returns the number of slots actually discarded. The scan cursor
    /// rides along if the region advances past it.
    pub fn discard_oldest(&mut self, n: usize) -> usize {
        let mut discarded = 0;
        for _ in 0..n {
            if self.is_empty() {
                break;
            }
            if self.cursor == self.tail {
                self.cursor = (self.cursor + 1) % self.capacity;
            }
            self.tail = (self.tail + 1) % self.capacity;
            discarded += 1;
        }
        discarded
    }

    /// Logical offset of a raw slot index from `tail`
    fn offset_from_tail(&self, pos: usize) -> usize {
        (pos + self.capacity - self.tail) % self.capacity
    }

    /// Reposition the scan cursor to a slot in `[tail, head)` circular order
    pub fn seek_cursor(&mut self, pos: usize) -> Result<(), QueueError> {
        if self.is_empty() || pos >= self.capacity || self.offset_from_tail(pos) >= self.used_space()
        {
            return Err(QueueError::InvalidPosition(pos));
        }
        self.cursor = pos;
        Ok(())
    }

    /// Return the slot under the cursor and step the cursor forward,
    /// without consuming anything
    pub fn advance_cursor(&mut self) -> Result<usize, QueueError> {
        if self.cursor == self.head {
            return Err(QueueError::EndOfQueue);
        }
        let pos = self.cursor;
        self.cursor = (self.cursor + 1) % self.capacity;
        Ok(pos)
    }
}

/// A board's event queue: ring cursors plus an arena of event slots
/// allocated once at start of run. No heap activity after construction;
/// slots are reused in place as the ring wraps.
pub struct EventQueue {
    ring: RingBuffer,
    slots: Vec<Event>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        EventQueue {
            ring: RingBuffer::new(capacity),
            slots: vec![Event::default(); capacity],
        }
    }

    /// Cursor state, read-only
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn reset(&mut self) {
        self.ring.reset();
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    pub fn used_space(&self) -> usize {
        self.ring.used_space()
    }

    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    pub fn occupancy(&self) -> f64 {
        self.ring.occupancy()
    }

    /// Borrow the slot at `head` for writing. `head` only advances on
    /// [`commit_writes`], so an aborted decode leaves the queue untouched.
    ///
    /// [`commit_writes`]: EventQueue::commit_writes
    pub fn write_slot(&mut self) -> Result<&mut Event, QueueError> {
        let pos = self.ring.write_slot()?;
        Ok(&mut self.slots[pos])
    }

    pub fn commit_writes(&mut self, n: usize) -> usize {
        self.ring.commit_writes(n)
    }

    pub fn peek_oldest(&self) -> Result<&Event, QueueError> {
        let pos = self.ring.oldest()?;
        Ok(&self.slots[pos])
    }

    pub fn discard_oldest(&mut self, n: usize) -> usize {
        self.ring.discard_oldest(n)
    }

    pub fn seek_cursor(&mut self, pos: usize) -> Result<(), QueueError> {
        self.ring.seek_cursor(pos)
    }

    pub fn advance_cursor(&mut self) -> Result<&Event, QueueError> {
        let pos = self.ring.advance_cursor()?;
        Ok(&self.slots[pos])
    }

    /// Write one event and commit it in a single step
    pub fn push(&mut self, event: Event) -> Result<(), QueueError> {
        let slot = self.write_slot()?;
        *slot = event;
        self.ring.commit_writes(1);
        Ok(())
    }
}
