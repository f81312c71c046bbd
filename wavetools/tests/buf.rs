use wavetools::buf::{EventQueue, QueueError, RingBuffer};

mod common;

#[test]
fn empty_and_full_predicates() {
    let mut rb = RingBuffer::new(4);
    assert!(rb.is_empty());
    assert!(!rb.is_full());
    assert_eq!(rb.used_space(), 0);
    assert_eq!(rb.free_space(), 3);

    rb.commit_writes(3);
    assert!(rb.is_full());
    assert_eq!(rb.used_space(), 3);
    assert_eq!(rb.free_space(), 0);
    assert_eq!(rb.write_slot(), Err(QueueError::BufferFull));

    rb.discard_oldest(3);
    assert!(rb.is_empty());
    assert_eq!(rb.oldest(), Err(QueueError::BufferEmpty));
}

/// The queue never holds more than capacity - 1 events, and is_full is
/// true exactly at that occupancy, across many interleaved operations.
#[test]
fn capacity_invariant() {
    let cap = 8;
    let mut rb = RingBuffer::new(cap);
    // alternating bursts of writes and discards, long enough to wrap the
    // ring several times
    let script: [(usize, usize); 10] = [
        (5, 2),
        (7, 0),
        (3, 6),
        (1, 1),
        (9, 4),
        (2, 0),
        (0, 9),
        (6, 3),
        (4, 4),
        (8, 8),
    ];
    for (wr, rd) in script {
        let committed = rb.commit_writes(wr);
        assert!(committed <= wr);
        assert!(rb.used_space() <= cap - 1);
        assert_eq!(rb.is_full(), rb.used_space() == cap - 1);
        assert_eq!(rb.used_space() + rb.free_space(), cap - 1);

        let discarded = rb.discard_oldest(rd);
        assert!(discarded <= rd);
        assert!(rb.used_space() <= cap - 1);
        assert_eq!(rb.used_space() + rb.free_space(), cap - 1);
    }
}

#[test]
fn partial_commit_and_discard_report_actual_counts() {
    let mut rb = RingBuffer::new(4);
    assert_eq!(rb.commit_writes(5), 3);
    assert!(rb.is_full());
    assert_eq!(rb.discard_oldest(5), 3);
    assert!(rb.is_empty());
    assert_eq!(rb.discard_oldest(1), 0);
}

/// Events come back out in exactly the order they were committed, across
/// wraparound.
#[test]
fn fifo_across_wraparound() {
    let mut q = EventQueue::new(4);
    let mut next = 0u64;
    let mut expect = 0u64;
    for _ in 0..20 {
        // fill to capacity, then drain two
        while !q.is_full() {
            q.push(common::event(0, next)).unwrap();
            next += 1;
        }
        for _ in 0..2 {
            assert_eq!(q.peek_oldest().unwrap().tdc(0), expect);
            assert_eq!(q.discard_oldest(1), 1);
            expect += 1;
        }
    }
}

#[test]
fn write_slot_does_not_advance_until_committed() {
    let mut q = EventQueue::new(4);
    *q.write_slot().unwrap() = common::event(0, 42);
    assert!(q.is_empty());
    assert_eq!(q.commit_writes(1), 1);
    assert_eq!(q.used_space(), 1);
    assert_eq!(q.peek_oldest().unwrap().tdc(0), 42);
}

#[test]
fn occupancy_scales_with_usable_capacity() {
    let mut q = EventQueue::new(2000);
    assert_eq!(q.occupancy(), 0.0);
    for i in 0..1999u64 {
        q.push(common::event(0, i)).unwrap();
    }
    assert!(q.is_full());
    assert!((q.occupancy() - 100.0).abs() < 1e-12);
    q.discard_oldest(999);
    assert!((q.occupancy() - 100.0 * 1000.0 / 1999.0).abs() < 1e-9);
}

#[test]
fn cursor_scans_without_consuming() {
    let mut q = EventQueue::new(8);
    for i in 0..5u64 {
        q.push(common::event(0, i)).unwrap();
    }
    // cursor starts at the tail
    for i in 0..5u64 {
        assert_eq!(q.advance_cursor().unwrap().tdc(0), i);
    }
    assert!(matches!(q.advance_cursor(), Err(QueueError::EndOfQueue)));
    // nothing was consumed
    assert_eq!(q.used_space(), 5);

    // re-scan from slot 2
    q.seek_cursor(2).unwrap();
    assert_eq!(q.advance_cursor().unwrap().tdc(0), 2);
}

#[test]
fn cursor_seek_rejects_positions_outside_live_region() {
    let mut q = EventQueue::new(8);
    assert!(matches!(
        q.seek_cursor(0),
        Err(QueueError::InvalidPosition(0))
    ));
    for i in 0..3u64 {
        q.push(common::event(0, i)).unwrap();
    }
    assert!(q.seek_cursor(0).is_ok());
    assert!(q.seek_cursor(2).is_ok());
    // head itself is not a readable slot
    assert!(matches!(
        q.seek_cursor(3),
        Err(QueueError::InvalidPosition(3))
    ));
    assert!(matches!(
        q.seek_cursor(9),
        Err(QueueError::InvalidPosition(9))
    ));
}

#[test]
fn cursor_rides_the_tail_when_overtaken() {
    let mut q = EventQueue::new(8);
    for i in 0..5u64 {
        q.push(common::event(0, i)).unwrap();
    }
    // cursor sits at the tail (slot 0); discarding past it drags it along
    q.discard_oldest(3);
    assert_eq!(q.advance_cursor().unwrap().tdc(0), 3);
}

#[test]
fn reset_restores_initial_state() {
    let mut q = EventQueue::new(8);
    for i in 0..6u64 {
        q.push(common::event(0, i)).unwrap();
    }
    q.discard_oldest(2);
    q.reset();
    assert!(q.is_empty());
    assert_eq!(q.free_space(), 7);
    assert!(q.peek_oldest().is_err());
}
