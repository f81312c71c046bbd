use wavetools::buf::EventQueue;
use wavetools::stats::{AveragingMode, StatisticsEngine};
use wavetools::sync::Synchronizer;

mod common;
use common::RecordingSink;

fn queues_with(cfg: &wavetools::cfg::AcqConfig, tdcs: &[&[u64]]) -> Vec<EventQueue> {
    tdcs.iter()
        .enumerate()
        .map(|(b, list)| {
            let mut q = EventQueue::new(cfg.queue_capacity);
            for &t in *list {
                q.push(common::event(b, t)).unwrap();
            }
            q
        })
        .collect()
}

/// The window test is inclusive: a spread of exactly the window width
/// still counts as one physical event.
#[test]
fn window_boundary_is_inclusive() {
    let cfg = common::config(2, AveragingMode::Instantaneous);
    // 20 ticks of 5 ns = 100 ns, the full window
    let mut queues = queues_with(&cfg, &[&[1_000], &[1_020]]);
    let mut stats = StatisticsEngine::new(&cfg);
    let mut sync = Synchronizer::new(&cfg);
    let mut sink = RecordingSink::accepting();

    assert_eq!(sync.synchronize(&mut queues, &mut stats, &mut sink), 1);
    assert_eq!(sink.calls.len(), 2);
    assert!(queues.iter().all(|q| q.is_empty()));
    assert_eq!(stats.run().unsynced_cnt, 0);
    assert_eq!(stats.counters(0, 0).filt_cnt, 1);
    assert_eq!(stats.counters(1, 0).filt_cnt, 1);
}

/// One tick past the window the early board's event has no counterpart:
/// it is dropped as lost while the late board keeps its event.
#[test]
fn early_event_outside_window_is_dropped() {
    let cfg = common::config(2, AveragingMode::Instantaneous);
    // 21 ticks = 105 ns, just outside
    let mut queues = queues_with(&cfg, &[&[1_000], &[1_021]]);
    let mut stats = StatisticsEngine::new(&cfg);
    let mut sync = Synchronizer::new(&cfg);
    let mut sink = RecordingSink::accepting();

    assert_eq!(sync.synchronize(&mut queues, &mut stats, &mut sink), 1);
    assert!(sink.calls.is_empty());
    assert!(queues[0].is_empty());
    assert_eq!(queues[1].used_space(), 1);
    assert_eq!(stats.run().unsynced_cnt, 1);
    assert_eq!(stats.counters(0, 0).lost_cnt, Some(1));
    assert_eq!(stats.counters(0, 0).processed_cnt, 1);
    assert_eq!(stats.counters(1, 0).processed_cnt, 0);
}

/// A stream with one orphan on board 1: every event is accounted for
/// exactly once across matched, lost and retained.
#[test]
fn orphan_accounting_across_rounds() {
    let cfg = common::config(2, AveragingMode::Instantaneous);
    let mut queues = queues_with(&cfg, &[&[1_000, 2_000, 4_000], &[1_000, 2_000, 3_000, 4_000]]);
    let mut stats = StatisticsEngine::new(&cfg);
    let mut sync = Synchronizer::new(&cfg);
    let mut sink = RecordingSink::accepting();

    // first pass is bounded by the shallower board
    assert_eq!(sync.synchronize(&mut queues, &mut stats, &mut sink), 3);
    // a later poll delivers nothing new but the queues still pair up
    assert_eq!(sync.synchronize(&mut queues, &mut stats, &mut sink), 1);

    assert!(queues.iter().all(|q| q.is_empty()));
    assert_eq!(stats.counters(0, 0).filt_cnt, 3);
    assert_eq!(stats.counters(1, 0).filt_cnt, 3);
    assert_eq!(stats.counters(0, 0).processed_cnt, 3);
    assert_eq!(stats.counters(1, 0).processed_cnt, 4);
    assert_eq!(stats.counters(0, 0).lost_cnt, Some(0));
    assert_eq!(stats.counters(1, 0).lost_cnt, Some(1));
    assert_eq!(stats.run().unsynced_cnt, 1);
}

/// Every call in a matched round carries the designated start board's
/// event as the time-of-flight reference.
#[test]
fn tof_reference_reaches_every_channel() {
    let cfg = common::config(2, AveragingMode::Instantaneous);
    let mut queues = queues_with(&cfg, &[&[500], &[505]]);
    let mut stats = StatisticsEngine::new(&cfg);
    let mut sync = Synchronizer::new(&cfg);
    let mut sink = RecordingSink::accepting();

    sync.synchronize(&mut queues, &mut stats, &mut sink);
    assert_eq!(sink.calls.len(), 2);
    for (_, _, _, tof) in &sink.calls {
        assert_eq!(*tof, Some(500));
    }
}

/// Rejected events still count as processed, just not as filtered
#[test]
fn sink_rejection_does_not_count_as_filtered() {
    let cfg = common::config(2, AveragingMode::Instantaneous);
    let mut queues = queues_with(&cfg, &[&[500], &[505]]);
    let mut stats = StatisticsEngine::new(&cfg);
    let mut sync = Synchronizer::new(&cfg);
    let mut sink = RecordingSink {
        calls: Vec::new(),
        accept: false,
    };

    assert_eq!(sync.synchronize(&mut queues, &mut stats, &mut sink), 1);
    assert_eq!(stats.counters(0, 0).filt_cnt, 0);
    assert_eq!(stats.counters(0, 0).processed_cnt, 1);
}

/// Matching cannot start until every board has at least one event
#[test]
fn empty_board_defers_matching() {
    let cfg = common::config(2, AveragingMode::Instantaneous);
    let mut queues = queues_with(&cfg, &[&[1_000, 2_000], &[]]);
    let mut stats = StatisticsEngine::new(&cfg);
    let mut sync = Synchronizer::new(&cfg);
    let mut sink = RecordingSink::accepting();

    assert_eq!(sync.synchronize(&mut queues, &mut stats, &mut sink), 0);
    assert_eq!(queues[0].used_space(), 2);
    assert!(sink.calls.is_empty());
    assert_eq!(stats.run().unsynced_cnt, 0);
}

/// Unsynchronized drain hands over only the events decoded this poll,
/// interleaved across boards, with the reference event attached only on
/// the start board itself.
#[test]
fn drain_respects_per_board_counts() {
    let cfg = common::config(2, AveragingMode::Instantaneous);
    let mut queues = queues_with(&cfg, &[&[10, 20, 30], &[100, 200, 300]]);
    let mut stats = StatisticsEngine::new(&cfg);
    let mut sync = Synchronizer::new(&cfg);
    let mut sink = RecordingSink::accepting();

    let drained = sync.drain_unsynchronized(&mut queues, &[2, 1], &mut stats, &mut sink);
    assert_eq!(drained, 3);
    assert_eq!(queues[0].used_space(), 1);
    assert_eq!(queues[1].used_space(), 2);
    assert_eq!(
        sink.calls,
        vec![
            (0, 0, 10, Some(10)),
            (1, 0, 100, None),
            (0, 0, 20, Some(20)),
        ]
    );
    assert_eq!(stats.counters(0, 0).processed_cnt, 2);
    assert_eq!(stats.counters(1, 0).processed_cnt, 1);
    assert_eq!(stats.run().unsynced_cnt, 0);
}
