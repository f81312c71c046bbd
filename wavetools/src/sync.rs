//! Cross-board event synchronization within a fixed timing window

use std::time::{Duration, Instant};
use tracing::warn;

use crate::buf::EventQueue;
use crate::cfg::AcqConfig;
use crate::stats::StatisticsEngine;
use crate::{group_of, Event, MAX_BD, MAX_CH, TICK_NS};

/// Default width of the synchronization window in nanoseconds, inclusive
pub const SYNC_WINDOW_NS: u64 = 100;

/// Minimum spacing between repeated desynchronization warnings
const DESYNC_WARN_COOLDOWN: Duration = Duration::from_secs(5);

/// Downstream consumer of accepted events: waveform processing, output
/// writers, histogramming. Called synchronously inside the processing
/// round; the handles are not retained afterwards.
pub trait EventSink {
    /// Handle one event on (board, channel). `tof_ref` is the designated
    /// time-of-flight start event for this round, valid only for the
    /// duration of the call. Returns whether the event passed the
    /// downstream software filters.
    fn process(
        &mut self,
        board: usize,
        channel: usize,
        event: &Event,
        tof_ref: Option<&Event>,
    ) -> bool;
}

/// Matches events across boards by their reference-channel timestamps.
///
/// Each round peeks the oldest event of every board, takes the minimum
/// timestamp, and marks every board whose offset from that minimum is
/// within the window. If all boards fall inside, the set is handed
/// downstream as one physical event; otherwise the early events have no
/// counterpart and are dropped as lost while later boards keep theirs
/// for the next round.
pub struct Synchronizer {
    window_ns: u64,
    tof_board: usize,
    ref_group: Vec<usize>,
    enabled: Vec<u16>,
    last_desync_warn: Option<Instant>,
}

impl Synchronizer {
    pub fn new(cfg: &AcqConfig) -> Self {
        Synchronizer {
            window_ns: cfg.sync_window_ns,
            tof_board: cfg.tof_start_board,
            ref_group: cfg.boards.iter().map(|b| group_of(b.ref_channel)).collect(),
            enabled: cfg.boards.iter().map(|b| b.enabled).collect(),
            last_desync_warn: None,
        }
    }

    fn enabled_channels(&self, board: usize) -> impl Iterator<Item = usize> + '_ {
        let mask = self.enabled[board];
        (0..MAX_CH).filter(move |&ch| mask & (1 << ch) != 0)
    }

    fn warn_desync(&mut self, outside: usize) {
        let now = Instant::now();
        let due = self
            .last_desync_warn
            .map_or(true, |t| now.duration_since(t) >= DESYNC_WARN_COOLDOWN);
        if due {
            warn!(
                outside,
                window_ns = self.window_ns,
                "events outside the synchronization window"
            );
            self.last_desync_warn = Some(now);
        }
    }

    /// Run matching rounds until some board runs out of buffered events.
    /// Returns the number of rounds completed. An empty board queue is a
    /// normal outcome, not an error.
    pub fn synchronize(
        &mut self,
        queues: &mut [EventQueue],
        stats: &mut StatisticsEngine,
        sink: &mut dyn EventSink,
    ) -> usize {
        let nboards = queues.len();
        let min_depth = queues.iter().map(|q| q.used_space()).min().unwrap_or(0);
        if min_depth == 0 {
            return 0;
        }

        let mut rounds = 0;
        for _ in 0..min_depth {
            // Reference timestamp of each board's oldest event. Every queue
            // held at least min_depth events when the pass started, so an
            // empty queue here is a bug guard: stop rather than fault.
            let mut stamps = [0u64; MAX_BD];
            for (b, q) in queues.iter().enumerate() {
                match q.peek_oldest() {
                    Ok(ev) => stamps[b] = ev.tdc(self.ref_group[b]),
                    Err(_) => return rounds,
                }
            }
            let tdc_min = match stamps[..nboards].iter().copied().min() {
                Some(t) => t,
                None => return rounds,
            };

            // Offsets from the minimum are non-negative; the window test is
            // an inclusive interval, so ties at the minimum all match
            let mut in_window = [false; MAX_BD];
            let mut matched = 0;
            for b in 0..nboards {
                if (stamps[b] - tdc_min) * TICK_NS <= self.window_ns {
                    in_window[b] = true;
                    matched += 1;
                }
            }

            if matched == nboards {
                // Full match: hand the whole set downstream
                let qs: &[EventQueue] = queues;
                let tof_ref = qs[self.tof_board].peek_oldest().ok();
                for b in 0..nboards {
                    let ev = match qs[b].peek_oldest() {
                        Ok(ev) => ev,
                        Err(_) => return rounds,
                    };
                    for ch in 0..MAX_CH {
                        if self.enabled[b] & (1 << ch) == 0 {
                            continue;
                        }
                        if sink.process(b, ch, ev, tof_ref) {
                            stats.note_filtered(b, ch);
                        }
                    }
                }
            } else {
                stats.note_unsynced((nboards - matched) as u64);
                self.warn_desync(nboards - matched);
                for b in 0..nboards {
                    if !in_window[b] {
                        continue;
                    }
                    for ch in self.enabled_channels(b) {
                        stats.note_lost(b, ch, 1);
                    }
                }
            }

            // Consume one event from every board inside the window; boards
            // outside it keep their event for the next round
            for b in 0..nboards {
                if !in_window[b] {
                    continue;
                }
                queues[b].discard_oldest(1);
                for ch in self.enabled_channels(b) {
                    stats.note_processed(b, ch, 1);
                }
            }
            rounds += 1;
        }
        rounds
    }

    /// Drain mode for runs without cross-board synchronization: each board
    /// hands over up to `new_counts[board]` events (the number decoded in
    /// the current poll) in arrival order, interleaved across boards.
    pub fn drain_unsynchronized(
        &mut self,
        queues: &mut [EventQueue],
        new_counts: &[usize],
        stats: &mut StatisticsEngine,
        sink: &mut dyn EventSink,
    ) -> usize {
        let max_new = new_counts.iter().copied().max().unwrap_or(0);
        let mut drained = 0;
        for i in 0..max_new {
            for b in 0..queues.len() {
                if i >= new_counts[b] || queues[b].is_empty() {
                    continue;
                }
                {
                    let ev = match queues[b].peek_oldest() {
                        Ok(ev) => ev,
                        Err(_) => continue,
                    };
                    let tof_ref = if b == self.tof_board { Some(ev) } else { None };
                    for ch in 0..MAX_CH {
                        if self.enabled[b] & (1 << ch) == 0 {
                            continue;
                        }
                        if sink.process(b, ch, ev, tof_ref) {
                            stats.note_filtered(b, ch);
                        }
                    }
                }
                queues[b].discard_oldest(1);
                for ch in self.enabled_channels(b) {
                    stats.note_processed(b, ch, 1);
                }
                drained += 1;
            }
        }
        drained
    }
}
