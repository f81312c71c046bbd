//! The acquisition session: one aggregate owning the per-board queues,
//! the synchronizer and the statistics engine, driven by a single
//! polling loop. No globals; everything the core mutates lives here.

use anyhow::Result;
use std::time::Instant;

use wavetools::buf::EventQueue;
use wavetools::cfg::{AcqConfig, ChannelRecord, RunRecord};
use wavetools::stats::StatisticsEngine;
use wavetools::sync::{EventSink, Synchronizer};
use wavetools::group_of;

use crate::source::{BoardBlock, ReadoutSource};

/// Wall clock in milliseconds since the epoch
fn wall_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

pub struct AcquisitionSession {
    cfg: AcqConfig,
    queues: Vec<EventQueue>,
    stats: StatisticsEngine,
    sync: Synchronizer,
    /// Events decoded per board in the current poll
    new_counts: Vec<usize>,
    last_stats: Instant,
    running: bool,
}

impl AcquisitionSession {
    pub fn new(mut cfg: AcqConfig) -> Result<Self> {
        cfg.validate()?;
        let queues = cfg
            .boards
            .iter()
            .map(|_| EventQueue::new(cfg.queue_capacity))
            .collect();
        let stats = StatisticsEngine::new(&cfg);
        let sync = Synchronizer::new(&cfg);
        let n = cfg.boards.len();
        Ok(AcquisitionSession {
            cfg,
            queues,
            stats,
            sync,
            new_counts: vec![0; n],
            last_stats: Instant::now(),
            running: false,
        })
    }

    pub fn cfg(&self) -> &AcqConfig {
        &self.cfg
    }

    pub fn stats(&self) -> &StatisticsEngine {
        &self.stats
    }

    pub fn occupancy(&self, board: usize) -> f64 {
        self.queues[board].occupancy()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Reset queues and counters and begin a run. Safe to call again for
    /// a restart; state persists after [`stop_run`] until the next start
    /// so end-of-run reporting sees the final counters.
    ///
    /// [`stop_run`]: AcquisitionSession::stop_run
    pub fn start_run(&mut self) {
        for q in &mut self.queues {
            q.reset();
        }
        self.stats.reset(wall_ms());
        self.last_stats = Instant::now();
        self.running = true;
    }

    /// Stop acquiring. Only takes effect between ticks.
    pub fn stop_run(&mut self) {
        self.running = false;
    }

    /// One pass of the service loop: poll, buffer, synchronize (or drain),
    /// and on the configured cadence recompute statistics.
    pub fn tick(&mut self, source: &mut dyn ReadoutSource, sink: &mut dyn EventSink) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        let blocks = source.poll()?;
        for c in self.new_counts.iter_mut() {
            *c = 0;
        }
        for block in &blocks {
            self.make_space(block.board, block.events.len());
        }
        for block in blocks {
            self.ingest(block);
        }
        if self.cfg.sync_enabled {
            self.sync
                .synchronize(&mut self.queues, &mut self.stats, sink);
        } else {
            let counts = self.new_counts.clone();
            self.sync
                .drain_unsynchronized(&mut self.queues, &counts, &mut self.stats, sink);
        }
        if self.last_stats.elapsed() >= self.cfg.stats_cadence {
            self.stats.update(wall_ms());
            self.last_stats = Instant::now();
        }
        Ok(())
    }

    /// Discard oldest events if a board's queue cannot take the incoming
    /// batch; every discarded event counts as lost and processed on all
    /// of the board's enabled channels.
    fn make_space(&mut self, board: usize, incoming: usize) {
        if self.queues[board].free_space() < incoming {
            let removed = self.queues[board].discard_oldest(incoming) as u64;
            for ch in self.cfg.boards[board].enabled_channels() {
                self.stats.note_lost(board, ch, removed);
                self.stats.note_processed(board, ch, removed);
            }
        }
    }

    fn ingest(&mut self, block: BoardBlock) {
        let b = block.board;
        self.stats.note_block_read(block.bytes);
        if block.events.is_empty() {
            // nothing decoded this poll; normal
            return;
        }
        self.stats.note_events_total(block.events.len() as u64);
        for event in block.events {
            for ch in self.cfg.boards[b].enabled_channels() {
                let g = group_of(ch);
                if !event.groups[g].present {
                    continue;
                }
                self.stats.note_events_read(b, ch, 1, event.tdc(g));
                self.stats.note_proc_time(b, ch, event.tdc(g));
            }
            // make_space ran against the poll's total, but a batch larger
            // than the whole queue can still fill it mid-loop
            if self.queues[b].is_full() {
                let removed = self.queues[b].discard_oldest(1) as u64;
                for ch in self.cfg.boards[b].enabled_channels() {
                    self.stats.note_lost(b, ch, removed);
                    self.stats.note_processed(b, ch, removed);
                }
            }
            if let Ok(slot) = self.queues[b].write_slot() {
                *slot = event;
                self.queues[b].commit_writes(1);
                self.new_counts[b] += 1;
            }
        }
    }

    /// Final statistics pass plus the run record for persistence
    pub fn finish(&mut self) -> RunRecord {
        self.running = false;
        self.stats.update(wall_ms());
        let mut channels = Vec::new();
        for b in 0..self.cfg.boards.len() {
            for ch in self.cfg.boards[b].enabled_channels() {
                let c = self.stats.counters(b, ch);
                channels.push(ChannelRecord {
                    board: b,
                    channel: ch,
                    read: c.read_cnt,
                    filtered: c.filt_cnt,
                    processed: c.processed_cnt,
                    lost: c.lost_cnt,
                });
            }
        }
        let run = self.stats.run();
        RunRecord {
            name: self.cfg.name.clone(),
            timestamp: run.started_at,
            duration_ms: run.acq_real_time_ms,
            total_events: run.tot_read_cnt,
            unsynced_events: run.unsynced_cnt,
            channels,
        }
    }
}
