//! The readout boundary: where decoded events enter the core

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use wavetools::sync::SYNC_WINDOW_NS;
use wavetools::{Event, GroupHit, MAX_GROUPS, TICK_NS};

/// One poll's worth of decoded events for a single board
pub struct BoardBlock {
    pub board: usize,
    /// Raw bytes transferred, for throughput accounting
    pub bytes: u64,
    pub events: Vec<Event>,
}

/// Abstraction over the vendor readout: each poll returns the events
/// decoded since the last one, per board. Zero new events is a normal
/// outcome, not an error.
pub trait ReadoutSource {
    fn poll(&mut self) -> Result<Vec<BoardBlock>>;
}

/// Hardware-free source generating physical events observed by every
/// board with jitter inside the synchronization window, with an
/// occasional board missing its share. Lets the whole pipeline run
/// without a digitizer on the bench.
pub struct SimSource {
    boards: usize,
    rng: StdRng,
    next_tdc: u64,
    /// Probability a board misses a physical event entirely
    miss_prob: f64,
    events_per_poll: usize,
}

impl SimSource {
    pub fn new(boards: usize, seed: u64) -> Self {
        SimSource {
            boards,
            rng: StdRng::seed_from_u64(seed),
            next_tdc: 1,
            miss_prob: 0.02,
            events_per_poll: 16,
        }
    }
}

impl ReadoutSource for SimSource {
    fn poll(&mut self) -> Result<Vec<BoardBlock>> {
        let mut blocks: Vec<BoardBlock> = (0..self.boards)
            .map(|board| BoardBlock {
                board,
                bytes: 0,
                events: Vec::new(),
            })
            .collect();
        for _ in 0..self.events_per_poll {
            // 10 us to 1 ms between physical events
            self.next_tdc += self.rng.gen_range(2_000..200_000);
            for b in 0..self.boards {
                if self.boards > 1 && self.rng.gen_bool(self.miss_prob) {
                    continue;
                }
                let jitter = self.rng.gen_range(0..=SYNC_WINDOW_NS / TICK_NS);
                let mut ev = Event {
                    board: b as u8,
                    size: 4096,
                    ..Default::default()
                };
                for g in 0..MAX_GROUPS {
                    ev.groups[g] = GroupHit {
                        present: true,
                        tdc: self.next_tdc + jitter,
                        fine: self.rng.gen_range(1..=1024),
                    };
                }
                blocks[b].bytes += ev.size as u64;
                blocks[b].events.push(ev);
            }
        }
        Ok(blocks)
    }
}
