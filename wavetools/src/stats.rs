//! Rates, dead time, busy time and matching ratio derived from raw
//! counters and timestamps.
//!
//! Two time domains are in play and never mixed implicitly: wall-clock
//! times are milliseconds, device times (derived from coarse timestamps)
//! are nanoseconds. Every counter keeps a previous-update snapshot so
//! rates can be computed either over the whole run (integrated) or over
//! the interval since the last update (instantaneous).

use chrono::{offset::Local, DateTime};
use serde::{Deserialize, Serialize};

use crate::cfg::AcqConfig;
use crate::{MAX_CH, TICK_NS};

/// If the input-trigger counter has not refreshed for this long while
/// events are still being read, assume it simply is not updating and
/// report the input rate as equal to the read rate.
pub const ICR_GRACE_MS: u64 = 5_000;

/// How a rate is averaged: over the whole run, or over the interval
/// since the previous statistics update.
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug)]
pub enum AveragingMode {
    Integrated,
    Instantaneous,
}

/// Where the elapsed real time came from. Device timestamps are
/// preferred since they are unaffected by host scheduling jitter.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RealTimeSource {
    FromBoards,
    FromComputer,
}

/// A rate in events/s, or a marker that the hardware cannot provide the
/// underlying counter. Kept as a tagged value so "not available" can
/// never be mistaken for a real rate of zero, including across
/// serialization.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum Rate {
    Available(f64),
    Unavailable,
}

impl Rate {
    pub fn value(self) -> Option<f64> {
        match self {
            Rate::Available(v) => Some(v),
            Rate::Unavailable => None,
        }
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::Available(0.0)
    }
}

/// Cumulative counters and timestamps for one (board, channel). Each
/// counter pairs with a previous-update snapshot (`*_pcnt`, `prev_*`)
/// used for delta computation.
#[derive(Clone, Copy, Debug)]
pub struct ChannelCounters {
    /// Events read out of the board for this channel
    pub read_cnt: u64,
    pub read_pcnt: u64,
    /// Reads since the previous update, recorded at snapshot time
    pub read_dcnt: u64,
    /// Events dequeued from the software queue (trails `read_cnt` by the
    /// queue occupancy)
    pub processed_cnt: u64,
    pub processed_pcnt: u64,
    /// Events that passed the downstream software filters
    pub filt_cnt: u64,
    pub filt_pcnt: u64,
    /// Triggers seen by the input discriminator; `None` when the board
    /// does not provide the counter
    pub input_cnt: Option<u64>,
    pub input_pcnt: u64,
    /// Triggers lost in hardware or to queue overflow; `None` when the
    /// raw counter is unavailable
    pub lost_cnt: Option<u64>,
    pub lost_pcnt: u64,
    /// Newest device timestamp at queue input, ns
    pub latest_read_ts: u64,
    pub prev_read_ts: u64,
    /// Newest device timestamp at queue output, ns
    pub latest_proc_ts: u64,
    pub prev_proc_ts: u64,
    /// Device timestamp of the last input-counter refresh, ns
    pub icr_update_ts: u64,
    pub prev_icr_update_ts: u64,
    /// Device timestamp of the last lost-trigger refresh, ns
    pub lost_update_ts: u64,
    pub prev_lost_update_ts: u64,
    /// Accumulated busy gaps (board unable to accept triggers), ns;
    /// zeroed after every statistics update
    pub busy_gap_ns: u64,
}

impl Default for ChannelCounters {
    fn default() -> Self {
        ChannelCounters {
            read_cnt: 0,
            read_pcnt: 0,
            read_dcnt: 0,
            processed_cnt: 0,
            processed_pcnt: 0,
            filt_cnt: 0,
            filt_pcnt: 0,
            input_cnt: Some(0),
            input_pcnt: 0,
            lost_cnt: Some(0),
            lost_pcnt: 0,
            latest_read_ts: 0,
            prev_read_ts: 0,
            latest_proc_ts: 0,
            prev_proc_ts: 0,
            icr_update_ts: 0,
            prev_icr_update_ts: 0,
            lost_update_ts: 0,
            prev_lost_update_ts: 0,
            busy_gap_ns: 0,
        }
    }
}

/// Derived per-channel figures, refreshed by [`StatisticsEngine::update`]
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug, Default)]
pub struct ChannelRates {
    /// Events/s read out of the board
    pub read: f64,
    /// Events/s surviving the downstream filters
    pub filtered: f64,
    /// Output rate; currently the filtered rate clamped non-negative
    pub output: f64,
    /// Triggers/s at the input discriminator
    pub input: Rate,
    /// Triggers/s lost before readout
    pub lost: Rate,
    /// Fraction of input triggers not recorded, 0 to 1
    pub dead_time: f64,
    /// Fraction of time the board could not accept triggers, 0 to 1
    pub busy_time: f64,
    /// Fraction of dequeued events that passed the filters over the last
    /// update interval
    pub matching_ratio: f64,
}

/// Run-scoped aggregate state
#[derive(Clone, Debug)]
pub struct RunStatistics {
    /// Wall-clock time at run start, ms
    pub start_time_ms: u64,
    /// Wall-clock time of the previous statistics update, ms
    pub last_update_ms: u64,
    /// Elapsed acquisition time, ms
    pub acq_real_time_ms: f64,
    /// Elapsed time at the newest processed event, ms
    pub acq_stop_time_ms: f64,
    pub real_time_source: RealTimeSource,
    pub started_at: Option<DateTime<Local>>,
    /// Bytes received from the boards
    pub rx_byte_cnt: u64,
    pub rx_byte_pcnt: u64,
    /// Data throughput in KiB/s
    pub rx_rate_kib: f64,
    /// Block transfers since the previous update
    pub block_read_cnt: u64,
    /// Total events read from all boards
    pub tot_read_cnt: u64,
    /// Events dropped because no cross-board counterpart was found
    pub unsynced_cnt: u64,
    /// Newest processed-event device timestamp across all boards, ns
    pub latest_proc_ts_all: u64,
    pub prev_proc_ts_all: u64,
}

impl Default for RunStatistics {
    fn default() -> Self {
        RunStatistics {
            start_time_ms: 0,
            last_update_ms: 0,
            acq_real_time_ms: 0.0,
            acq_stop_time_ms: 0.0,
            real_time_source: RealTimeSource::FromComputer,
            started_at: None,
            rx_byte_cnt: 0,
            rx_byte_pcnt: 0,
            rx_rate_kib: 0.0,
            block_read_cnt: 0,
            tot_read_cnt: 0,
            unsynced_cnt: 0,
            latest_proc_ts_all: 0,
            prev_proc_ts_all: 0,
        }
    }
}

/// Converts the cumulative counters fed by the readout and synchronizer
/// into operational rates, on an externally driven cadence.
pub struct StatisticsEngine {
    mode: AveragingMode,
    enabled: Vec<u16>,
    run: RunStatistics,
    counters: Vec<[ChannelCounters; MAX_CH]>,
    rates: Vec<[ChannelRates; MAX_CH]>,
}

impl StatisticsEngine {
    pub fn new(cfg: &AcqConfig) -> Self {
        let n = cfg.boards.len();
        StatisticsEngine {
            mode: cfg.averaging,
            enabled: cfg.boards.iter().map(|b| b.enabled).collect(),
            run: RunStatistics::default(),
            counters: vec![[ChannelCounters::default(); MAX_CH]; n],
            rates: vec![[ChannelRates::default(); MAX_CH]; n],
        }
    }

    pub fn mode(&self) -> AveragingMode {
        self.mode
    }

    pub fn num_boards(&self) -> usize {
        self.enabled.len()
    }

    pub fn channel_enabled(&self, board: usize, channel: usize) -> bool {
        self.enabled[board] & (1 << channel) != 0
    }

    pub fn run(&self) -> &RunStatistics {
        &self.run
    }

    pub fn counters(&self, board: usize, channel: usize) -> &ChannelCounters {
        &self.counters[board][channel]
    }

    pub fn rates(&self, board: usize, channel: usize) -> &ChannelRates {
        &self.rates[board][channel]
    }

    /// Zero all counters, rates and run state and stamp a new start time.
    /// Board topology and averaging mode survive the reset.
    pub fn reset(&mut self, now_ms: u64) {
        for board in self.counters.iter_mut() {
            *board = [ChannelCounters::default(); MAX_CH];
        }
        for board in self.rates.iter_mut() {
            *board = [ChannelRates::default(); MAX_CH];
        }
        self.run = RunStatistics {
            start_time_ms: now_ms,
            last_update_ms: now_ms,
            started_at: Some(Local::now()),
            ..RunStatistics::default()
        };
    }

    /// One raw block transferred from a board
    pub fn note_block_read(&mut self, bytes: u64) {
        self.run.rx_byte_cnt += bytes;
        self.run.block_read_cnt += 1;
    }

    /// `n` events read from a board, all channels together
    pub fn note_events_total(&mut self, n: u64) {
        self.run.tot_read_cnt += n;
    }

    /// `n` events read for a channel, newest at coarse timestamp `tdc`
    pub fn note_events_read(&mut self, board: usize, channel: usize, n: u64, tdc: u64) {
        let c = &mut self.counters[board][channel];
        c.read_cnt += n;
        c.latest_read_ts = tdc * TICK_NS;
    }

    /// Track the newest timestamp seen anywhere, used as the best
    /// available notion of elapsed real time
    pub fn note_proc_time(&mut self, board: usize, channel: usize, tdc: u64) {
        let t = tdc * TICK_NS;
        if t > self.run.latest_proc_ts_all {
            self.run.latest_proc_ts_all = t;
        }
        self.run.acq_stop_time_ms = self.run.latest_proc_ts_all as f64 / 1e6;
        self.counters[board][channel].latest_proc_ts = t;
    }

    /// `n` events dequeued from a board's queue for this channel
    pub fn note_processed(&mut self, board: usize, channel: usize, n: u64) {
        self.counters[board][channel].processed_cnt += n;
    }

    /// One event passed the downstream filters
    pub fn note_filtered(&mut self, board: usize, channel: usize) {
        self.counters[board][channel].filt_cnt += 1;
    }

    /// `n` events lost, in hardware or to queue overflow
    pub fn note_lost(&mut self, board: usize, channel: usize, n: u64) {
        let c = &mut self.counters[board][channel];
        c.lost_cnt = Some(c.lost_cnt.unwrap_or(0) + n);
    }

    /// Events dropped with no cross-board counterpart
    pub fn note_unsynced(&mut self, n: u64) {
        self.run.unsynced_cnt += n;
    }

    /// Refresh the input-trigger counter with its own update timestamp
    pub fn note_input_counter(&mut self, board: usize, channel: usize, count: u64, ts_ns: u64) {
        let c = &mut self.counters[board][channel];
        c.input_cnt = Some(count);
        c.icr_update_ts = ts_ns;
    }

    /// The board cannot provide an input-trigger counter for this channel
    pub fn mark_input_unavailable(&mut self, board: usize, channel: usize) {
        self.counters[board][channel].input_cnt = None;
    }

    /// Refresh the lost-trigger counter with its own update timestamp
    pub fn note_lost_counter(&mut self, board: usize, channel: usize, count: u64, ts_ns: u64) {
        let c = &mut self.counters[board][channel];
        c.lost_cnt = Some(count);
        c.lost_update_ts = ts_ns;
    }

    /// The board cannot provide a lost-trigger counter for this channel
    pub fn mark_lost_unavailable(&mut self, board: usize, channel: usize) {
        self.counters[board][channel].lost_cnt = None;
    }

    /// Accumulate a busy gap (board memory full, triggers refused)
    pub fn note_busy_gap(&mut self, board: usize, channel: usize, gap_ns: u64) {
        self.counters[board][channel].busy_gap_ns += gap_ns;
    }

    /// Recompute every derived figure from the current counters.
    ///
    /// `now_ms` is the wall clock in milliseconds. Rates whose elapsed-time
    /// denominator has not advanced keep their previous value rather than
    /// decaying to zero; snapshots advance unconditionally at the end so
    /// the next interval is well defined either way.
    pub fn update(&mut self, now_ms: u64) {
        let mode = self.mode;

        // Real time: prefer device timestamps over the host clock
        if self.run.latest_proc_ts_all > self.run.prev_proc_ts_all {
            self.run.acq_real_time_ms = self.run.latest_proc_ts_all as f64 / 1e6;
            self.run.real_time_source = RealTimeSource::FromBoards;
        } else {
            self.run.acq_real_time_ms = now_ms.saturating_sub(self.run.start_time_ms) as f64;
            self.run.real_time_source = RealTimeSource::FromComputer;
        }
        let real_ms = self.run.acq_real_time_ms;

        // Throughput, KiB/s
        match mode {
            AveragingMode::Integrated => {
                if real_ms > 0.0 {
                    self.run.rx_rate_kib = self.run.rx_byte_cnt as f64 / (real_ms * 1.024);
                }
            }
            AveragingMode::Instantaneous => {
                let dt_ms = now_ms.saturating_sub(self.run.last_update_ms);
                if dt_ms > 0 {
                    self.run.rx_rate_kib = (self.run.rx_byte_cnt - self.run.rx_byte_pcnt) as f64
                        / (dt_ms as f64 * 1.024);
                }
            }
        }
        self.run.rx_byte_pcnt = self.run.rx_byte_cnt;
        self.run.block_read_cnt = 0;
        self.run.last_update_ms = now_ms;

        for b in 0..self.enabled.len() {
            for ch in 0..MAX_CH {
                if self.enabled[b] & (1 << ch) == 0 {
                    continue;
                }
                let c = &mut self.counters[b][ch];
                let r = &mut self.rates[b][ch];

                // Read and filtered rates over device time
                match mode {
                    AveragingMode::Integrated => {
                        if c.latest_read_ts > 0 {
                            let elapsed = c.latest_read_ts as f64 / 1e9;
                            r.read = c.read_cnt as f64 / elapsed;
                            r.filtered = c.filt_cnt as f64 / elapsed;
                        }
                    }
                    AveragingMode::Instantaneous => {
                        if c.latest_read_ts > c.prev_read_ts {
                            let elapsed = (c.latest_read_ts - c.prev_read_ts) as f64 / 1e9;
                            r.read = (c.read_cnt - c.read_pcnt) as f64 / elapsed;
                            r.filtered = (c.filt_cnt - c.filt_pcnt) as f64 / elapsed;
                        }
                    }
                }

                r.output = r.filtered;
                // correct for cross-update races between the counters
                if r.filtered > r.read {
                    r.filtered = r.read;
                }
                if r.output < 0.0 {
                    r.output = 0.0;
                }

                // Input (discriminator) rate, with its own update timestamp
                match c.input_cnt {
                    None => r.input = Rate::Unavailable,
                    Some(cnt) => {
                        if r.read == 0.0 || c.icr_update_ts == 0 {
                            r.input = Rate::Available(0.0);
                        } else {
                            match mode {
                                AveragingMode::Integrated => {
                                    r.input = Rate::Available(
                                        cnt as f64 / (c.icr_update_ts as f64 / 1e9),
                                    );
                                    c.input_pcnt = cnt;
                                    c.prev_icr_update_ts = c.icr_update_ts;
                                }
                                AveragingMode::Instantaneous => {
                                    if c.icr_update_ts > c.prev_icr_update_ts {
                                        let elapsed = (c.icr_update_ts - c.prev_icr_update_ts)
                                            as f64
                                            / 1e9;
                                        // a wrapped or restarted hardware counter
                                        // reads below the snapshot; resync and keep
                                        // the previous rate
                                        if let Some(delta) = cnt.checked_sub(c.input_pcnt) {
                                            r.input = Rate::Available(delta as f64 / elapsed);
                                        }
                                        c.input_pcnt = cnt;
                                        c.prev_icr_update_ts = c.icr_update_ts;
                                    } else if (c.prev_icr_update_ts as f64 / 1e6)
                                        < real_ms - ICR_GRACE_MS as f64
                                    {
                                        // counter stopped refreshing; assume
                                        // it tracks the read rate
                                        r.input = Rate::Available(r.read);
                                    }
                                }
                            }
                        }
                        // The counter refreshes only every N triggers, so it
                        // can lag the read rate; force it up rather than
                        // imply negative dead time
                        if let Rate::Available(v) = r.input {
                            if v < r.read {
                                r.input = Rate::Available(r.read);
                            }
                        }
                    }
                }

                // Lost-trigger rate
                match c.lost_cnt {
                    None => r.lost = Rate::Unavailable,
                    Some(cnt) => {
                        match mode {
                            AveragingMode::Integrated => {
                                if c.lost_update_ts > 0 {
                                    r.lost = Rate::Available(
                                        cnt as f64 / (c.lost_update_ts as f64 / 1e9),
                                    );
                                    c.lost_pcnt = cnt;
                                    c.prev_lost_update_ts = c.lost_update_ts;
                                }
                            }
                            AveragingMode::Instantaneous => {
                                if c.lost_update_ts > c.prev_lost_update_ts {
                                    let elapsed =
                                        (c.lost_update_ts - c.prev_lost_update_ts) as f64 / 1e9;
                                    if let Some(delta) = cnt.checked_sub(c.lost_pcnt) {
                                        r.lost = Rate::Available(delta as f64 / elapsed);
                                    }
                                    c.lost_pcnt = cnt;
                                    c.prev_lost_update_ts = c.lost_update_ts;
                                }
                            }
                        }
                        if let (Rate::Available(l), Rate::Available(i)) = (r.lost, r.input) {
                            if l > i {
                                r.lost = Rate::Available(i);
                            }
                        }
                    }
                }

                // Dead time
                r.dead_time = match (r.input, r.lost) {
                    (Rate::Available(i), Rate::Available(l)) if i > 0.0 => {
                        (1.0 - (i - l) / i).clamp(0.0, 1.0)
                    }
                    _ => 0.0,
                };

                // Busy time: accumulated gaps minus one nominal trigger
                // period, over the device time covered by this interval
                r.busy_time = 0.0;
                if c.latest_read_ts > c.prev_read_ts {
                    let period_ns = match r.input {
                        Rate::Available(i) if i > 0.0 => 1e9 / i,
                        _ => 0.0,
                    };
                    r.busy_time = (c.busy_gap_ns as f64 - period_ns)
                        / (c.latest_read_ts - c.prev_read_ts) as f64;
                }
                r.busy_time = r.busy_time.clamp(0.0, 1.0);

                // Matching ratio over the interval
                r.matching_ratio = if c.processed_cnt > c.processed_pcnt {
                    (c.filt_cnt - c.filt_pcnt) as f64 / (c.processed_cnt - c.processed_pcnt) as f64
                } else {
                    0.0
                };

                // Snapshots advance unconditionally, even for rates left at
                // their previous value above
                c.read_dcnt = c.read_cnt - c.read_pcnt;
                c.read_pcnt = c.read_cnt;
                c.filt_pcnt = c.filt_cnt;
                c.processed_pcnt = c.processed_cnt;
                c.prev_read_ts = c.latest_read_ts;
                c.prev_proc_ts = c.latest_proc_ts;
                c.busy_gap_ns = 0;
            }
        }
        self.run.prev_proc_ts_all = self.run.latest_proc_ts_all;
    }
}
