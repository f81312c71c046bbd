//! Configuration and run-record formats
//!
//! An acquisition is declared in a text file ([TOML](https://toml.io) for
//! concreteness) deserialized into [`AcqConfig`]. Board and channel
//! topology is fixed for the duration of a run, so indices are validated
//! once at this boundary and trusted everywhere else. At end of run a
//! [`RunRecord`] with the final counters is serialized back out.

use chrono::{offset::Local, DateTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::buf::EVT_BUF_SIZE;
use crate::stats::AveragingMode;
use crate::sync::SYNC_WINDOW_NS;
use crate::{MAX_BD, MAX_CH};

#[derive(Clone, Copy, Eq, PartialEq, Debug, Error)]
pub enum ConfigError {
    #[error("an acquisition needs between 1 and {MAX_BD} boards, got {0}")]
    BadBoardCount(usize),
    #[error("board {0}: channel {1} out of range")]
    BadChannel(usize, usize),
    #[error("board {0} has no enabled channels")]
    NoEnabledChannels(usize),
    #[error("TOF start board {0} out of range")]
    BadTofBoard(usize),
    #[error("queue capacity {0} too small")]
    BadCapacity(usize),
}

/// Settings for one digitizer board
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug)]
pub struct BoardConfig {
    /// Bit mask of enabled channels
    pub enabled: u16,
    /// Channel whose coarse timestamp represents the board during
    /// cross-board synchronization
    pub ref_channel: usize,
}

impl BoardConfig {
    pub fn channel_enabled(&self, channel: usize) -> bool {
        channel < MAX_CH && self.enabled & (1 << channel) != 0
    }

    pub fn enabled_channels(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_CH).filter(move |&ch| self.enabled & (1 << ch) != 0)
    }

    fn first_enabled(&self) -> Option<usize> {
        self.enabled_channels().next()
    }
}

/// Acquisition settings consumed by the core. Parsing the on-disk format
/// is the front end's job; the core only validates and uses it.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct AcqConfig {
    pub name: String,
    /// One entry per active board
    pub boards: Vec<BoardConfig>,
    /// Match events across boards; when false each board drains
    /// independently
    pub sync_enabled: bool,
    /// Width of the synchronization window in nanoseconds, inclusive
    pub sync_window_ns: u64,
    /// Slots in each board's event queue (one is always wasted)
    pub queue_capacity: usize,
    /// Board holding the time-of-flight start event each round
    pub tof_start_board: usize,
    pub tof_start_channel: usize,
    /// How often to recompute statistics
    #[serde(with = "humantime_serde")]
    pub stats_cadence: Duration,
    pub averaging: AveragingMode,
    /// Stop acquisition after this long, if set
    #[serde(default, with = "humantime_serde::option")]
    pub run_limit: Option<Duration>,
}

impl Default for AcqConfig {
    fn default() -> Self {
        AcqConfig {
            name: String::new(),
            boards: vec![BoardConfig {
                enabled: 0xFFFF,
                ref_channel: 0,
            }],
            sync_enabled: false,
            sync_window_ns: SYNC_WINDOW_NS,
            queue_capacity: EVT_BUF_SIZE,
            tof_start_board: 0,
            tof_start_channel: 0,
            stats_cadence: Duration::from_secs(1),
            averaging: AveragingMode::Instantaneous,
            run_limit: None,
        }
    }
}

impl AcqConfig {
    /// Check indices and reference channels, repairing what the original
    /// front end repairs: a disabled reference or TOF start channel falls
    /// back to the board's first enabled channel, with a warning.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.boards.is_empty() || self.boards.len() > MAX_BD {
            return Err(ConfigError::BadBoardCount(self.boards.len()));
        }
        if self.queue_capacity < 2 {
            return Err(ConfigError::BadCapacity(self.queue_capacity));
        }
        for (b, board) in self.boards.iter_mut().enumerate() {
            if board.ref_channel >= MAX_CH {
                return Err(ConfigError::BadChannel(b, board.ref_channel));
            }
            if !board.channel_enabled(board.ref_channel) {
                let fallback = board
                    .first_enabled()
                    .ok_or(ConfigError::NoEnabledChannels(b))?;
                warn!(
                    board = b,
                    channel = board.ref_channel,
                    fallback, "reference channel disabled, using first enabled channel"
                );
                board.ref_channel = fallback;
            }
        }
        if self.tof_start_board >= self.boards.len() {
            return Err(ConfigError::BadTofBoard(self.tof_start_board));
        }
        let tof = &self.boards[self.tof_start_board];
        if self.tof_start_channel >= MAX_CH {
            return Err(ConfigError::BadChannel(
                self.tof_start_board,
                self.tof_start_channel,
            ));
        }
        if !tof.channel_enabled(self.tof_start_channel) {
            let fallback = tof
                .first_enabled()
                .ok_or(ConfigError::NoEnabledChannels(self.tof_start_board))?;
            warn!(
                board = self.tof_start_board,
                channel = self.tof_start_channel,
                fallback, "TOF start channel disabled, using first enabled channel"
            );
            self.tof_start_channel = fallback;
        }
        Ok(())
    }
}

/// Final per-channel counters recorded at end of run
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Debug)]
pub struct ChannelRecord {
    pub board: usize,
    pub channel: usize,
    pub read: u64,
    pub filtered: u64,
    pub processed: u64,
    pub lost: Option<u64>,
}

/// A completed run, serialized next to the data it produced
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct RunRecord {
    pub name: String,
    pub timestamp: Option<DateTime<Local>>,
    /// Elapsed acquisition time in ms
    pub duration_ms: f64,
    pub total_events: u64,
    pub unsynced_events: u64,
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelRecord>,
}
