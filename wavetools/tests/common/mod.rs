use wavetools::cfg::{AcqConfig, BoardConfig};
use wavetools::stats::AveragingMode;
use wavetools::sync::EventSink;
use wavetools::{Event, GroupHit, MAX_GROUPS};

/// Event with the same coarse timestamp on every group and a nonzero
/// fine timestamp
#[allow(dead_code)]
pub fn event(board: usize, tdc: u64) -> Event {
    let mut ev = Event {
        board: board as u8,
        size: 64,
        ..Default::default()
    };
    for g in 0..MAX_GROUPS {
        ev.groups[g] = GroupHit {
            present: true,
            tdc,
            fine: 1,
        };
    }
    ev
}

/// `n` boards with only channel 0 enabled, synchronization on, defaults
/// elsewhere
#[allow(dead_code)]
pub fn config(n: usize, mode: AveragingMode) -> AcqConfig {
    AcqConfig {
        boards: vec![
            BoardConfig {
                enabled: 0b1,
                ref_channel: 0,
            };
            n
        ],
        sync_enabled: true,
        averaging: mode,
        ..AcqConfig::default()
    }
}

/// Records every downstream call and answers with a fixed accept verdict
#[allow(dead_code)]
pub struct RecordingSink {
    /// (board, channel, event tdc, tof reference tdc)
    pub calls: Vec<(usize, usize, u64, Option<u64>)>,
    pub accept: bool,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn accepting() -> Self {
        RecordingSink {
            calls: Vec::new(),
            accept: true,
        }
    }
}

impl EventSink for RecordingSink {
    fn process(
        &mut self,
        board: usize,
        channel: usize,
        event: &Event,
        tof_ref: Option<&Event>,
    ) -> bool {
        self.calls
            .push((board, channel, event.tdc(0), tof_ref.map(|e| e.tdc(0))));
        self.accept
    }
}
