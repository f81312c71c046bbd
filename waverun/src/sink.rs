//! Downstream boundary: stands in for the waveform-processing, writer
//! and histogram stages

use wavetools::group_of;
use wavetools::sync::EventSink;
use wavetools::Event;

/// Accepts events whose fine timestamp was filled in by the waveform
/// stage, mirroring the front end's software filter. Keeps tallies for
/// end-of-run reporting.
#[derive(Default)]
pub struct FineTimeSink {
    pub accepted: u64,
    pub rejected: u64,
}

impl EventSink for FineTimeSink {
    fn process(
        &mut self,
        _board: usize,
        channel: usize,
        event: &Event,
        _tof_ref: Option<&Event>,
    ) -> bool {
        let ok = event.groups[group_of(channel)].fine != 0;
        if ok {
            self.accepted += 1;
        } else {
            self.rejected += 1;
        }
        ok
    }
}
