pub mod buf;
pub mod cfg;
pub mod stats;
pub mod sync;

/// Duration of one coarse timestamp tick in nanoseconds, fixed by the
/// digitizer hardware family.
pub const TICK_NS: u64 = 5;

/// Maximum number of boards in one acquisition chain
pub const MAX_BD: usize = 4;
/// Maximum number of channels per board
pub const MAX_CH: usize = 16;
/// Channels sharing one digitization group
pub const CH_PER_GROUP: usize = 2;
/// Number of channel groups per board
pub const MAX_GROUPS: usize = MAX_CH / CH_PER_GROUP;

/// Group index a channel belongs to
pub const fn group_of(channel: usize) -> usize {
    channel / CH_PER_GROUP
}

/// One channel group's share of a decoded event
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct GroupHit {
    /// Group carried data in this event
    pub present: bool,
    /// Coarse timestamp in tick units from arbitrary offset
    pub tdc: u64,
    /// Sub-tick interpolated offset; zero until the waveform stage fills it in
    pub fine: u16,
}

/// One decoded event record belonging to exactly one board. The record is
/// owned by the queue slot it occupies; consumers only borrow a view while
/// it is the oldest unconsumed element of its board's queue.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Event {
    /// Board (0-indexed) the event was read from
    pub board: u8,
    pub groups: [GroupHit; MAX_GROUPS],
    /// Size of the raw block the event was decoded from, in bytes
    pub size: u32,
}

impl Event {
    /// Coarse timestamp of a group in tick units
    pub fn tdc(&self, group: usize) -> u64 {
        self.groups[group].tdc
    }

    /// Coarse timestamp of a group converted to nanoseconds
    pub fn tdc_ns(&self, group: usize) -> u64 {
        self.groups[group].tdc * TICK_NS
    }
}
