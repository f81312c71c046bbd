pub mod session;
pub mod sink;
pub mod source;
pub mod timer;

use argh::FromArgs;
#[derive(Debug, FromArgs, Clone)]
/// Acquisition front end for multi-board digitizers: buffers events per
/// board, synchronizes them across boards and reports live rates
pub struct CliArgs {
    /// print version information
    #[argh(switch, short = 'v')]
    pub version: bool,
    /// path to a TOML acquisition config
    #[argh(option, short = 'c')]
    pub config: Option<String>,
    /// hardware poll period in milliseconds
    #[argh(option, default = "10")]
    pub tick_rate: u64,
    /// number of simulated boards when no config is given
    #[argh(option, default = "2")]
    pub boards: usize,
    /// stop after this many seconds, overriding the config's run limit
    #[argh(option, short = 'd')]
    pub duration: Option<u64>,
}

pub enum Event {
    Tick,
}
