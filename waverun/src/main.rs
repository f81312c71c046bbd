use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{error, info};

use wavetools::cfg::{AcqConfig, BoardConfig};
use waverun::session::AcquisitionSession;
use waverun::sink::FineTimeSink;
use waverun::source::SimSource;
use waverun::{timer, CliArgs, Event};

fn main() -> Result<()> {
    let args: CliArgs = argh::from_env();

    if args.version {
        println!(
            concat!(env!("CARGO_BIN_NAME"), " {}"),
            env!("CARGO_PKG_VERSION"),
        );
        return Ok(());
    }

    tracing_subscriber::fmt::init();

    let mut cfg = match &args.config {
        Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
        None => AcqConfig {
            name: String::from("simulated"),
            boards: vec![
                BoardConfig {
                    enabled: 0xFFFF,
                    ref_channel: 0,
                };
                args.boards
            ],
            sync_enabled: args.boards > 1,
            run_limit: Some(Duration::from_secs(10)),
            ..AcqConfig::default()
        },
    };
    if let Some(secs) = args.duration {
        cfg.run_limit = Some(Duration::from_secs(secs));
    }

    let mut session = AcquisitionSession::new(cfg)?;
    let mut source = SimSource::new(session.cfg().boards.len(), 0xD743);
    let mut sink = FineTimeSink::default();

    let (tx, rx) = flume::bounded(1);
    timer::main(Duration::from_millis(args.tick_rate), tx)?;

    let started = Instant::now();
    let mut last_report = Instant::now();
    session.start_run();
    while let Ok(Event::Tick) = rx.recv() {
        // a failed poll ends the run; the record below still covers
        // everything acquired up to this point
        if let Err(e) = session.tick(&mut source, &mut sink) {
            error!(error = %e, "readout failed, stopping the run");
            break;
        }
        if last_report.elapsed() >= session.cfg().stats_cadence {
            report(&session);
            last_report = Instant::now();
        }
        if let Some(limit) = session.cfg().run_limit {
            if started.elapsed() >= limit {
                break;
            }
        }
    }

    let record = session.finish();
    info!(
        accepted = sink.accepted,
        rejected = sink.rejected,
        "acquisition stopped"
    );
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Log each board's occupancy and reference-channel rates
fn report(session: &AcquisitionSession) {
    let stats = session.stats();
    for b in 0..stats.num_boards() {
        let ch = session.cfg().boards[b].ref_channel;
        let r = stats.rates(b, ch);
        info!(
            board = b,
            occupancy = format_args!("{:.1}%", session.occupancy(b)),
            read = format_args!("{:.1}/s", r.read),
            filtered = format_args!("{:.1}/s", r.filtered),
            dead_time = format_args!("{:.3}", r.dead_time),
            matching = format_args!("{:.3}", r.matching_ratio),
            "board rates"
        );
    }
    let run = stats.run();
    info!(
        throughput = format_args!("{:.1} KiB/s", run.rx_rate_kib),
        events = run.tot_read_cnt,
        unsynced = run.unsynced_cnt,
        "run totals"
    );
}
