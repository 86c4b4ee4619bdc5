use flowgen::backpressure::BackpressurePolicy;
use flowgen::config::Configuration;
use flowgen::exporter::IpfixExporter;
use flowgen::pipeline::{Pipeline, PipelineReport};
use flowgen::stats::{self, Stats};
mod cmd;

use std::error::Error;
use std::fs;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = cmd::Args::parse();

    if let Err(e) = run_command(args.command) {
        log::error!("{e}");
        process::exit(1);
    }
}

fn run_command(command: cmd::Command) -> Result<(), Box<dyn Error>> {
    match command {
        cmd::Command::Run {
            config,
            collector,
            flows_per_second,
            ticks_per_second,
            simulators,
            workers,
            buffer_size,
            max_message_size,
            seed,
            src_network,
            dst_network,
            fill_ratio,
            duration,
            report,
        } => {
            let mut config = match config {
                Some(path) => Configuration::from_file(path)?,
                None => Configuration::default(),
            };
            // the command line overrides the configuration file
            if let Some(c) = collector {
                config.collector = c.parse()?;
            }
            if let Some(f) = flows_per_second {
                config.flows_per_second = f;
            }
            if let Some(t) = ticks_per_second {
                config.ticks_per_second = t;
            }
            if let Some(s) = simulators {
                config.simulators = s;
            }
            if let Some(w) = workers {
                config.workers = w;
            }
            if let Some(b) = buffer_size {
                config.buffer_size = b;
            }
            if let Some(m) = max_message_size {
                config.max_message_size = m;
            }
            if seed.is_some() {
                config.seed = seed;
            }
            if let Some(n) = src_network {
                config.src_network = n;
            }
            if let Some(n) = dst_network {
                config.dst_network = n;
            }
            if let Some(threshold) = fill_ratio {
                config.backpressure = BackpressurePolicy::FillRatio { threshold };
            }
            let duration = duration
                .map(|d| humantime::parse_duration(&d))
                .transpose()?;
            run(config, duration, report)
        }
    }
}

fn run(
    config: Configuration,
    duration: Option<Duration>,
    report_path: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let stats = Arc::new(Stats::default());

    // Handle ctrl+C
    let stats_ctrlc = Arc::clone(&stats);
    ctrlc::set_handler(move || {
        if !stats_ctrlc.should_stop() {
            log::warn!("Ending the generation, please wait a few seconds");
            stats_ctrlc.stop_early();
        } else {
            log::warn!("Ending immediately");
            process::exit(1);
        }
    })?;

    if let Some(s) = config.seed {
        log::info!("Generating with seed {s}");
    }
    let pipeline = Pipeline::start(
        &config,
        |_| IpfixExporter::connect(config.collector, config.get_ipfix_options()),
        Arc::clone(&stats),
    )?;
    let flows_per_tick = config.get_flows_per_tick_per_simulator();
    log::info!(
        "Sending to {}: {} ticks/s, {} flows per tick and per simulator, {} simulators ({} flows/s)",
        config.collector,
        config.ticks_per_second,
        flows_per_tick,
        config.simulators,
        flows_per_tick * config.ticks_per_second * config.simulators as u64
    );
    if let Some(d) = duration {
        log::info!("Generating for {}", humantime::format_duration(d));
    }

    let monitoring = {
        let stats = Arc::clone(&stats);
        let builder = thread::Builder::new().name("Monitoring".into());
        builder.spawn(move || stats::show_progression(stats))?
    };

    let deadline = duration.map(|d| Instant::now() + d);
    while !stats.should_stop() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            log::info!("Generation duration reached");
            stats.stop_early();
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    let report = pipeline.stop();
    if monitoring.join().is_err() {
        log::warn!("Monitoring thread panicked");
    }
    log_report(&report);
    if let Some(path) = report_path {
        fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        log::info!("Report written to {path}");
    }
    Ok(())
}

fn log_report(report: &PipelineReport) {
    let t = &report.totals;
    log::info!(
        "{} records sent in {} messages ({} bytes) in {:.1}s",
        t.records_sent,
        t.messages_sent,
        t.bytes_sent,
        report.elapsed_secs
    );
    log::info!(
        "{} records created, {} enqueued, {}/{} ticks skipped",
        t.records_created,
        t.records_enqueued,
        t.skipped_ticks,
        t.ticks
    );
    if t.failed_flushes > 0 {
        log::warn!(
            "{} messages failed, {} records dropped",
            t.failed_flushes,
            t.records_dropped
        );
    }
}
