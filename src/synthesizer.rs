use crate::backpressure::BackpressurePolicy;
use crate::config::{AddressSpace, Configuration};
use crate::errors::ConfigError;
use crate::stats::Stats;
use crate::structs::*;

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TryRecvError, TrySendError};
use rand_core::*;
use rand_distr::{Distribution, Normal, Uniform};
use rand_pcg::Pcg32;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of random values, in milliseconds. Closures can be used as deterministic samplers.
pub trait Sampler: std::marker::Send + 'static {
    fn sample(&mut self) -> f64;
}

impl<F: FnMut() -> f64 + std::marker::Send + 'static> Sampler for F {
    fn sample(&mut self) -> f64 {
        self()
    }
}

/// Sample a normal distribution
pub struct NormalSampler {
    distrib: Normal<f64>,
    rng: Pcg32,
}

impl NormalSampler {
    pub fn new(
        name: &'static str,
        mean: f64,
        std_dev: f64,
        rng: Pcg32,
    ) -> Result<Self, ConfigError> {
        let distrib = Normal::new(mean, std_dev).map_err(|e| ConfigError::Distribution {
            name,
            reason: format!("{e}"),
        })?;
        Ok(NormalSampler { distrib, rng })
    }
}

impl Sampler for NormalSampler {
    fn sample(&mut self) -> f64 {
        self.distrib.sample(&mut self.rng)
    }
}

/// The three timing models of a synthesizer
pub struct Samplers {
    /// flow duration
    pub duration: Box<dyn Sampler>,
    /// delay between a request and its response
    pub latency: Box<dyn Sampler>,
    /// offset of the end of the flow from the tick
    pub jitter: Box<dyn Sampler>,
}

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    pub tick_interval: Duration,
    /// flow pairs per tick
    pub flows_per_tick: u64,
    pub src_space: AddressSpace,
    pub dst_space: AddressSpace,
    pub backpressure: BackpressurePolicy,
}

/// Draw addresses uniformly in an address space
#[derive(Debug, Clone)]
struct AddressSampler {
    network: [u8; 4],
    octets: [Uniform<u8>; 4],
}

impl AddressSampler {
    fn new(space: &AddressSpace) -> Self {
        let mask = space.mask.octets();
        AddressSampler {
            network: space.network.octets(),
            octets: mask.map(|m| Uniform::new_inclusive(0, 255 - m)),
        }
    }

    fn sample(&self, rng: &mut Pcg32) -> Ipv4Addr {
        let mut octets = self.network;
        for (o, distrib) in octets.iter_mut().zip(self.octets.iter()) {
            *o = o.wrapping_add(distrib.sample(rng));
        }
        Ipv4Addr::from(octets)
    }
}

/// What happened during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// All the records of the tick have been enqueued
    Enqueued(u64),
    /// The channel could not receive the tick
    Skipped,
    /// The synthesizer has been stopped (or the workers are gone) while waiting for the channel
    Interrupted(u64),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SynthesizerReport {
    pub id: usize,
    pub ticks: u64,
    pub skipped_ticks: u64,
    /// created records, two per flow pair
    pub records_created: u64,
    pub records_enqueued: u64,
}

/// Creates flow pairs at every tick and sends them to the export workers
pub struct FlowSynthesizer {
    config: SynthesizerConfig,
    samplers: Samplers,
    rng: Pcg32,
    src_addr: AddressSampler,
    dst_addr: AddressSampler,
    src_port: Uniform<u16>,
    dst_port: Uniform<u16>,
    report: SynthesizerReport,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn stop_requested(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}

impl FlowSynthesizer {
    pub fn new(id: usize, config: SynthesizerConfig, samplers: Samplers, rng: Pcg32) -> Self {
        FlowSynthesizer {
            src_addr: AddressSampler::new(&config.src_space),
            dst_addr: AddressSampler::new(&config.dst_space),
            // ephemeral ports
            src_port: Uniform::new_inclusive(32768, 65535),
            dst_port: Uniform::new_inclusive(1, 2048),
            config,
            samplers,
            rng,
            report: SynthesizerReport {
                id,
                ..Default::default()
            },
        }
    }

    /// Build the synthesizer number `id` of a configuration, with normal timing models
    pub fn from_configuration(id: usize, config: &Configuration) -> Result<Self, ConfigError> {
        let tick_interval = config.get_tick_interval()?;
        let mut rng = match config.seed {
            Some(s) => Pcg32::seed_from_u64(s.wrapping_add(id as u64)),
            None => Pcg32::from_entropy(),
        };
        let samplers = Samplers {
            duration: Box::new(NormalSampler::new(
                "duration",
                config.duration.mean,
                config.duration.std_dev,
                Pcg32::seed_from_u64(rng.next_u64()),
            )?),
            latency: Box::new(NormalSampler::new(
                "latency",
                config.latency.mean,
                config.latency.std_dev,
                Pcg32::seed_from_u64(rng.next_u64()),
            )?),
            jitter: Box::new(NormalSampler::new(
                "jitter",
                0.,
                tick_interval.as_millis() as f64 / 3.,
                Pcg32::seed_from_u64(rng.next_u64()),
            )?),
        };
        let synth_config = SynthesizerConfig {
            tick_interval,
            flows_per_tick: config.get_flows_per_tick_per_simulator(),
            src_space: AddressSpace::parse(&config.src_network)?,
            dst_space: AddressSpace::parse(&config.dst_network)?,
            backpressure: config.backpressure,
        };
        Ok(FlowSynthesizer::new(id, synth_config, samplers, rng))
    }

    pub fn get_report(&self) -> &SynthesizerReport {
        &self.report
    }

    /// Create a request flow ending around now, and its response
    pub fn create_flow_pair(&mut self) -> FlowPair {
        let jitter = self.samplers.jitter.sample().round() as i64;
        let flow_end = now_ms().saturating_add_signed(jitter);
        // a flow lasts at least 1 ms
        let duration = self.samplers.duration.sample().round().max(1.) as u64;
        let flow_start = flow_end.saturating_sub(duration);

        let src_addr = self.src_addr.sample(&mut self.rng);
        let dst_addr = self.dst_addr.sample(&mut self.rng);
        let src_port = self.src_port.sample(&mut self.rng);
        let dst_port = self.dst_port.sample(&mut self.rng);

        // the response comes at least 1 ms after the request
        let latency_ms = self.samplers.latency.sample().round().max(1.) as u64;

        let request = FlowRecord {
            src_addr,
            dst_addr,
            src_port,
            dst_port,
            protocol: PROTO_TCP,
            flow_start_ms: flow_start,
            flow_end_ms: flow_end,
            octet_count: self.rng.next_u64(),
            packet_count: self.rng.next_u64(),
        };
        let response = FlowRecord {
            src_addr: dst_addr,
            dst_addr: src_addr,
            src_port: dst_port,
            dst_port: src_port,
            protocol: PROTO_TCP,
            flow_start_ms: flow_start + latency_ms,
            flow_end_ms: flow_end + latency_ms,
            octet_count: self.rng.next_u64(),
            packet_count: self.rng.next_u64(),
        };
        self.report.records_created += 2;
        FlowPair {
            request,
            response,
            latency_ms,
        }
    }

    /// Send one record. A send that would block can be interrupted by the stop signal.
    fn enqueue(&self, tx: &Sender<FlowRecord>, stop: &Receiver<()>, record: FlowRecord) -> bool {
        match tx.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => false,
            Err(TrySendError::Full(record)) => select! {
                send(tx, record) -> res => res.is_ok(),
                recv(stop) -> _ => false,
            },
        }
    }

    /// Handle one tick: check the channel, then create and enqueue the flow pairs of the tick
    pub fn run_tick(
        &mut self,
        tx: &Sender<FlowRecord>,
        stop: &Receiver<()>,
        stats: &Stats,
    ) -> TickOutcome {
        self.report.ticks += 1;
        stats.tick();
        let records = 2 * self.config.flows_per_tick as usize;
        if self.config.backpressure.should_skip_channel(tx, records) {
            log::warn!(
                "Simulator {}: skipping tick as channel cannot receive ({} records queued)",
                self.report.id,
                tx.len()
            );
            self.report.skipped_ticks += 1;
            stats.tick_skipped();
            return TickOutcome::Skipped;
        }

        let mut enqueued = 0;
        for _ in 0..self.config.flows_per_tick {
            let pair = self.create_flow_pair();
            stats.records_created(2);
            for record in pair.into_records() {
                if !self.enqueue(tx, stop, record) {
                    self.report.records_enqueued += enqueued;
                    stats.records_enqueued(enqueued);
                    return TickOutcome::Interrupted(enqueued);
                }
                enqueued += 1;
            }
        }
        self.report.records_enqueued += enqueued;
        stats.records_enqueued(enqueued);
        TickOutcome::Enqueued(enqueued)
    }

    /// Run until the stop signal (either a message or the disconnection of its sender)
    pub fn run(
        mut self,
        tx: Sender<FlowRecord>,
        stop: Receiver<()>,
        stats: Arc<Stats>,
    ) -> SynthesizerReport {
        log::trace!("Start simulator {}", self.report.id);
        let ticker = tick(self.config.tick_interval);
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(ticker) -> _ => {
                    if stop_requested(&stop) {
                        break;
                    }
                    if let TickOutcome::Interrupted(_) = self.run_tick(&tx, &stop, &stats) {
                        break;
                    }
                }
            }
        }
        log::trace!("Simulator {} stops", self.report.id);
        self.report
    }

    /// Run in a dedicated thread
    pub fn start(
        self,
        tx: Sender<FlowRecord>,
        stats: Arc<Stats>,
    ) -> std::io::Result<SynthesizerHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let builder = thread::Builder::new().name(format!("Simulator-{}", self.report.id));
        let thread = builder.spawn(move || self.run(tx, stop_rx, stats))?;
        Ok(SynthesizerHandle { stop_tx, thread })
    }
}

/// A running synthesizer
pub struct SynthesizerHandle {
    stop_tx: Sender<()>,
    thread: thread::JoinHandle<SynthesizerReport>,
}

impl SynthesizerHandle {
    /// Stop the timer and wait for the thread. No record is sent once this returns.
    pub fn stop(self) -> SynthesizerReport {
        drop(self.stop_tx);
        match self.thread.join() {
            Ok(report) => report,
            Err(e) => std::panic::resume_unwind(e),
        }
    }
}
