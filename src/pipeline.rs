use crate::config::Configuration;
use crate::errors::{ExporterError, PipelineError};
use crate::exporter::ProtocolExporter;
use crate::stats::Stats;
use crate::structs::*;
use crate::synthesizer::{FlowSynthesizer, SynthesizerHandle, SynthesizerReport};
use crate::worker::{ExportWorker, WorkerReport};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Totals {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub records_created: u64,
    pub records_enqueued: u64,
    pub records_sent: u64,
    pub records_dropped: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub failed_flushes: u64,
}

/// The outcome of a generation, gathered once every thread has been joined
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub elapsed_secs: f64,
    pub totals: Totals,
    pub synthesizers: Vec<SynthesizerReport>,
    pub workers: Vec<WorkerReport>,
}

impl PipelineReport {
    fn new(
        elapsed_secs: f64,
        synthesizers: Vec<SynthesizerReport>,
        workers: Vec<WorkerReport>,
    ) -> Self {
        let mut totals = Totals::default();
        for s in synthesizers.iter() {
            totals.ticks += s.ticks;
            totals.skipped_ticks += s.skipped_ticks;
            totals.records_created += s.records_created;
            totals.records_enqueued += s.records_enqueued;
        }
        for w in workers.iter() {
            totals.records_sent += w.records_sent;
            totals.records_dropped += w.records_dropped;
            totals.messages_sent += w.messages_sent;
            totals.bytes_sent += w.bytes_sent;
            totals.failed_flushes += w.failed_flushes;
        }
        PipelineReport {
            elapsed_secs,
            totals,
            synthesizers,
            workers,
        }
    }
}

/// Flow synthesizers feeding export workers through a bounded channel.
///
/// Stopping consumes the pipeline, so the shutdown order cannot be broken: the synthesizers are
/// stopped and joined first, which drops every sender and closes the channel, then the workers
/// drain it, flush and close their sessions.
pub struct Pipeline {
    synthesizers: Vec<SynthesizerHandle>,
    workers: Vec<JoinHandle<WorkerReport>>,
    stats: Arc<Stats>,
    start_time: Instant,
}

impl Pipeline {
    /// Validate the configuration, open one exporter session per worker and start every thread.
    /// Nothing runs if any configuration or session error occurs.
    pub fn start<E, F>(
        config: &Configuration,
        mut new_exporter: F,
        stats: Arc<Stats>,
    ) -> Result<Pipeline, PipelineError>
    where
        E: ProtocolExporter,
        F: FnMut(usize) -> Result<E, ExporterError>,
    {
        config.validate()?;
        let synthesizers = (0..config.simulators)
            .map(|id| FlowSynthesizer::from_configuration(id, config))
            .collect::<Result<Vec<_>, _>>()?;
        let workers = (0..config.workers)
            .map(|id| {
                new_exporter(id)
                    .and_then(|exporter| {
                        ExportWorker::new(id, exporter, config.max_message_size, Arc::clone(&stats))
                    })
                    .map_err(|source| PipelineError::Exporter { worker: id, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, rx) = bounded::<FlowRecord>(config.buffer_size);
        let mut pipeline = Pipeline {
            synthesizers: Vec::with_capacity(synthesizers.len()),
            workers: Vec::with_capacity(workers.len()),
            stats,
            start_time: Instant::now(),
        };
        if let Err(e) = pipeline.spawn(synthesizers, workers, tx, rx) {
            pipeline.stop();
            return Err(PipelineError::Spawn(e));
        }
        log::debug!(
            "Pipeline started: {} simulators, {} workers, channel capacity {}",
            pipeline.synthesizers.len(),
            pipeline.workers.len(),
            config.buffer_size
        );
        Ok(pipeline)
    }

    // The channel ends passed here are dropped on return, so only the threads hold it
    fn spawn<E: ProtocolExporter>(
        &mut self,
        synthesizers: Vec<FlowSynthesizer>,
        workers: Vec<ExportWorker<E>>,
        tx: Sender<FlowRecord>,
        rx: Receiver<FlowRecord>,
    ) -> std::io::Result<()> {
        for worker in workers {
            self.workers.push(worker.start(rx.clone())?);
        }
        for synthesizer in synthesizers {
            self.synthesizers
                .push(synthesizer.start(tx.clone(), Arc::clone(&self.stats))?);
        }
        Ok(())
    }

    pub fn get_stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Stop the synthesizers, then wait for every worker to close its session
    pub fn stop(self) -> PipelineReport {
        log::debug!("Stopping the simulators");
        let synthesizers: Vec<SynthesizerReport> = self
            .synthesizers
            .into_iter()
            .map(SynthesizerHandle::stop)
            .collect();
        log::debug!("Waiting for the workers");
        let workers: Vec<WorkerReport> = self
            .workers
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(report) => report,
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect();
        PipelineReport::new(
            self.start_time.elapsed().as_secs_f64(),
            synthesizers,
            workers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigError;
    use crate::exporter::IpfixExporter;
    use std::net::{SocketAddr, UdpSocket};

    #[test]
    fn invalid_configuration_opens_no_session() {
        let config = Configuration {
            ticks_per_second: 0,
            ..Default::default()
        };
        let mut sessions = 0;
        let res = Pipeline::start(
            &config,
            |_| {
                sessions += 1;
                IpfixExporter::connect(config.collector, config.get_ipfix_options())
            },
            Arc::new(Stats::default()),
        );
        assert!(matches!(
            res,
            Err(PipelineError::Config(ConfigError::NoTick))
        ));
        assert_eq!(sessions, 0);
    }

    #[test]
    fn session_error_aborts_startup() {
        let config = Configuration::default();
        let res = Pipeline::start(
            &config,
            |id| {
                if id == 2 {
                    Err(ExporterError::Closed)
                } else {
                    IpfixExporter::connect(config.collector, config.get_ipfix_options())
                }
            },
            Arc::new(Stats::default()),
        );
        assert!(matches!(
            res,
            Err(PipelineError::Exporter {
                worker: 2,
                source: ExporterError::Closed
            })
        ));
    }

    #[test]
    fn ipfix_end_to_end() {
        let collector = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr: SocketAddr = collector.local_addr().unwrap();
        let config = Configuration {
            collector: addr,
            flows_per_second: 400,
            ticks_per_second: 20,
            simulators: 2,
            workers: 2,
            buffer_size: 1000,
            seed: Some(1),
            ..Default::default()
        };
        let pipeline = Pipeline::start(
            &config,
            |_| IpfixExporter::connect(config.collector, config.get_ipfix_options()),
            Arc::new(Stats::default()),
        )
        .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(200));
        let report = pipeline.stop();
        assert!(report.totals.records_enqueued > 0);
        assert_eq!(
            report.totals.records_sent + report.totals.records_dropped,
            report.totals.records_enqueued
        );
        assert_eq!(report.workers.len(), 2);
        assert!(report
            .workers
            .iter()
            .all(|w| w.state == WorkerState::Closed));
    }
}
