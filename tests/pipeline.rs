use flowgen::config::Configuration;
use flowgen::errors::ExporterError;
use flowgen::exporter::{FieldValue, ProtocolExporter, TemplateId};
use flowgen::pipeline::Pipeline;
use flowgen::stats::Stats;
use flowgen::WorkerState;

use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Counts what reaches the exporters of a pipeline
#[derive(Default)]
struct Collector {
    templates: AtomicUsize,
    records_received: AtomicU64,
    closes: AtomicUsize,
}

struct RecordingExporter {
    collector: Arc<Collector>,
    pending: u64,
    /// every n-th flush fails
    fail_every: Option<u64>,
    flushes: u64,
}

impl RecordingExporter {
    fn new(collector: &Arc<Collector>, fail_every: Option<u64>) -> Self {
        RecordingExporter {
            collector: Arc::clone(collector),
            pending: 0,
            fail_every,
            flushes: 0,
        }
    }
}

impl ProtocolExporter for RecordingExporter {
    fn register_template(&mut self, field_names: &[&str]) -> Result<TemplateId, ExporterError> {
        assert_eq!(field_names.len(), 9);
        self.collector.templates.fetch_add(1, Ordering::Relaxed);
        Ok(256)
    }

    fn pending_message_size(&self, _: TemplateId) -> usize {
        20 + 45 * self.pending as usize
    }

    fn add_record(&mut self, _: TemplateId, _: &[FieldValue]) -> Result<(), ExporterError> {
        self.pending += 1;
        Ok(())
    }

    fn flush(&mut self, _: TemplateId) -> Result<usize, ExporterError> {
        let records = std::mem::take(&mut self.pending);
        if records == 0 {
            return Ok(0);
        }
        self.flushes += 1;
        if self.fail_every.is_some_and(|n| self.flushes % n == 0) {
            return Err(ExporterError::Send(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "refused",
            )));
        }
        self.collector
            .records_received
            .fetch_add(records, Ordering::Relaxed);
        Ok(20 + 45 * records as usize)
    }

    fn close(&mut self) -> Result<(), ExporterError> {
        self.collector.closes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn config(flows_per_second: u64, simulators: usize, workers: usize, buffer_size: usize) -> Configuration {
    Configuration {
        flows_per_second,
        ticks_per_second: 20,
        simulators,
        workers,
        buffer_size,
        // small messages, so that workers flush while running
        max_message_size: 20 + 10 * 45,
        seed: Some(0),
        ..Default::default()
    }
}

#[test]
fn channel_smaller_than_a_tick() {
    // 6 flow pairs per tick, in a channel of 10 records
    let config = Configuration {
        flows_per_second: 60,
        ticks_per_second: 10,
        simulators: 1,
        workers: 1,
        buffer_size: 10,
        ..Default::default()
    };
    let collector = Arc::new(Collector::default());
    let pipeline = Pipeline::start(
        &config,
        |_| Ok(RecordingExporter::new(&collector, None)),
        Arc::new(Stats::default()),
    )
    .unwrap();
    thread::sleep(Duration::from_millis(350));
    let report = pipeline.stop();
    let totals = &report.totals;
    assert!(totals.ticks >= 1);
    assert_eq!(totals.skipped_ticks, totals.ticks);
    assert_eq!(totals.records_created, 0);
    assert_eq!(totals.records_enqueued, 0);
    assert_eq!(totals.records_sent, 0);
    assert_eq!(collector.records_received.load(Ordering::Relaxed), 0);
    assert_eq!(collector.closes.load(Ordering::Relaxed), 1);
}

fn run_without_loss(buffer_size: usize) {
    let config = config(2000, 4, 3, buffer_size);
    let collector = Arc::new(Collector::default());
    let pipeline = Pipeline::start(
        &config,
        |_| Ok(RecordingExporter::new(&collector, None)),
        Arc::new(Stats::default()),
    )
    .unwrap();
    thread::sleep(Duration::from_millis(300));
    let report = pipeline.stop();
    let totals = &report.totals;
    assert!(totals.records_enqueued > 0);
    assert_eq!(totals.records_sent, totals.records_enqueued);
    assert_eq!(totals.records_dropped, 0);
    assert_eq!(
        report.workers.iter().map(|w| w.records_sent).sum::<u64>(),
        collector.records_received.load(Ordering::Relaxed)
    );
    assert_eq!(report.synthesizers.len(), 4);
    // 25 flow pairs per tick and per simulator, and no partial tick when the channel has room
    if buffer_size > 0 {
        for s in report.synthesizers.iter() {
            assert_eq!(s.records_enqueued, 50 * (s.ticks - s.skipped_ticks));
        }
    }
}

#[test]
fn every_enqueued_record_is_sent() {
    run_without_loss(10_000);
}

#[test]
fn every_enqueued_record_is_sent_synchronously() {
    run_without_loss(0);
}

#[test]
fn failed_flushes_are_counted() {
    let config = config(2000, 2, 2, 10_000);
    let collector = Arc::new(Collector::default());
    let pipeline = Pipeline::start(
        &config,
        |_| Ok(RecordingExporter::new(&collector, Some(3))),
        Arc::new(Stats::default()),
    )
    .unwrap();
    thread::sleep(Duration::from_millis(300));
    let report = pipeline.stop();
    let totals = &report.totals;
    assert!(totals.failed_flushes > 0);
    assert!(totals.records_dropped > 0);
    assert_eq!(
        totals.records_sent + totals.records_dropped,
        totals.records_enqueued
    );
    assert_eq!(
        totals.records_sent,
        collector.records_received.load(Ordering::Relaxed)
    );
}

#[test]
fn shutdown_closes_every_session_once() {
    let config = config(2000, 2, 5, 100);
    let collector = Arc::new(Collector::default());
    let stats = Arc::new(Stats::default());
    let pipeline = Pipeline::start(
        &config,
        |_| Ok(RecordingExporter::new(&collector, None)),
        Arc::clone(&stats),
    )
    .unwrap();
    // sessions are ready before anything runs
    assert_eq!(collector.templates.load(Ordering::Relaxed), 5);
    thread::sleep(Duration::from_millis(200));
    let report = pipeline.stop();
    assert_eq!(report.workers.len(), 5);
    assert!(report.workers.iter().all(|w| w.state == WorkerState::Closed));
    assert_eq!(collector.closes.load(Ordering::Relaxed), 5);
    assert_eq!(
        stats.records_sent.load(Ordering::Relaxed),
        report.totals.records_sent
    );
}
