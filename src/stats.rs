use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const REPORT_PERIOD_IN_SECS: u64 = 5;

/// Live generation statistics, for monitoring only.
///
/// The counters are updated with relaxed ordering by every thread and may be slightly behind.
/// The exact totals are the reports returned by the workers and the simulators once joined.
pub struct Stats {
    pub start_time: Instant,
    pub ticks: AtomicU64,
    pub skipped_ticks: AtomicU64,
    pub records_created: AtomicU64,
    pub records_enqueued: AtomicU64,
    pub records_sent: AtomicU64,
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub failed_flushes: AtomicU64,
    pub records_dropped: AtomicU64,
    pub early_stop: AtomicBool,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            start_time: Instant::now(),
            ticks: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            records_created: AtomicU64::new(0),
            records_enqueued: AtomicU64::new(0),
            records_sent: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            early_stop: AtomicBool::new(false),
        }
    }
}

impl Stats {
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_skipped(&self) {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_created(&self, count: u64) {
        self.records_created.fetch_add(count, Ordering::Relaxed);
    }

    pub fn records_enqueued(&self, count: u64) {
        self.records_enqueued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn message_sent(&self, records: u64, bytes: usize) {
        self.records_sent.fetch_add(records, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn flush_failed(&self, records: u64) {
        self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        self.records_dropped.fetch_add(records, Ordering::Relaxed);
    }

    pub fn records_dropped(&self, count: u64) {
        self.records_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.early_stop.load(Ordering::Relaxed)
    }

    pub fn stop_early(&self) {
        self.early_stop.store(true, Ordering::Relaxed);
    }

    fn log_progression(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let sent = self.records_sent.load(Ordering::Relaxed);
        let enqueued = self.records_enqueued.load(Ordering::Relaxed);
        let skipped = self.skipped_ticks.load(Ordering::Relaxed);
        let ticks = self.ticks.load(Ordering::Relaxed);
        let bytes = self.bytes_sent.load(Ordering::Relaxed);
        let throughput = 8. * (bytes as f64) / elapsed.max(1.) / 1_000_000.;
        let rate = (sent as f64) / elapsed.max(1.);
        if throughput < 1. {
            log::info!(
                "{enqueued} records enqueued, {sent} sent ({rate:.0} flows/s, {:.2} kbps), {skipped}/{ticks} ticks skipped",
                throughput * 1000.
            );
        } else {
            log::info!(
                "{enqueued} records enqueued, {sent} sent ({rate:.0} flows/s, {throughput:.2} Mbps), {skipped}/{ticks} ticks skipped"
            );
        }
        let failed = self.failed_flushes.load(Ordering::Relaxed);
        if failed > 0 {
            log::warn!(
                "{failed} messages could not be sent ({} records lost)",
                self.records_dropped.load(Ordering::Relaxed)
            );
        }
    }
}

/// Log the progression regularly until the generation stops
pub fn show_progression(stats: Arc<Stats>) {
    while !stats.should_stop() {
        for _ in 0..REPORT_PERIOD_IN_SECS {
            thread::sleep(Duration::from_secs(1));
            if stats.should_stop() {
                return;
            }
        }
        stats.log_progression();
    }
}
