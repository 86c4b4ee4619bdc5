use crate::errors::ExporterError;
use crate::exporter::{ProtocolExporter, TemplateId};
use crate::stats::Stats;
use crate::structs::*;

use crossbeam_channel::Receiver;
use serde::Serialize;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub id: usize,
    /// records accepted by successful flushes
    pub records_sent: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub failed_flushes: u64,
    /// records lost with failed flushes or rejected by the exporter
    pub records_dropped: u64,
    pub state: WorkerState,
}

/// Consumes flow records, batches them into messages of bounded size and flushes them with
/// its own exporter session
pub struct ExportWorker<E: ProtocolExporter> {
    exporter: E,
    template_id: TemplateId,
    max_message_size: usize,
    /// records in the pending batch
    pending: u64,
    stats: Arc<Stats>,
    report: WorkerReport,
}

impl<E: ProtocolExporter> ExportWorker<E> {
    /// Register the flow template on the session. A worker without a template cannot run.
    pub fn new(
        id: usize,
        mut exporter: E,
        max_message_size: usize,
        stats: Arc<Stats>,
    ) -> Result<Self, ExporterError> {
        let template_id = exporter.register_template(&FLOW_TEMPLATE)?;
        log::debug!("Worker {id}: template {template_id} registered");
        Ok(ExportWorker {
            exporter,
            template_id,
            max_message_size,
            pending: 0,
            stats,
            report: WorkerReport {
                id,
                records_sent: 0,
                messages_sent: 0,
                bytes_sent: 0,
                failed_flushes: 0,
                records_dropped: 0,
                state: WorkerState::Running,
            },
        })
    }

    pub fn get_state(&self) -> WorkerState {
        self.report.state
    }

    pub fn get_report(&self) -> &WorkerReport {
        &self.report
    }

    pub fn get_pending_count(&self) -> u64 {
        self.pending
    }

    fn set_state(&mut self, state: WorkerState) {
        debug_assert_eq!(self.report.state.next(), Some(state));
        log::trace!("Worker {}: {:?} -> {:?}", self.report.id, self.report.state, state);
        self.report.state = state;
    }

    /// Add a record to the pending batch. If the batch has reached the maximum message size,
    /// it is flushed first.
    pub fn push(&mut self, record: &FlowRecord) {
        if self.exporter.pending_message_size(self.template_id) >= self.max_message_size {
            self.flush();
        }
        match self
            .exporter
            .add_record(self.template_id, &record.field_values())
        {
            Ok(()) => self.pending += 1,
            Err(e) => {
                log::warn!("Worker {}: record rejected: {e}", self.report.id);
                self.report.records_dropped += 1;
                self.stats.records_dropped(1);
            }
        }
    }

    /// Send the pending batch. A failed batch is dropped. Flushing an empty batch does nothing.
    pub fn flush(&mut self) {
        let records = std::mem::take(&mut self.pending);
        match self.exporter.flush(self.template_id) {
            Ok(_) if records == 0 => (),
            Ok(bytes) => {
                self.report.records_sent += records;
                self.report.messages_sent += 1;
                self.report.bytes_sent += bytes as u64;
                self.stats.message_sent(records, bytes);
            }
            Err(e) => {
                log::warn!(
                    "Worker {}: flush failed, {records} records dropped: {e}",
                    self.report.id
                );
                self.report.failed_flushes += 1;
                self.report.records_dropped += records;
                self.stats.flush_failed(records);
            }
        }
    }

    /// Consume the channel until it is closed and empty, then flush and close the session
    pub fn run(mut self, rx: Receiver<FlowRecord>) -> WorkerReport {
        log::trace!("Start worker {}", self.report.id);
        for record in rx {
            self.push(&record);
        }
        self.set_state(WorkerState::Draining);
        self.set_state(WorkerState::Flushing);
        self.flush();
        if let Err(e) = self.exporter.close() {
            log::warn!("Worker {}: cannot close the session: {e}", self.report.id);
        }
        self.set_state(WorkerState::Closed);
        log::trace!("Worker {} stops", self.report.id);
        self.report
    }

    /// Run in a dedicated thread
    pub fn start(self, rx: Receiver<FlowRecord>) -> std::io::Result<thread::JoinHandle<WorkerReport>> {
        let builder = thread::Builder::new().name(format!("Worker-{}", self.report.id));
        builder.spawn(move || self.run(rx))
    }
}
