use crate::exporter::FieldValue;
use serde::Serialize;
use std::fmt::Debug;
use std::net::Ipv4Addr;

/// TCP protocol number, the only transport protocol synthesized for now
pub const PROTO_TCP: u8 = 6;

/// The information elements of the flow template, in encoding order
pub const FLOW_TEMPLATE: [&str; 9] = [
    "sourceIPv4Address",
    "destinationIPv4Address",
    "sourceTransportPort",
    "destinationTransportPort",
    "protocolIdentifier",
    "flowStartMilliseconds",
    "flowEndMilliseconds",
    "octetTotalCount",
    "packetTotalCount",
];

/// A unidirectional flow: the 7-tuple (with both timestamps) and its volume counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FlowRecord {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    pub flow_start_ms: u64,
    pub flow_end_ms: u64,
    pub octet_count: u64,
    pub packet_count: u64,
}

impl FlowRecord {
    pub fn get_duration_ms(&self) -> u64 {
        self.flow_end_ms.saturating_sub(self.flow_start_ms)
    }

    /// The values of the record, ordered as in FLOW_TEMPLATE
    pub fn field_values(&self) -> [FieldValue; 9] {
        [
            FieldValue::Ipv4(self.src_addr),
            FieldValue::Ipv4(self.dst_addr),
            FieldValue::U16(self.src_port),
            FieldValue::U16(self.dst_port),
            FieldValue::U8(self.protocol),
            FieldValue::U64(self.flow_start_ms),
            FieldValue::U64(self.flow_end_ms),
            FieldValue::U64(self.octet_count),
            FieldValue::U64(self.packet_count),
        ]
    }
}

/// A request flow and its time-shifted response
#[derive(Debug, Clone, Copy)]
pub struct FlowPair {
    pub request: FlowRecord,
    pub response: FlowRecord,
    /// delay between the request and the response (in ms), always at least 1
    pub latency_ms: u64,
}

impl FlowPair {
    pub fn into_records(self) -> [FlowRecord; 2] {
        [self.request, self.response]
    }
}

/// Lifecycle of an export worker. Transitions are strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// Consuming records from the channel
    Running,
    /// The channel has been closed, the loop is exiting
    Draining,
    /// Sending the last pending batch
    Flushing,
    /// The exporter session is closed. Terminal.
    Closed,
}

impl WorkerState {
    /// The only state reachable from this one
    pub fn next(&self) -> Option<WorkerState> {
        match self {
            WorkerState::Running => Some(WorkerState::Draining),
            WorkerState::Draining => Some(WorkerState::Flushing),
            WorkerState::Flushing => Some(WorkerState::Closed),
            WorkerState::Closed => None,
        }
    }
}
