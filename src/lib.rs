//! Synthetic network flow generation, for load testing of flow collectors.
//! Flow simulators feed a pool of export workers through a bounded channel, and each worker
//! sends size-bounded IPFIX messages to the collector.

/// Generation configuration
pub mod config;
/// Error types
pub mod errors;
/// Generation statistics
pub mod stats;

#[doc(hidden)]
/// Structures used throughout the library
pub mod structs;

#[doc(inline)]
pub use structs::*;

/// Load shedding when the channel is full
pub mod backpressure;

/// Flow pair generation
pub mod synthesizer;

/// Batching and export of flow records
pub mod worker;

/// Protocol exporters
pub mod exporter;

/// Simulators and workers together
pub mod pipeline;
