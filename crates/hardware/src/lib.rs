//! Cycle-level cache hierarchy simulator library.
//!
//! This crate implements a discrete-event model of a multi-level cache hierarchy with the following:
//! 1. **Caches:** Set-associative block stores, replacement policies, MSHRs and prefetchers.
//! 2. **Coherence:** MESI (or MSI) with exact sharer directories at every home node.
//! 3. **Memory:** A fixed-latency memory controller with range-checked sparse storage.
//! 4. **SoC:** Timed FIFO links, message routing and topology construction.
//! 5. **Simulation:** Scheduler, simulator facade, trace replay and statistics.

/// Common types (addresses, requests, errors, units).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Core port and cache units (block store, policies, coherence, prefetch).
pub mod core;
/// Scheduler, simulator facade and traces.
pub mod sim;
/// Links, memory controller and topology builder.
pub mod soc;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Finished request as posted by a core port.
pub use crate::core::Completion;
/// Top-level simulator; construct with `Simulator::new`.
pub use crate::sim::Simulator;
