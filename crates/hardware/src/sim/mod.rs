//! Simulation driver.
//!
//! This module provides:
//! 1. **Scheduler:** The discrete-event queue and the clock.
//! 2. **Simulator:** The facade that builds a hierarchy and runs it.
//! 3. **Traces:** Parsing and replay of request trace files.

/// Event queue and scheduler.
pub mod event;

/// Simulator facade.
pub mod simulator;

/// Request trace parsing and replay.
pub mod trace;

pub use self::event::{Event, Payload, Scheduler};
pub use self::simulator::Simulator;
