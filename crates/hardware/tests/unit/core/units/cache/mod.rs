//! Cache tests.

/// Block store lookup, insertion and allocation.
pub mod block_store;

/// Single-cache behaviour driven through the simulator.
pub mod controller;

/// Replacement policies in isolation.
pub mod policies;
