//! System-on-Chip (SoC) components.
//!
//! This module organizes the parts that sit between the caches: the timed
//! link fabric and the messages it carries, the memory controller, the node
//! enum the scheduler dispatches to, and the builder that wires a hierarchy
//! from configuration.

/// Topology builder.
pub mod builder;

/// Timed FIFO links and port addressing.
pub mod interconnect;

/// Memory controller and backing store.
pub mod memory;

/// Messages carried by links.
pub mod message;

/// Components addressable by the scheduler.
pub mod node;

pub use builder::System;
pub use node::Node;
