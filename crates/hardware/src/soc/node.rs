//! Scheduler nodes.
//!
//! Every component that can receive an event is a [`Node`]. The scheduler
//! addresses nodes by index; the simulator dispatches each delivered event to
//! the node's handler.

use crate::common::SimResult;
use crate::core::CorePort;
use crate::core::units::cache::CacheController;
use crate::sim::event::{Payload, Scheduler};
use crate::soc::interconnect::Port;
use crate::soc::memory::MemoryController;

/// A component reachable through the fabric.
#[derive(Debug)]
pub enum Node {
    /// CPU-side request port.
    Core(CorePort),
    /// One cache instance.
    Cache(Box<CacheController>),
    /// The memory controller.
    Memory(MemoryController),
}

impl Node {
    /// Name used in logs and link names.
    pub fn name(&self) -> String {
        match self {
            Self::Core(port) => format!("core{}", port.core()),
            Self::Cache(cache) => cache.name().to_owned(),
            Self::Memory(memory) => memory.name().to_owned(),
        }
    }

    /// Delivers one event to the component.
    pub fn handle(&mut self, port: Port, payload: Payload, sched: &mut Scheduler) -> SimResult<()> {
        match self {
            Self::Core(core) => core.handle(port, payload, sched),
            Self::Cache(cache) => cache.handle(port, payload, sched),
            Self::Memory(memory) => memory.handle(port, payload, sched),
        }
    }

    /// True when the component has no transaction in progress.
    pub fn quiescent(&self) -> bool {
        match self {
            Self::Core(core) => core.outstanding() == 0,
            Self::Cache(cache) => cache.quiescent(),
            Self::Memory(memory) => memory.quiescent(),
        }
    }

    /// The cache controller, if this node is one.
    pub fn as_cache(&self) -> Option<&CacheController> {
        match self {
            Self::Cache(cache) => Some(cache),
            _ => None,
        }
    }

    /// The core port, if this node is one.
    pub fn as_core(&self) -> Option<&CorePort> {
        match self {
            Self::Core(core) => Some(core),
            _ => None,
        }
    }
}
