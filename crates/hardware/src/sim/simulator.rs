//! Simulator facade.
//!
//! The simulator owns the nodes built from configuration and the scheduler
//! that drives them. Callers submit requests at core ports, advance time with
//! [`Simulator::step`], [`Simulator::run`] or [`Simulator::run_until`], and
//! collect [`Completion`]s.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::common::{Addr, RequestId, RequestKind, SimError, SimResult, Tick};
use crate::config::Config;
use crate::core::Completion;
use crate::core::units::cache::CacheController;
use crate::core::units::coherence::MesiState;
use crate::sim::event::Scheduler;
use crate::soc::interconnect::NodeId;
use crate::soc::memory::MemoryController;
use crate::soc::{Node, System};
use crate::stats::SimStats;

/// A running cache hierarchy.
#[derive(Debug)]
pub struct Simulator {
    nodes: Vec<Node>,
    cores: Vec<NodeId>,
    caches: Vec<NodeId>,
    memory: NodeId,
    parents: Vec<Option<NodeId>>,
    sched: Scheduler,
    next_id: RequestId,
    host_time: Duration,
}

impl Simulator {
    /// Builds the hierarchy described by `config`.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] if the configuration is invalid.
    pub fn new(config: &Config) -> SimResult<Self> {
        let System {
            nodes,
            fabric,
            cores,
            caches,
            memory,
            parents,
            ..
        } = System::new(config)?;
        info!(
            cores = cores.len(),
            caches = caches.len(),
            line = config.system.cache_line_size,
            "simulator ready"
        );
        Ok(Self {
            nodes,
            cores,
            caches,
            memory,
            parents,
            sched: Scheduler::new(fabric),
            next_id: 0,
            host_time: Duration::ZERO,
        })
    }

    /// Current simulated time in picoseconds.
    pub const fn now(&self) -> Tick {
        self.sched.now()
    }

    /// Number of cores.
    pub fn cores(&self) -> usize {
        self.cores.len()
    }

    /// Submits a request at `core`'s port at the current time.
    ///
    /// # Returns
    ///
    /// The id the matching [`Completion`] will carry.
    ///
    /// # Errors
    ///
    /// [`SimError::UnknownCore`], [`SimError::AddressRange`] or
    /// [`SimError::InvalidRequest`]; a rejected request leaves no trace in the hierarchy.
    pub fn submit(&mut self, core: usize, addr: Addr, kind: RequestKind) -> SimResult<RequestId> {
        let node = *self.cores.get(core).ok_or(SimError::UnknownCore(core))?;
        let Some(Node::Core(port)) = self.nodes.get_mut(node) else {
            return Err(SimError::UnknownCore(core));
        };
        let id = self.next_id;
        port.submit(id, addr, kind, &mut self.sched)?;
        self.next_id += 1;
        Ok(id)
    }

    /// Delivers the earliest pending event.
    ///
    /// # Returns
    ///
    /// `false` when nothing was pending.
    ///
    /// # Errors
    ///
    /// Any error raised by the receiving component; the simulation should stop.
    pub fn step(&mut self) -> SimResult<bool> {
        let started = Instant::now();
        let Some(event) = self.sched.pop() else {
            return Ok(false);
        };
        let node = self
            .nodes
            .get_mut(event.node)
            .ok_or_else(|| SimError::config(format!("event for unknown node {}", event.node)))?;
        let result = node.handle(event.port, event.payload, &mut self.sched);
        self.host_time += started.elapsed();
        result.map(|()| true)
    }

    /// Runs until no event is pending.
    ///
    /// # Errors
    ///
    /// The first error raised by a component.
    pub fn run(&mut self) -> SimResult<()> {
        while self.step()? {}
        debug!(now = self.now(), events = self.sched.delivered(), "drained");
        Ok(())
    }

    /// Delivers every event due at or before `until`, then moves the clock to `until`.
    ///
    /// # Errors
    ///
    /// The first error raised by a component.
    pub fn run_until(&mut self, until: Tick) -> SimResult<()> {
        while self.sched.next_time().is_some_and(|at| at <= until) {
            let _ = self.step()?;
        }
        self.sched.advance_to(until);
        Ok(())
    }

    /// Removes every posted completion, ordered by completion time then id.
    pub fn drain_completions(&mut self) -> Vec<Completion> {
        let mut out = Vec::new();
        for &node in &self.cores {
            if let Some(Node::Core(port)) = self.nodes.get_mut(node) {
                out.extend(port.drain());
            }
        }
        out.sort_by_key(|c| (c.completed_at, c.id));
        out
    }

    /// True when no event is pending and no component has work in progress.
    pub fn idle(&self) -> bool {
        self.sched.pending() == 0 && self.nodes.iter().all(Node::quiescent)
    }

    /// The cache instance named `name`.
    pub fn cache(&self, name: &str) -> Option<&CacheController> {
        self.caches
            .iter()
            .filter_map(|&node| self.nodes.get(node).and_then(Node::as_cache))
            .find(|cache| cache.name() == name)
    }

    /// Every cache instance, L1 first.
    pub fn caches(&self) -> impl Iterator<Item = &CacheController> + '_ {
        self.caches
            .iter()
            .filter_map(|&node| self.nodes.get(node).and_then(Node::as_cache))
    }

    /// The memory controller.
    pub fn memory(&self) -> Option<&MemoryController> {
        match self.nodes.get(self.memory) {
            Some(Node::Memory(memory)) => Some(memory),
            _ => None,
        }
    }

    /// Mutable access to the memory controller.
    pub fn memory_mut(&mut self) -> Option<&mut MemoryController> {
        match self.nodes.get_mut(self.memory) {
            Some(Node::Memory(memory)) => Some(memory),
            _ => None,
        }
    }

    /// Snapshot of every counter.
    pub fn stats(&self) -> SimStats {
        SimStats {
            sim_time: self.now(),
            events: self.sched.delivered(),
            host_seconds: self.host_time.as_secs_f64(),
            cores: self
                .cores
                .iter()
                .filter_map(|&node| self.nodes.get(node).and_then(Node::as_core))
                .map(|port| port.stats().clone())
                .collect(),
            caches: self
                .caches()
                .map(|cache| (cache.name().to_owned(), cache.stats().clone()))
                .collect(),
            memory: self
                .memory()
                .map(|memory| memory.stats().clone())
                .unwrap_or_default(),
            links: self
                .sched
                .fabric()
                .links()
                .iter()
                .map(|link| (link.name.clone(), link.messages))
                .collect(),
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        while let Some(parent) = self.parents.get(node).copied().flatten() {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    /// Checks the single-writer invariant across caches.
    ///
    /// A cache holding a line in M or E excludes every other valid copy,
    /// except in its own ancestors (inclusive levels) and descendants.
    ///
    /// # Errors
    ///
    /// [`SimError::ProtocolViolation`] naming the first offending cache.
    pub fn check_coherence(&self) -> SimResult<()> {
        let mut holders: HashMap<Addr, Vec<(NodeId, MesiState)>> = HashMap::new();
        for &node in &self.caches {
            let Some(cache) = self.nodes.get(node).and_then(Node::as_cache) else {
                continue;
            };
            for (addr, line) in cache.store().resident() {
                holders.entry(addr).or_default().push((node, line.state));
            }
        }
        for (addr, copies) in &holders {
            for &(a, state_a) in copies {
                if !state_a.can_write() {
                    continue;
                }
                for &(b, state_b) in copies {
                    if a == b || self.is_ancestor(a, b) || self.is_ancestor(b, a) {
                        continue;
                    }
                    let name = self.nodes[a].name();
                    return Err(SimError::violation(
                        &name,
                        *addr,
                        format!(
                            "holds {} while {} holds {}",
                            state_a.letter(),
                            self.nodes[b].name(),
                            state_b.letter()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
