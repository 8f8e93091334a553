//! Timed FIFO links between components.
//!
//! This module implements the fabric that connects core ports, caches and the
//! memory controller. It provides:
//! 1. **Links:** Directed channels with a constant propagation delay.
//! 2. **Ordering:** Per-link FIFO; a message never arrives before one sent earlier on the same link.
//! 3. **Addressing:** Each link delivers to a fixed node and port, so receivers know who sent a message.

use crate::common::Tick;

/// Index of a simulated component.
pub type NodeId = usize;

/// Index of a link in the [`Interconnect`].
pub type LinkId = usize;

/// Where a message enters its receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Port {
    /// From the `n`-th child (core port or upper-level cache).
    Upper(usize),
    /// From the parent (next level or memory).
    Lower,
    /// Self-scheduled event.
    Local,
}

/// A directed timed channel.
#[derive(Clone, Debug)]
pub struct Link {
    /// Name used in logs, e.g. `"l1cache.0->memory"`.
    pub name: String,
    /// Receiving node.
    pub to: NodeId,
    /// Port on the receiving node.
    pub port: Port,
    /// Propagation delay.
    pub latency: Tick,
    /// Messages carried so far.
    pub messages: u64,
    last_arrival: Tick,
}

/// All links of a simulated system.
#[derive(Clone, Debug, Default)]
pub struct Interconnect {
    links: Vec<Link>,
}

impl Interconnect {
    /// Creates an empty fabric.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a link and returns its id.
    pub fn connect(&mut self, name: impl Into<String>, to: NodeId, port: Port, latency: Tick) -> LinkId {
        self.links.push(Link {
            name: name.into(),
            to,
            port,
            latency,
            messages: 0,
            last_arrival: 0,
        });
        self.links.len() - 1
    }

    /// Link `id`.
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    /// All links in creation order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Books a transfer that leaves at `depart` and returns `(receiver, port, arrival)`.
    ///
    /// The arrival is `depart + latency`, pushed back to the previous arrival on
    /// the same link so that delivery order matches send order.
    pub fn transfer(&mut self, id: LinkId, depart: Tick) -> Option<(NodeId, Port, Tick)> {
        let link = self.links.get_mut(id)?;
        let arrival = depart.saturating_add(link.latency).max(link.last_arrival);
        link.last_arrival = arrival;
        link.messages += 1;
        Some((link.to, link.port, arrival))
    }
}
