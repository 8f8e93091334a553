//! Topology construction.
//!
//! This module turns a validated [`Config`] into a wired set of nodes. It performs:
//! 1. **Core ports:** One per core, occupying node ids `0..cores`.
//! 2. **Cache levels:** Private levels get one instance per core (`name.N` when there
//!    are several cores), shared levels a single instance.
//! 3. **Links:** Two directed links per parent/child pair; the CPU side uses
//!    `system.link_latency`, a cache uses its own `link_latency` toward the level below.
//! 4. **Memory controller:** The root home, parent of every last-level instance.

use tracing::debug;

use crate::common::{LineGeometry, SimError, SimResult, Tick};
use crate::config::Config;
use crate::core::CorePort;
use crate::core::units::cache::CacheController;
use crate::soc::interconnect::{Interconnect, NodeId, Port};
use crate::soc::memory::MemoryController;
use crate::soc::node::Node;

/// Wired components and the fabric connecting them.
#[derive(Debug)]
pub struct System {
    /// Every node, indexed by [`NodeId`].
    pub nodes: Vec<Node>,
    /// Links between the nodes.
    pub fabric: Interconnect,
    /// Node id of each core port, by core index.
    pub cores: Vec<NodeId>,
    /// Node ids of the cache instances, L1 first.
    pub caches: Vec<NodeId>,
    /// Node id of the memory controller.
    pub memory: NodeId,
    /// Parent of every node (`None` for the memory controller).
    pub parents: Vec<Option<NodeId>>,
    /// Line arithmetic shared by the hierarchy.
    pub geometry: LineGeometry,
}

impl System {
    /// Builds the hierarchy described by `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration; validated before anything is built.
    ///
    /// # Returns
    ///
    /// A fully connected `System` whose fabric is ready to hand to a scheduler.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] if the configuration is invalid.
    pub fn new(config: &Config) -> SimResult<Self> {
        config.validate()?;
        let geometry = config.geometry()?;
        let range = (config.memory.addr_range_start.0, config.memory.addr_range_end.0);
        let cores = config.system.cores;

        let mut system = Self {
            nodes: Vec::new(),
            fabric: Interconnect::new(),
            cores: Vec::with_capacity(cores),
            caches: Vec::new(),
            memory: 0,
            parents: Vec::new(),
            geometry,
        };

        for core in 0..cores {
            let id = system.push(Node::Core(CorePort::new(core, geometry, range)));
            system.cores.push(id);
        }

        // Node below each core at the previous level, and that level's link latency.
        let mut below: Vec<NodeId> = system.cores.clone();
        let mut latency = config.system.link_latency.ticks();
        for cache in &config.caches {
            let instances = if cache.shared { 1 } else { cores };
            let mut level = Vec::with_capacity(instances);
            for index in 0..instances {
                let name = if instances > 1 {
                    format!("{}.{index}", cache.name)
                } else {
                    cache.name.clone()
                };
                let id = system.nodes.len();
                let controller =
                    CacheController::new(name, id, cache, &config.system, geometry, range);
                let _ = system.push(Node::Cache(Box::new(controller)));
                system.caches.push(id);
                level.push(id);
            }
            let next: Vec<NodeId> = (0..cores)
                .map(|core| if cache.shared { level[0] } else { level[core] })
                .collect();
            for child in distinct(&below) {
                let parent = next[below.iter().position(|&n| n == child).unwrap_or(0)];
                system.connect(child, parent, latency)?;
            }
            below = next;
            latency = cache.link_latency.unwrap_or(config.system.link_latency).ticks();
        }

        let memory = MemoryController::new(&config.memory, geometry);
        system.memory = system.push(Node::Memory(memory));
        for child in distinct(&below) {
            system.connect(child, system.memory, latency)?;
        }
        debug!(
            nodes = system.nodes.len(),
            links = system.fabric.links().len(),
            "topology built"
        );
        Ok(system)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.parents.push(None);
        self.nodes.len() - 1
    }

    /// Wires `child` below `parent` with one link in each direction.
    fn connect(&mut self, child: NodeId, parent: NodeId, latency: Tick) -> SimResult<()> {
        let accepts_exclusive = match &self.nodes[child] {
            Node::Core(_) => false,
            Node::Cache(cache) => cache.protocol().allows_exclusive(),
            Node::Memory(_) => return Err(SimError::config("memory cannot be a child")),
        };
        let child_is_core = matches!(self.nodes[child], Node::Core(_));
        let child_name = self.nodes[child].name();
        let parent_name = self.nodes[parent].name();

        let down = self
            .fabric
            .connect(format!("{parent_name}->{child_name}"), child, Port::Lower, latency);
        let port = match &mut self.nodes[parent] {
            Node::Cache(cache) if child_is_core => {
                cache.attach_core(down);
                0
            }
            Node::Cache(cache) => cache.attach_child(down, accepts_exclusive),
            Node::Memory(memory) => memory.attach_child(down, accepts_exclusive),
            Node::Core(_) => return Err(SimError::config("a core cannot be a parent")),
        };
        let up = self.fabric.connect(
            format!("{child_name}->{parent_name}"),
            parent,
            Port::Upper(port),
            latency,
        );
        match &mut self.nodes[child] {
            Node::Core(core) => core.attach(up),
            Node::Cache(cache) => cache.attach_parent(up),
            Node::Memory(_) => {}
        }
        self.parents[child] = Some(parent);
        Ok(())
    }
}

/// Node ids in first-seen order without repeats.
fn distinct(nodes: &[NodeId]) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(nodes.len());
    for &node in nodes {
        if !out.contains(&node) {
            out.push(node);
        }
    }
    out
}
