//! Memory controller: the root home of the coherence hierarchy.
//!
//! This module provides:
//! 1. **Directory:** An exact sharer vector per line over the caches attached to it.
//! 2. **Serialization:** One transaction per line; later `GetS`/`GetX` wait in a per-line queue.
//! 3. **Timing:** Data leaves after the backend access time, rounded up to a controller clock edge.
//!
//! Writebacks are posted: `PutM` updates the backend on arrival and is never acknowledged.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use super::backend::{Backend, SimpleBackend};
use crate::common::{Addr, LineGeometry, SimError, SimResult, Tick};
use crate::config::MemoryConfig;
use crate::core::units::coherence::{Sharers, Want};
use crate::sim::event::{Payload, Scheduler};
use crate::soc::interconnect::{LinkId, Port};
use crate::soc::message::{Block, Message};
use crate::stats::MemoryStats;

#[derive(Debug, Default)]
struct MemLine {
    sharers: Sharers,
    active: Option<(usize, Want)>,
    pending: u64,
    queue: VecDeque<(usize, Want)>,
}

impl MemLine {
    fn idle(&self) -> bool {
        self.active.is_none() && self.queue.is_empty() && self.sharers.is_empty()
    }
}

/// Fixed-latency memory controller with a sparse backend.
#[derive(Debug)]
pub struct MemoryController {
    name: String,
    geometry: LineGeometry,
    period: Tick,
    backend: Box<dyn Backend>,
    up_links: Vec<LinkId>,
    child_exclusive: Vec<bool>,
    lines: HashMap<Addr, MemLine>,
    stats: MemoryStats,
}

impl MemoryController {
    /// Creates an unconnected controller for `config` over a [`SimpleBackend`].
    pub fn new(config: &MemoryConfig, geometry: LineGeometry) -> Self {
        let backend = SimpleBackend::new(
            geometry,
            config.addr_range_start.0,
            config.addr_range_end.0,
            config.mem_size.get(),
            config.access_time.ticks(),
        );
        Self::with_backend(config, geometry, Box::new(backend))
    }

    /// Creates an unconnected controller over a custom backend.
    pub fn with_backend(config: &MemoryConfig, geometry: LineGeometry, backend: Box<dyn Backend>) -> Self {
        Self {
            name: "memory".to_owned(),
            geometry,
            period: config.clock.period(),
            backend,
            up_links: Vec::new(),
            child_exclusive: Vec::new(),
            lines: HashMap::new(),
            stats: MemoryStats::default(),
        }
    }

    /// Attaches a child cache; returns its upper port index.
    pub fn attach_child(&mut self, link: LinkId, accepts_exclusive: bool) -> usize {
        self.up_links.push(link);
        self.child_exclusive.push(accepts_exclusive);
        self.up_links.len() - 1
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counters.
    pub const fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// The backing store.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Sharers recorded for `addr`'s line.
    pub fn sharers(&self, addr: Addr) -> Sharers {
        self.lines
            .get(&self.geometry.base(addr))
            .map(|line| line.sharers)
            .unwrap_or_default()
    }

    /// True when no line has a transaction in progress.
    pub fn quiescent(&self) -> bool {
        self.lines
            .values()
            .all(|line| line.active.is_none() && line.queue.is_empty())
    }

    /// Reads the current backend copy of a line (not coherent with dirty cache lines).
    ///
    /// # Errors
    ///
    /// [`SimError::AddressRange`] outside the served range.
    pub fn read_line(&mut self, addr: Addr) -> SimResult<Vec<u8>> {
        self.backend.fetch(self.geometry.base(addr))
    }

    fn violation(&self, addr: Addr, detail: impl Into<String>) -> SimError {
        SimError::violation(&self.name, addr, detail)
    }

    fn child_link(&self, port: usize) -> SimResult<LinkId> {
        self.child_port(port).map(|(link, _)| link)
    }

    /// Link and exclusive-grant capability of upper port `port`.
    fn child_port(&self, port: usize) -> SimResult<(LinkId, bool)> {
        match (self.up_links.get(port), self.child_exclusive.get(port)) {
            (Some(&link), Some(&accepts)) => Ok((link, accepts)),
            _ => Err(SimError::config(format!("memory has no upper port {port}"))),
        }
    }

    /// Ticks from `now` until the response is ready on a clock edge.
    fn response_delay(&mut self, now: Tick, addr: Addr) -> Tick {
        let ready = now.saturating_add(self.backend.access_latency(addr));
        let edge = ready.div_ceil(self.period).saturating_mul(self.period);
        edge - now
    }

    /// Handles one delivered event.
    ///
    /// # Errors
    ///
    /// [`SimError::AddressRange`] for a fetch outside the backend range and
    /// [`SimError::ProtocolViolation`] for impossible coherence observations.
    pub fn handle(&mut self, port: Port, payload: Payload, sched: &mut Scheduler) -> SimResult<()> {
        let Payload::Message(msg) = payload else {
            return Ok(());
        };
        let line = self.geometry.base(msg.addr());
        let Port::Upper(child) = port else {
            return Err(self.violation(line, format!("{} on non-child port", msg.name())));
        };
        trace!(child, msg = msg.name(), line, "memory receive");
        match msg {
            Message::GetS { .. } => self.enqueue(line, child, Want::Shared, sched),
            Message::GetX { .. } => self.enqueue(line, child, Want::Exclusive, sched),
            Message::PutM { data, .. } => self.on_writeback(line, child, Some(&data)),
            Message::PutClean { .. } => self.on_writeback(line, child, None),
            Message::InvAck { data, .. } => self.on_ack(line, child, data, false, sched),
            Message::DowngradeAck { data, .. } => self.on_ack(line, child, data, true, sched),
            other => Err(self.violation(line, format!("unexpected {} at memory", other.name()))),
        }
    }

    fn enqueue(&mut self, line: Addr, child: usize, want: Want, sched: &mut Scheduler) -> SimResult<()> {
        let entry = self.lines.entry(line).or_default();
        if entry.active.is_some() {
            entry.queue.push_back((child, want));
            return Ok(());
        }
        self.start(line, child, want, sched)
    }

    fn start(&mut self, line: Addr, child: usize, want: Want, sched: &mut Scheduler) -> SimResult<()> {
        let entry = self.lines.entry(line).or_default();
        entry.active = Some((child, want));
        let conflicts = entry.sharers.conflicts(Some(child), want);
        if conflicts.is_empty() {
            return self.respond(line, sched);
        }
        let mut pending = 0u64;
        for port in conflicts {
            let msg = match want {
                Want::Shared => Message::Downgrade { addr: line },
                Want::Exclusive => Message::Inv { addr: line },
            };
            sched.send(self.child_link(port)?, msg)?;
            pending |= 1 << port;
            self.stats.recalls += 1;
        }
        debug!(line, pending, ?want, "memory collects acks");
        if let Some(entry) = self.lines.get_mut(&line) {
            entry.pending = pending;
        }
        Ok(())
    }

    /// Reads the line and sends it to the active requester, then starts the next one.
    fn respond(&mut self, line: Addr, sched: &mut Scheduler) -> SimResult<()> {
        let Some((child, want)) = self.lines.get(&line).and_then(|entry| entry.active) else {
            return Err(self.violation(line, "response without an active request"));
        };
        let data = self.backend.fetch(line)?;
        self.stats.reads += 1;
        let delay = self.response_delay(sched.now(), line);
        let (link, may_own) = self.child_port(child)?;
        let Some(entry) = self.lines.get_mut(&line) else {
            return Err(self.violation(line, "line vanished while responding"));
        };
        let grant = entry.sharers.grant(child, want, may_own);
        entry.active = None;
        trace!(line, child, ?grant, delay, "memory grant");
        sched.send_after(link, delay, Message::Data { addr: line, data, grant })?;

        if let Some((next, next_want)) = self.lines.get_mut(&line).and_then(|entry| entry.queue.pop_front()) {
            return self.start(line, next, next_want, sched);
        }
        Ok(())
    }

    fn on_writeback(&mut self, line: Addr, child: usize, data: Option<&Block>) -> SimResult<()> {
        let sharers = self.sharers(line);
        if let Some(data) = data {
            if sharers.owner() != Some(child) {
                return Err(self.violation(line, format!("PutM from non-owner port {child}")));
            }
            self.backend.store(line, data)?;
            self.stats.writes += 1;
        }
        if let Some(entry) = self.lines.get_mut(&line) {
            entry.sharers.remove(child);
            if entry.idle() {
                let _ = self.lines.remove(&line);
            }
        }
        Ok(())
    }

    fn on_ack(
        &mut self,
        line: Addr,
        child: usize,
        data: Option<Block>,
        downgrade: bool,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        let bit = 1u64 << child;
        let pending = self.lines.get(&line).map_or(0, |entry| entry.pending);
        if pending & bit == 0 {
            return Err(self.violation(line, format!("unexpected ack from port {child}")));
        }
        if let Some(data) = &data {
            self.backend.store(line, data)?;
            self.stats.writes += 1;
        }
        let Some(entry) = self.lines.get_mut(&line) else {
            return Err(self.violation(line, "ack for an untracked line"));
        };
        entry.pending &= !bit;
        if downgrade {
            entry.sharers.downgrade();
        } else {
            entry.sharers.remove(child);
        }
        if entry.pending == 0 {
            return self.respond(line, sched);
        }
        Ok(())
    }
}
