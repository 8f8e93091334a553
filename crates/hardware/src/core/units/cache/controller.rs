//! Per-level cache controller.
//!
//! A controller wraps a [`BlockStore`] and speaks two roles at once: it is a
//! *requester* toward its parent (next level or memory) and a *home* toward its
//! children (the core port for an L1, upper-level caches otherwise).
//!
//! Every state change happens when a message is received; latencies only delay
//! the messages a handler sends. Work on a line is serialized: while a line has
//! an active transaction, an outstanding acknowledgement collection, or a
//! stalled request, new demands for it wait in a per-line queue. Writebacks
//! from children and recalls from the parent bypass that queue.
//!
//! Flow of a demand:
//! 1. **Hit:** permission suffices → child conflicts are resolved (Inv/Downgrade) → respond after the hit latency.
//! 2. **Upgrade:** S held, write wanted → `GetX` to the parent, the way is kept.
//! 3. **Miss:** an MSHR and a way are claimed; a victim still held by children is recalled first,
//!    otherwise it is written back (`PutM`/`PutClean`). Then `GetS`/`GetX` goes to the parent.
//! 4. **Fill:** data arrives → installed in the granted state → conflicts resolved → respond.
//!
//! Without a free MSHR or way the demand is parked on its line and retried on
//! the next cache cycle.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace, warn};

use super::{Allocation, BlockStore};
use crate::common::{
    Addr, CacheRequest, CacheResponse, LineGeometry, RequestKind, ResponseKind, SimError,
    SimResult, Tick,
};
use crate::config::{CacheConfig, SystemConfig};
use crate::core::units::coherence::{CoherenceProtocol, Grant, MesiState, Want};
use crate::core::units::prefetch::{self, Prefetcher};
use crate::sim::event::{Payload, Scheduler};
use crate::soc::interconnect::{LinkId, NodeId, Port};
use crate::soc::message::{Block, Message};
use crate::stats::CacheStats;

/// Prefetch streams of child caches are keyed apart from core ids.
const CHILD_STREAM: u64 = 1 << 32;

/// A request waiting for, or being served on, a line.
#[derive(Clone, Debug)]
enum Demand {
    /// Load, store or invalidate from the core port (L1 only).
    Core(CacheRequest),
    /// `GetS`/`GetX` from a child cache.
    Child { port: usize, want: Want },
    /// Speculative fill; never queued.
    Prefetch,
}

impl Demand {
    const fn want(&self) -> Want {
        match self {
            Self::Core(req) if req.kind.is_write() => Want::Exclusive,
            Self::Child { want, .. } => *want,
            Self::Core(_) | Self::Prefetch => Want::Shared,
        }
    }

    const fn requester(&self) -> Option<usize> {
        match self {
            Self::Child { port, .. } => Some(*port),
            Self::Core(_) | Self::Prefetch => None,
        }
    }
}

/// Where an active transaction is waiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// A victim in `slot` is being recalled from children.
    Victim { slot: usize },
    /// `GetS`/`GetX` sent to the parent.
    Parent,
    /// Acks from conflicting children are being collected.
    Children,
}

#[derive(Clone, Debug)]
struct Txn {
    demand: Demand,
    phase: Phase,
}

/// A recall requested by the parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Recall {
    Inv,
    Downgrade,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Purpose {
    /// Conflicts of the line's own transaction.
    Serve,
    /// The line is being evicted to make room for `for_line`.
    Evict { for_line: Addr },
    /// The parent asked for the line back.
    Recall(Recall),
}

#[derive(Clone, Copy, Debug)]
struct Collect {
    pending: u64,
    purpose: Purpose,
}

/// Per-line control state; absent for idle lines.
#[derive(Debug, Default)]
struct LineCtl {
    txn: Option<Txn>,
    queue: VecDeque<Demand>,
    collect: Option<Collect>,
    deferred: Option<Recall>,
    stalled: bool,
}

impl LineCtl {
    /// New demands must wait.
    const fn busy(&self) -> bool {
        self.txn.is_some() || self.collect.is_some() || self.stalled
    }

    fn idle(&self) -> bool {
        !self.busy() && self.queue.is_empty() && self.deferred.is_none()
    }
}

/// Who sits above this cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Upper {
    Core,
    Caches,
}

/// One cache instance: store, coherence engine, MSHRs and prefetcher.
#[derive(Debug)]
pub struct CacheController {
    name: String,
    node: NodeId,
    store: BlockStore,
    geometry: LineGeometry,
    period: Tick,
    hit_latency: Tick,
    protocol: CoherenceProtocol,
    mshrs: usize,
    mshrs_in_use: usize,
    prefetcher: Option<Box<dyn Prefetcher>>,
    range: (Addr, Addr),
    upper: Upper,
    up_links: Vec<LinkId>,
    child_exclusive: Vec<bool>,
    down_link: Option<LinkId>,
    lines: HashMap<Addr, LineCtl>,
    stalled: Vec<Addr>,
    retry_scheduled: bool,
    stats: CacheStats,
}

impl CacheController {
    /// Creates an unconnected cache for `config`.
    ///
    /// # Arguments
    ///
    /// * `name` - Instance name used in logs and statistics.
    /// * `node` - Scheduler node id of this instance.
    /// * `config` - Validated level configuration.
    /// * `system` - System parameters (clock used when the level sets none).
    /// * `geometry` - Line arithmetic shared by the hierarchy.
    /// * `range` - Inclusive memory range; prefetches outside it are dropped.
    pub fn new(
        name: impl Into<String>,
        node: NodeId,
        config: &CacheConfig,
        system: &SystemConfig,
        geometry: LineGeometry,
        range: (Addr, Addr),
    ) -> Self {
        let clock = config.frequency(system);
        Self {
            name: name.into(),
            node,
            store: BlockStore::new(config, geometry),
            geometry,
            period: clock.period(),
            hit_latency: clock.cycles(config.access_latency_cycles),
            protocol: config.coherence_protocol,
            mshrs: config.mshrs.max(1),
            mshrs_in_use: 0,
            prefetcher: prefetch::build(config),
            range,
            upper: Upper::Caches,
            up_links: Vec::new(),
            child_exclusive: Vec::new(),
            down_link: None,
            lines: HashMap::new(),
            stalled: Vec::new(),
            retry_scheduled: false,
            stats: CacheStats::default(),
        }
    }

    /// Attaches the core port that feeds this L1 as upper port 0.
    pub fn attach_core(&mut self, link: LinkId) {
        self.upper = Upper::Core;
        self.up_links = vec![link];
        self.child_exclusive = vec![false];
    }

    /// Attaches a child cache; returns its upper port index.
    ///
    /// `accepts_exclusive` is false for children running MSI.
    pub fn attach_child(&mut self, link: LinkId, accepts_exclusive: bool) -> usize {
        self.upper = Upper::Caches;
        self.up_links.push(link);
        self.child_exclusive.push(accepts_exclusive);
        self.up_links.len() - 1
    }

    /// Attaches the link toward the parent.
    pub const fn attach_parent(&mut self, link: LinkId) {
        self.down_link = Some(link);
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Coherence protocol this cache runs.
    pub const fn protocol(&self) -> CoherenceProtocol {
        self.protocol
    }

    /// The underlying store.
    pub const fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Counters.
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// MSHRs currently allocated.
    pub const fn mshrs_in_use(&self) -> usize {
        self.mshrs_in_use
    }

    /// State of `addr`'s line in this cache.
    pub fn state_of(&self, addr: Addr) -> MesiState {
        self.store.state_of(self.geometry.base(addr))
    }

    /// True when no line has work in progress.
    pub fn quiescent(&self) -> bool {
        self.lines.is_empty() && self.mshrs_in_use == 0
    }

    fn violation(&self, addr: Addr, detail: impl Into<String>) -> SimError {
        SimError::violation(&self.name, addr, detail)
    }

    fn parent(&self) -> SimResult<LinkId> {
        self.down_link
            .ok_or_else(|| SimError::config(format!("cache {} has no parent link", self.name)))
    }

    fn child_link(&self, port: usize) -> SimResult<LinkId> {
        self.child_port(port).map(|(link, _)| link)
    }

    /// Link and exclusive-grant capability of upper port `port`.
    fn child_port(&self, port: usize) -> SimResult<(LinkId, bool)> {
        match (self.up_links.get(port), self.child_exclusive.get(port)) {
            (Some(&link), Some(&accepts)) => Ok((link, accepts)),
            _ => Err(SimError::config(format!("cache {} has no upper port {port}", self.name))),
        }
    }

    /// Handles one delivered event.
    ///
    /// # Errors
    ///
    /// [`SimError::ProtocolViolation`] for impossible coherence observations and
    /// [`SimError::InvalidRequest`] for a core request that crosses a line.
    pub fn handle(&mut self, port: Port, payload: Payload, sched: &mut Scheduler) -> SimResult<()> {
        let msg = match payload {
            Payload::Retry => return self.on_retry(sched),
            Payload::Message(msg) => msg,
        };
        trace!(cache = %self.name, ?port, msg = msg.name(), addr = msg.addr(), "receive");
        let line = self.geometry.base(msg.addr());
        match (port, msg) {
            (Port::Upper(0), Message::Request(req)) if self.upper == Upper::Core => {
                self.on_core_request(req, sched)
            }
            (Port::Upper(child), Message::GetS { .. }) => {
                self.on_child_get(child, line, Want::Shared, sched)
            }
            (Port::Upper(child), Message::GetX { .. }) => {
                self.on_child_get(child, line, Want::Exclusive, sched)
            }
            (Port::Upper(child), Message::PutM { data, .. }) => {
                self.on_writeback(child, line, Some(data))
            }
            (Port::Upper(child), Message::PutClean { .. }) => self.on_writeback(child, line, None),
            (Port::Upper(child), Message::InvAck { data, .. }) => {
                self.on_ack(child, line, data, Recall::Inv, sched)
            }
            (Port::Upper(child), Message::DowngradeAck { data, .. }) => {
                self.on_ack(child, line, data, Recall::Downgrade, sched)
            }
            (Port::Lower, Message::Data { data, grant, .. }) => {
                self.on_data(line, &data, grant, sched)
            }
            (Port::Lower, Message::Inv { .. }) => self.on_recall(line, Recall::Inv, sched),
            (Port::Lower, Message::Downgrade { .. }) => {
                self.on_recall(line, Recall::Downgrade, sched)
            }
            (port, msg) => Err(self.violation(
                line,
                format!("unexpected {} on port {port:?}", msg.name()),
            )),
        }
    }

    // ═══════════════════════════════════════════════════════════
    //  Demand intake
    // ═══════════════════════════════════════════════════════════

    fn on_core_request(&mut self, req: CacheRequest, sched: &mut Scheduler) -> SimResult<()> {
        if req.kind.is_empty() || self.geometry.crosses(req.addr, req.kind.len()) {
            return Err(SimError::InvalidRequest(format!(
                "{} request at {:#x} of {} bytes does not fit one line",
                req.kind.mnemonic(),
                req.addr,
                req.kind.len()
            )));
        }
        let line = self.geometry.base(req.addr);
        let candidates = if matches!(req.kind, RequestKind::Invalidate) {
            Vec::new()
        } else {
            self.observe(req.source as u64, line)
        };
        self.enqueue(line, Demand::Core(req), sched)?;
        self.issue_prefetches(candidates, sched)
    }

    fn on_child_get(
        &mut self,
        port: usize,
        line: Addr,
        want: Want,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        let candidates = self.observe(CHILD_STREAM | port as u64, line);
        self.enqueue(line, Demand::Child { port, want }, sched)?;
        self.issue_prefetches(candidates, sched)
    }

    fn enqueue(&mut self, line: Addr, demand: Demand, sched: &mut Scheduler) -> SimResult<()> {
        let ctl = self.lines.entry(line).or_default();
        if ctl.busy() || !ctl.queue.is_empty() {
            ctl.queue.push_back(demand);
            return Ok(());
        }
        self.start(line, demand, sched)?;
        self.tidy(line);
        Ok(())
    }

    /// Starts queued demands of `line` until one blocks.
    fn pump(&mut self, line: Addr, sched: &mut Scheduler) -> SimResult<()> {
        loop {
            let Some(ctl) = self.lines.get_mut(&line) else {
                return Ok(());
            };
            if ctl.busy() {
                break;
            }
            let Some(demand) = ctl.queue.pop_front() else {
                break;
            };
            self.start(line, demand, sched)?;
        }
        self.tidy(line);
        Ok(())
    }

    fn tidy(&mut self, line: Addr) {
        if self.lines.get(&line).is_some_and(LineCtl::idle) {
            let _ = self.lines.remove(&line);
        }
    }

    fn stall(&mut self, line: Addr, demand: Demand, sched: &mut Scheduler) {
        self.stats.stalls += 1;
        let ctl = self.lines.entry(line).or_default();
        ctl.queue.push_front(demand);
        ctl.stalled = true;
        self.stalled.push(line);
        if !self.retry_scheduled {
            self.retry_scheduled = true;
            sched.wake(self.node, self.period);
        }
        trace!(cache = %self.name, line, mshrs = self.mshrs_in_use, "stall");
    }

    fn on_retry(&mut self, sched: &mut Scheduler) -> SimResult<()> {
        self.retry_scheduled = false;
        for line in std::mem::take(&mut self.stalled) {
            if let Some(ctl) = self.lines.get_mut(&line) {
                ctl.stalled = false;
            }
            self.pump(line, sched)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    //  Transactions
    // ═══════════════════════════════════════════════════════════

    fn start(&mut self, line: Addr, demand: Demand, sched: &mut Scheduler) -> SimResult<()> {
        if let Demand::Core(req) = &demand
            && matches!(req.kind, RequestKind::Invalidate)
        {
            return self.invalidate_request(line, req, sched);
        }

        let want = demand.want();
        if let Some(slot) = self.store.lookup(line) {
            let state = self.store.line(slot).state;
            if state.satisfies(want) {
                self.stats.hits += 1;
                self.note_demand_use(slot);
                self.store.touch(slot);
                self.set_txn(line, demand, Phase::Children);
                return self.serve(line, slot, self.hit_latency, sched);
            }
            if self.mshrs_in_use >= self.mshrs {
                self.stall(line, demand, sched);
                return Ok(());
            }
            self.stats.upgrades += 1;
            self.note_demand_use(slot);
            self.store.touch(slot);
            self.mshrs_in_use += 1;
            debug!(cache = %self.name, line, "upgrade S->M");
            sched.send_after(self.parent()?, self.hit_latency, Message::GetX { addr: line })?;
            self.set_txn(line, demand, Phase::Parent);
            return Ok(());
        }

        if self.mshrs_in_use >= self.mshrs {
            self.stall(line, demand, sched);
            return Ok(());
        }
        let lines = &self.lines;
        let allocation = self
            .store
            .allocate(line, |addr| lines.get(&addr).is_some_and(|ctl| !ctl.idle()));
        match allocation {
            Allocation::Blocked => {
                self.stall(line, demand, sched);
                Ok(())
            }
            Allocation::Free(slot) => {
                self.stats.misses += 1;
                self.mshrs_in_use += 1;
                self.request_line(line, slot, want, self.hit_latency, sched)?;
                self.set_txn(line, demand, Phase::Parent);
                Ok(())
            }
            Allocation::Evict { slot, victim } => {
                self.stats.misses += 1;
                self.mshrs_in_use += 1;
                let holders = self.store.line(slot).sharers;
                if holders.is_empty() {
                    self.evict(slot, victim, sched)?;
                    self.request_line(line, slot, want, self.hit_latency, sched)?;
                    self.set_txn(line, demand, Phase::Parent);
                    return Ok(());
                }
                debug!(cache = %self.name, victim, holders = holders.mask(), "recall victim");
                for port in holders.holders() {
                    sched.send_after(self.child_link(port)?, self.hit_latency, Message::Inv {
                        addr: victim,
                    })?;
                }
                self.lines.entry(victim).or_default().collect = Some(Collect {
                    pending: holders.mask(),
                    purpose: Purpose::Evict { for_line: line },
                });
                self.set_txn(line, demand, Phase::Victim { slot });
                Ok(())
            }
        }
    }

    fn set_txn(&mut self, line: Addr, demand: Demand, phase: Phase) {
        self.lines.entry(line).or_default().txn = Some(Txn { demand, phase });
    }

    fn set_phase(&mut self, line: Addr, phase: Phase) {
        if let Some(txn) = self.lines.get_mut(&line).and_then(|ctl| ctl.txn.as_mut()) {
            txn.phase = phase;
        }
    }

    /// Counts the first demand touch of a prefetched line.
    fn note_demand_use(&mut self, slot: usize) {
        let entry = self.store.line_mut(slot);
        if entry.prefetched {
            entry.prefetched = false;
            self.stats.prefetch_used += 1;
        }
    }

    /// Claims `slot` for `line` and asks the parent for it.
    fn request_line(
        &mut self,
        line: Addr,
        slot: usize,
        want: Want,
        delay: Tick,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        self.store.reserve(slot, line);
        let msg = match want {
            Want::Shared => Message::GetS { addr: line },
            Want::Exclusive => Message::GetX { addr: line },
        };
        sched.send_after(self.parent()?, delay, msg)
    }

    /// Drops a victim with no child copies, writing it back if dirty.
    fn evict(&mut self, slot: usize, victim: Addr, sched: &mut Scheduler) -> SimResult<()> {
        self.stats.evictions += 1;
        debug!(cache = %self.name, victim, state = %self.store.line(slot).state.letter(), "evict");
        self.write_back(slot, victim, sched)
    }

    fn write_back(&mut self, slot: usize, addr: Addr, sched: &mut Scheduler) -> SimResult<()> {
        let entry = self.store.line(slot);
        let msg = if entry.state.is_dirty() {
            self.stats.writebacks += 1;
            Message::PutM {
                addr,
                data: entry.data.clone(),
            }
        } else {
            Message::PutClean { addr }
        };
        self.store.invalidate(slot, false);
        sched.send(self.parent()?, msg)
    }

    /// Resolves child conflicts of the line's transaction, then completes it.
    fn serve(&mut self, line: Addr, slot: usize, delay: Tick, sched: &mut Scheduler) -> SimResult<()> {
        let Some(demand) = self
            .lines
            .get(&line)
            .and_then(|ctl| ctl.txn.as_ref())
            .map(|txn| txn.demand.clone())
        else {
            return Err(self.violation(line, "serve without a transaction"));
        };
        let want = demand.want();
        let conflicts = self
            .store
            .line(slot)
            .sharers
            .conflicts(demand.requester(), want);
        if conflicts.is_empty() {
            return self.complete(line, slot, demand, delay, sched);
        }

        let mut pending = 0u64;
        for port in conflicts {
            let msg = match want {
                Want::Shared => Message::Downgrade { addr: line },
                Want::Exclusive => Message::Inv { addr: line },
            };
            sched.send_after(self.child_link(port)?, delay, msg)?;
            pending |= 1 << port;
        }
        debug!(cache = %self.name, line, pending, ?want, "collect child acks");
        let ctl = self.lines.entry(line).or_default();
        ctl.collect = Some(Collect {
            pending,
            purpose: Purpose::Serve,
        });
        self.set_phase(line, Phase::Children);
        Ok(())
    }

    /// Performs the demand on a line that now has the needed permission.
    fn complete(
        &mut self,
        line: Addr,
        slot: usize,
        demand: Demand,
        delay: Tick,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        match demand {
            Demand::Core(req) => {
                let offset = self.geometry.offset(req.addr);
                let entry = self.store.line_mut(slot);
                let kind = match req.kind {
                    RequestKind::Read { size } => {
                        ResponseKind::Data(entry.data[offset..offset + size].to_vec())
                    }
                    RequestKind::Write { bytes } => {
                        entry.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
                        entry.state = MesiState::Modified;
                        ResponseKind::WriteAck
                    }
                    RequestKind::Invalidate => ResponseKind::InvalidateAck,
                };
                let response = CacheResponse {
                    id: req.id,
                    addr: req.addr,
                    kind,
                };
                sched.send_after(self.child_link(0)?, delay, Message::Response(response))?;
            }
            Demand::Child { port, want } => {
                let (link, accepts) = self.child_port(port)?;
                let entry = self.store.line_mut(slot);
                let may_own =
                    accepts && self.protocol.allows_exclusive() && entry.state.can_write();
                let grant = entry.sharers.grant(port, want, may_own);
                let data = entry.data.clone();
                trace!(cache = %self.name, line, port, ?grant, "grant");
                sched.send_after(link, delay, Message::Data {
                    addr: line,
                    data,
                    grant,
                })?;
            }
            Demand::Prefetch => {}
        }
        self.finish(line, sched)
    }

    /// Closes the line's transaction and runs a recall deferred behind it.
    fn finish(&mut self, line: Addr, sched: &mut Scheduler) -> SimResult<()> {
        let Some(ctl) = self.lines.get_mut(&line) else {
            return Ok(());
        };
        ctl.txn = None;
        if let Some(kind) = ctl.deferred.take() {
            self.recall(line, kind, sched)?;
        }
        Ok(())
    }

    /// Core-requested invalidation: drop the line here, ack regardless.
    fn invalidate_request(
        &mut self,
        line: Addr,
        req: &CacheRequest,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        if let Some(slot) = self.store.lookup(line) {
            self.stats.invalidations += 1;
            debug!(cache = %self.name, line, "invalidate on request");
            self.write_back(slot, line, sched)?;
        }
        self.stats.invalidation_acks += 1;
        let response = CacheResponse {
            id: req.id,
            addr: req.addr,
            kind: ResponseKind::InvalidateAck,
        };
        sched.send_after(self.child_link(0)?, self.hit_latency, Message::Response(response))
    }

    // ═══════════════════════════════════════════════════════════
    //  Messages from the parent
    // ═══════════════════════════════════════════════════════════

    fn on_data(
        &mut self,
        line: Addr,
        data: &[u8],
        grant: Grant,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        let awaiting = self
            .lines
            .get(&line)
            .and_then(|ctl| ctl.txn.as_ref())
            .is_some_and(|txn| txn.phase == Phase::Parent);
        if !awaiting {
            return Err(self.violation(line, "data without an outstanding miss"));
        }
        if grant == Grant::Exclusive && !self.protocol.allows_exclusive() {
            return Err(self.violation(line, "exclusive grant to an MSI cache"));
        }
        let Some(slot) = self.store.find(line) else {
            return Err(self.violation(line, "data for a line with no reserved way"));
        };
        self.store.fill(slot, data, grant.state());
        self.mshrs_in_use = self.mshrs_in_use.saturating_sub(1);
        debug!(cache = %self.name, line, state = %grant.state().letter(), "fill");

        let is_prefetch = self
            .lines
            .get(&line)
            .and_then(|ctl| ctl.txn.as_ref())
            .is_some_and(|txn| matches!(txn.demand, Demand::Prefetch));
        if is_prefetch {
            self.store.line_mut(slot).prefetched = true;
            self.finish(line, sched)?;
        } else {
            self.serve(line, slot, 0, sched)?;
        }
        self.pump(line, sched)
    }

    fn on_recall(&mut self, line: Addr, kind: Recall, sched: &mut Scheduler) -> SimResult<()> {
        let ctl = self.lines.entry(line).or_default();
        if ctl.collect.is_some() {
            if ctl.deferred.is_some() {
                return Err(self.violation(line, "second recall while one is deferred"));
            }
            trace!(cache = %self.name, line, ?kind, "recall deferred");
            ctl.deferred = Some(kind);
            return Ok(());
        }
        self.recall(line, kind, sched)?;
        self.tidy(line);
        Ok(())
    }

    /// Recalls the line from children (if needed), then acks the parent.
    fn recall(&mut self, line: Addr, kind: Recall, sched: &mut Scheduler) -> SimResult<()> {
        let Some(slot) = self.store.lookup(line) else {
            return self.ack_parent(line, kind, None, sched);
        };
        let sharers = self.store.line(slot).sharers;
        let targets: Vec<usize> = match kind {
            Recall::Inv => sharers.holders().collect(),
            Recall::Downgrade => sharers.owner().into_iter().collect(),
        };
        if targets.is_empty() {
            return self.finish_recall(line, slot, kind, sched);
        }
        let mut pending = 0u64;
        for port in targets {
            let msg = match kind {
                Recall::Inv => Message::Inv { addr: line },
                Recall::Downgrade => Message::Downgrade { addr: line },
            };
            sched.send_after(self.child_link(port)?, self.hit_latency, msg)?;
            pending |= 1 << port;
        }
        self.lines.entry(line).or_default().collect = Some(Collect {
            pending,
            purpose: Purpose::Recall(kind),
        });
        Ok(())
    }

    fn finish_recall(
        &mut self,
        line: Addr,
        slot: usize,
        kind: Recall,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        let entry = self.store.line(slot);
        let data = entry.state.is_dirty().then(|| entry.data.clone());
        match kind {
            Recall::Inv => {
                let upgrading = self
                    .lines
                    .get(&line)
                    .and_then(|ctl| ctl.txn.as_ref())
                    .is_some_and(|txn| txn.phase == Phase::Parent);
                self.store.invalidate(slot, upgrading);
                self.stats.invalidations += 1;
                debug!(cache = %self.name, line, dirty = data.is_some(), "invalidated by parent");
            }
            Recall::Downgrade => {
                let entry = self.store.line_mut(slot);
                if entry.state.can_write() {
                    entry.state = MesiState::Shared;
                    self.stats.downgrades += 1;
                    debug!(cache = %self.name, line, dirty = data.is_some(), "downgraded to S");
                }
            }
        }
        self.ack_parent(line, kind, data, sched)
    }

    fn ack_parent(
        &mut self,
        line: Addr,
        kind: Recall,
        data: Option<Block>,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        let msg = match kind {
            Recall::Inv => {
                self.stats.invalidation_acks += 1;
                Message::InvAck { addr: line, data }
            }
            Recall::Downgrade => Message::DowngradeAck { addr: line, data },
        };
        sched.send_after(self.parent()?, self.hit_latency, msg)
    }

    // ═══════════════════════════════════════════════════════════
    //  Messages from children
    // ═══════════════════════════════════════════════════════════

    fn on_writeback(&mut self, port: usize, line: Addr, data: Option<Block>) -> SimResult<()> {
        let Some(slot) = self.store.lookup(line) else {
            if data.is_some() {
                return Err(self.violation(line, format!("PutM from port {port} for an absent line")));
            }
            warn!(cache = %self.name, line, port, "PutClean for an absent line");
            return Ok(());
        };
        let entry = self.store.line_mut(slot);
        match data {
            Some(data) => {
                if entry.sharers.owner() != Some(port) {
                    return Err(self.violation(line, format!("PutM from non-owner port {port}")));
                }
                let len = entry.data.len().min(data.len());
                entry.data[..len].copy_from_slice(&data[..len]);
                entry.state = MesiState::Modified;
            }
            None if !entry.sharers.contains(port) => {
                warn!(cache = %self.name, line, port, "PutClean from a non-holder");
            }
            None => {}
        }
        entry.sharers.remove(port);
        trace!(cache = %self.name, line, port, "child writeback");
        Ok(())
    }

    fn on_ack(
        &mut self,
        port: usize,
        line: Addr,
        data: Option<Block>,
        kind: Recall,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        let Some(collect) = self.lines.get_mut(&line).and_then(|ctl| ctl.collect.as_mut()) else {
            return Err(self.violation(line, "ack without a pending collection"));
        };
        let bit = 1u64 << port;
        if collect.pending & bit == 0 {
            return Err(self.violation(line, format!("unexpected ack from port {port}")));
        }
        collect.pending &= !bit;
        let done = (collect.pending == 0).then_some(collect.purpose);

        let Some(slot) = self.store.lookup(line) else {
            return Err(self.violation(line, "ack for a line this home does not hold"));
        };
        let entry = self.store.line_mut(slot);
        match kind {
            Recall::Inv => entry.sharers.remove(port),
            Recall::Downgrade => entry.sharers.downgrade(),
        }
        if let Some(data) = data {
            let len = entry.data.len().min(data.len());
            entry.data[..len].copy_from_slice(&data[..len]);
            entry.state = MesiState::Modified;
        }

        let Some(purpose) = done else {
            return Ok(());
        };
        if let Some(ctl) = self.lines.get_mut(&line) {
            ctl.collect = None;
        }
        match purpose {
            Purpose::Serve => {
                let Some(demand) = self
                    .lines
                    .get(&line)
                    .and_then(|ctl| ctl.txn.as_ref())
                    .map(|txn| txn.demand.clone())
                else {
                    return Err(self.violation(line, "collection finished without a transaction"));
                };
                self.complete(line, slot, demand, 0, sched)?;
            }
            Purpose::Evict { for_line } => self.finish_evict(line, slot, for_line, sched)?,
            Purpose::Recall(kind) => self.finish_recall(line, slot, kind, sched)?,
        }
        self.pump(line, sched)
    }

    /// The victim is free of child copies: drop it and resume the miss that needed its way.
    fn finish_evict(
        &mut self,
        victim: Addr,
        slot: usize,
        for_line: Addr,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        self.evict(slot, victim, sched)?;
        let Some(txn) = self.lines.get(&for_line).and_then(|ctl| ctl.txn.as_ref()) else {
            return Err(self.violation(for_line, "victim recalled for a vanished miss"));
        };
        if txn.phase != (Phase::Victim { slot }) {
            return Err(self.violation(for_line, "victim recalled for a miss in another phase"));
        }
        let want = txn.demand.want();
        self.request_line(for_line, slot, want, 0, sched)?;
        self.set_phase(for_line, Phase::Parent);

        if let Some(kind) = self.lines.get_mut(&victim).and_then(|ctl| ctl.deferred.take()) {
            self.recall(victim, kind, sched)?;
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════
    //  Prefetching
    // ═══════════════════════════════════════════════════════════

    fn observe(&mut self, stream: u64, line: Addr) -> Vec<u64> {
        let hit = self.store.lookup(line).is_some();
        let index = self.geometry.line_index(line);
        self.prefetcher
            .as_mut()
            .map(|p| p.observe(stream, index, hit))
            .unwrap_or_default()
    }

    fn issue_prefetches(&mut self, candidates: Vec<u64>, sched: &mut Scheduler) -> SimResult<()> {
        for index in candidates {
            let line = self.geometry.line_addr(index);
            if self.try_prefetch(line, sched)? {
                self.stats.prefetch_issued += 1;
                trace!(cache = %self.name, line, "prefetch");
            } else {
                self.stats.prefetch_dropped += 1;
            }
        }
        Ok(())
    }

    /// Sends a prefetch fill for `line` unless it would wait, recall or evict a busy line.
    fn try_prefetch(&mut self, line: Addr, sched: &mut Scheduler) -> SimResult<bool> {
        if line < self.geometry.base(self.range.0) || line > self.range.1 {
            return Ok(false);
        }
        if self.store.find(line).is_some() || self.lines.contains_key(&line) {
            return Ok(false);
        }
        if self.mshrs_in_use >= self.mshrs {
            return Ok(false);
        }
        let lines = &self.lines;
        let slot = match self
            .store
            .allocate(line, |addr| lines.get(&addr).is_some_and(|ctl| !ctl.idle()))
        {
            Allocation::Free(slot) => slot,
            Allocation::Evict { slot, victim } if self.store.line(slot).sharers.is_empty() => {
                self.evict(slot, victim, sched)?;
                slot
            }
            Allocation::Evict { .. } | Allocation::Blocked => return Ok(false),
        };
        self.mshrs_in_use += 1;
        self.request_line(line, slot, Want::Shared, self.hit_latency, sched)?;
        self.set_txn(line, Demand::Prefetch, Phase::Parent);
        Ok(true)
    }
}
