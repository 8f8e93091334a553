//! CPU-side request port.
//!
//! A core port is the only entry point for workload traffic. It performs:
//! 1. **Validation:** Empty or over-long accesses and addresses outside the memory range are rejected at submission.
//! 2. **Splitting:** An access crossing a line boundary becomes two line requests sharing one id.
//! 3. **Merging:** Partial responses are reassembled by offset; the request completes when the last part returns.
//! 4. **Completion channel:** Finished requests are posted as [`Completion`]s for the caller to drain.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace};

use crate::common::{
    Addr, CacheRequest, CacheResponse, LineGeometry, RequestId, RequestKind, ResponseKind,
    SimError, SimResult, Tick,
};
use crate::sim::event::{Payload, Scheduler};
use crate::soc::interconnect::{LinkId, Port};
use crate::soc::message::Message;
use crate::stats::CoreStats;

/// A finished request as observed by the issuing core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    /// Id returned by submission.
    pub id: RequestId,
    /// Issuing core.
    pub core: usize,
    /// First byte of the original access.
    pub addr: Addr,
    /// Merged result.
    pub response: ResponseKind,
    /// Time the request entered the port.
    pub issued_at: Tick,
    /// Time the last response part reached the port.
    pub completed_at: Tick,
}

impl Completion {
    /// End-to-end latency in picoseconds.
    pub const fn latency(&self) -> Tick {
        self.completed_at.saturating_sub(self.issued_at)
    }

    /// Bytes returned by a read, `None` otherwise.
    pub fn data(&self) -> Option<&[u8]> {
        match &self.response {
            ResponseKind::Data(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    addr: Addr,
    issued_at: Tick,
    parts_left: u8,
    response: ResponseKind,
}

/// Request port of one core, attached to that core's L1.
#[derive(Debug)]
pub struct CorePort {
    core: usize,
    geometry: LineGeometry,
    range: (Addr, Addr),
    link: Option<LinkId>,
    inflight: HashMap<RequestId, InFlight>,
    completions: VecDeque<Completion>,
    stats: CoreStats,
}

impl CorePort {
    /// Creates an unconnected port for `core`.
    ///
    /// `range` is the inclusive span served by the memory controller.
    pub fn new(core: usize, geometry: LineGeometry, range: (Addr, Addr)) -> Self {
        Self {
            core,
            geometry,
            range,
            link: None,
            inflight: HashMap::new(),
            completions: VecDeque::new(),
            stats: CoreStats::default(),
        }
    }

    /// Attaches the link toward the L1.
    pub const fn attach(&mut self, link: LinkId) {
        self.link = Some(link);
    }

    /// Core index.
    pub const fn core(&self) -> usize {
        self.core
    }

    /// Counters.
    pub const fn stats(&self) -> &CoreStats {
        &self.stats
    }

    /// Requests submitted but not yet completed.
    pub fn outstanding(&self) -> usize {
        self.inflight.len()
    }

    /// Removes and returns every posted completion, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = Completion> + '_ {
        self.completions.drain(..)
    }

    /// Accepts a request and sends it (or its two halves) to the L1 now.
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier the completion will carry.
    /// * `addr` - First byte touched.
    /// * `kind` - Operation.
    /// * `sched` - Scheduler used to send the line requests.
    ///
    /// # Errors
    ///
    /// [`SimError::AddressRange`] if any touched byte is outside the memory range,
    /// [`SimError::InvalidRequest`] for an empty access or one longer than a line.
    pub fn submit(
        &mut self,
        id: RequestId,
        addr: Addr,
        kind: RequestKind,
        sched: &mut Scheduler,
    ) -> SimResult<()> {
        let len = kind.len();
        if kind.is_empty() || len > self.geometry.line_len() {
            return Err(SimError::InvalidRequest(format!(
                "{} of {len} bytes at {addr:#x} (line is {} bytes)",
                kind.mnemonic(),
                self.geometry.line_bytes()
            )));
        }
        self.check_range(addr, len)?;
        let link = self
            .link
            .ok_or_else(|| SimError::config(format!("core {} is not attached", self.core)))?;

        self.stats.requests += 1;
        match &kind {
            RequestKind::Read { .. } => self.stats.reads += 1,
            RequestKind::Write { .. } => self.stats.writes += 1,
            RequestKind::Invalidate => self.stats.invalidates += 1,
        }

        let now = sched.now();
        let parts = self.split(addr, kind);
        let response = match &parts[0].1 {
            RequestKind::Read { .. } => ResponseKind::Data(vec![0; len]),
            RequestKind::Write { .. } => ResponseKind::WriteAck,
            RequestKind::Invalidate => ResponseKind::InvalidateAck,
        };
        if parts.len() > 1 {
            self.stats.split += 1;
            debug!(core = self.core, id, addr, len, "split line-crossing access");
        }
        let _ = self.inflight.insert(id, InFlight {
            addr,
            issued_at: now,
            parts_left: parts.len() as u8,
            response,
        });
        for (part_addr, part_kind) in parts {
            let request = CacheRequest {
                id,
                addr: part_addr,
                kind: part_kind,
                source: self.core,
                issued_at: now,
            };
            sched.send(link, Message::Request(request))?;
        }
        Ok(())
    }

    fn check_range(&self, addr: Addr, len: usize) -> SimResult<()> {
        let (start, end) = self.range;
        let last = addr.checked_add(len as u64 - 1);
        match last {
            Some(last) if addr >= start && last <= end => Ok(()),
            _ => Err(SimError::AddressRange {
                addr: if addr < start { addr } else { last.unwrap_or(u64::MAX) },
                start,
                end,
            }),
        }
    }

    /// Cuts an access at the line boundary it crosses, if any.
    fn split(&self, addr: Addr, kind: RequestKind) -> Vec<(Addr, RequestKind)> {
        if !self.geometry.crosses(addr, kind.len()) {
            return vec![(addr, kind)];
        }
        let head = self.geometry.line_len() - self.geometry.offset(addr);
        let second = self.geometry.base(addr) + self.geometry.line_bytes();
        match kind {
            RequestKind::Read { size } => vec![
                (addr, RequestKind::Read { size: head }),
                (second, RequestKind::Read { size: size - head }),
            ],
            RequestKind::Write { mut bytes } => {
                let tail = bytes.split_off(head);
                vec![
                    (addr, RequestKind::Write { bytes }),
                    (second, RequestKind::Write { bytes: tail }),
                ]
            }
            RequestKind::Invalidate => vec![(addr, RequestKind::Invalidate)],
        }
    }

    /// Handles one delivered event.
    ///
    /// # Errors
    ///
    /// [`SimError::ProtocolViolation`] for a response nobody asked for.
    pub fn handle(&mut self, port: Port, payload: Payload, sched: &mut Scheduler) -> SimResult<()> {
        match (port, payload) {
            (Port::Lower, Payload::Message(Message::Response(resp))) => {
                self.on_response(resp, sched.now())
            }
            (_, Payload::Retry) => Ok(()),
            (_, Payload::Message(msg)) => Err(SimError::violation(
                &format!("core{}", self.core),
                msg.addr(),
                format!("unexpected {} at core port", msg.name()),
            )),
        }
    }

    fn on_response(&mut self, resp: CacheResponse, now: Tick) -> SimResult<()> {
        let Some(entry) = self.inflight.get_mut(&resp.id) else {
            return Err(SimError::violation(
                &format!("core{}", self.core),
                resp.addr,
                format!("response for unknown request {}", resp.id),
            ));
        };
        if let (ResponseKind::Data(merged), ResponseKind::Data(part)) =
            (&mut entry.response, &resp.kind)
        {
            let at = resp.addr.saturating_sub(entry.addr) as usize;
            if let Some(dst) = merged.get_mut(at..at + part.len()) {
                dst.copy_from_slice(part);
            }
        }
        entry.parts_left = entry.parts_left.saturating_sub(1);
        trace!(core = self.core, id = resp.id, left = entry.parts_left, "response part");
        if entry.parts_left > 0 {
            return Ok(());
        }

        let Some(done) = self.inflight.remove(&resp.id) else {
            return Ok(());
        };
        let completion = Completion {
            id: resp.id,
            core: self.core,
            addr: done.addr,
            response: done.response,
            issued_at: done.issued_at,
            completed_at: now,
        };
        let latency = completion.latency();
        self.stats.completed += 1;
        self.stats.total_latency += latency;
        self.stats.max_latency = self.stats.max_latency.max(latency);
        self.completions.push_back(completion);
        Ok(())
    }
}
