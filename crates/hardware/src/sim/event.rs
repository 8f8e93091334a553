//! Discrete-event scheduler.
//!
//! The scheduler owns simulated time, the pending-event heap and the link
//! fabric. It is passed as `&mut Scheduler` to every component handler, so
//! there is no global state: a handler reacts to one delivered message and
//! schedules follow-up messages on links.
//!
//! Events are ordered by `(time, sequence)`; the sequence number is assigned at
//! submission, so simultaneous events run in the order they were scheduled.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::common::{SimError, SimResult, Tick};
use crate::soc::interconnect::{Interconnect, LinkId, NodeId, Port};
use crate::soc::message::Message;

/// What an event delivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// A message that travelled over a link.
    Message(Message),
    /// A component asked to be woken up (backpressure retry).
    Retry,
}

/// A scheduled delivery.
#[derive(Clone, Debug)]
pub struct Event {
    /// Delivery time.
    pub at: Tick,
    seq: u64,
    /// Receiving node.
    pub node: NodeId,
    /// Port it arrives on.
    pub port: Port,
    /// Contents.
    pub payload: Payload,
}

impl Event {
    /// Submission sequence number (tie-breaker at equal times).
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behaviour.
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

/// Simulated clock, event heap and link fabric.
#[derive(Debug)]
pub struct Scheduler {
    now: Tick,
    seq: u64,
    queue: BinaryHeap<Event>,
    fabric: Interconnect,
    delivered: u64,
}

impl Scheduler {
    /// Creates a scheduler at time zero over `fabric`.
    pub fn new(fabric: Interconnect) -> Self {
        Self {
            now: 0,
            seq: 0,
            queue: BinaryHeap::new(),
            fabric,
            delivered: 0,
        }
    }

    /// Current simulated time.
    pub const fn now(&self) -> Tick {
        self.now
    }

    /// Events delivered so far.
    pub const fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Events still pending.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Time of the next pending event.
    pub fn next_time(&self) -> Option<Tick> {
        self.queue.peek().map(|event| event.at)
    }

    /// The link fabric.
    pub const fn fabric(&self) -> &Interconnect {
        &self.fabric
    }

    fn push(&mut self, at: Tick, node: NodeId, port: Port, payload: Payload) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Event {
            at,
            seq,
            node,
            port,
            payload,
        });
    }

    /// Sends `msg` on `link` now; it arrives after the link latency.
    pub fn send(&mut self, link: LinkId, msg: Message) -> SimResult<()> {
        self.send_after(link, 0, msg)
    }

    /// Sends `msg` on `link` after a local processing `delay`.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] if `link` does not exist.
    pub fn send_after(&mut self, link: LinkId, delay: Tick, msg: Message) -> SimResult<()> {
        let depart = self.now.saturating_add(delay);
        let (node, port, at) = self
            .fabric
            .transfer(link, depart)
            .ok_or_else(|| SimError::config(format!("message sent on unknown link {link}")))?;
        trace!(link, at, msg = msg.name(), addr = msg.addr(), "send");
        self.push(at, node, port, Payload::Message(msg));
        Ok(())
    }

    /// Wakes `node` with [`Payload::Retry`] after `delay`.
    pub fn wake(&mut self, node: NodeId, delay: Tick) {
        let at = self.now.saturating_add(delay);
        self.push(at, node, Port::Local, Payload::Retry);
    }

    /// Removes the earliest event and advances the clock to it.
    pub fn pop(&mut self) -> Option<Event> {
        let event = self.queue.pop()?;
        self.now = self.now.max(event.at);
        self.delivered += 1;
        Some(event)
    }

    /// Moves the clock forward to `at` without delivering anything.
    pub fn advance_to(&mut self, at: Tick) {
        self.now = self.now.max(at);
    }
}
