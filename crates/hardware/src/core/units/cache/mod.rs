//! Set-Associative Cache.
//!
//! This module implements the storage half of a cache level, the [`BlockStore`],
//! and the coherence-aware [`CacheController`] that drives it. The store holds
//! data, MESI state and the sharer vector of every line; replacement metadata
//! lives in the configured [`ReplacementPolicy`].
//!
//! Lines are located by `set = (addr / line) % sets` and `tag = addr / (line * sets)`.
//! At most one valid or pending line per tag exists in a set.

/// Per-level coherence controller (MSHRs, per-line queues, backpressure).
pub mod controller;

/// Cache replacement policy implementations (FIFO, LRU, MRU, PLRU, Random).
pub mod policies;

pub use self::controller::CacheController;
use self::policies::ReplacementPolicy;
use crate::common::{Addr, LineGeometry};
use crate::config::CacheConfig;
use crate::core::units::coherence::{MesiState, Sharers};

/// Cache line entry: tag, coherence state, data and directory bits.
#[derive(Clone, Debug, Default)]
pub struct CacheLine {
    /// Address tag within the set.
    pub tag: u64,
    /// MESI state; `Invalid` for empty and pending ways.
    pub state: MesiState,
    /// Line contents (`cache_line_size` bytes).
    pub data: Vec<u8>,
    /// Installed by the prefetcher and not yet touched by a demand access.
    pub prefetched: bool,
    /// Reserved for an outstanding fill; never chosen as a victim.
    pub pending: bool,
    /// Children holding a copy (inclusive directory).
    pub sharers: Sharers,
}

/// A line pushed out of the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evicted {
    /// Base address of the evicted line.
    pub addr: Addr,
    /// State the line was in.
    pub state: MesiState,
    /// Its contents.
    pub data: Vec<u8>,
    /// Children that still held it.
    pub sharers: Sharers,
}

/// Result of looking for a way to hold a new line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// An invalid way is available.
    Free(usize),
    /// The policy chose a valid victim at `slot` holding line `victim`.
    Evict {
        /// Slot of the victim.
        slot: usize,
        /// Base address of the victim line.
        victim: Addr,
    },
    /// Every way is pending or locked by an in-flight transaction.
    Blocked,
}

/// Data, state and replacement metadata of one cache level.
///
/// Slots are flat indices `set * ways + way`.
#[derive(Debug)]
pub struct BlockStore {
    lines: Vec<CacheLine>,
    sets: usize,
    ways: usize,
    geometry: LineGeometry,
    policy: Box<dyn ReplacementPolicy>,
}

impl BlockStore {
    /// Creates an empty store for `config`.
    ///
    /// The configuration must already be validated (non-zero sets and ways).
    pub fn new(config: &CacheConfig, geometry: LineGeometry) -> Self {
        let sets = config.sets(geometry.line_bytes()).max(1);
        let ways = config.associativity.max(1);
        let line = CacheLine {
            data: vec![0; geometry.line_len()],
            ..CacheLine::default()
        };
        Self {
            lines: vec![line; sets * ways],
            sets,
            ways,
            geometry,
            policy: policies::build(config.replacement_policy, sets, ways),
        }
    }

    /// Number of sets.
    pub const fn sets(&self) -> usize {
        self.sets
    }

    /// Associativity.
    pub const fn ways(&self) -> usize {
        self.ways
    }

    /// Line arithmetic used by this store.
    pub const fn geometry(&self) -> LineGeometry {
        self.geometry
    }

    /// Set index of `addr`.
    pub const fn set_of(&self, addr: Addr) -> usize {
        self.geometry.set_index(addr, self.sets)
    }

    /// Base address of the line in `slot`.
    pub fn addr_of(&self, slot: usize) -> Addr {
        self.geometry
            .rebuild(self.lines[slot].tag, slot / self.ways, self.sets)
    }

    /// Line in `slot`.
    pub fn line(&self, slot: usize) -> &CacheLine {
        &self.lines[slot]
    }

    /// Mutable line in `slot`.
    pub fn line_mut(&mut self, slot: usize) -> &mut CacheLine {
        &mut self.lines[slot]
    }

    fn slots(&self, addr: Addr) -> std::ops::Range<usize> {
        let base = self.set_of(addr) * self.ways;
        base..base + self.ways
    }

    /// Slot holding a valid copy of `addr`'s line (HIT), or `None` (MISS).
    pub fn lookup(&self, addr: Addr) -> Option<usize> {
        let tag = self.geometry.tag(addr, self.sets);
        self.slots(addr)
            .find(|&slot| self.lines[slot].state.is_valid() && self.lines[slot].tag == tag)
    }

    /// Slot holding `addr`'s line, valid or pending a fill.
    pub fn find(&self, addr: Addr) -> Option<usize> {
        let tag = self.geometry.tag(addr, self.sets);
        self.slots(addr).find(|&slot| {
            let line = &self.lines[slot];
            (line.state.is_valid() || line.pending) && line.tag == tag
        })
    }

    /// State of `addr`'s line, `Invalid` if absent.
    pub fn state_of(&self, addr: Addr) -> MesiState {
        self.lookup(addr)
            .map_or(MesiState::Invalid, |slot| self.lines[slot].state)
    }

    /// Records a demand access to `slot` for replacement purposes.
    pub fn touch(&mut self, slot: usize) {
        let set = slot / self.ways;
        self.policy.update(set, slot % self.ways);
    }

    /// Finds a way for `addr`'s line without modifying the store.
    ///
    /// Invalid, non-pending ways are used first (lowest way wins). Otherwise the
    /// policy picks among valid ways that are not pending and whose line is not
    /// `busy`.
    pub fn allocate(&mut self, addr: Addr, busy: impl Fn(Addr) -> bool) -> Allocation {
        let slots = self.slots(addr);
        if let Some(slot) = slots
            .clone()
            .find(|&slot| !self.lines[slot].state.is_valid() && !self.lines[slot].pending)
        {
            return Allocation::Free(slot);
        }
        let base = slots.start;
        let eligible: Vec<bool> = slots
            .map(|slot| !self.lines[slot].pending && !busy(self.addr_of(slot)))
            .collect();
        match self.policy.get_victim(base / self.ways, &eligible) {
            Some(way) => {
                let slot = base + way;
                Allocation::Evict {
                    slot,
                    victim: self.addr_of(slot),
                }
            }
            None => Allocation::Blocked,
        }
    }

    /// Claims `slot` for `addr`'s line ahead of its fill.
    pub fn reserve(&mut self, slot: usize, addr: Addr) {
        let tag = self.geometry.tag(addr, self.sets);
        let line = &mut self.lines[slot];
        line.tag = tag;
        line.state = MesiState::Invalid;
        line.pending = true;
        line.prefetched = false;
        line.sharers.clear();
        line.data.fill(0);
        self.policy.insert(slot / self.ways, slot % self.ways);
    }

    /// Completes a fill (or upgrade) of `slot` with `data` in `state`.
    pub fn fill(&mut self, slot: usize, data: &[u8], state: MesiState) {
        let line = &mut self.lines[slot];
        let len = data.len().min(line.data.len());
        line.data[..len].copy_from_slice(&data[..len]);
        line.state = state;
        line.pending = false;
        self.touch(slot);
    }

    /// Drops the line in `slot`. With `keep_pending` the way stays reserved
    /// for an outstanding fill of the same tag.
    pub fn invalidate(&mut self, slot: usize, keep_pending: bool) {
        let line = &mut self.lines[slot];
        line.state = MesiState::Invalid;
        line.pending = keep_pending;
        line.prefetched = false;
        line.sharers.clear();
    }

    /// Installs `addr`'s line directly, returning the valid line it displaced.
    ///
    /// An existing copy is overwritten in place. Otherwise the victim is chosen
    /// as in [`BlockStore::allocate`] with no line considered busy.
    pub fn insert(&mut self, addr: Addr, data: &[u8], state: MesiState) -> Option<Evicted> {
        if let Some(slot) = self.find(addr) {
            self.fill(slot, data, state);
            return None;
        }
        let (slot, evicted) = match self.allocate(addr, |_| false) {
            Allocation::Free(slot) => (slot, None),
            Allocation::Evict { slot, victim } => {
                let line = &self.lines[slot];
                let evicted = Evicted {
                    addr: victim,
                    state: line.state,
                    data: line.data.clone(),
                    sharers: line.sharers,
                };
                (slot, Some(evicted))
            }
            Allocation::Blocked => return None,
        };
        self.reserve(slot, addr);
        self.fill(slot, data, state);
        evicted
    }

    /// Valid lines as `(base address, line)` pairs.
    pub fn resident(&self) -> impl Iterator<Item = (Addr, &CacheLine)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.state.is_valid())
            .map(|(slot, line)| (self.addr_of(slot), line))
    }

    /// Tags of the valid lines in `set`, in way order.
    pub fn tags_in_set(&self, set: usize) -> Vec<u64> {
        let base = set * self.ways;
        self.lines[base..base + self.ways]
            .iter()
            .filter(|line| line.state.is_valid())
            .map(|line| line.tag)
            .collect()
    }
}
