//! Exact sharer tracking for home nodes.
//!
//! A home records, per line, which of its children hold a copy and whether
//! the single holder owns it (E or M). Writebacks (`PutM`/`PutClean`) keep the
//! vector exact, so conflicts can be resolved without broadcasts.

use super::{Grant, MAX_SHARERS, Want};

/// Children holding a line, as a bitmask over upper port indices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Sharers {
    mask: u64,
    owned: bool,
}

impl Sharers {
    #[inline]
    const fn bit(port: usize) -> u64 {
        1u64 << (port % MAX_SHARERS)
    }

    /// No child holds the line.
    pub const fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Whether `port` holds the line.
    pub const fn contains(&self, port: usize) -> bool {
        self.mask & Self::bit(port) != 0
    }

    /// Number of holders.
    pub const fn count(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Raw bitmask of holders.
    pub const fn mask(&self) -> u64 {
        self.mask
    }

    /// The child holding the line in E or M, if any.
    pub fn owner(&self) -> Option<usize> {
        if self.owned && self.mask != 0 {
            Some(self.mask.trailing_zeros() as usize)
        } else {
            None
        }
    }

    /// Iterates holder port indices in ascending order.
    pub fn holders(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_SHARERS).filter(move |&port| self.contains(port))
    }

    /// Holders that must be contacted before `requester` can be granted `want`.
    ///
    /// A read conflicts only with a foreign owner (which is downgraded); a
    /// write conflicts with every other holder (which is invalidated).
    pub fn conflicts(&self, requester: Option<usize>, want: Want) -> Vec<usize> {
        let others = |port: &usize| Some(*port) != requester;
        match want {
            Want::Shared => self.owner().into_iter().filter(others).collect(),
            Want::Exclusive => self.holders().filter(others).collect(),
        }
    }

    /// Records a grant to `requester` once conflicts are resolved.
    ///
    /// `may_own` says whether a read may be answered with E: the requester
    /// accepts E and the home itself holds the line exclusively.
    pub fn grant(&mut self, requester: usize, want: Want, may_own: bool) -> Grant {
        match want {
            Want::Exclusive => {
                self.mask = Self::bit(requester);
                self.owned = true;
                Grant::Modified
            }
            Want::Shared => {
                let alone = self.mask & !Self::bit(requester) == 0;
                if alone && may_own {
                    self.mask = Self::bit(requester);
                    self.owned = true;
                    Grant::Exclusive
                } else {
                    self.mask |= Self::bit(requester);
                    self.owned = false;
                    Grant::Shared
                }
            }
        }
    }

    /// Drops `port` after an invalidation ack or a writeback.
    pub const fn remove(&mut self, port: usize) {
        self.mask &= !Self::bit(port);
        if self.mask == 0 {
            self.owned = false;
        }
    }

    /// The owner keeps a shared copy after a downgrade.
    pub const fn downgrade(&mut self) {
        self.owned = false;
    }

    /// Forgets every holder.
    pub const fn clear(&mut self) {
        self.mask = 0;
        self.owned = false;
    }
}
