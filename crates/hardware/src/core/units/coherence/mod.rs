//! MESI coherence states and the sharer directory.
//!
//! Every cache level is a requester toward its parent and a home toward its
//! children; the memory controller is the root home. This module provides:
//! 1. **States:** [`MesiState`] with the permission predicates used on lookup.
//! 2. **Requests and grants:** what a requester asks for ([`Want`]) and what a home hands out ([`Grant`]).
//! 3. **Directory:** exact per-line sharer vectors kept by every home ([`Sharers`]).

/// Sharer vector kept by home nodes.
pub mod directory;

pub use self::directory::Sharers;
pub use crate::config::CoherenceProtocol;

/// Maximum number of children a home can track (width of the sharer mask).
pub const MAX_SHARERS: usize = 64;

/// Coherence state of a cache line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MesiState {
    /// Dirty and exclusively owned.
    Modified,
    /// Clean and exclusively owned; may be written without asking the home.
    Exclusive,
    /// Clean, possibly held by other caches; read-only.
    Shared,
    /// Not present.
    #[default]
    Invalid,
}

impl MesiState {
    /// Line holds usable data.
    #[inline]
    pub const fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Line may be written without a coherence transaction.
    #[inline]
    pub const fn can_write(self) -> bool {
        matches!(self, Self::Modified | Self::Exclusive)
    }

    /// Line must be written back before it is dropped.
    #[inline]
    pub const fn is_dirty(self) -> bool {
        matches!(self, Self::Modified)
    }

    /// Whether this state satisfies a request for `want`.
    pub const fn satisfies(self, want: Want) -> bool {
        match want {
            Want::Shared => self.is_valid(),
            Want::Exclusive => self.can_write(),
        }
    }

    /// Single-letter name used in logs.
    pub const fn letter(self) -> char {
        match self {
            Self::Modified => 'M',
            Self::Exclusive => 'E',
            Self::Shared => 'S',
            Self::Invalid => 'I',
        }
    }
}

/// Permission a requester needs on a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Want {
    /// Read permission (`GetS`).
    Shared,
    /// Write permission (`GetX`).
    Exclusive,
}

/// State a home hands to a requester together with the line data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Grant {
    /// Install in S.
    Shared,
    /// Install in E.
    Exclusive,
    /// Install in M.
    Modified,
}

impl Grant {
    /// State the requester installs.
    pub const fn state(self) -> MesiState {
        match self {
            Self::Shared => MesiState::Shared,
            Self::Exclusive => MesiState::Exclusive,
            Self::Modified => MesiState::Modified,
        }
    }
}
