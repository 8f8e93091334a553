//! CPU-facing request and response types.
//!
//! These are the messages exchanged between a core port and its L1, and the
//! payloads carried by completions. Coherence traffic between levels uses
//! [`crate::soc::message::Message`] instead.

use super::addr::Addr;

/// Identifier assigned to every request accepted by a core port.
pub type RequestId = u64;

/// What a CPU-side request asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestKind {
    /// Read `size` bytes.
    Read {
        /// Number of bytes to read (1..=line size after splitting).
        size: usize,
    },
    /// Write the given bytes.
    Write {
        /// Bytes to store, starting at the request address.
        bytes: Vec<u8>,
    },
    /// Drop the line from the core's L1, writing it back to the next level if dirty.
    Invalidate,
}

impl RequestKind {
    /// Number of bytes the request touches; invalidations cover one byte for range checks.
    pub fn len(&self) -> usize {
        match self {
            Self::Read { size } => *size,
            Self::Write { bytes } => bytes.len(),
            Self::Invalidate => 1,
        }
    }

    /// True for a zero-length read or write.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the request needs write permission on the line.
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. })
    }

    /// Short mnemonic used in logs and traces.
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Read { .. } => "R",
            Self::Write { .. } => "W",
            Self::Invalidate => "I",
        }
    }
}

/// A request travelling from a core port to its L1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheRequest {
    /// Request id (sub-requests of a split access share their parent's id).
    pub id: RequestId,
    /// First byte touched; never crosses a line boundary once at the cache.
    pub addr: Addr,
    /// Operation.
    pub kind: RequestKind,
    /// Issuing core index.
    pub source: usize,
    /// Simulated time the request entered the port.
    pub issued_at: u64,
}

/// Payload of a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    /// Bytes returned by a read.
    Data(Vec<u8>),
    /// A write has been performed.
    WriteAck,
    /// The line is no longer held by the issuing core's L1.
    InvalidateAck,
}

/// A response travelling from an L1 back to its core port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheResponse {
    /// Id of the request being answered.
    pub id: RequestId,
    /// Address of the request being answered.
    pub addr: Addr,
    /// Result.
    pub kind: ResponseKind,
}
