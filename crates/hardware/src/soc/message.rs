//! Messages carried by links.
//!
//! Two families travel through the fabric: CPU-side requests and responses
//! between a core port and its L1, and coherence traffic between a requester
//! and its home (the next cache level or the memory controller).

use crate::common::{Addr, CacheRequest, CacheResponse};
use crate::core::units::coherence::Grant;

/// Contents of one cache line.
pub type Block = Vec<u8>;

/// A message in flight on a link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Core port → L1.
    Request(CacheRequest),
    /// L1 → core port.
    Response(CacheResponse),
    /// Requester → home: read permission.
    GetS {
        /// Line base address.
        addr: Addr,
    },
    /// Requester → home: write permission (miss or S→M upgrade).
    GetX {
        /// Line base address.
        addr: Addr,
    },
    /// Requester → home: dirty eviction.
    PutM {
        /// Line base address.
        addr: Addr,
        /// Line contents.
        data: Block,
    },
    /// Requester → home: clean eviction, keeps the directory exact.
    PutClean {
        /// Line base address.
        addr: Addr,
    },
    /// Home → requester: line contents and the state to install.
    Data {
        /// Line base address.
        addr: Addr,
        /// Line contents.
        data: Block,
        /// Granted state.
        grant: Grant,
    },
    /// Home → holder: drop the line.
    Inv {
        /// Line base address.
        addr: Addr,
    },
    /// Home → owner: keep the line in S only.
    Downgrade {
        /// Line base address.
        addr: Addr,
    },
    /// Holder → home: line dropped, with data if it was dirty.
    InvAck {
        /// Line base address.
        addr: Addr,
        /// Dirty contents, if any.
        data: Option<Block>,
    },
    /// Owner → home: line now S, with data if it was dirty.
    DowngradeAck {
        /// Line base address.
        addr: Addr,
        /// Dirty contents, if any.
        data: Option<Block>,
    },
}

impl Message {
    /// Address the message concerns.
    pub const fn addr(&self) -> Addr {
        match self {
            Self::Request(req) => req.addr,
            Self::Response(resp) => resp.addr,
            Self::GetS { addr }
            | Self::GetX { addr }
            | Self::PutM { addr, .. }
            | Self::PutClean { addr }
            | Self::Data { addr, .. }
            | Self::Inv { addr }
            | Self::Downgrade { addr }
            | Self::InvAck { addr, .. }
            | Self::DowngradeAck { addr, .. } => *addr,
        }
    }

    /// Short name for logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Request(_) => "Request",
            Self::Response(_) => "Response",
            Self::GetS { .. } => "GetS",
            Self::GetX { .. } => "GetX",
            Self::PutM { .. } => "PutM",
            Self::PutClean { .. } => "PutClean",
            Self::Data { .. } => "Data",
            Self::Inv { .. } => "Inv",
            Self::Downgrade { .. } => "Downgrade",
            Self::InvAck { .. } => "InvAck",
            Self::DowngradeAck { .. } => "DowngradeAck",
        }
    }
}
