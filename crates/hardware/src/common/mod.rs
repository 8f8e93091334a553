//! Common types shared by every component of the cache simulator.
//!
//! This module provides the following:
//! 1. **Addresses:** Line geometry and set/tag mapping.
//! 2. **Requests:** CPU-side request and response types.
//! 3. **Errors:** The crate-wide [`SimError`] and [`SimResult`].
//! 4. **Units:** Frequencies, time spans and byte sizes as written in configurations.

/// Address type and line arithmetic.
pub mod addr;

/// CPU-side requests and responses.
pub mod data;

/// Error types.
pub mod error;

/// Unit-bearing configuration quantities.
pub mod units;

pub use addr::{Addr, LineGeometry};
pub use data::{CacheRequest, CacheResponse, RequestId, RequestKind, ResponseKind};
pub use error::{SimError, SimResult};
pub use units::{AddrValue, ByteSize, Frequency, PS_PER_SECOND, Tick, TimeSpan};
