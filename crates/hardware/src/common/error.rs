//! Simulator error taxonomy.
//!
//! Every fallible operation in the crate returns [`SimError`]. The variants map
//! onto the failure classes of the simulated system:
//! 1. **Configuration:** Invalid geometry or unknown component names, fatal at setup.
//! 2. **Address range:** A request or backend access outside the memory controller's span.
//! 3. **Protocol violation:** An impossible coherence observation; never recovered.
//! 4. **Plumbing:** Malformed requests, unknown cores, trace and I/O failures.

use thiserror::Error;

/// Convenience alias used throughout the simulator.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised while configuring or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration (bad geometry, unknown policy, inconsistent topology).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Address outside the memory controller's `[start, end]` range.
    #[error("address {addr:#x} outside memory range [{start:#x}, {end:#x}]")]
    AddressRange {
        /// The offending address.
        addr: u64,
        /// First valid address.
        start: u64,
        /// Last valid address (inclusive).
        end: u64,
    },

    /// A coherence state that the protocol can never legally reach.
    #[error("protocol violation in {component} at {addr:#x}: {detail}")]
    ProtocolViolation {
        /// Name of the component that observed the violation.
        component: String,
        /// Line address involved.
        addr: u64,
        /// Human-readable description.
        detail: String,
    },

    /// A request that cannot be expressed (zero size, larger than a line).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request submitted to a core index that does not exist.
    #[error("unknown core {0}")]
    UnknownCore(usize),

    /// Malformed line in a request trace.
    #[error("trace line {line}: {detail}")]
    Trace {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        detail: String,
    },

    /// Failure reading a configuration or trace file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failure parsing a JSON configuration.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Builds a [`SimError::ProtocolViolation`].
    pub fn violation(component: &str, addr: u64, detail: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            component: component.to_owned(),
            addr,
            detail: detail.into(),
        }
    }

    /// Builds a [`SimError::Configuration`].
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Configuration(detail.into())
    }
}
