//! Shared test infrastructure.

/// Configuration builders and the request rig.
pub mod harness;
