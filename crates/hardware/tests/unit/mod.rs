//! # Unit Tests
//!
//! Mirrors the `src` tree: one module per component, plus whole-hierarchy
//! scenarios under `sim`.

/// Address arithmetic and unit parsing.
pub mod common;




/// Links and the memory controller.
pub mod soc;

/// Statistics collection and reporting.
pub mod stats;
