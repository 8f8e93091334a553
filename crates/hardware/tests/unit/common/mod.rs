//! Tests for shared types.

/// Line geometry.
pub mod addr;
