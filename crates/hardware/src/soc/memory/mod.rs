//! Main memory.
//!
//! This module implements the bottom of the hierarchy. It provides:
//! 1. **Backend:** Backing storage with a fixed access time and range checks.
//! 2. **Controller:** The root coherence home that serves misses from the last cache level.

/// Backing stores.
pub mod backend;

/// Memory controller (root home).
pub mod controller;

pub use self::backend::{Backend, SimpleBackend};
pub use self::controller::MemoryController;
