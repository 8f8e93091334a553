//! SoC-level component tests.


/// Memory backend and controller.
pub mod memory;
