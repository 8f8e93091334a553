//! Tests for the units a cache level is built from.

/// Block store, replacement policies and the cache controller.
pub mod cache;
