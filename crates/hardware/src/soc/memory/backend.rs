//! Memory backends.
//!
//! This module provides:
//! 1. **Backend trait:** Line-granular `fetch`/`store` with a per-access latency.
//! 2. **SimpleBackend:** Fixed access time over a sparse, zero-filled line store.
//!
//! Every access is bounds-checked against the controller's inclusive address range.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::common::{Addr, LineGeometry, SimError, SimResult, Tick};

/// Trait for backing stores behind the memory controller.
pub trait Backend: Debug + Send + Sync {
    /// Latency of an access to the line at `addr`, in ticks.
    fn access_latency(&mut self, addr: Addr) -> Tick;

    /// Reads the line at `addr`.
    ///
    /// # Errors
    ///
    /// [`SimError::AddressRange`] when `addr` lies outside the backend range.
    fn fetch(&mut self, addr: Addr) -> SimResult<Vec<u8>>;

    /// Writes the line at `addr`.
    ///
    /// # Errors
    ///
    /// [`SimError::AddressRange`] when `addr` lies outside the backend range.
    fn store(&mut self, addr: Addr, data: &[u8]) -> SimResult<()>;
}

/// Fixed-latency backend; every access takes the same time.
#[derive(Debug)]
pub struct SimpleBackend {
    geometry: LineGeometry,
    start: Addr,
    end: Addr,
    capacity: u64,
    access_time: Tick,
    lines: HashMap<Addr, Vec<u8>>,
}

impl SimpleBackend {
    /// Creates a backend serving `[start, end]` with the given capacity and access time.
    pub fn new(geometry: LineGeometry, start: Addr, end: Addr, capacity: u64, access_time: Tick) -> Self {
        Self {
            geometry,
            start,
            end,
            capacity,
            access_time,
            lines: HashMap::new(),
        }
    }

    /// Capacity in bytes, fixed at construction.
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Inclusive address range served.
    pub const fn range(&self) -> (Addr, Addr) {
        (self.start, self.end)
    }

    /// Lines that have been written at least once.
    pub fn resident_lines(&self) -> usize {
        self.lines.len()
    }

    /// Reads `len` bytes at `addr` directly, bypassing timing (inspection only).
    ///
    /// # Errors
    ///
    /// [`SimError::AddressRange`] when any byte lies outside the range.
    pub fn peek(&self, addr: Addr, len: usize) -> SimResult<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        for i in 0..len as u64 {
            let byte_addr = addr.saturating_add(i);
            self.check(byte_addr)?;
            let base = self.geometry.base(byte_addr);
            let byte = self
                .lines
                .get(&base)
                .map_or(0, |line| line[self.geometry.offset(byte_addr)]);
            out.push(byte);
        }
        Ok(out)
    }

    fn check(&self, addr: Addr) -> SimResult<()> {
        if addr < self.start || addr > self.end {
            return Err(SimError::AddressRange {
                addr,
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// A line is valid if any of its bytes lies in range.
    fn check_line(&self, addr: Addr) -> SimResult<Addr> {
        let base = self.geometry.base(addr);
        let last = base.saturating_add(self.geometry.line_bytes() - 1);
        if last < self.start || base > self.end {
            return Err(SimError::AddressRange {
                addr,
                start: self.start,
                end: self.end,
            });
        }
        Ok(base)
    }
}

impl Backend for SimpleBackend {
    fn access_latency(&mut self, _addr: Addr) -> Tick {
        self.access_time
    }

    fn fetch(&mut self, addr: Addr) -> SimResult<Vec<u8>> {
        let base = self.check_line(addr)?;
        Ok(self
            .lines
            .get(&base)
            .cloned()
            .unwrap_or_else(|| vec![0; self.geometry.line_len()]))
    }

    fn store(&mut self, addr: Addr, data: &[u8]) -> SimResult<()> {
        let base = self.check_line(addr)?;
        let line_len = self.geometry.line_len();
        let line = self.lines.entry(base).or_insert_with(|| vec![0; line_len]);
        let len = line.len().min(data.len());
        line[..len].copy_from_slice(&data[..len]);
        Ok(())
    }
}
