//! Address and cache-line arithmetic.
//!
//! Every component agrees on one line size (`system.cache_line_size`). This
//! module provides the following:
//! 1. **Line Geometry:** Base, offset and line-index extraction for a power-of-two line size.
//! 2. **Set Mapping:** Set index and tag for a given set count.
//! 3. **Splitting:** Detection of accesses that straddle a line boundary.

/// A physical byte address.
pub type Addr = u64;

/// Line-size arithmetic shared by caches, the memory controller and the core port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineGeometry {
    line_bytes: u64,
    shift: u32,
}

impl LineGeometry {
    /// Creates the geometry for `line_bytes`, which must be a non-zero power of two.
    ///
    /// # Returns
    ///
    /// `None` when `line_bytes` is zero or not a power of two.
    pub fn new(line_bytes: u64) -> Option<Self> {
        if line_bytes == 0 || !line_bytes.is_power_of_two() {
            return None;
        }
        Some(Self {
            line_bytes,
            shift: line_bytes.trailing_zeros(),
        })
    }

    /// Line size in bytes.
    #[inline]
    pub const fn line_bytes(&self) -> u64 {
        self.line_bytes
    }

    /// Line size as a `usize`, for sizing data buffers.
    #[inline]
    pub const fn line_len(&self) -> usize {
        self.line_bytes as usize
    }

    /// Address of the first byte of the line containing `addr`.
    #[inline]
    pub const fn base(&self, addr: Addr) -> Addr {
        addr & !(self.line_bytes - 1)
    }

    /// Byte offset of `addr` within its line.
    #[inline]
    pub const fn offset(&self, addr: Addr) -> usize {
        (addr & (self.line_bytes - 1)) as usize
    }

    /// Global line number of `addr` (address divided by line size).
    #[inline]
    pub const fn line_index(&self, addr: Addr) -> u64 {
        addr >> self.shift
    }

    /// Base address of line number `index`.
    #[inline]
    pub const fn line_addr(&self, index: u64) -> Addr {
        index << self.shift
    }

    /// Set index for a cache with `sets` sets: `(addr / line) % sets`.
    #[inline]
    pub const fn set_index(&self, addr: Addr, sets: usize) -> usize {
        (self.line_index(addr) % sets as u64) as usize
    }

    /// Tag for a cache with `sets` sets: `addr / (line * sets)`.
    #[inline]
    pub const fn tag(&self, addr: Addr, sets: usize) -> u64 {
        self.line_index(addr) / sets as u64
    }

    /// Rebuilds a line base address from a tag and set index.
    #[inline]
    pub const fn rebuild(&self, tag: u64, set: usize, sets: usize) -> Addr {
        self.line_addr(tag * sets as u64 + set as u64)
    }

    /// True when `size` bytes starting at `addr` touch more than one line.
    pub const fn crosses(&self, addr: Addr, size: usize) -> bool {
        size > 0 && self.offset(addr) + size > self.line_len()
    }
}
