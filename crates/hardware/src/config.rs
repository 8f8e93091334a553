//! Configuration system for the cache hierarchy simulator.
//!
//! This module defines all configuration structures and enums used to parameterize
//! the simulator. It provides:
//! 1. **Defaults:** Baseline hardware constants (2.5 GHz core, 32 KiB 8-way L1, 10 ns memory).
//! 2. **Structures:** System, per-level cache and memory controller configuration.
//! 3. **Enums:** Replacement policy, coherence protocol and prefetcher selection.
//! 4. **Validation:** Geometry and topology checks performed before a simulator is built.
//!
//! Configuration is supplied as JSON. Quantities accept either bare numbers
//! (Hz, ps, bytes) or unit strings such as `"2.5GHz"`, `"300ps"` and `"32 KiB"`.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{AddrValue, ByteSize, Frequency, LineGeometry, SimError, SimResult, TimeSpan};

/// Default configuration constants for the simulator.
///
/// These mirror the single-core reference system: a 2.5 GHz core, one
/// private L1 and a 2400 MHz fixed-latency memory.
mod defaults {
    use crate::common::{ByteSize, Frequency, TimeSpan};

    /// Core clock (2.5 GHz, 400 ps period).
    pub const CPU_CLOCK: Frequency = Frequency::from_mhz(2500);

    /// Number of cores (request ports).
    pub const CORES: usize = 1;

    /// Cache line size in bytes, shared by every level.
    pub const CACHE_LINE: u64 = 128;

    /// Propagation delay of every link unless overridden.
    pub const LINK_LATENCY: TimeSpan = TimeSpan::from_ps(300);

    /// Default cache capacity (32 KiB).
    pub const CACHE_SIZE: ByteSize = ByteSize::kib(32);

    /// Default associativity.
    pub const CACHE_WAYS: usize = 8;

    /// Default hit latency in cache cycles.
    pub const CACHE_LATENCY: u64 = 4;

    /// Stride prefetcher confidence threshold.
    pub const PREFETCH_CONFIDENCE: u32 = 2;

    /// Stride prefetcher lookahead in strides.
    pub const PREFETCH_LOOKAHEAD: u64 = 4;

    /// Next-line prefetcher degree.
    pub const PREFETCH_DEGREE: u64 = 1;

    /// Outstanding misses per cache.
    pub const MSHRS: usize = 16;

    /// Memory controller clock (2400 MHz).
    pub const MEM_CLOCK: Frequency = Frequency::from_mhz(2400);

    /// Last valid physical address (inclusive).
    pub const ADDR_RANGE_END: u64 = 10_000_000_000;

    /// Backend access time.
    pub const ACCESS_TIME: TimeSpan = TimeSpan::from_ns(10);

    /// Backend capacity (1030 MiB).
    pub const MEM_SIZE: ByteSize = ByteSize::mib(1030);
}

/// Cache replacement policy algorithms.
///
/// Specifies the algorithm used to select which cache line to evict
/// when a new line must be installed in a full cache set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicy {
    /// Least Recently Used replacement policy.
    ///
    /// Evicts the cache line that was accessed least recently.
    #[default]
    #[serde(alias = "LRU", alias = "Lru")]
    Lru,
    /// Pseudo-LRU (bit) replacement policy.
    #[serde(alias = "PLRU", alias = "Plru")]
    Plru,
    /// First In First Out replacement policy.
    ///
    /// Evicts the line that was installed earliest.
    #[serde(alias = "FIFO", alias = "Fifo")]
    Fifo,
    /// Random replacement policy.
    #[serde(alias = "RANDOM", alias = "Random")]
    Random,
    /// Most Recently Used replacement policy.
    ///
    /// Effective for cyclic access patterns larger than the cache.
    #[serde(alias = "MRU", alias = "Mru")]
    Mru,
}

/// Coherence protocol a cache speaks toward its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoherenceProtocol {
    /// Modified / Exclusive / Shared / Invalid.
    #[default]
    #[serde(rename = "MESI", alias = "mesi", alias = "Mesi")]
    Mesi,
    /// Modified / Shared / Invalid; the cache never holds a line Exclusive.
    #[serde(rename = "MSI", alias = "msi", alias = "Msi")]
    Msi,
}

impl CoherenceProtocol {
    /// Whether a cache running this protocol may be granted a clean exclusive copy.
    pub const fn allows_exclusive(self) -> bool {
        matches!(self, Self::Mesi)
    }
}

/// Hardware prefetcher types for cache prefetching.
///
/// Prefetchers predict future memory accesses and fetch data
/// into the cache before it is needed to reduce miss penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetcherKind {
    /// No prefetching enabled.
    #[default]
    #[serde(alias = "None", alias = "")]
    None,
    /// Stride prefetcher.
    ///
    /// Detects constant-stride streams per requester and runs ahead of them.
    #[serde(alias = "Stride", alias = "cassini.StridePrefetcher")]
    Stride,
    /// Next-line prefetcher.
    ///
    /// Prefetches the following lines after each demand miss.
    #[serde(alias = "NextLine", alias = "nextline")]
    NextLine,
}

/// Root configuration structure containing all simulator settings.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use cachesim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.system.cache_line_size, 128);
/// assert_eq!(config.caches[0].cache_size.get(), 32 * 1024);
/// ```
///
/// Deserializing from JSON, with SST-style unit strings:
///
/// ```
/// use cachesim_core::config::{Config, PrefetcherKind};
///
/// let json = r#"{
///     "system": { "cpu_clock": "2.5GHz", "cache_line_size": 128, "link_latency": "300ps" },
///     "caches": [{
///         "name": "l1cache",
///         "cache_size": "32 KiB",
///         "associativity": 8,
///         "access_latency_cycles": 4,
///         "replacement_policy": "lru",
///         "coherence_protocol": "MESI",
///         "prefetcher": "cassini.StridePrefetcher"
///     }],
///     "memory": {
///         "clock": "2400 MHz",
///         "addr_range_start": 0,
///         "addr_range_end": "10000000000",
///         "access_time": "10ns",
///         "mem_size": "1030 MiB"
///     }
/// }"#;
///
/// let config = Config::from_json_str(json).unwrap();
/// assert_eq!(config.system.cpu_clock.period(), 400);
/// assert_eq!(config.caches[0].prefetcher, PrefetcherKind::Stride);
/// assert_eq!(config.memory.addr_range_end.0, 10_000_000_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core clock, core count, line size and default link latency
    #[serde(default)]
    pub system: SystemConfig,
    /// Cache levels, closest to the cores first
    #[serde(default = "Config::default_caches")]
    pub caches: Vec<CacheConfig>,
    /// Memory controller and backend
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system: SystemConfig::default(),
            caches: Self::default_caches(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    /// One private L1.
    fn default_caches() -> Vec<CacheConfig> {
        vec![CacheConfig::default()]
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Pretty-printed JSON for this configuration.
    pub fn to_json_pretty(&self) -> SimResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Line arithmetic for the configured line size.
    ///
    /// # Errors
    ///
    /// [`SimError::Configuration`] when the line size is not a power of two.
    pub fn geometry(&self) -> SimResult<LineGeometry> {
        LineGeometry::new(self.system.cache_line_size).ok_or_else(|| {
            SimError::config(format!(
                "cache_line_size {} is not a non-zero power of two",
                self.system.cache_line_size
            ))
        })
    }

    /// Checks geometry, names and topology.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> SimResult<()> {
        let geometry = self.geometry()?;
        if self.system.cores == 0 {
            return Err(SimError::config("cores must be at least 1"));
        }
        if self.system.cores > crate::core::units::coherence::MAX_SHARERS {
            return Err(SimError::config(format!(
                "at most {} cores are supported, got {}",
                crate::core::units::coherence::MAX_SHARERS,
                self.system.cores
            )));
        }
        if self.caches.is_empty() {
            return Err(SimError::config("at least one cache level is required"));
        }

        let mut names = HashSet::new();
        let mut seen_shared = false;
        for (level, cache) in self.caches.iter().enumerate() {
            cache.validate(level, geometry)?;
            if !names.insert(cache.name.as_str()) {
                return Err(SimError::config(format!(
                    "duplicate cache name {:?}",
                    cache.name
                )));
            }
            if seen_shared && !cache.shared {
                return Err(SimError::config(format!(
                    "private cache {:?} cannot sit below a shared level",
                    cache.name
                )));
            }
            if level == 0 && cache.shared && self.system.cores > 1 {
                return Err(SimError::config(format!(
                    "first level {:?} is attached to a single core and cannot be shared",
                    cache.name
                )));
            }
            seen_shared |= cache.shared;
        }

        self.memory.validate()
    }
}

/// Core-side and fabric-wide parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Core clock; cache clocks default to it
    #[serde(default = "SystemConfig::default_cpu_clock")]
    pub cpu_clock: Frequency,

    /// Number of cores issuing requests
    #[serde(default = "SystemConfig::default_cores")]
    pub cores: usize,

    /// Line size in bytes, shared by every cache and the memory controller
    #[serde(default = "SystemConfig::default_line")]
    pub cache_line_size: u64,

    /// Core-to-L1 link latency, and the default for every other link
    #[serde(default = "SystemConfig::default_link_latency")]
    pub link_latency: TimeSpan,
}

impl SystemConfig {
    fn default_cpu_clock() -> Frequency {
        defaults::CPU_CLOCK
    }

    fn default_cores() -> usize {
        defaults::CORES
    }

    fn default_line() -> u64 {
        defaults::CACHE_LINE
    }

    fn default_link_latency() -> TimeSpan {
        defaults::LINK_LATENCY
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            cpu_clock: defaults::CPU_CLOCK,
            cores: defaults::CORES,
            cache_line_size: defaults::CACHE_LINE,
            link_latency: defaults::LINK_LATENCY,
        }
    }
}

/// Configuration for one cache level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Level name; private levels get a `.N` core suffix per instance
    #[serde(default = "CacheConfig::default_name")]
    pub name: String,

    /// Cache clock; defaults to `system.cpu_clock`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_frequency: Option<Frequency>,

    /// Capacity
    #[serde(default = "CacheConfig::default_size")]
    pub cache_size: ByteSize,

    /// Ways per set
    #[serde(default = "CacheConfig::default_ways")]
    pub associativity: usize,

    /// Hit latency in cache cycles
    #[serde(default = "CacheConfig::default_latency")]
    pub access_latency_cycles: u64,

    /// Victim selection
    #[serde(default)]
    pub replacement_policy: ReplacementPolicy,

    /// Protocol spoken toward the parent
    #[serde(default)]
    pub coherence_protocol: CoherenceProtocol,

    /// Hardware prefetcher; the stride prefetcher unless set
    #[serde(default = "CacheConfig::default_prefetcher")]
    pub prefetcher: PrefetcherKind,

    /// Stride matches required before the stride prefetcher issues
    #[serde(default = "CacheConfig::default_prefetch_confidence")]
    pub prefetch_confidence: u32,

    /// How many strides ahead the stride prefetcher runs
    #[serde(default = "CacheConfig::default_prefetch_lookahead")]
    pub prefetch_lookahead: u64,

    /// Lines fetched per miss by the next-line prefetcher
    #[serde(default = "CacheConfig::default_prefetch_degree")]
    pub prefetch_degree: u64,

    /// Outstanding misses (MSHRs) before requests stall
    #[serde(default = "CacheConfig::default_mshrs")]
    pub mshrs: usize,

    /// One instance shared by all cores instead of one per core
    #[serde(default)]
    pub shared: bool,

    /// Latency of the link to the level below; defaults to `system.link_latency`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_latency: Option<TimeSpan>,
}

impl CacheConfig {
    fn default_name() -> String {
        "l1cache".to_owned()
    }

    fn default_size() -> ByteSize {
        defaults::CACHE_SIZE
    }

    fn default_ways() -> usize {
        defaults::CACHE_WAYS
    }

    fn default_latency() -> u64 {
        defaults::CACHE_LATENCY
    }

    const fn default_prefetcher() -> PrefetcherKind {
        PrefetcherKind::Stride
    }

    fn default_prefetch_confidence() -> u32 {
        defaults::PREFETCH_CONFIDENCE
    }

    fn default_prefetch_lookahead() -> u64 {
        defaults::PREFETCH_LOOKAHEAD
    }

    fn default_prefetch_degree() -> u64 {
        defaults::PREFETCH_DEGREE
    }

    fn default_mshrs() -> usize {
        defaults::MSHRS
    }

    /// Number of sets: `cache_size / (line * associativity)`.
    pub fn sets(&self, line_bytes: u64) -> usize {
        let per_set = line_bytes.saturating_mul(self.associativity as u64);
        if per_set == 0 {
            return 0;
        }
        (self.cache_size.get() / per_set) as usize
    }

    /// Effective clock for this level.
    pub fn frequency(&self, system: &SystemConfig) -> Frequency {
        self.cache_frequency.unwrap_or(system.cpu_clock)
    }

    fn validate(&self, level: usize, geometry: LineGeometry) -> SimResult<()> {
        let what = |detail: String| {
            SimError::config(format!("cache {:?} (level {}): {detail}", self.name, level + 1))
        };
        if self.name.trim().is_empty() {
            return Err(what("name must not be empty".to_owned()));
        }
        if self.associativity == 0 {
            return Err(what("associativity must be at least 1".to_owned()));
        }
        let set_bytes = geometry.line_bytes() * self.associativity as u64;
        if self.cache_size.get() == 0 || self.cache_size.get() % set_bytes != 0 {
            return Err(what(format!(
                "cache_size {} is not a positive multiple of line size x associativity ({set_bytes} bytes)",
                self.cache_size
            )));
        }
        if self.mshrs == 0 {
            return Err(what("mshrs must be at least 1".to_owned()));
        }
        match self.prefetcher {
            PrefetcherKind::Stride if self.prefetch_lookahead == 0 => {
                Err(what("prefetch_lookahead must be at least 1".to_owned()))
            }
            PrefetcherKind::NextLine if self.prefetch_degree == 0 => {
                Err(what("prefetch_degree must be at least 1".to_owned()))
            }
            _ => Ok(()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            cache_frequency: None,
            cache_size: defaults::CACHE_SIZE,
            associativity: defaults::CACHE_WAYS,
            access_latency_cycles: defaults::CACHE_LATENCY,
            replacement_policy: ReplacementPolicy::default(),
            coherence_protocol: CoherenceProtocol::default(),
            prefetcher: Self::default_prefetcher(),
            prefetch_confidence: defaults::PREFETCH_CONFIDENCE,
            prefetch_lookahead: defaults::PREFETCH_LOOKAHEAD,
            prefetch_degree: defaults::PREFETCH_DEGREE,
            mshrs: defaults::MSHRS,
            shared: false,
            link_latency: None,
        }
    }
}

/// Memory controller and backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Controller clock; responses leave on a clock edge
    #[serde(default = "MemoryConfig::default_clock")]
    pub clock: Frequency,

    /// First valid address
    #[serde(default)]
    pub addr_range_start: AddrValue,

    /// Last valid address (inclusive)
    #[serde(default = "MemoryConfig::default_addr_range_end")]
    pub addr_range_end: AddrValue,

    /// Fixed backend access time
    #[serde(default = "MemoryConfig::default_access_time")]
    pub access_time: TimeSpan,

    /// Backend capacity
    #[serde(default = "MemoryConfig::default_mem_size")]
    pub mem_size: ByteSize,
}

impl MemoryConfig {
    fn default_clock() -> Frequency {
        defaults::MEM_CLOCK
    }

    fn default_addr_range_end() -> AddrValue {
        AddrValue(defaults::ADDR_RANGE_END)
    }

    fn default_access_time() -> TimeSpan {
        defaults::ACCESS_TIME
    }

    fn default_mem_size() -> ByteSize {
        defaults::MEM_SIZE
    }

    fn validate(&self) -> SimResult<()> {
        if self.addr_range_start.0 > self.addr_range_end.0 {
            return Err(SimError::config(format!(
                "memory addr_range_start {:#x} is above addr_range_end {:#x}",
                self.addr_range_start.0, self.addr_range_end.0
            )));
        }
        if self.mem_size.get() == 0 {
            return Err(SimError::config("memory mem_size must be positive"));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            clock: defaults::MEM_CLOCK,
            addr_range_start: AddrValue(0),
            addr_range_end: AddrValue(defaults::ADDR_RANGE_END),
            access_time: defaults::ACCESS_TIME,
            mem_size: defaults::MEM_SIZE,
        }
    }
}
