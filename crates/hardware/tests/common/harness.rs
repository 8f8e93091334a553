//! Test harness.
//!
//! Small, deterministic hierarchies: prefetching is off unless a test turns it
//! on, and the memory range is kept small so address errors are easy to hit.

use std::sync::Once;

use cachesim_core::common::{Addr, ByteSize, RequestId, RequestKind, ResponseKind, TimeSpan};
use cachesim_core::config::{CacheConfig, CoherenceProtocol, Config, PrefetcherKind};
use cachesim_core::core::units::coherence::MesiState;
use cachesim_core::{Completion, Simulator};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Routes simulator logs to the test output; honours `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Line size used by every harness configuration.
pub const LINE: u64 = 64;

/// A private level without prefetching.
pub fn level(name: &str, size: u64, ways: usize) -> CacheConfig {
    CacheConfig {
        name: name.to_owned(),
        cache_size: ByteSize::bytes(size),
        associativity: ways,
        access_latency_cycles: 2,
        prefetcher: PrefetcherKind::None,
        ..CacheConfig::default()
    }
}

/// A shared level without prefetching.
pub fn shared_level(name: &str, size: u64, ways: usize) -> CacheConfig {
    CacheConfig {
        shared: true,
        ..level(name, size, ways)
    }
}

/// `cores` cores over `caches`, 64-byte lines, memory `[0, 0xFFFF]`.
pub fn config(cores: usize, caches: Vec<CacheConfig>) -> Config {
    let mut config = Config::default();
    config.system.cores = cores;
    config.system.cache_line_size = LINE;
    config.caches = caches;
    config.memory.addr_range_start.0 = 0;
    config.memory.addr_range_end.0 = 0xFFFF;
    config.memory.access_time = TimeSpan::from_ns(10);
    config
}

/// One core, one 4 KiB 4-way L1.
pub fn single_l1() -> Config {
    config(1, vec![level("l1", 4096, 4)])
}

/// `cores` private L1s below a shared L2.
pub fn two_level(cores: usize) -> Config {
    config(cores, vec![level("l1", 2048, 2), shared_level("l2", 16384, 8)])
}

/// `cores` private L1s directly above memory, each running `protocol`.
pub fn flat(cores: usize, protocol: CoherenceProtocol) -> Config {
    let mut l1 = level("l1", 2048, 2);
    l1.coherence_protocol = protocol;
    config(cores, vec![l1])
}

/// Simulator wrapper that runs each request to completion.
#[derive(Debug)]
pub struct Rig {
    /// The simulator under test.
    pub sim: Simulator,
}

impl Rig {
    /// Builds a rig; panics on an invalid configuration.
    pub fn new(config: &Config) -> Self {
        init_tracing();
        Self {
            sim: Simulator::new(config).expect("valid test configuration"),
        }
    }

    /// Submits one request, runs until idle and returns its completion.
    pub fn access(&mut self, core: usize, addr: Addr, kind: RequestKind) -> Completion {
        let id = self.sim.submit(core, addr, kind).expect("request accepted");
        self.sim.run().expect("simulation runs");
        let mut done = self.sim.drain_completions();
        let pos = done
            .iter()
            .position(|c| c.id == id)
            .expect("request completed");
        done.swap_remove(pos)
    }

    /// Reads `size` bytes.
    pub fn read(&mut self, core: usize, addr: Addr, size: usize) -> Vec<u8> {
        match self.access(core, addr, RequestKind::Read { size }).response {
            ResponseKind::Data(bytes) => bytes,
            other => panic!("read answered with {other:?}"),
        }
    }

    /// Writes `bytes`.
    pub fn write(&mut self, core: usize, addr: Addr, bytes: &[u8]) {
        let done = self.access(core, addr, RequestKind::Write { bytes: bytes.to_vec() });
        assert_eq!(done.response, ResponseKind::WriteAck);
    }

    /// Invalidates `addr`'s line at `core`'s L1.
    pub fn invalidate(&mut self, core: usize, addr: Addr) {
        let done = self.access(core, addr, RequestKind::Invalidate);
        assert_eq!(done.response, ResponseKind::InvalidateAck);
    }

    /// Submits without running.
    pub fn submit(&mut self, core: usize, addr: Addr, kind: RequestKind) -> RequestId {
        self.sim.submit(core, addr, kind).expect("request accepted")
    }

    /// State of `addr`'s line in the cache named `cache`.
    pub fn state(&self, cache: &str, addr: Addr) -> MesiState {
        self.sim
            .cache(cache)
            .unwrap_or_else(|| panic!("no cache named {cache}"))
            .state_of(addr)
    }
}
