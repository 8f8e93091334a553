//! Simulation statistics collection and reporting.
//!
//! This module tracks performance metrics for the cache hierarchy. It provides:
//! 1. **Cache counters:** Hits, misses, upgrades, evictions, writebacks and coherence traffic per cache.
//! 2. **Prefetch counters:** Issued, used and dropped prefetches per cache.
//! 3. **Memory and core counters:** Backend reads/writes and per-core request latency.
//! 4. **Reporting:** A text report and the [`StatsSink`] seam for external collectors.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::common::Tick;

/// Receiver of named per-component counters (e.g. a CSV or database writer).
pub trait StatsSink {
    /// Records `value` for counter `name` of `component`.
    fn counter(&mut self, component: &str, name: &str, value: u64);
}

/// Collects counters keyed `"component.name"`.
impl StatsSink for BTreeMap<String, u64> {
    fn counter(&mut self, component: &str, name: &str, value: u64) {
        let _ = self.insert(format!("{component}.{name}"), value);
    }
}

/// Counters of one cache instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Demand accesses that found the line with sufficient permission.
    pub hits: u64,
    /// Demand accesses that had to fetch the line.
    pub misses: u64,
    /// Writes that hit a shared line and requested ownership.
    pub upgrades: u64,
    /// Valid lines displaced to make room.
    pub evictions: u64,
    /// Dirty lines written back to the next level.
    pub writebacks: u64,
    /// Lines dropped because of an invalidation (remote or requested).
    pub invalidations: u64,
    /// Invalidation acknowledgements sent, including no-op ones.
    pub invalidation_acks: u64,
    /// Owned lines downgraded to shared on a remote read.
    pub downgrades: u64,
    /// Prefetch fetches sent to the next level.
    pub prefetch_issued: u64,
    /// Prefetched lines later hit by a demand access.
    pub prefetch_used: u64,
    /// Prefetch candidates discarded.
    pub prefetch_dropped: u64,
    /// Demand requests held back for lack of an MSHR or a free way.
    pub stalls: u64,
}

impl CacheStats {
    /// Counter names and values in report order.
    pub const fn counters(&self) -> [(&'static str, u64); 12] {
        [
            ("hits", self.hits),
            ("misses", self.misses),
            ("upgrades", self.upgrades),
            ("evictions", self.evictions),
            ("writebacks", self.writebacks),
            ("invalidations", self.invalidations),
            ("invalidation_acks", self.invalidation_acks),
            ("downgrades", self.downgrades),
            ("prefetch_issued", self.prefetch_issued),
            ("prefetch_used", self.prefetch_used),
            ("prefetch_dropped", self.prefetch_dropped),
            ("stalls", self.stalls),
        ]
    }

    /// Demand lookups (hits, misses and upgrades).
    pub const fn accesses(&self) -> u64 {
        self.hits + self.misses + self.upgrades
    }

    /// Fraction of demand lookups that missed (upgrades count as misses).
    pub fn miss_rate(&self) -> f64 {
        let total = self.accesses();
        if total == 0 {
            0.0
        } else {
            (self.misses + self.upgrades) as f64 / total as f64
        }
    }
}

/// Counters of the memory controller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Lines read from the backend to answer a request.
    pub reads: u64,
    /// Lines written to the backend (writebacks and dirty acks).
    pub writes: u64,
    /// Invalidations and downgrades sent to caches.
    pub recalls: u64,
}

impl MemoryStats {
    /// Counter names and values in report order.
    pub const fn counters(&self) -> [(&'static str, u64); 3] {
        [
            ("reads", self.reads),
            ("writes", self.writes),
            ("recalls", self.recalls),
        ]
    }
}

/// Counters of one core port.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoreStats {
    /// Requests accepted.
    pub requests: u64,
    /// Read requests accepted.
    pub reads: u64,
    /// Write requests accepted.
    pub writes: u64,
    /// Invalidate requests accepted.
    pub invalidates: u64,
    /// Requests split because they crossed a line boundary.
    pub split: u64,
    /// Requests completed.
    pub completed: u64,
    /// Sum of completion latencies in ticks.
    pub total_latency: Tick,
    /// Longest completion latency in ticks.
    pub max_latency: Tick,
}

impl CoreStats {
    /// Counter names and values in report order.
    pub const fn counters(&self) -> [(&'static str, u64); 8] {
        [
            ("requests", self.requests),
            ("reads", self.reads),
            ("writes", self.writes),
            ("invalidates", self.invalidates),
            ("split", self.split),
            ("completed", self.completed),
            ("total_latency_ps", self.total_latency),
            ("max_latency_ps", self.max_latency),
        ]
    }

    /// Mean completion latency in ticks.
    pub fn avg_latency(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.completed as f64
        }
    }
}

/// Snapshot of every counter in a simulated system.
#[derive(Clone, Debug, Default)]
pub struct SimStats {
    /// Simulated time reached, in picoseconds.
    pub sim_time: Tick,
    /// Events delivered.
    pub events: u64,
    /// Wall-clock seconds spent simulating.
    pub host_seconds: f64,
    /// Per-core counters, indexed by core.
    pub cores: Vec<CoreStats>,
    /// Per-cache counters, in topology order.
    pub caches: Vec<(String, CacheStats)>,
    /// Memory controller counters.
    pub memory: MemoryStats,
    /// Messages carried per link.
    pub links: Vec<(String, u64)>,
}

/// Section names for selective stats output.
///
/// Valid section identifiers: `"summary"`, `"core"`, `"cache"`, `"memory"`, `"links"`.
/// Pass an empty slice to `print_sections` to print all sections.
pub const STATS_SECTIONS: &[&str] = &["summary", "core", "cache", "memory", "links"];

impl SimStats {
    /// Counters of the cache named `name`.
    pub fn cache(&self, name: &str) -> Option<&CacheStats> {
        self.caches
            .iter()
            .find(|(cache, _)| cache == name)
            .map(|(_, stats)| stats)
    }

    /// Sum of the counters of every cache whose name starts with `prefix`.
    ///
    /// Private levels are named `<level>.<core>`, so the level name totals all instances.
    pub fn level_total(&self, prefix: &str) -> CacheStats {
        let mut total = CacheStats::default();
        for (_, stats) in self.caches.iter().filter(|(name, _)| {
            name == prefix
                || name
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.'))
        }) {
            total.hits += stats.hits;
            total.misses += stats.misses;
            total.upgrades += stats.upgrades;
            total.evictions += stats.evictions;
            total.writebacks += stats.writebacks;
            total.invalidations += stats.invalidations;
            total.invalidation_acks += stats.invalidation_acks;
            total.downgrades += stats.downgrades;
            total.prefetch_issued += stats.prefetch_issued;
            total.prefetch_used += stats.prefetch_used;
            total.prefetch_dropped += stats.prefetch_dropped;
            total.stalls += stats.stalls;
        }
        total
    }

    /// Emits every counter to `sink`.
    pub fn report(&self, sink: &mut dyn StatsSink) {
        sink.counter("sim", "time_ps", self.sim_time);
        sink.counter("sim", "events", self.events);
        for (core, stats) in self.cores.iter().enumerate() {
            let component = format!("core.{core}");
            for (name, value) in stats.counters() {
                sink.counter(&component, name, value);
            }
        }
        for (cache, stats) in &self.caches {
            for (name, value) in stats.counters() {
                sink.counter(cache, name, value);
            }
        }
        for (name, value) in self.memory.counters() {
            sink.counter("memory", name, value);
        }
        for (link, messages) in &self.links {
            sink.counter(link, "messages", *messages);
        }
    }

    /// Renders the requested sections as text; an empty slice renders all of them.
    pub fn render_sections(&self, sections: &[String]) -> String {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let mut out = String::new();
        let rule = "----------------------------------------------------------";

        let _ = writeln!(out, "\n==========================================================");
        let _ = writeln!(out, "CACHE HIERARCHY SIMULATION STATISTICS");
        let _ = writeln!(out, "==========================================================");
        if want("summary") {
            let rate = if self.host_seconds > 0.0 {
                self.events as f64 / self.host_seconds / 1000.0
            } else {
                0.0
            };
            let _ = writeln!(out, "host_seconds             {:.4} s", self.host_seconds);
            let _ = writeln!(out, "sim_time                 {} ps", self.sim_time);
            let _ = writeln!(out, "sim_events               {}", self.events);
            let _ = writeln!(out, "sim_rate                 {rate:.2} kevents/s");
            let _ = writeln!(out, "{rule}");
        }
        if want("core") {
            let _ = writeln!(out, "CORES");
            for (core, stats) in self.cores.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "  core.{core:<3} requests: {:<8} | R/W/I: {}/{}/{} | split: {:<6} | avg_latency: {:.1} ps | max: {} ps",
                    stats.requests,
                    stats.reads,
                    stats.writes,
                    stats.invalidates,
                    stats.split,
                    stats.avg_latency(),
                    stats.max_latency
                );
            }
            let _ = writeln!(out, "{rule}");
        }
        if want("cache") {
            let _ = writeln!(out, "CACHES");
            for (name, stats) in &self.caches {
                let _ = writeln!(
                    out,
                    "  {name:<12} accesses: {:<10} | hits: {:<10} | miss_rate: {:.2}%",
                    stats.accesses(),
                    stats.hits,
                    stats.miss_rate() * 100.0
                );
                for (counter, value) in stats.counters().iter().skip(2) {
                    let _ = writeln!(out, "    {counter:<22} {value}");
                }
            }
            let _ = writeln!(out, "{rule}");
        }
        if want("memory") {
            let _ = writeln!(out, "MEMORY");
            for (counter, value) in self.memory.counters() {
                let _ = writeln!(out, "  {counter:<24} {value}");
            }
            let _ = writeln!(out, "{rule}");
        }
        if want("links") {
            let _ = writeln!(out, "LINKS");
            for (link, messages) in &self.links {
                let _ = writeln!(out, "  {link:<32} {messages}");
            }
        }
        let _ = writeln!(out, "==========================================================");
        out
    }

    /// Prints only the requested statistics sections to stdout.
    ///
    /// Each element of `sections` should be one of [`STATS_SECTIONS`]. Pass an
    /// empty slice to print all sections (same as `print()`).
    pub fn print_sections(&self, sections: &[String]) {
        print!("{}", self.render_sections(sections));
    }

    /// Prints all statistics sections to stdout.
    pub fn print(&self) {
        self.print_sections(&[]);
    }
}
