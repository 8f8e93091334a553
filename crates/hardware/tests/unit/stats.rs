//! Statistics aggregation and reporting.

use std::collections::BTreeMap;

use cachesim_core::stats::{CacheStats, CoreStats, MemoryStats, STATS_SECTIONS, SimStats};
use pretty_assertions::assert_eq;

fn sample() -> SimStats {
    let l1 = |hits, misses| CacheStats {
        hits,
        misses,
        ..CacheStats::default()
    };
    SimStats {
        sim_time: 12_000,
        events: 40,
        host_seconds: 0.0,
        cores: vec![CoreStats {
            requests: 2,
            reads: 2,
            completed: 2,
            total_latency: 3_000,
            max_latency: 2_000,
            ..CoreStats::default()
        }],
        caches: vec![
            ("l1.0".to_owned(), l1(3, 1)),
            ("l1.1".to_owned(), l1(1, 3)),
            ("l10".to_owned(), l1(100, 100)),
            ("l2".to_owned(), CacheStats {
                upgrades: 2,
                misses: 2,
                ..CacheStats::default()
            }),
        ],
        memory: MemoryStats {
            reads: 2,
            writes: 1,
            recalls: 0,
        },
        links: vec![("core0->l1.0".to_owned(), 2)],
    }
}

#[test]
fn level_total_sums_instances_only() {
    let stats = sample();
    let total = stats.level_total("l1");
    assert_eq!(total.hits, 4);
    assert_eq!(total.misses, 4);
    assert_eq!(stats.level_total("l2").misses, 2);
    assert_eq!(stats.level_total("l3"), CacheStats::default());
}

#[test]
fn miss_rate_counts_upgrades() {
    let stats = sample();
    assert!((stats.cache("l1.0").unwrap().miss_rate() - 0.25).abs() < 1e-12);
    assert!((stats.cache("l2").unwrap().miss_rate() - 1.0).abs() < 1e-12);
    assert_eq!(CacheStats::default().miss_rate(), 0.0);
    assert_eq!(stats.cache("l2").unwrap().accesses(), 4);
}

#[test]
fn report_feeds_a_sink() {
    let mut sink = BTreeMap::new();
    sample().report(&mut sink);
    assert_eq!(sink["sim.time_ps"], 12_000);
    assert_eq!(sink["core.0.max_latency_ps"], 2_000);
    assert_eq!(sink["l1.1.misses"], 3);
    assert_eq!(sink["memory.writes"], 1);
    assert_eq!(sink["core0->l1.0.messages"], 2);
}

#[test]
fn render_all_sections() {
    let text = sample().render_sections(&[]);
    for heading in ["sim_time", "CORES", "CACHES", "MEMORY", "LINKS"] {
        assert!(text.contains(heading), "missing {heading}");
    }
    assert!(text.contains("miss_rate: 25.00%"));
}

#[test]
fn render_selected_sections() {
    let text = sample().render_sections(&["memory".to_owned()]);
    assert!(text.contains("MEMORY"));
    assert!(!text.contains("CACHES"));
    assert!(!text.contains("sim_time"));
    assert_eq!(STATS_SECTIONS.len(), 5);
}
