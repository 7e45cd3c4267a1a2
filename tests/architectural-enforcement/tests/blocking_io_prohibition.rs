//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: streamer-core never blocks a runtime worker on I/O.
//! **Required**: `tokio::fs` and async `reqwest` for fetching; blocking byte
//! sources go through `OffloadedReader` and `spawn_blocking`.
//!
//! **Allowed**:
//! - `config/mod.rs` (configuration loads before the pool starts)
//! - Test code

use architectural_enforcement::{core_src_dir, report, scan, Rule};

const RULES: &[Rule] = &[
    Rule {
        name: "Blocking file I/O",
        patterns: &["std::fs::", "use std::fs"],
        allowed_in: &["config/mod.rs"],
    },
    Rule {
        name: "Blocking network I/O",
        patterns: &["std::net::", "use std::net"],
        allowed_in: &[],
    },
    Rule {
        name: "Blocking HTTP client",
        patterns: &["reqwest::blocking"],
        allowed_in: &[],
    },
    Rule {
        name: "Blocking process I/O",
        patterns: &["std::process::Command"],
        allowed_in: &[],
    },
];

#[test]
fn test_no_blocking_io_in_core() {
    let violations = scan(&core_src_dir(), RULES);
    report("Blocking I/O found in streamer-core production code!", &violations);
}

#[test]
fn test_blocking_reads_are_offloaded() {
    let root = core_src_dir();
    let offload = std::fs::read_to_string(root.join("stream/offload.rs")).unwrap();
    assert!(offload.contains("spawn_blocking"));
}
