//! Integration Test: Sleep Prohibition
//!
//! Slots wait on surface change notifications and the supervisor waits on
//! freed-slot messages. Nothing in the core polls.
//!
//! **Allowed**:
//! - `std::thread::sleep` in `stream/virtual_stream.rs` (simulated read latency,
//!   always on a blocking worker)
//! - `tokio::time::sleep` in `pool/mod.rs` (restart backoff after a failed cycle)
//! - Test code

use architectural_enforcement::{core_src_dir, report, scan, Rule};

const RULES: &[Rule] = &[
    Rule {
        name: "Blocking sleep",
        patterns: &["thread::sleep("],
        allowed_in: &["stream/virtual_stream.rs"],
    },
    Rule {
        name: "Async sleep",
        patterns: &["time::sleep(", "sleep_until("],
        allowed_in: &["pool/mod.rs"],
    },
    Rule {
        name: "Polling interval",
        patterns: &["time::interval("],
        allowed_in: &[],
    },
];

#[test]
fn test_no_sleep_calls_in_core() {
    let violations = scan(&core_src_dir(), RULES);
    report("Sleep or polling found in streamer-core production code!", &violations);
}

#[test]
fn test_allowed_sleeps_are_still_present() {
    // Guards against the scan silently matching nothing
    let root = core_src_dir();
    let virtual_stream = std::fs::read_to_string(root.join("stream/virtual_stream.rs")).unwrap();
    let pool = std::fs::read_to_string(root.join("pool/mod.rs")).unwrap();

    assert!(virtual_stream.contains("thread::sleep("));
    assert!(pool.contains("time::sleep("));
}
