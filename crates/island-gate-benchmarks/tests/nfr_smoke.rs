//! Benchmark smoke test for geo classification and ledger-backed gating.

use std::time::Instant;

use island_gate_benchmarks::{classify_sweep, ledger_gate_loop};

#[test]
fn benchmark_gate_smoke_prints_latency() {
    let start = Instant::now();

    let inside = classify_sweep(30_000);
    let allowed = ledger_gate_loop(60, 1_000);

    let elapsed_ms = start.elapsed().as_millis();
    println!("benchmark_gate_elapsed_ms={elapsed_ms}");
    println!("benchmark_sweep_inside={inside}");

    // A third of the sweep lies inside the box.
    assert!((9_900..=10_100).contains(&inside), "inside={inside}");
    assert_eq!(allowed, 1_000);

    // This is a lightweight guardrail; strict NFR checks are environment-specific.
    assert!(
        elapsed_ms < 5_000,
        "gate smoke benchmark should stay bounded"
    );
}
