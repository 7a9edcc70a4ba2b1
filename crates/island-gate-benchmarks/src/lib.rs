//! Deterministic workloads for smoke-benchmarking the gate's hot paths.

use std::sync::Arc;

use island_gate_access::AccessGate;
use island_gate_core::{Coordinate, DetectionResult, Region};
use island_gate_store::{AccessLedger, ManualClock, MemoryStore};

/// Classifies `count` coordinates on a diagonal sweep across the region and
/// returns how many landed inside.
pub fn classify_sweep(count: usize) -> usize {
    let region = Region::island();
    let bounds = region.bounds;
    let steps = count.max(1) as f64;

    (0..count)
        .filter_map(|index| {
            // Sweep starts and ends one box-width outside the region.
            let t = (index as f64 / steps) * 3.0 - 1.0;
            let latitude = bounds.south + t * (bounds.north - bounds.south);
            let longitude = bounds.west + t * (bounds.east - bounds.west);
            Coordinate::new(latitude, longitude).ok()
        })
        .filter(|point| DetectionResult::measured(*point, &region).inside_region)
        .count()
}

/// Records `records` accesses one minute apart, then evaluates the gate
/// `evaluations` times. Returns the number of allowed evaluations.
pub fn ledger_gate_loop(records: usize, evaluations: usize) -> usize {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let ledger = AccessLedger::new(Arc::new(MemoryStore::new()), clock.clone());
    for _ in 0..records {
        clock.advance(60_000);
        if ledger.record_access(None).is_err() {
            return 0;
        }
    }

    let detection = DetectionResult::loading();
    (0..evaluations)
        .filter(|_| AccessGate::new(&detection, &ledger).can_exercise_restricted_capability())
        .count()
}
