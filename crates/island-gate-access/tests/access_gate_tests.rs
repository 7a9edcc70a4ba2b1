//! Integration tests for capability gating across detection states.

use std::sync::Arc;

use island_gate_access::{AccessGate, Capability, DecisionReason};
use island_gate_core::{AccessCapability, DetectionResult};
use island_gate_store::{ACCESS_RETENTION_WINDOW_MS, AccessLedger, ManualClock, MemoryStore};

const START_MS: u64 = 1_700_000_000_000;

fn fixture() -> (Arc<ManualClock>, AccessLedger) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let ledger = AccessLedger::new(Arc::new(MemoryStore::new()), clock.clone());
    (clock, ledger)
}

fn non_success_states() -> Vec<DetectionResult> {
    vec![
        DetectionResult::loading(),
        DetectionResult::error("unavailable"),
        DetectionResult::denied("denied"),
    ]
}

#[test]
fn access_gate_tests_non_success_states_grant_nothing_alone() {
    let (_clock, ledger) = fixture();
    for detection in non_success_states() {
        let gate = AccessGate::new(&detection, &ledger);
        assert!(!gate.can_exercise_restricted_capability());
        for capability in Capability::ALL {
            let decision = gate.decide(capability);
            assert!(!decision.allowed);
            assert_eq!(decision.reason, DecisionReason::NotChecked);
        }
    }
}

#[test]
fn access_gate_tests_non_success_states_fall_back_to_grant() {
    let (_clock, ledger) = fixture();
    ledger.record_access(None).expect("record should work");
    for detection in non_success_states() {
        let gate = AccessGate::new(&detection, &ledger);
        assert!(gate.can_exercise_restricted_capability());
        assert!(Capability::ALL.iter().all(|capability| gate.allows(*capability)));
    }
}

#[test]
fn access_gate_tests_inside_flag_ignored_unless_success() {
    let (_clock, ledger) = fixture();
    let mut detection = DetectionResult::error("stale");
    detection.inside_region = true;
    let gate = AccessGate::new(&detection, &ledger);
    assert!(!gate.is_currently_inside_region());
    assert!(!gate.can_exercise_restricted_capability());
}

#[test]
fn access_gate_tests_grant_lapses_after_window() {
    let (clock, ledger) = fixture();
    ledger.record_access(None).expect("record should work");
    let detection = DetectionResult::success(false, Some(286.0), None);

    clock.advance(ACCESS_RETENTION_WINDOW_MS);
    assert!(AccessGate::new(&detection, &ledger).has_recent_access_grant());

    clock.advance(1);
    let gate = AccessGate::new(&detection, &ledger);
    assert!(!gate.has_recent_access_grant());
    assert_eq!(gate.decide(Capability::Post).reason, DecisionReason::OutsideRegion);
}

#[test]
fn access_gate_tests_capability_snapshot_reports_last_access() {
    let (clock, ledger) = fixture();
    ledger.record_access(None).expect("record should work");
    clock.advance(60_000);
    ledger.record_access(None).expect("record should work");
    clock.advance(60_000);

    let detection = DetectionResult::success(false, Some(286.0), None);
    let capability = AccessGate::new(&detection, &ledger).capability();
    assert_eq!(
        capability,
        AccessCapability {
            can_post: true,
            is_currently_in_region: false,
            has_recent_region_access: true,
            last_region_access_ms: Some(START_MS + 60_000),
        }
    );
}

#[test]
fn access_gate_tests_custom_window_is_honored() {
    let (clock, ledger) = fixture();
    ledger.record_access(None).expect("record should work");
    clock.advance(11);
    let detection = DetectionResult::loading();
    assert!(!AccessGate::new(&detection, &ledger)
        .with_window_ms(10)
        .can_exercise_restricted_capability());
}
