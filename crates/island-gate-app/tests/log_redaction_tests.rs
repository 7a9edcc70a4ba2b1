//! Integration tests for coordinate redaction in logs.

use island_gate_app::redact_coordinate;
use island_gate_core::Coordinate;

#[test]
fn log_redaction_tests_rounds_coordinates_to_two_decimals() {
    let precise = Coordinate::new(33.106_712, 139.785_349).expect("coordinate should be valid");
    let redacted = redact_coordinate(Some(precise));

    assert_eq!(redacted, "(33.11, 139.79)");
    assert!(!redacted.contains("106712"));
    assert_eq!(redact_coordinate(None), "(unknown)");
}
