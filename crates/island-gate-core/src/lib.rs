#![warn(missing_docs)]
//! # island-gate-core
//!
//! ## Purpose
//! Defines the pure data model and geo math shared across the `island-gate`
//! workspace.
//!
//! ## Responsibilities
//! - Represent coordinates, the gated region, and detection outcomes.
//! - Compute great-circle distances and inclusive bounding-box membership.
//! - Define the persisted cache/ledger entry shapes and the derived
//!   [`AccessCapability`] snapshot.
//!
//! ## Data flow
//! A detector produces a [`Coordinate`] -> [`DetectionResult::measured`]
//! derives region membership and distance -> the store crate persists
//! [`CachedLocationEntry`] / [`AccessLedgerEntry`] values -> the access crate
//! projects an [`AccessCapability`].
//!
//! ## Ownership and lifetimes
//! All types are small owned values (`Copy` where possible) so detection
//! results can move freely between async tasks and persistence.
//!
//! ## Error model
//! Invalid coordinates or region bounds return [`CoreError`]. The geo
//! functions themselves are total over finite inputs.
//!
//! ## Example
//! ```rust
//! use island_gate_core::{Coordinate, Region, haversine_distance_km, is_inside_region};
//!
//! let region = Region::island();
//! let center = region.center;
//! assert!(is_inside_region(center, &region.bounds));
//! assert_eq!(haversine_distance_km(center, center), 0.0);
//! let tokyo = Coordinate::new(35.6762, 139.6503).unwrap();
//! assert!(!is_inside_region(tokyo, &region.bounds));
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, `[-90, 90]`.
    pub latitude: f64,
    /// Longitude in degrees, `[-180, 180]`.
    pub longitude: f64,
}

impl Coordinate {
    /// Constructs a validated coordinate.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidCoordinate`] for non-finite values or values
    /// outside WGS84 ranges.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoreError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoreError::InvalidCoordinate(format!(
                "non-finite value ({latitude}, {longitude})"
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoreError::InvalidCoordinate(format!(
                "latitude {latitude} out of range"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoreError::InvalidCoordinate(format!(
                "longitude {longitude} out of range"
            )));
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Axis-aligned latitude/longitude box.
///
/// The region used here never crosses the antimeridian, so `east > west`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    /// Northern edge latitude.
    pub north: f64,
    /// Southern edge latitude.
    pub south: f64,
    /// Eastern edge longitude.
    pub east: f64,
    /// Western edge longitude.
    pub west: f64,
}

impl RegionBounds {
    /// Constructs validated bounds.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidBounds`] unless all edges are finite,
    /// `north > south` and `east > west`.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self, CoreError> {
        if ![north, south, east, west].iter().all(|edge| edge.is_finite()) {
            return Err(CoreError::InvalidBounds(
                "edges must be finite".to_string(),
            ));
        }
        if north <= south {
            return Err(CoreError::InvalidBounds(format!(
                "north {north} must be greater than south {south}"
            )));
        }
        if east <= west {
            return Err(CoreError::InvalidBounds(format!(
                "east {east} must be greater than west {west}"
            )));
        }

        Ok(Self {
            north,
            south,
            east,
            west,
        })
    }
}

/// The gated area: its bounding box plus the reference point used for
/// distance reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Membership box.
    pub bounds: RegionBounds,
    /// Reference point for `distance_km`.
    pub center: Coordinate,
}

impl Region {
    /// The island this deployment serves. Fixed configuration.
    pub const fn island() -> Self {
        Self {
            bounds: RegionBounds {
                north: 33.1550,
                south: 33.0450,
                east: 139.8100,
                west: 139.7400,
            },
            center: Coordinate {
                latitude: 33.1067,
                longitude: 139.7853,
            },
        }
    }

    /// Returns `true` when `point` lies inside (or on the edge of) the region.
    pub fn contains(&self, point: Coordinate) -> bool {
        is_inside_region(point, &self.bounds)
    }

    /// Distance from `point` to the region center, rounded to 0.1 km.
    pub fn distance_from_center_km(&self, point: Coordinate) -> f64 {
        round_to_tenth(haversine_distance_km(point, self.center))
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::island()
    }
}

/// Great-circle distance between two coordinates in kilometers.
pub fn haversine_distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Inclusive bounding-box membership test. Points on any edge are inside.
pub fn is_inside_region(point: Coordinate, bounds: &RegionBounds) -> bool {
    point.latitude >= bounds.south
        && point.latitude <= bounds.north
        && point.longitude >= bounds.west
        && point.longitude <= bounds.east
}

/// Rounds a distance to one decimal place.
pub fn round_to_tenth(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

/// Lifecycle state of one detection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStatus {
    /// Detection in flight.
    Loading,
    /// A coordinate was obtained (measured or estimated).
    Success,
    /// Detection failed for a reason other than permission refusal.
    Error,
    /// The user refused location permission.
    Denied,
}

/// Outcome of one detection attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    /// Current state.
    pub status: DetectionStatus,
    /// Whether the coordinate fell inside the region. `false` unless
    /// `status == Success`.
    pub inside_region: bool,
    /// Distance to the region center rounded to 0.1 km.
    pub distance_km: Option<f64>,
    /// Coordinate the result was derived from.
    pub coordinate: Option<Coordinate>,
    /// Human-readable message. On a successful estimate this carries the
    /// "estimated, not measured" note.
    pub error_message: Option<String>,
    /// Whether the coordinate came from the network estimate instead of a
    /// sensor fix.
    #[serde(default)]
    pub estimated: bool,
}

impl DetectionResult {
    /// A detection in flight.
    pub fn loading() -> Self {
        Self {
            status: DetectionStatus::Loading,
            inside_region: false,
            distance_km: None,
            coordinate: None,
            error_message: None,
            estimated: false,
        }
    }

    /// A successful detection with precomputed membership and distance.
    pub fn success(
        inside_region: bool,
        distance_km: Option<f64>,
        coordinate: Option<Coordinate>,
    ) -> Self {
        Self {
            status: DetectionStatus::Success,
            inside_region,
            distance_km,
            coordinate,
            error_message: None,
            estimated: false,
        }
    }

    /// Derives a successful result from a coordinate and the gated region.
    pub fn measured(coordinate: Coordinate, region: &Region) -> Self {
        Self::success(
            region.contains(coordinate),
            Some(region.distance_from_center_km(coordinate)),
            Some(coordinate),
        )
    }

    /// A failed detection.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: DetectionStatus::Error,
            inside_region: false,
            distance_km: None,
            coordinate: None,
            error_message: Some(message.into()),
            estimated: false,
        }
    }

    /// A permission-refused detection.
    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            status: DetectionStatus::Denied,
            ..Self::error(message)
        }
    }

    /// Attaches a note to the message field without changing status.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.error_message = Some(match self.error_message.take() {
            Some(existing) if !existing.is_empty() => format!("{existing} ({note})"),
            _ => note,
        });
        self
    }

    /// Marks the result as a network estimate and attaches `note`.
    pub fn into_estimate(self, note: impl Into<String>) -> Self {
        Self {
            estimated: true,
            ..self.with_note(note)
        }
    }

    /// Returns `true` for a success inside the region.
    pub fn is_inside_success(&self) -> bool {
        self.status == DetectionStatus::Success && self.inside_region
    }
}

/// Single-slot persisted copy of the last successful detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedLocationEntry {
    /// Region membership at capture time.
    pub inside_region: bool,
    /// Distance to the region center at capture time.
    pub distance_km: Option<f64>,
    /// Captured coordinate.
    pub coordinate: Option<Coordinate>,
    /// Capture time in Unix epoch milliseconds.
    pub captured_at_ms: u64,
    /// Whether the cached coordinate was a network estimate. Entries written
    /// before this field existed decode as measured.
    #[serde(default)]
    pub estimated: bool,
}

impl CachedLocationEntry {
    /// Builds an entry from a detection result captured at `now_ms`.
    pub fn from_result(result: &DetectionResult, now_ms: u64) -> Self {
        Self {
            inside_region: result.inside_region,
            distance_km: result.distance_km,
            coordinate: result.coordinate,
            captured_at_ms: now_ms,
            estimated: result.estimated,
        }
    }

    /// Returns `true` while `now_ms - captured_at_ms < ttl_ms`.
    pub fn is_fresh(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.captured_at_ms) < ttl_ms
    }

    /// Rehydrates the cached outcome as a successful detection. The
    /// user-facing note is not stored; callers restore it from `estimated`.
    pub fn to_result(&self) -> DetectionResult {
        DetectionResult {
            estimated: self.estimated,
            ..DetectionResult::success(self.inside_region, self.distance_km, self.coordinate)
        }
    }
}

/// One recorded "observed inside the region" event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLedgerEntry {
    /// Event time in Unix epoch milliseconds.
    pub captured_at_ms: u64,
    /// Always `true`; only positive events are recorded.
    pub inside_region: bool,
    /// Coordinate of the event, when known.
    pub coordinate: Option<Coordinate>,
}

impl AccessLedgerEntry {
    /// Creates a positive access event.
    pub fn inside(captured_at_ms: u64, coordinate: Option<Coordinate>) -> Self {
        Self {
            captured_at_ms,
            inside_region: true,
            coordinate,
        }
    }

    /// Age of the entry at `now_ms`. Entries from the future have age zero.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.captured_at_ms)
    }
}

/// Derived capability snapshot. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCapability {
    /// Whether restricted actions are currently allowed.
    pub can_post: bool,
    /// Whether the live detection places the user inside the region.
    pub is_currently_in_region: bool,
    /// Whether the ledger holds an event inside the retention window.
    pub has_recent_region_access: bool,
    /// Most recent in-window access time.
    pub last_region_access_ms: Option<u64>,
}

/// Error type for core model validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Coordinate is non-finite or outside WGS84 ranges.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
    /// Region bounds violate ordering constraints.
    #[error("invalid region bounds: {0}")]
    InvalidBounds(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for geo math and result constructors.

    use super::*;

    fn coord(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate::new(latitude, longitude).expect("fixture coordinate should be valid")
    }

    #[test]
    fn haversine_is_zero_for_identical_points_and_symmetric() {
        let a = coord(33.1067, 139.7853);
        let b = coord(35.6762, 139.6503);
        assert_eq!(haversine_distance_km(a, a), 0.0);
        assert!((haversine_distance_km(a, b) - haversine_distance_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn island_center_is_inside_with_zero_distance() {
        let region = Region::island();
        let result = DetectionResult::measured(region.center, &region);
        assert!(result.inside_region);
        assert_eq!(result.distance_km, Some(0.0));
        assert_eq!(result.status, DetectionStatus::Success);
    }

    #[test]
    fn remote_city_is_outside_at_expected_distance() {
        let region = Region::island();
        let result = DetectionResult::measured(coord(35.6762, 139.6503), &region);
        assert!(!result.inside_region);
        let distance = result.distance_km.expect("distance should be set");
        assert!((distance - 287.0).abs() <= 5.0, "distance was {distance}");
    }

    #[test]
    fn rejects_invalid_coordinates_and_bounds() {
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(RegionBounds::new(1.0, 2.0, 3.0, 1.0).is_err());
        assert!(RegionBounds::new(2.0, 1.0, 1.0, 3.0).is_err());
        assert!(RegionBounds::new(2.0, 1.0, 3.0, 1.0).is_ok());
    }

    #[test]
    fn with_note_appends_to_existing_message() {
        let result = DetectionResult::success(false, Some(1.0), None).with_note("estimate");
        assert_eq!(result.error_message.as_deref(), Some("estimate"));
        let result = DetectionResult::error("failed").with_note("estimate");
        assert_eq!(result.error_message.as_deref(), Some("failed (estimate)"));
    }

    #[test]
    fn cache_entry_freshness_is_exclusive_at_ttl() {
        let entry = CachedLocationEntry {
            inside_region: true,
            distance_km: Some(0.0),
            coordinate: None,
            captured_at_ms: 1_000,
            estimated: false,
        };
        assert!(entry.is_fresh(1_000 + 3_599_999, 3_600_000));
        assert!(!entry.is_fresh(1_000 + 3_600_000, 3_600_000));
    }

    #[test]
    fn cache_entry_keeps_estimate_flag() {
        let estimate = DetectionResult::success(true, Some(2.5), None).into_estimate("estimated");
        assert!(estimate.estimated);
        let entry = CachedLocationEntry::from_result(&estimate, 1_000);
        assert!(entry.estimated);
        let restored = entry.to_result();
        assert!(restored.estimated);
        assert_eq!(restored.error_message, None);
    }
}
