//! Shared fixtures for app integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use island_gate_app::{GateConfig, LocationSession};
use island_gate_core::{Coordinate, Region};
use island_gate_detect::{
    DetectError, LocationDetector, NetworkEstimator, PositionSensor, SensorFailure, SensorFix,
    SensorOptions,
};
use island_gate_store::{ManualClock, MemoryStore};

/// Fixed start time for deterministic clocks.
#[allow(dead_code)]
pub const START_MS: u64 = 1_700_000_000_000;

/// Sensor replaying a queue of outcomes; an empty queue reports unavailable.
#[derive(Debug, Default)]
pub struct ScriptedSensor {
    outcomes: Mutex<VecDeque<Result<SensorFix, SensorFailure>>>,
}

impl ScriptedSensor {
    /// Creates a sensor replaying `outcomes` in order.
    #[allow(dead_code)]
    pub fn new(outcomes: Vec<Result<SensorFix, SensorFailure>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
        }
    }
}

#[async_trait]
impl PositionSensor for ScriptedSensor {
    async fn current_position(&self, _options: SensorOptions) -> Result<SensorFix, SensorFailure> {
        self.outcomes
            .lock()
            .expect("script lock should work")
            .pop_front()
            .unwrap_or(Err(SensorFailure::PositionUnavailable))
    }
}

/// Estimator returning a fixed coordinate, or failing when `None`.
#[derive(Debug, Clone, Copy)]
pub struct StaticEstimator(pub Option<Coordinate>);

#[async_trait]
impl NetworkEstimator for StaticEstimator {
    async fn estimate(&self) -> Result<Coordinate, DetectError> {
        self.0.ok_or(DetectError::MissingCoordinate)
    }
}

/// Builds a validated coordinate.
#[allow(dead_code)]
pub fn coord(latitude: f64, longitude: f64) -> Coordinate {
    Coordinate::new(latitude, longitude).expect("fixture coordinate should be valid")
}

/// A sensor fix at `coordinate`.
#[allow(dead_code)]
pub fn fix(coordinate: Coordinate) -> Result<SensorFix, SensorFailure> {
    Ok(SensorFix {
        coordinate,
        accuracy_m: Some(12.0),
    })
}

/// Coordinate at the island's harbor.
#[allow(dead_code)]
pub fn harbor() -> Coordinate {
    coord(33.1100, 139.7900)
}

/// Coordinate in the capital, far outside the region.
#[allow(dead_code)]
pub fn tokyo() -> Coordinate {
    coord(35.6762, 139.6503)
}

/// Shared store/clock pair so sessions can simulate reloads.
#[allow(dead_code)]
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub config: GateConfig,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::new(START_MS)),
            config: GateConfig::default(),
        }
    }

    /// Starts a session whose sensor replays `outcomes` and whose fallback
    /// estimator yields `estimate`.
    pub fn session(
        &self,
        outcomes: Vec<Result<SensorFix, SensorFailure>>,
        estimate: Option<Coordinate>,
    ) -> LocationSession {
        let sensor = Arc::new(ScriptedSensor::new(outcomes));
        let detector = LocationDetector::new(sensor, Region::island())
            .with_estimator(Arc::new(StaticEstimator(estimate)));
        LocationSession::start(&self.config, self.store.clone(), self.clock.clone(), detector)
    }
}
