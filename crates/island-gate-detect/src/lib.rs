#![warn(missing_docs)]
//! # island-gate-detect
//!
//! ## Purpose
//! Produces one [`DetectionResult`] per invocation using a two-tier strategy:
//! a high-accuracy position sensor first, and an IP-based network estimate
//! only when the user refused sensor permission.
//!
//! ## Responsibilities
//! - Define the sensor port ([`PositionSensor`]) and the estimate port
//!   ([`NetworkEstimator`]).
//! - Bound sensor requests by the configured timeout.
//! - Map every failure reason onto a structured result with a user-facing
//!   message.
//! - Provide the HTTP estimator used in production.
//!
//! ## Data flow
//! [`LocationDetector::detect`] -> sensor fix or failure -> (`Denied` only)
//! network estimate -> [`DetectionResult`].
//!
//! ## Ownership and lifetimes
//! Ports are shared as `Arc<dyn ..>` so one detector can be cloned into
//! independent call sites.
//!
//! ## Error model
//! Detection never fails with `Err`: every sensor and network failure becomes
//! an `Error` or `Denied` result. [`DetectError`] only describes estimator
//! failures and construction problems.
//!
//! ## Side effects
//! None beyond the sensor/network calls. Caching and ledger writes belong to
//! the orchestrating layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use island_gate_core::{Coordinate, CoreError, DetectionResult, DetectionStatus, Region};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Default IP-geolocation endpoint.
pub const DEFAULT_ESTIMATE_ENDPOINT: &str = "https://ipapi.co/json/";
/// Sensor fix timeout.
pub const SENSOR_TIMEOUT_MS: u64 = 10_000;
/// Oldest platform-cached fix the sensor may return.
pub const SENSOR_MAX_CACHED_AGE_MS: u64 = 5 * 60 * 1_000;

/// Message shown when permission was refused.
pub const MSG_PERMISSION_DENIED: &str = "位置情報の利用が許可されていません";
/// Message shown when no position could be determined.
pub const MSG_POSITION_UNAVAILABLE: &str = "位置情報が利用できません";
/// Message shown when the sensor timed out.
pub const MSG_TIMEOUT: &str = "位置情報の取得がタイムアウトしました";
/// Message shown for any other sensor failure.
pub const MSG_GENERIC: &str = "位置情報の取得に失敗しました";
/// Message shown when the platform has no location capability.
pub const MSG_UNSUPPORTED: &str = "この端末は位置情報に対応していません";
/// Message shown when the network estimate failed.
pub const MSG_ESTIMATE_FAILED: &str = "IPアドレスから位置を推定できませんでした";
/// Note attached to results derived from the network estimate.
pub const NOTE_ESTIMATED: &str = "IPアドレスからの推定値です（実測ではありません）";

/// Options passed to the platform sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorOptions {
    /// Request a high-accuracy (GPS-grade) fix.
    pub high_accuracy: bool,
    /// Give up after this many milliseconds.
    pub timeout_ms: u64,
    /// Accept platform-cached fixes up to this age.
    pub max_cached_age_ms: u64,
}

impl Default for SensorOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: SENSOR_TIMEOUT_MS,
            max_cached_age_ms: SENSOR_MAX_CACHED_AGE_MS,
        }
    }
}

/// One position fix returned by a sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFix {
    /// Measured coordinate.
    pub coordinate: Coordinate,
    /// Reported accuracy radius in meters.
    pub accuracy_m: Option<f64>,
}

/// Failure reasons reported by a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorFailure {
    /// Platform has no location capability.
    #[error("location sensor unsupported")]
    Unsupported,
    /// User refused permission.
    #[error("location permission denied")]
    PermissionDenied,
    /// Platform could not determine a position.
    #[error("position unavailable")]
    PositionUnavailable,
    /// No fix within the timeout.
    #[error("position request timed out")]
    Timeout,
    /// Any other platform failure.
    #[error("sensor failure: {0}")]
    Other(String),
}

/// Failure taxonomy used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No location capability at all; terminal, no fallback.
    SensorUnsupported,
    /// Permission refused; triggers the network estimate.
    PermissionDenied,
    /// Position could not be determined.
    PositionUnavailable,
    /// Sensor timed out.
    Timeout,
    /// Unclassified sensor failure.
    Unknown,
    /// Network estimate failed; terminal.
    NetworkEstimateFailed,
}

/// Maps a sensor failure onto the logging taxonomy.
pub fn classify_sensor_failure(failure: &SensorFailure) -> FailureKind {
    match failure {
        SensorFailure::Unsupported => FailureKind::SensorUnsupported,
        SensorFailure::PermissionDenied => FailureKind::PermissionDenied,
        SensorFailure::PositionUnavailable => FailureKind::PositionUnavailable,
        SensorFailure::Timeout => FailureKind::Timeout,
        SensorFailure::Other(_) => FailureKind::Unknown,
    }
}

/// Converts a sensor failure into the matching terminal result.
pub fn sensor_failure_result(failure: &SensorFailure) -> DetectionResult {
    match failure {
        SensorFailure::PermissionDenied => DetectionResult::denied(MSG_PERMISSION_DENIED),
        SensorFailure::Unsupported => DetectionResult::error(MSG_UNSUPPORTED),
        SensorFailure::PositionUnavailable => DetectionResult::error(MSG_POSITION_UNAVAILABLE),
        SensorFailure::Timeout => DetectionResult::error(MSG_TIMEOUT),
        SensorFailure::Other(_) => DetectionResult::error(MSG_GENERIC),
    }
}

/// One-shot position sensor port.
#[async_trait]
pub trait PositionSensor: Send + Sync {
    /// Requests one position fix.
    ///
    /// # Errors
    /// Returns the platform's [`SensorFailure`] reason.
    async fn current_position(&self, options: SensorOptions) -> Result<SensorFix, SensorFailure>;
}

/// Approximate-position port used after permission refusal.
#[async_trait]
pub trait NetworkEstimator: Send + Sync {
    /// Estimates the caller's coordinate.
    ///
    /// # Errors
    /// Returns [`DetectError`] when the lookup fails or carries no coordinate.
    async fn estimate(&self) -> Result<Coordinate, DetectError>;
}

/// Sensor returning a preconfigured outcome.
///
/// Used for manual coordinate entry and for hosts without a location API.
#[derive(Debug, Clone)]
pub struct FixedSensor {
    outcome: Result<SensorFix, SensorFailure>,
}

impl FixedSensor {
    /// Sensor that always reports `coordinate`.
    pub fn fix(coordinate: Coordinate) -> Self {
        Self {
            outcome: Ok(SensorFix {
                coordinate,
                accuracy_m: None,
            }),
        }
    }

    /// Sensor that always fails with `failure`.
    pub fn failing(failure: SensorFailure) -> Self {
        Self {
            outcome: Err(failure),
        }
    }

    /// Sensor for hosts without any location capability.
    pub fn unsupported() -> Self {
        Self::failing(SensorFailure::Unsupported)
    }
}

#[async_trait]
impl PositionSensor for FixedSensor {
    async fn current_position(&self, _options: SensorOptions) -> Result<SensorFix, SensorFailure> {
        self.outcome.clone()
    }
}

/// Minimal shape of an IP-geolocation response.
#[derive(Debug, Clone, Deserialize)]
struct IpLookupResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Extracts a coordinate from an IP-geolocation JSON body.
///
/// # Errors
/// Returns [`DetectError::Codec`] for invalid JSON or non-numeric fields,
/// [`DetectError::MissingCoordinate`] when either field is absent, and
/// [`DetectError::Core`] for out-of-range values.
pub fn parse_ip_lookup_response(raw: &str) -> Result<Coordinate, DetectError> {
    let response: IpLookupResponse = serde_json::from_str(raw)?;
    match (response.latitude, response.longitude) {
        (Some(latitude), Some(longitude)) => Ok(Coordinate::new(latitude, longitude)?),
        _ => Err(DetectError::MissingCoordinate),
    }
}

/// IP-geolocation estimator backed by an HTTPS endpoint.
#[derive(Debug, Clone)]
pub struct HttpNetworkEstimator {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpNetworkEstimator {
    /// Creates an estimator for `endpoint`.
    ///
    /// # Errors
    /// Returns [`DetectError::InvalidEndpoint`] unless the URL parses and uses
    /// HTTPS, or [`DetectError::Http`] when the client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, DetectError> {
        let endpoint = validate_estimate_endpoint(endpoint)?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("island-gate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { endpoint, client })
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl NetworkEstimator for HttpNetworkEstimator {
    async fn estimate(&self) -> Result<Coordinate, DetectError> {
        let body = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_ip_lookup_response(&body)
    }
}

/// Validates that an estimate endpoint is an HTTPS URL.
///
/// # Errors
/// Returns [`DetectError::InvalidEndpoint`] for unparsable or non-HTTPS URLs.
pub fn validate_estimate_endpoint(endpoint: &str) -> Result<Url, DetectError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| DetectError::InvalidEndpoint(format!("invalid estimate url: {error}")))?;
    if parsed.scheme() != "https" {
        return Err(DetectError::InvalidEndpoint(
            "estimate endpoint must use https".to_string(),
        ));
    }
    Ok(parsed)
}

/// Two-tier location detector.
#[derive(Clone)]
pub struct LocationDetector {
    sensor: Arc<dyn PositionSensor>,
    estimator: Option<Arc<dyn NetworkEstimator>>,
    region: Region,
    options: SensorOptions,
}

impl LocationDetector {
    /// Creates a detector for `region` with default sensor options and no
    /// fallback estimator.
    pub fn new(sensor: Arc<dyn PositionSensor>, region: Region) -> Self {
        Self {
            sensor,
            estimator: None,
            region,
            options: SensorOptions::default(),
        }
    }

    /// Enables the network-estimate fallback.
    pub fn with_estimator(mut self, estimator: Arc<dyn NetworkEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Overrides sensor options.
    pub fn with_options(mut self, options: SensorOptions) -> Self {
        self.options = options;
        self
    }

    /// Requests one sensor fix bounded by `options.timeout_ms`.
    pub async fn detect_via_sensor(&self) -> DetectionResult {
        let timeout = Duration::from_millis(self.options.timeout_ms);
        let request = self.sensor.current_position(self.options);
        let outcome = match tokio::time::timeout(timeout, request).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SensorFailure::Timeout),
        };

        match outcome {
            Ok(fix) => {
                let result = DetectionResult::measured(fix.coordinate, &self.region);
                debug!(
                    inside_region = result.inside_region,
                    distance_km = ?result.distance_km,
                    accuracy_m = ?fix.accuracy_m,
                    "sensor fix acquired"
                );
                result
            }
            Err(failure) => {
                warn!(
                    kind = ?classify_sensor_failure(&failure),
                    %failure,
                    "sensor detection failed"
                );
                sensor_failure_result(&failure)
            }
        }
    }

    /// Estimates the position from the network. Single attempt, no retry.
    pub async fn detect_via_network_estimate(&self) -> DetectionResult {
        let Some(estimator) = &self.estimator else {
            warn!("network estimate requested but no estimator is configured");
            return DetectionResult::error(MSG_ESTIMATE_FAILED);
        };

        match estimator.estimate().await {
            Ok(coordinate) => DetectionResult::measured(coordinate, &self.region),
            Err(error) => {
                warn!(
                    kind = ?FailureKind::NetworkEstimateFailed,
                    %error,
                    "network estimate failed"
                );
                DetectionResult::error(MSG_ESTIMATE_FAILED)
            }
        }
    }

    /// Runs the two-tier policy.
    ///
    /// Only a `Denied` sensor result triggers the network estimate; a
    /// successful estimate is flagged `estimated` and carries
    /// [`NOTE_ESTIMATED`] in `error_message`.
    /// Sensor errors are returned as-is.
    pub async fn detect(&self) -> DetectionResult {
        let sensed = self.detect_via_sensor().await;
        if sensed.status != DetectionStatus::Denied || self.estimator.is_none() {
            return sensed;
        }

        info!("sensor permission denied; falling back to network estimate");
        let estimated = self.detect_via_network_estimate().await;
        if estimated.status == DetectionStatus::Success {
            estimated.into_estimate(NOTE_ESTIMATED)
        } else {
            estimated
        }
    }
}

/// Errors produced by estimators and detector construction.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Endpoint is not an HTTPS URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// HTTP request or client failure.
    #[error("estimate request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Response body was not the expected JSON.
    #[error("estimate response decode failed: {0}")]
    Codec(#[from] serde_json::Error),
    /// Response had no usable latitude/longitude.
    #[error("estimate response missing coordinate")]
    MissingCoordinate,
    /// Coordinate failed validation.
    #[error("estimate coordinate invalid: {0}")]
    Core(#[from] CoreError),
}
