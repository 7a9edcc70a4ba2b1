#![warn(missing_docs)]
//! # island-gate-app
//!
//! ## Purpose
//! Orchestrates detection, caching, the access ledger and the gate for the
//! island bulletin board.
//!
//! ## Responsibilities
//! - Load runtime configuration from the environment.
//! - Hydrate the session from a fresh cached detection on cold start.
//! - Run detections on explicit request and apply the mandatory side effects
//!   (cache write on success, ledger write on inside-region success).
//! - Expose capability checks and explicit reset actions.
//!
//! ## Data flow
//! [`LocationSession::start`] -> cached outcome or `Unasked` ->
//! [`LocationSession::request_detection`] -> detector -> cache + ledger ->
//! [`LocationSession::capability`].
//!
//! ## Ownership and lifetimes
//! The session owns its detector, cache and ledger handles; the persistence
//! and clock ports behind them are shared `Arc`s.
//!
//! ## Error model
//! Detection outcomes are values, never errors. Persistence failures during
//! detection side effects are logged and swallowed. Explicit reset actions and
//! configuration problems surface as [`AppError`].
//!
//! ## Privacy notes
//! Coordinates are logged only through [`redact_coordinate`], which rounds to
//! roughly one kilometer.

use std::path::PathBuf;
use std::sync::Arc;

use island_gate_access::{AccessGate, Capability, GateDecision};
use island_gate_core::{AccessCapability, Coordinate, DetectionResult, DetectionStatus, Region};
use island_gate_detect::{
    DEFAULT_ESTIMATE_ENDPOINT, DetectError, HttpNetworkEstimator, LocationDetector,
    NOTE_ESTIMATED, PositionSensor, SensorOptions,
};
use island_gate_store::{
    ACCESS_LEDGER_CAP, ACCESS_RETENTION_WINDOW_MS, AccessLedger, Clock, KeyValueStore,
    LOCATION_CACHE_TTL_MS, LocationCache, StoreError,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("ISLAND_GATE_VERSION");

/// Env var overriding the persistence directory.
pub const ENV_DATA_DIR: &str = "ISLAND_GATE_DATA_DIR";
/// Env var overriding the IP-geolocation endpoint.
pub const ENV_ESTIMATE_ENDPOINT: &str = "ISLAND_GATE_ESTIMATE_ENDPOINT";
/// Env var toggling the network-estimate fallback.
pub const ENV_ESTIMATE_ENABLED: &str = "ISLAND_GATE_ESTIMATE_ENABLED";

/// Default persistence directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".island-gate";

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Gated region.
    pub region: Region,
    /// Location cache TTL.
    pub cache_ttl_ms: u64,
    /// Window in which a past access still grants capabilities.
    pub retention_window_ms: u64,
    /// Maximum ledger entries.
    pub ledger_cap: usize,
    /// Options passed to the position sensor.
    pub sensor: SensorOptions,
    /// IP-geolocation endpoint for the fallback.
    pub estimate_endpoint: String,
    /// Whether a `Denied` sensor result falls back to the estimate.
    pub estimate_enabled: bool,
    /// Directory for file-backed persistence.
    pub data_dir: PathBuf,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            region: Region::island(),
            cache_ttl_ms: LOCATION_CACHE_TTL_MS,
            retention_window_ms: ACCESS_RETENTION_WINDOW_MS,
            ledger_cap: ACCESS_LEDGER_CAP,
            sensor: SensorOptions::default(),
            estimate_endpoint: DEFAULT_ESTIMATE_ENDPOINT.to_string(),
            estimate_enabled: true,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl GateConfig {
    /// Loads configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, starting from defaults.
    ///
    /// Semantics:
    /// - Unset or blank values keep the default.
    /// - `ISLAND_GATE_ESTIMATE_ENABLED` set to `0`, `false` or `off`
    ///   (case-insensitive) disables the fallback; other values enable it.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = present(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(endpoint) = present(ENV_ESTIMATE_ENDPOINT) {
            config.estimate_endpoint = endpoint.trim().to_string();
        }
        if let Some(flag) = present(ENV_ESTIMATE_ENABLED) {
            config.estimate_enabled = flag_enabled(&flag);
        }

        config
    }
}

fn flag_enabled(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    !(normalized == "0" || normalized == "false" || normalized == "off")
}

/// Builds a detector for `config` around `sensor`.
///
/// # Errors
/// Returns [`AppError::Detect`] when the estimate endpoint is invalid.
pub fn build_detector(
    config: &GateConfig,
    sensor: Arc<dyn PositionSensor>,
) -> Result<LocationDetector, AppError> {
    let detector = LocationDetector::new(sensor, config.region).with_options(config.sensor);
    if !config.estimate_enabled {
        return Ok(detector);
    }

    let estimator = HttpNetworkEstimator::new(&config.estimate_endpoint)?;
    info!(endpoint = %estimator.endpoint(), "network estimate fallback enabled");
    Ok(detector.with_estimator(Arc::new(estimator)))
}

/// Installs the global `tracing` subscriber.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Calling this more than
/// once is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Formats a coordinate for logs, rounded to two decimals.
pub fn redact_coordinate(coordinate: Option<Coordinate>) -> String {
    match coordinate {
        Some(coordinate) => format!("({:.2}, {:.2})", coordinate.latitude, coordinate.longitude),
        None => "(unknown)".to_string(),
    }
}

/// Session-level detection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No detection this session and no fresh cache.
    Unasked,
    /// Detection in flight.
    Loading,
    /// Detection succeeded (possibly hydrated from cache).
    Success,
    /// Detection failed.
    Error,
    /// Permission refused and no estimate was available.
    Denied,
}

impl From<DetectionStatus> for SessionPhase {
    fn from(status: DetectionStatus) -> Self {
        match status {
            DetectionStatus::Loading => SessionPhase::Loading,
            DetectionStatus::Success => SessionPhase::Success,
            DetectionStatus::Error => SessionPhase::Error,
            DetectionStatus::Denied => SessionPhase::Denied,
        }
    }
}

/// One user's location-gating session.
pub struct LocationSession {
    detector: LocationDetector,
    cache: LocationCache,
    ledger: AccessLedger,
    retention_window_ms: u64,
    phase: SessionPhase,
    detection: DetectionResult,
    has_asked_permission: bool,
}

impl LocationSession {
    /// Creates a session and hydrates it from a fresh cached detection.
    pub fn start(
        config: &GateConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        detector: LocationDetector,
    ) -> Self {
        let cache =
            LocationCache::new(store.clone(), clock.clone()).with_ttl_ms(config.cache_ttl_ms);
        let ledger = AccessLedger::new(store, clock).with_cap(config.ledger_cap);

        let mut session = Self {
            detector,
            cache,
            ledger,
            retention_window_ms: config.retention_window_ms,
            phase: SessionPhase::Unasked,
            detection: DetectionResult::loading(),
            has_asked_permission: false,
        };

        if let Some(entry) = session.cache.load_if_fresh() {
            info!(
                inside_region = entry.inside_region,
                captured_at_ms = entry.captured_at_ms,
                estimated = entry.estimated,
                "restored location from cache"
            );
            let restored = entry.to_result();
            session.detection = if restored.estimated {
                restored.into_estimate(NOTE_ESTIMATED)
            } else {
                restored
            };
            session.phase = SessionPhase::Success;
            session.has_asked_permission = true;
        }

        session
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Latest detection. Meaningless while [`SessionPhase::Unasked`].
    pub fn detection(&self) -> &DetectionResult {
        &self.detection
    }

    /// Whether a detection was run (or restored) this session.
    pub fn has_asked_permission(&self) -> bool {
        self.has_asked_permission
    }

    /// The access ledger backing this session.
    pub fn ledger(&self) -> &AccessLedger {
        &self.ledger
    }

    /// The location cache backing this session.
    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    /// Runs one detection and applies its side effects.
    pub async fn request_detection(&mut self) -> &DetectionResult {
        self.phase = SessionPhase::Loading;
        self.detection = DetectionResult::loading();
        self.has_asked_permission = true;

        let result = self.detector.detect().await;
        self.apply_detection(result);
        &self.detection
    }

    /// Stores a fresh detection result and applies its side effects.
    ///
    /// A success is written to the cache; an inside-region success is also
    /// recorded in the ledger. Persistence failures are logged only.
    pub fn apply_detection(&mut self, result: DetectionResult) {
        if result.status == DetectionStatus::Success
            && let Err(error) = self.cache.save(&result)
        {
            warn!(%error, "failed to persist location cache");
        }

        if result.is_inside_success() {
            match self.ledger.record_access(result.coordinate) {
                Ok(()) => info!(
                    coordinate = %redact_coordinate(result.coordinate),
                    "recorded on-island access"
                ),
                Err(error) => warn!(%error, "failed to record on-island access"),
            }
        }

        info!(
            status = ?result.status,
            inside_region = result.inside_region,
            distance_km = ?result.distance_km,
            "detection finished"
        );
        self.phase = SessionPhase::from(result.status);
        self.detection = result;
    }

    /// Policy view over the current state.
    pub fn gate(&self) -> AccessGate<'_> {
        AccessGate::new(&self.detection, &self.ledger).with_window_ms(self.retention_window_ms)
    }

    /// Derived capability snapshot.
    pub fn capability(&self) -> AccessCapability {
        self.gate().capability()
    }

    /// Checks one restricted capability.
    pub fn can(&self, capability: Capability) -> bool {
        self.gate().allows(capability)
    }

    /// Checks one restricted capability and reports why.
    pub fn decide(&self, capability: Capability) -> GateDecision {
        self.gate().decide(capability)
    }

    /// Forgets the cached location and returns to [`SessionPhase::Unasked`].
    ///
    /// # Errors
    /// Returns [`AppError::Store`] when the cache cannot be cleared.
    pub fn reset_location(&mut self) -> Result<(), AppError> {
        self.cache.clear()?;
        self.phase = SessionPhase::Unasked;
        self.detection = DetectionResult::loading();
        self.has_asked_permission = false;
        info!("location cache cleared");
        Ok(())
    }

    /// Deletes the whole access history.
    ///
    /// # Errors
    /// Returns [`AppError::Store`] when the ledger cannot be cleared.
    pub fn reset_access_history(&self) -> Result<(), AppError> {
        self.ledger.clear_all()?;
        info!("access history cleared");
        Ok(())
    }
}

/// Renders the plain-text status report printed by the CLI.
///
/// One `key=value` line per fact, one line per capability decision, then the
/// capability snapshot as pretty JSON.
///
/// # Errors
/// Returns [`AppError::Encode`] when the snapshot cannot be serialized.
pub fn render_report(session: &LocationSession) -> Result<String, AppError> {
    let mut lines = vec![
        format!("island-gate {}", app_version()),
        format!("phase={:?}", session.phase()),
        format!("cache_ttl_ms={}", session.cache().ttl_ms()),
    ];

    let detection = session.detection();
    if session.has_asked_permission() {
        lines.push(format!("inside_region={}", detection.inside_region));
        if let Some(distance) = detection.distance_km {
            lines.push(format!("distance_km={distance:.1}"));
        }
        if detection.estimated {
            lines.push("estimated=true".to_string());
        }
        if let Some(message) = &detection.error_message {
            lines.push(format!("message={message}"));
        }
    }

    for capability in Capability::ALL {
        let decision = session.decide(capability);
        lines.push(format!(
            "{capability:?}: allowed={} reason={:?}",
            decision.allowed, decision.reason
        ));
    }

    lines.push(serde_json::to_string_pretty(&session.capability())?);
    Ok(lines.join("\n"))
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Detector construction failure.
    #[error("detect error: {0}")]
    Detect(#[from] DetectError),
    /// Report encoding failure.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    /// Invalid command-line input.
    #[error("usage error: {0}")]
    Usage(String),
}
