#![warn(missing_docs)]
//! # island-gate-access
//!
//! ## Purpose
//! Decides whether the user may exercise a restricted capability right now.
//!
//! ## Responsibilities
//! - Combine the live [`DetectionResult`] with the [`AccessLedger`] history.
//! - Grant restricted capabilities while inside the region, or for the
//!   retention window after the last confirmed presence.
//! - Project the decision into an [`AccessCapability`] snapshot and
//!   user-facing [`GateDecision`] values.
//!
//! ## Data flow
//! Orchestrator detection state + ledger -> [`AccessGate`] ->
//! capability snapshot read by the presentation layer.
//!
//! ## Ownership and lifetimes
//! [`AccessGate`] borrows both inputs; it is a cheap, short-lived view built
//! on demand and never cached.
//!
//! ## Error model
//! The gate is total. `Loading`, `Error` and `Denied` detections grant
//! nothing on their own and fall back to the ledger.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//!
//! use island_gate_access::AccessGate;
//! use island_gate_core::DetectionResult;
//! use island_gate_store::{AccessLedger, ManualClock, MemoryStore};
//!
//! let ledger = AccessLedger::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(0)));
//! let detection = DetectionResult::loading();
//! assert!(!AccessGate::new(&detection, &ledger).can_exercise_restricted_capability());
//! ```

use island_gate_core::{AccessCapability, DetectionResult, DetectionStatus};
use island_gate_store::{ACCESS_RETENTION_WINDOW_MS, AccessLedger};
use serde::Serialize;
use tracing::trace;

/// Board features restricted to present (or recently present) islanders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Creating posts.
    Post,
    /// Commenting on posts.
    Comment,
    /// Viewing job listings.
    ViewJobListings,
}

impl Capability {
    /// Every restricted capability.
    pub const ALL: [Capability; 3] = [
        Capability::Post,
        Capability::Comment,
        Capability::ViewJobListings,
    ];
}

/// Why a capability was granted or withheld.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Live detection places the user inside the region.
    InsideRegion,
    /// User was confirmed inside the region within the retention window.
    RecentAccess,
    /// Live detection places the user outside and no recent access exists.
    OutsideRegion,
    /// No usable detection and no recent access exists.
    NotChecked,
}

/// Outcome of checking one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    /// Capability that was checked.
    pub capability: Capability,
    /// Whether it is allowed.
    pub allowed: bool,
    /// Reason for the outcome.
    pub reason: DecisionReason,
}

/// Policy view over the current detection and the access ledger.
pub struct AccessGate<'a> {
    detection: &'a DetectionResult,
    ledger: &'a AccessLedger,
    window_ms: u64,
}

impl<'a> AccessGate<'a> {
    /// Creates a gate using the 14-day retention window.
    pub fn new(detection: &'a DetectionResult, ledger: &'a AccessLedger) -> Self {
        Self {
            detection,
            ledger,
            window_ms: ACCESS_RETENTION_WINDOW_MS,
        }
    }

    /// Overrides the retention window.
    pub fn with_window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = window_ms;
        self
    }

    /// `true` iff the detection succeeded and placed the user inside.
    pub fn is_currently_inside_region(&self) -> bool {
        self.detection.status == DetectionStatus::Success && self.detection.inside_region
    }

    /// `true` iff the ledger holds an access inside the retention window.
    pub fn has_recent_access_grant(&self) -> bool {
        !self.ledger.query_recent_entries(self.window_ms).is_empty()
    }

    /// Inside now, or inside recently.
    pub fn can_exercise_restricted_capability(&self) -> bool {
        self.is_currently_inside_region() || self.has_recent_access_grant()
    }

    /// Checks one capability. All restricted capabilities share one rule.
    pub fn allows(&self, capability: Capability) -> bool {
        self.decide(capability).allowed
    }

    /// Checks one capability and reports why.
    pub fn decide(&self, capability: Capability) -> GateDecision {
        let reason = if self.is_currently_inside_region() {
            DecisionReason::InsideRegion
        } else if self.has_recent_access_grant() {
            DecisionReason::RecentAccess
        } else if self.detection.status == DetectionStatus::Success {
            DecisionReason::OutsideRegion
        } else {
            DecisionReason::NotChecked
        };
        let allowed = matches!(
            reason,
            DecisionReason::InsideRegion | DecisionReason::RecentAccess
        );
        trace!(?capability, allowed, ?reason, "capability decision");

        GateDecision {
            capability,
            allowed,
            reason,
        }
    }

    /// Derived capability snapshot.
    pub fn capability(&self) -> AccessCapability {
        let is_currently_in_region = self.is_currently_inside_region();
        let last_region_access_ms = self.ledger.most_recent_timestamp(self.window_ms);
        let has_recent_region_access = last_region_access_ms.is_some();

        AccessCapability {
            can_post: is_currently_in_region || has_recent_region_access,
            is_currently_in_region,
            has_recent_region_access,
            last_region_access_ms,
        }
    }
}
