//! Detector pipeline and its supporting window state.
//!
//! Detectors are pure per-call: each one reads the event plus a consistent
//! `Observation` snapshot assembled under the tracker lock, and optionally
//! emits an alert candidate. A single event may raise several alerts; the
//! pipeline never short-circuits between detectors.

pub mod failed_logins;
pub mod geo;
pub mod rules;
pub mod tracker;

pub use failed_logins::FailedLoginTracker;
pub use geo::{haversine_distance, GeoLocation, LocationTable};
pub use tracker::ActivityTracker;

use crate::config::Thresholds;
use crate::models::{ActivityEvent, AlertCandidate};

/// Consistent per-event snapshot of window state handed to every detector.
pub struct Observation<'a> {
    pub event: &'a ActivityEvent,
    /// Events for this actor in the rapid-action window, including this one
    pub minute_count: usize,
    /// Account create/delete actions for this actor in the churn window
    pub churn_count: usize,
    /// Export actions for this actor in the export window
    pub export_count: usize,
    /// Previous location sample, if one existed before this event
    pub previous_location: Option<(i64, GeoLocation)>,
    /// Location resolved for this event, if any
    pub current_location: Option<GeoLocation>,
    /// Local hour derived from the event timestamp
    pub local_hour: u32,
    /// Failed logins for (identifier, ip) in the auth-failure window; zero
    /// outside the failed-login path
    pub failed_pair_count: usize,
}

impl<'a> Observation<'a> {
    /// An observation with no window state, for detectors that only need the
    /// event itself.
    pub fn bare(event: &'a ActivityEvent, local_hour: u32) -> Self {
        Observation {
            event,
            minute_count: 0,
            churn_count: 0,
            export_count: 0,
            previous_location: None,
            current_location: None,
            local_hour,
            failed_pair_count: 0,
        }
    }
}

/// A single detection rule.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Evaluate the rule; `None` means the rule does not fire. A detector
    /// that cannot resolve its inputs declines silently.
    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate>;
}

/// Derive the local hour-of-day for a unix timestamp given a fixed UTC
/// offset. Deterministic, unlike asking the host for its timezone.
pub fn local_hour(timestamp: i64, utc_offset_hours: i32) -> u32 {
    let hours = timestamp.div_euclid(3600) + i64::from(utc_offset_hours);
    hours.rem_euclid(24) as u32
}
