//! Security engine: event analysis, enforcement, and the admin surface
//!
//! The engine owns all mutable window state behind its own locks and exposes
//! a synchronous API. Analysis is fail-open: an error in one detector or in
//! persistence is logged and never blocks the event, and the ingestion entry
//! point never returns an error to its caller.

pub mod queue;

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use serde_json::json;

use crate::clock::{Clock, SystemClock};
use crate::config::Thresholds;
use crate::detection::rules::{self, RepeatedAuthFailureDetector};
use crate::detection::{
    local_hour, ActivityTracker, Detector, FailedLoginTracker, LocationTable, Observation,
};
use crate::directory::{LogOnlyDirectory, UserDirectory};
use crate::enforcement::{EnforcementEngine, EnforcementEntry};
use crate::geolocation::GeoIpService;
use crate::models::{
    ActionKind, ActivityEvent, ActivityType, ActorKind, Alert, AlertCandidate, AlertFilter,
    AlertStats, AlertStatus, Severity,
};
use crate::notify::{Notification, NotificationQueue};
use crate::persistence::{AlertStore, NewAlert, StoreError};

const CHURN_ACTIONS: [ActionKind; 2] = [ActionKind::CreateAccount, ActionKind::DeleteAccount];

/// The behavioral analysis and enforcement engine
pub struct SecurityEngine {
    thresholds: Thresholds,
    clock: Arc<dyn Clock>,
    activity: Mutex<ActivityTracker>,
    failed_logins: Mutex<FailedLoginTracker>,
    locations: Mutex<LocationTable>,
    detectors: Vec<Box<dyn Detector>>,
    enforcement: EnforcementEngine,
    store: Arc<dyn AlertStore>,
    notifications: Option<NotificationQueue>,
    geoip: Option<GeoIpService>,
    directory: Arc<dyn UserDirectory>,
}

impl SecurityEngine {
    /// Build an engine over the given thresholds and alert store.
    ///
    /// Fails only when an admin endpoint pattern is not a valid regex.
    pub fn new(thresholds: Thresholds, store: Arc<dyn AlertStore>) -> Result<Self, regex::Error> {
        let detectors = rules::build_pipeline(&thresholds)?;
        let enforcement =
            EnforcementEngine::new(thresholds.ip_block_secs, thresholds.suspend_secs);

        Ok(SecurityEngine {
            activity: Mutex::new(ActivityTracker::new(thresholds.activity_retention_secs)),
            failed_logins: Mutex::new(FailedLoginTracker::new(
                thresholds.failed_login_window_secs,
            )),
            locations: Mutex::new(LocationTable::new(thresholds.geo_anomaly_window_secs)),
            detectors,
            enforcement,
            store,
            clock: Arc::new(SystemClock),
            notifications: None,
            geoip: None,
            directory: Arc::new(LogOnlyDirectory),
            thresholds,
        })
    }

    /// Replace the time source (tests use a manual clock)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a queue for user-facing security warnings
    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    /// Attach a GeoIP service for resolving event locations
    pub fn with_geoip(mut self, geoip: GeoIpService) -> Self {
        self.geoip = Some(geoip);
        self
    }

    /// Replace the user directory hook used for auto-suspension
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Ingestion entry point. Never fails: a blocked source IP drops the
    /// event, everything else goes through analysis.
    pub fn report_activity(&self, event: &ActivityEvent) -> Vec<Alert> {
        let now = event.timestamp;
        if self
            .enforcement
            .is_ip_blocked(&event.source_ip.to_string(), now)
            .is_some()
        {
            log::debug!("Dropping event from blocked IP {}", event.source_ip);
            return Vec::new();
        }
        self.analyze_activity(event)
    }

    /// Run the full detector pipeline over one event.
    ///
    /// Window state is updated and snapshotted first, then every detector
    /// sees the same `Observation`. One event may raise several alerts.
    pub fn analyze_activity(&self, event: &ActivityEvent) -> Vec<Alert> {
        let now = event.timestamp;
        let key = event.actor_key();

        let current_location = event
            .location
            .or_else(|| {
                self.geoip
                    .as_ref()
                    .and_then(|g| g.lookup_optional(&event.source_ip))
            });

        let (minute_count, churn_count, export_count) = match key {
            Some(ref key) => {
                let mut activity = self.activity.lock().unwrap();
                activity.record(key, event.action, now);
                (
                    activity.window_count(key, self.thresholds.rapid_action_window_secs, now),
                    activity.window_count_of(
                        key,
                        &CHURN_ACTIONS,
                        self.thresholds.churn_window_secs,
                        now,
                    ),
                    activity.window_count_of(
                        key,
                        &[ActionKind::Export],
                        self.thresholds.export_window_secs,
                        now,
                    ),
                )
            }
            None => (0, 0, 0),
        };

        let previous_location = match (&key, current_location) {
            (Some(key), Some(location)) => {
                self.locations.lock().unwrap().observe(key, now, location)
            }
            _ => None,
        };

        let obs = Observation {
            event,
            minute_count,
            churn_count,
            export_count,
            previous_location,
            current_location,
            local_hour: local_hour(event.timestamp, self.thresholds.utc_offset_hours),
            failed_pair_count: 0,
        };

        let mut alerts = Vec::new();
        for detector in &self.detectors {
            if let Some(candidate) = detector.evaluate(&obs, &self.thresholds) {
                match self.create_alert(event, candidate, now, true) {
                    Ok(mut created) => alerts.append(&mut created),
                    Err(e) => {
                        log::error!("Failed to persist {} alert: {}", detector.name(), e)
                    }
                }
            }
        }
        alerts
    }

    /// Record a failed login attempt for an identifier/IP pair.
    ///
    /// Attempts from an already-blocked IP are ignored entirely: they are
    /// neither counted nor alerted. Returns the alert raised, if any.
    pub fn track_failed_login(
        &self,
        identifier: &str,
        ip: IpAddr,
        user_agent: Option<&str>,
    ) -> Option<Alert> {
        let now = self.clock.now_ts();
        if self.enforcement.is_ip_blocked(&ip.to_string(), now).is_some() {
            return None;
        }

        let (pair_count, ip_count) = self
            .failed_logins
            .lock()
            .unwrap()
            .record(identifier, ip, now);

        if ip_count >= self.thresholds.ip_block_threshold {
            self.enforcement.block_ip(
                &ip.to_string(),
                "excessive failed login attempts",
                None,
                now,
            );
            let candidate = AlertCandidate {
                activity_type: ActivityType::RepeatedAuthFailure,
                severity: Severity::Critical,
                confidence: 98,
                description: format!(
                    "{} failed login attempts from {}; IP blocked",
                    ip_count, ip
                ),
                details: json!({
                    "ip_address": ip.to_string(),
                    "attempt_count": ip_count,
                    "action": "ip_blocked",
                }),
            };
            let event = Self::login_failure_event(identifier, ip, user_agent, now);
            return match self.create_alert(&event, candidate, now, false) {
                Ok(mut alerts) => alerts.pop(),
                Err(e) => {
                    log::error!("Failed to persist IP-block alert: {}", e);
                    None
                }
            };
        }

        let event = Self::login_failure_event(identifier, ip, user_agent, now);
        let mut obs = Observation::bare(
            &event,
            local_hour(now, self.thresholds.utc_offset_hours),
        );
        obs.failed_pair_count = pair_count;

        let candidate = RepeatedAuthFailureDetector.evaluate(&obs, &self.thresholds)?;
        match self.create_alert(&event, candidate, now, false) {
            Ok(mut alerts) => alerts.pop(),
            Err(e) => {
                log::error!("Failed to persist auth-failure alert: {}", e);
                None
            }
        }
    }

    fn login_failure_event(
        identifier: &str,
        ip: IpAddr,
        user_agent: Option<&str>,
        now: i64,
    ) -> ActivityEvent {
        ActivityEvent {
            timestamp: now,
            actor_id: None,
            actor_kind: ActorKind::EndUser,
            display_name: None,
            email: Some(identifier.to_string()),
            role: None,
            action: ActionKind::Login,
            endpoint: "/auth/login".to_string(),
            http_method: "POST".to_string(),
            source_ip: ip,
            user_agent: user_agent.map(ToString::to_string),
            payload: None,
            affected_records: None,
            previous_value: None,
            new_value: None,
            location: None,
        }
    }

    /// Persist a candidate, dispatch the warning for high-severity alerts,
    /// and run the auto-suspension check. Returns the created alert plus any
    /// escalation alert.
    fn create_alert(
        &self,
        event: &ActivityEvent,
        candidate: AlertCandidate,
        now: i64,
        escalate: bool,
    ) -> Result<Vec<Alert>, StoreError> {
        let new_alert = NewAlert {
            created_at: now,
            actor_id: event.actor_id.clone(),
            actor_kind: event.actor_kind,
            display_name: event.display_name.clone(),
            email: event.email.clone(),
            role: event.role.clone(),
            activity_type: candidate.activity_type,
            severity: candidate.severity,
            confidence: candidate.confidence,
            description: candidate.description.clone(),
            details: candidate.details.clone(),
        };
        let id = self.store.create(&new_alert)?;

        log::warn!(
            "Alert {}: {} [{}] {}",
            id,
            candidate.activity_type.as_str(),
            candidate.severity.as_str(),
            candidate.description
        );

        let mut created = vec![Alert {
            id,
            created_at: now,
            actor_id: new_alert.actor_id.clone(),
            actor_kind: new_alert.actor_kind,
            display_name: new_alert.display_name.clone(),
            email: new_alert.email.clone(),
            role: new_alert.role.clone(),
            activity_type: candidate.activity_type,
            severity: candidate.severity,
            confidence: candidate.confidence,
            description: candidate.description,
            details: candidate.details,
            status: AlertStatus::New,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
            warning_sent: false,
            warning_at: None,
            actions: Vec::new(),
        }];

        if candidate.severity >= Severity::High {
            self.send_warning(&mut created[0], now);

            if escalate {
                if let Some(alert) = self.check_auto_suspension(event, now) {
                    created.push(alert);
                }
            }
        }

        Ok(created)
    }

    /// Queue a user-facing warning and record dispatch on success
    fn send_warning(&self, alert: &mut Alert, now: i64) {
        let queue = match self.notifications {
            Some(ref queue) => queue,
            None => return,
        };
        let actor_id = match alert.actor_id {
            Some(ref id) => id.clone(),
            None => return,
        };

        let notification = Notification::security_warning(
            &actor_id,
            alert.actor_kind,
            &alert.description,
            alert.severity,
        );
        if queue.queue(notification) {
            if let Err(e) = self.store.mark_warning_sent(alert.id, now) {
                log::error!("Failed to record warning dispatch for alert {}: {}", alert.id, e);
            } else {
                alert.warning_sent = true;
                alert.warning_at = Some(now);
            }
        }
    }

    /// Suspend an actor who accumulated too many serious violations.
    ///
    /// An actor under an active suspension is never re-suspended, so a burst
    /// of violations produces exactly one suspension alert.
    fn check_auto_suspension(&self, event: &ActivityEvent, now: i64) -> Option<Alert> {
        let actor_id = event.actor_id.as_deref()?;
        if self.enforcement.is_suspended(actor_id, now).is_some() {
            return None;
        }

        let since = now - self.thresholds.violation_window_secs;
        let violations = match self.store.count_actor_violations(actor_id, since) {
            Ok(n) => n,
            Err(e) => {
                log::error!("Violation count failed for {}: {}", actor_id, e);
                return None;
            }
        };
        if violations < self.thresholds.auto_suspend_violations {
            return None;
        }

        let reason = format!("{} serious violations in 24h", violations);
        self.enforcement.suspend(actor_id, &reason, None, now);

        // The suspension stands even if the directory call fails
        if let Err(e) = self.directory.deactivate(actor_id, &reason) {
            log::error!("Directory deactivation failed for {}: {}", actor_id, e);
        }

        let candidate = AlertCandidate {
            activity_type: ActivityType::AutoSuspension,
            severity: Severity::Critical,
            confidence: 100,
            description: format!("Account automatically suspended: {}", reason),
            details: json!({
                "violation_count": violations,
                "suspend_secs": self.thresholds.suspend_secs,
            }),
        };
        match self.create_alert(event, candidate, now, false) {
            Ok(mut alerts) => alerts.pop(),
            Err(e) => {
                log::error!("Failed to persist suspension alert: {}", e);
                None
            }
        }
    }

    // Fast guards for the request path. The returned entry carries the
    // reason and expiry so the caller can reject the request with both.

    pub fn is_ip_blocked(&self, ip: IpAddr) -> Option<EnforcementEntry> {
        self.enforcement
            .is_ip_blocked(&ip.to_string(), self.clock.now_ts())
    }

    pub fn is_user_suspended(&self, actor_id: &str) -> Option<EnforcementEntry> {
        self.enforcement.is_suspended(actor_id, self.clock.now_ts())
    }

    // Admin surface

    pub fn block_ip(&self, ip: &str, reason: &str, ttl_secs: Option<i64>) {
        self.enforcement
            .block_ip(ip, reason, ttl_secs, self.clock.now_ts());
    }

    pub fn unblock_ip(&self, ip: &str) -> bool {
        self.enforcement.unblock_ip(ip)
    }

    pub fn blocked_ips(&self) -> Vec<EnforcementEntry> {
        self.enforcement.blocked_ips(self.clock.now_ts())
    }

    pub fn suspend_user(&self, actor_id: &str, reason: &str, ttl_secs: Option<i64>) {
        self.enforcement
            .suspend(actor_id, reason, ttl_secs, self.clock.now_ts());
    }

    /// Lift a suspension and ask the directory to reactivate the account
    pub fn unsuspend_user(&self, actor_id: &str) -> bool {
        let removed = self.enforcement.unsuspend(actor_id);
        if removed {
            if let Err(e) = self.directory.reactivate(actor_id) {
                log::error!("Directory reactivation failed for {}: {}", actor_id, e);
            }
        }
        removed
    }

    pub fn suspended_users(&self) -> Vec<EnforcementEntry> {
        self.enforcement.suspended_users(self.clock.now_ts())
    }

    pub fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        self.store.list(filter)
    }

    pub fn alert(&self, id: i64) -> Result<Option<Alert>, StoreError> {
        self.store.get(id)
    }

    pub fn alerts_for_actor(&self, actor_id: &str, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.store.alerts_for_actor(actor_id, limit)
    }

    pub fn update_alert_status(
        &self,
        id: i64,
        status: AlertStatus,
        reviewer: &str,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        self.store
            .update_status(id, status, reviewer, notes, self.clock.now_ts())
    }

    pub fn add_action(
        &self,
        id: i64,
        action: &str,
        taken_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        self.store
            .append_action(id, action, taken_by, notes, self.clock.now_ts())
    }

    pub fn bulk_update_status(
        &self,
        ids: &[i64],
        status: AlertStatus,
        reviewer: &str,
    ) -> Result<usize, StoreError> {
        self.store
            .bulk_update_status(ids, status, reviewer, self.clock.now_ts())
    }

    pub fn stats(&self) -> Result<AlertStats, StoreError> {
        self.store.stats(self.clock.now_ts())
    }

    /// Periodic maintenance: drop drained windows and expired enforcement
    /// entries. Correctness does not depend on this running; it only bounds
    /// memory.
    pub fn prune_stale(&self) {
        let now = self.clock.now_ts();
        self.activity.lock().unwrap().prune_idle(now);
        self.failed_logins.lock().unwrap().prune_idle(now);
        self.locations.lock().unwrap().prune_idle(now);
        // Listing prunes expired entries as a side effect
        let _ = self.enforcement.blocked_ips(now);
        let _ = self.enforcement.suspended_users(now);
    }
}
