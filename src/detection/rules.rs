//! The detection rules.
//!
//! Each rule is an independent `Detector`; the engine fans a single
//! observation out to all of them. Thresholds are strict greater-than except
//! where noted (repeated auth failure and the IP block path use `>=`).

use regex::RegexSet;
use serde_json::json;

use super::{haversine_distance, Detector, Observation};
use crate::config::Thresholds;
use crate::models::{ActionKind, ActivityType, ActorKind, AlertCandidate, Severity};

/// Build the full pipeline in evaluation order.
///
/// Fails only if a configured admin-endpoint pattern is not a valid regex.
pub fn build_pipeline(cfg: &Thresholds) -> Result<Vec<Box<dyn Detector>>, regex::Error> {
    Ok(vec![
        Box::new(RateAbuseDetector),
        Box::new(OffHoursDetector),
        Box::new(BulkAccessDetector),
        Box::new(PaymentAnomalyDetector),
        Box::new(SensitiveMutationDetector),
        Box::new(UnauthorizedEndpointDetector::new(cfg)?),
        Box::new(AccountChurnDetector),
        Box::new(ExportAbuseDetector),
        Box::new(RepeatedAuthFailureDetector),
        Box::new(GeoAnomalyDetector),
    ])
}

/// Rapid, likely automated actions: actor exceeded the per-minute budget.
pub struct RateAbuseDetector;

impl Detector for RateAbuseDetector {
    fn name(&self) -> &'static str {
        "rate_abuse"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        let count = obs.minute_count;
        if count <= cfg.max_actions_per_minute {
            return None;
        }

        let severity = if count > cfg.max_actions_per_minute * 2 {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(AlertCandidate {
            activity_type: ActivityType::RateAbuse,
            severity,
            confidence: (50 + count).min(95) as u8,
            description: format!(
                "Unusually high activity: {} actions in {} seconds",
                count, cfg.rapid_action_window_secs
            ),
            details: json!({
                "ip_address": obs.event.source_ip.to_string(),
                "user_agent": obs.event.user_agent,
                "action_count": count,
                "window_secs": cfg.rapid_action_window_secs,
            }),
        })
    }
}

/// Access during the configured off-hours interval.
pub struct OffHoursDetector;

impl Detector for OffHoursDetector {
    fn name(&self) -> &'static str {
        "off_hours_access"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        let hour = obs.local_hour;
        let off_hours = hour >= cfg.off_hours_start || hour < cfg.off_hours_end;
        let watched = matches!(
            obs.event.action,
            ActionKind::Login | ActionKind::DataAccess | ActionKind::Modification
        );
        if !off_hours || !watched {
            return None;
        }

        Some(AlertCandidate {
            activity_type: ActivityType::OffHoursAccess,
            severity: Severity::Low,
            confidence: 40,
            description: format!("System access during off-hours ({}:00)", hour),
            details: json!({
                "ip_address": obs.event.source_ip.to_string(),
                "endpoint": obs.event.endpoint,
                "local_hour": hour,
            }),
        })
    }
}

/// A single operation touching an unusually large number of records.
pub struct BulkAccessDetector;

impl Detector for BulkAccessDetector {
    fn name(&self) -> &'static str {
        "bulk_access"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        let records = obs.event.affected_records?;
        if records <= cfg.bulk_access_threshold {
            return None;
        }

        let severity = if records > 200 {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(AlertCandidate {
            activity_type: ActivityType::BulkAccess,
            severity,
            confidence: (50 + records / 5).min(90) as u8,
            description: format!("Bulk data access: {} records accessed", records),
            details: json!({
                "endpoint": obs.event.endpoint,
                "affected_records": records,
            }),
        })
    }
}

/// Payment above the anomaly floor.
pub struct PaymentAnomalyDetector;

impl Detector for PaymentAnomalyDetector {
    fn name(&self) -> &'static str {
        "payment_anomaly"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        if obs.event.action != ActionKind::Payment {
            return None;
        }
        let amount = obs
            .event
            .payload
            .as_ref()
            .and_then(|p| p.get("amount"))
            .and_then(|a| a.as_f64())?;
        if amount <= cfg.suspicious_payment_amount {
            return None;
        }

        Some(AlertCandidate {
            activity_type: ActivityType::PaymentAnomaly,
            severity: Severity::High,
            confidence: 75,
            description: format!("Large payment detected: {}", amount),
            details: json!({
                "amount": amount,
                "endpoint": obs.event.endpoint,
                "payload": obs.event.payload,
            }),
        })
    }
}

/// A modification that changed one of the sensitive fields between the
/// before/after snapshots.
pub struct SensitiveMutationDetector;

impl Detector for SensitiveMutationDetector {
    fn name(&self) -> &'static str {
        "sensitive_mutation"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        if obs.event.action != ActionKind::Modification {
            return None;
        }
        let previous = obs.event.previous_value.as_ref()?.as_object()?;
        let new = obs.event.new_value.as_ref()?.as_object()?;

        let changed: Vec<&str> = new
            .iter()
            .filter(|(key, value)| {
                cfg.sensitive_fields.iter().any(|f| f == *key) && previous.get(*key) != Some(*value)
            })
            .map(|(key, _)| key.as_str())
            .collect();

        if changed.is_empty() {
            return None;
        }

        // Privilege-bearing fields get the top severity
        let severity = if changed.contains(&"role") || changed.contains(&"is_admin") {
            Severity::Critical
        } else {
            Severity::Medium
        };

        Some(AlertCandidate {
            activity_type: ActivityType::SensitiveMutation,
            severity,
            confidence: 80,
            description: format!("Sensitive fields modified: {}", changed.join(", ")),
            details: json!({
                "endpoint": obs.event.endpoint,
                "changed_fields": changed,
                "previous_value": obs.event.previous_value,
                "new_value": obs.event.new_value,
            }),
        })
    }
}

/// Non-administrator actor hitting an admin-only endpoint.
pub struct UnauthorizedEndpointDetector {
    admin_endpoints: RegexSet,
}

impl UnauthorizedEndpointDetector {
    pub fn new(cfg: &Thresholds) -> Result<Self, regex::Error> {
        Ok(UnauthorizedEndpointDetector {
            admin_endpoints: RegexSet::new(&cfg.admin_endpoints)?,
        })
    }
}

impl Detector for UnauthorizedEndpointDetector {
    fn name(&self) -> &'static str {
        "unauthorized_endpoint"
    }

    fn evaluate(&self, obs: &Observation<'_>, _cfg: &Thresholds) -> Option<AlertCandidate> {
        if obs.event.actor_kind == ActorKind::Administrator
            || !self.admin_endpoints.is_match(&obs.event.endpoint)
        {
            return None;
        }

        Some(AlertCandidate {
            activity_type: ActivityType::UnauthorizedEndpoint,
            severity: Severity::High,
            confidence: 90,
            description: format!(
                "Non-administrator attempted to access admin endpoint {}",
                obs.event.endpoint
            ),
            details: json!({
                "endpoint": obs.event.endpoint,
                "http_method": obs.event.http_method,
                "actor_kind": obs.event.actor_kind.as_str(),
            }),
        })
    }
}

/// Burst of account create/delete operations by one actor.
pub struct AccountChurnDetector;

impl Detector for AccountChurnDetector {
    fn name(&self) -> &'static str {
        "account_churn"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        if !obs.event.action.is_account_churn() || obs.churn_count <= cfg.account_churn_threshold {
            return None;
        }

        Some(AlertCandidate {
            activity_type: ActivityType::AccountChurn,
            severity: Severity::High,
            confidence: 85,
            description: format!(
                "Multiple account operations: {} in the last {} seconds",
                obs.churn_count, cfg.churn_window_secs
            ),
            details: json!({
                "action_count": obs.churn_count,
                "window_secs": cfg.churn_window_secs,
            }),
        })
    }
}

/// Excessive export operations by one actor.
pub struct ExportAbuseDetector;

impl Detector for ExportAbuseDetector {
    fn name(&self) -> &'static str {
        "export_abuse"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        if obs.event.action != ActionKind::Export || obs.export_count <= cfg.max_exports_per_hour {
            return None;
        }

        Some(AlertCandidate {
            activity_type: ActivityType::ExportAbuse,
            severity: Severity::High,
            confidence: 80,
            description: format!(
                "Excessive data exports: {} in the last {} seconds",
                obs.export_count, cfg.export_window_secs
            ),
            details: json!({
                "endpoint": obs.event.endpoint,
                "export_count": obs.export_count,
                "window_secs": cfg.export_window_secs,
            }),
        })
    }
}

/// Repeated authentication failures for one (identifier, ip) pair.
///
/// Only fires on the failed-login path, where the engine fills
/// `failed_pair_count`; for ordinary activity the count is zero and the rule
/// declines. Uses `>=` thresholds, unlike the other rate rules.
pub struct RepeatedAuthFailureDetector;

impl Detector for RepeatedAuthFailureDetector {
    fn name(&self) -> &'static str {
        "repeated_auth_failure"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        let count = obs.failed_pair_count;
        if count == 0 || count < cfg.max_failed_logins {
            return None;
        }

        let severity = if count >= cfg.max_failed_logins * 2 {
            Severity::Critical
        } else {
            Severity::High
        };

        Some(AlertCandidate {
            activity_type: ActivityType::RepeatedAuthFailure,
            severity,
            confidence: 95,
            description: format!(
                "{} failed login attempts in {} minutes",
                count,
                cfg.failed_login_window_secs / 60
            ),
            details: json!({
                "ip_address": obs.event.source_ip.to_string(),
                "user_agent": obs.event.user_agent,
                "attempt_count": count,
            }),
        })
    }
}

/// Physically implausible travel between consecutive location samples.
pub struct GeoAnomalyDetector;

impl Detector for GeoAnomalyDetector {
    fn name(&self) -> &'static str {
        "geo_anomaly"
    }

    fn evaluate(&self, obs: &Observation<'_>, cfg: &Thresholds) -> Option<AlertCandidate> {
        let current = obs.current_location?;
        let (prev_ts, prev_loc) = obs.previous_location?;

        let distance_km = haversine_distance(prev_loc, current);
        let elapsed = obs.event.timestamp - prev_ts;
        if distance_km <= cfg.geo_anomaly_distance_km || elapsed >= cfg.geo_anomaly_window_secs {
            return None;
        }

        let hours = elapsed as f64 / 3600.0;
        Some(AlertCandidate {
            activity_type: ActivityType::GeoAnomaly,
            severity: Severity::High,
            confidence: 85,
            description: format!(
                "Implausible travel: {:.0} km from last location in {:.1} hours",
                distance_km, hours
            ),
            details: json!({
                "ip_address": obs.event.source_ip.to_string(),
                "previous_location": { "latitude": prev_loc.latitude, "longitude": prev_loc.longitude },
                "new_location": { "latitude": current.latitude, "longitude": current.longitude },
                "distance_km": distance_km.round(),
                "elapsed_secs": elapsed,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::GeoLocation;
    use crate::models::ActivityEvent;
    use std::net::IpAddr;
    use std::str::FromStr;

    fn event(action: ActionKind) -> ActivityEvent {
        ActivityEvent {
            timestamp: 1_700_000_000,
            actor_id: Some("u1".to_string()),
            actor_kind: ActorKind::EndUser,
            display_name: Some("Test User".to_string()),
            email: Some("user@example.com".to_string()),
            role: None,
            action,
            endpoint: "/api/records".to_string(),
            http_method: "GET".to_string(),
            source_ip: IpAddr::from_str("10.0.0.1").unwrap(),
            user_agent: Some("test-agent".to_string()),
            payload: None,
            affected_records: None,
            previous_value: None,
            new_value: None,
            location: None,
        }
    }

    fn obs(ev: &ActivityEvent) -> Observation<'_> {
        Observation::bare(ev, 12)
    }

    #[test]
    fn test_rate_abuse_thresholds() {
        let cfg = Thresholds::default();
        let ev = event(ActionKind::DataAccess);

        let mut o = obs(&ev);
        o.minute_count = 60;
        assert!(RateAbuseDetector.evaluate(&o, &cfg).is_none(), "60 is not > 60");

        o.minute_count = 70;
        let alert = RateAbuseDetector.evaluate(&o, &cfg).unwrap();
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.confidence, 95); // min(95, 50 + 70)

        o.minute_count = 121;
        let alert = RateAbuseDetector.evaluate(&o, &cfg).unwrap();
        assert_eq!(alert.severity, Severity::High);
    }

    #[test]
    fn test_off_hours_window_edges() {
        let cfg = Thresholds::default();
        let ev = event(ActionKind::Login);

        let fire_hours = [23, 0, 4];
        let quiet_hours = [5, 12, 22];

        for h in fire_hours {
            let mut o = obs(&ev);
            o.local_hour = h;
            let alert = OffHoursDetector.evaluate(&o, &cfg).unwrap();
            assert_eq!(alert.severity, Severity::Low);
            assert_eq!(alert.confidence, 40);
        }
        for h in quiet_hours {
            let mut o = obs(&ev);
            o.local_hour = h;
            assert!(OffHoursDetector.evaluate(&o, &cfg).is_none(), "hour {}", h);
        }
    }

    #[test]
    fn test_off_hours_ignores_unwatched_actions() {
        let cfg = Thresholds::default();
        let ev = event(ActionKind::Payment);
        let mut o = obs(&ev);
        o.local_hour = 2;
        assert!(OffHoursDetector.evaluate(&o, &cfg).is_none());
    }

    #[test]
    fn test_bulk_access_severity_split() {
        let cfg = Thresholds::default();

        let mut ev = event(ActionKind::DataAccess);
        ev.affected_records = Some(50);
        assert!(BulkAccessDetector.evaluate(&obs(&ev), &cfg).is_none(), "50 is not > 50");

        ev.affected_records = Some(100);
        let alert = BulkAccessDetector.evaluate(&obs(&ev), &cfg).unwrap();
        assert_eq!(alert.severity, Severity::Medium);
        assert_eq!(alert.confidence, 70); // 50 + 100/5

        ev.affected_records = Some(500);
        let alert = BulkAccessDetector.evaluate(&obs(&ev), &cfg).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.confidence, 90); // capped
    }

    #[test]
    fn test_payment_anomaly() {
        let cfg = Thresholds::default();

        let mut ev = event(ActionKind::Payment);
        ev.payload = Some(serde_json::json!({ "amount": 75_000 }));
        let alert = PaymentAnomalyDetector.evaluate(&obs(&ev), &cfg).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.confidence, 75);

        ev.payload = Some(serde_json::json!({ "amount": 1_000 }));
        assert!(PaymentAnomalyDetector.evaluate(&obs(&ev), &cfg).is_none());

        // Missing amount never fires
        ev.payload = Some(serde_json::json!({}));
        assert!(PaymentAnomalyDetector.evaluate(&obs(&ev), &cfg).is_none());
    }

    #[test]
    fn test_sensitive_mutation_severity() {
        let cfg = Thresholds::default();

        let mut ev = event(ActionKind::Modification);
        ev.previous_value = Some(serde_json::json!({ "role": "staff", "balance": 10 }));
        ev.new_value = Some(serde_json::json!({ "role": "administrator", "balance": 10 }));
        let alert = SensitiveMutationDetector.evaluate(&obs(&ev), &cfg).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.confidence, 80);

        ev.previous_value = Some(serde_json::json!({ "balance": 10 }));
        ev.new_value = Some(serde_json::json!({ "balance": 9_999 }));
        let alert = SensitiveMutationDetector.evaluate(&obs(&ev), &cfg).unwrap();
        assert_eq!(alert.severity, Severity::Medium);

        // Non-sensitive change does not fire
        ev.previous_value = Some(serde_json::json!({ "nickname": "a" }));
        ev.new_value = Some(serde_json::json!({ "nickname": "b" }));
        assert!(SensitiveMutationDetector.evaluate(&obs(&ev), &cfg).is_none());
    }

    #[test]
    fn test_unauthorized_endpoint_first_event() {
        let cfg = Thresholds::default();
        let detector = UnauthorizedEndpointDetector::new(&cfg).unwrap();

        // First-ever event still fires: no history required
        let mut ev = event(ActionKind::DataAccess);
        ev.endpoint = "/api/admin/users".to_string();
        let alert = detector.evaluate(&obs(&ev), &cfg).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.confidence, 90);

        // Administrators are exempt
        ev.actor_kind = ActorKind::Administrator;
        assert!(detector.evaluate(&obs(&ev), &cfg).is_none());

        // Non-admin endpoint is fine
        ev.actor_kind = ActorKind::EndUser;
        ev.endpoint = "/api/records".to_string();
        assert!(detector.evaluate(&obs(&ev), &cfg).is_none());
    }

    #[test]
    fn test_account_churn() {
        let cfg = Thresholds::default();
        let ev = event(ActionKind::CreateAccount);

        let mut o = obs(&ev);
        o.churn_count = 5;
        assert!(AccountChurnDetector.evaluate(&o, &cfg).is_none(), "5 is not > 5");

        o.churn_count = 6;
        let alert = AccountChurnDetector.evaluate(&o, &cfg).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.confidence, 85);

        // Not a churn action
        let ev2 = event(ActionKind::DataAccess);
        let mut o2 = obs(&ev2);
        o2.churn_count = 10;
        assert!(AccountChurnDetector.evaluate(&o2, &cfg).is_none());
    }

    #[test]
    fn test_export_abuse() {
        let cfg = Thresholds::default();
        let ev = event(ActionKind::Export);

        let mut o = obs(&ev);
        o.export_count = 10;
        assert!(ExportAbuseDetector.evaluate(&o, &cfg).is_none(), "10 is not > 10");

        o.export_count = 11;
        let alert = ExportAbuseDetector.evaluate(&o, &cfg).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.confidence, 80);

        // Non-export action never fires
        let ev2 = event(ActionKind::DataAccess);
        let mut o2 = obs(&ev2);
        o2.export_count = 20;
        assert!(ExportAbuseDetector.evaluate(&o2, &cfg).is_none());
    }

    #[test]
    fn test_repeated_auth_failure_severity_promotion() {
        let cfg = Thresholds::default();
        let ev = event(ActionKind::Login);

        let mut o = obs(&ev);
        o.failed_pair_count = 4;
        assert!(RepeatedAuthFailureDetector.evaluate(&o, &cfg).is_none());

        o.failed_pair_count = 5;
        let alert = RepeatedAuthFailureDetector.evaluate(&o, &cfg).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.confidence, 95);

        o.failed_pair_count = 10;
        let alert = RepeatedAuthFailureDetector.evaluate(&o, &cfg).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
    }

    #[test]
    fn test_geo_anomaly_time_gating() {
        let cfg = Thresholds::default();
        let ev = event(ActionKind::Login);
        let nyc = GeoLocation { latitude: 40.7128, longitude: -74.0060 };
        let la = GeoLocation { latitude: 34.0522, longitude: -118.2437 };

        // ~3944 km in 1 hour: fires
        let mut o = obs(&ev);
        o.current_location = Some(la);
        o.previous_location = Some((ev.timestamp - 3600, nyc));
        let alert = GeoAnomalyDetector.evaluate(&o, &cfg).unwrap();
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.confidence, 85);

        // Same distance over 3 hours: does not fire
        o.previous_location = Some((ev.timestamp - 3 * 3600, nyc));
        assert!(GeoAnomalyDetector.evaluate(&o, &cfg).is_none());

        // No history: declines silently
        o.previous_location = None;
        assert!(GeoAnomalyDetector.evaluate(&o, &cfg).is_none());
    }

    #[test]
    fn test_pipeline_registers_all_rules() {
        let cfg = Thresholds::default();
        let pipeline = build_pipeline(&cfg).unwrap();
        assert_eq!(pipeline.len(), 10);
    }

    #[test]
    fn test_pipeline_rejects_bad_pattern() {
        let mut cfg = Thresholds::default();
        cfg.admin_endpoints.push("(".to_string());
        assert!(build_pipeline(&cfg).is_err());
    }
}
