//! Alert records: the durable output of the detector pipeline.

use serde::{Deserialize, Serialize};

use super::ActorKind;

/// Severity assigned by the detector that raised the alert. Ordered so that
/// `>= High` selects the alerts that warrant warnings and escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Classification of the suspicious behavior an alert documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    RateAbuse,
    OffHoursAccess,
    BulkAccess,
    PaymentAnomaly,
    SensitiveMutation,
    UnauthorizedEndpoint,
    AccountChurn,
    RepeatedAuthFailure,
    GeoAnomaly,
    AutoSuspension,
    ExportAbuse,
    Other,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::RateAbuse => "rate_abuse",
            ActivityType::OffHoursAccess => "off_hours_access",
            ActivityType::BulkAccess => "bulk_access",
            ActivityType::PaymentAnomaly => "payment_anomaly",
            ActivityType::SensitiveMutation => "sensitive_mutation",
            ActivityType::UnauthorizedEndpoint => "unauthorized_endpoint",
            ActivityType::AccountChurn => "account_churn",
            ActivityType::RepeatedAuthFailure => "repeated_auth_failure",
            ActivityType::GeoAnomaly => "geo_anomaly",
            ActivityType::AutoSuspension => "auto_suspension",
            ActivityType::ExportAbuse => "export_abuse",
            ActivityType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rate_abuse" => Some(ActivityType::RateAbuse),
            "off_hours_access" => Some(ActivityType::OffHoursAccess),
            "bulk_access" => Some(ActivityType::BulkAccess),
            "payment_anomaly" => Some(ActivityType::PaymentAnomaly),
            "sensitive_mutation" => Some(ActivityType::SensitiveMutation),
            "unauthorized_endpoint" => Some(ActivityType::UnauthorizedEndpoint),
            "account_churn" => Some(ActivityType::AccountChurn),
            "repeated_auth_failure" => Some(ActivityType::RepeatedAuthFailure),
            "geo_anomaly" => Some(ActivityType::GeoAnomaly),
            "auto_suspension" => Some(ActivityType::AutoSuspension),
            "export_abuse" => Some(ActivityType::ExportAbuse),
            "other" => Some(ActivityType::Other),
            _ => None,
        }
    }
}

/// Review lifecycle of an alert. Transitions are caller-driven overwrites;
/// there is deliberately no transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    New,
    Investigating,
    Confirmed,
    FalsePositive,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Investigating => "investigating",
            AlertStatus::Confirmed => "confirmed",
            AlertStatus::FalsePositive => "false_positive",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(AlertStatus::New),
            "investigating" => Some(AlertStatus::Investigating),
            "confirmed" => Some(AlertStatus::Confirmed),
            "false_positive" => Some(AlertStatus::FalsePositive),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

/// Output of a single detector: everything except the actor identity, which
/// the engine fills in from the event when it persists the record.
#[derive(Debug, Clone)]
pub struct AlertCandidate {
    pub activity_type: ActivityType,
    pub severity: Severity,
    pub confidence: u8,
    pub description: String,
    pub details: serde_json::Value,
}

/// One entry in an alert's append-only action log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAction {
    pub action: String,
    pub taken_by: Option<String>,
    pub taken_at: i64,
    pub notes: Option<String>,
}

/// A persisted alert. Severity and confidence are immutable after creation;
/// only status, review metadata and the action log change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub created_at: i64,
    pub actor_id: Option<String>,
    pub actor_kind: ActorKind,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub activity_type: ActivityType,
    pub severity: Severity,
    pub confidence: u8,
    pub description: String,
    pub details: serde_json::Value,
    pub status: AlertStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<i64>,
    pub review_notes: Option<String>,
    pub warning_sent: bool,
    pub warning_at: Option<i64>,
    pub actions: Vec<AlertAction>,
}

/// Filter for the admin listing surface. All fields are optional and AND-ed.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
    pub activity_type: Option<ActivityType>,
    pub actor_kind: Option<ActorKind>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<usize>,
}

/// Aggregate dashboard statistics.
#[derive(Debug, Clone, Serialize)]
pub struct AlertStats {
    pub total: u64,
    pub new_alerts: u64,
    pub today: u64,
    pub week: u64,
    pub by_severity: Vec<(String, u64)>,
    pub by_type: Vec<(String, u64)>,
}
