use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the vigil daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Input source configuration
    pub input: InputConfig,
    /// Detector thresholds
    pub thresholds: Thresholds,
    /// Alert storage configuration
    pub storage: StorageConfig,
    /// Security-warning notification configuration
    pub notify: NotifyConfig,
    /// Optional GeoIP database for resolving event locations
    pub geoip: GeoIpConfig,
}

/// Input source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to the JSONL audit-event file to tail
    pub event_file: PathBuf,
}

/// Alert storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite alert database
    pub db_path: PathBuf,
}

/// Notification dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub enabled: bool,
    /// Webhook receiving user-facing security warnings
    pub webhook_url: Option<String>,
}

/// GeoIP lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// Path to a MaxMind GeoLite2-City database, if available
    pub db_path: Option<PathBuf>,
}

/// Every detection and enforcement threshold, in one immutable structure
/// passed into the engine at construction. Tests tighten these without
/// touching detector logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Retention horizon for the per-actor activity window, in seconds
    pub activity_retention_secs: i64,
    /// Window for the rate-abuse detector, in seconds
    pub rapid_action_window_secs: i64,
    /// Actions within the rapid window before a rate-abuse alert
    pub max_actions_per_minute: usize,
    /// Off-hours interval: [start, 24) union [0, end), local hours
    pub off_hours_start: u32,
    pub off_hours_end: u32,
    /// Hours added to UTC when deriving the local hour from a timestamp
    pub utc_offset_hours: i32,
    /// Affected-record count above which access counts as bulk
    pub bulk_access_threshold: u64,
    /// Payment amount above which a payment is anomalous, in currency units
    pub suspicious_payment_amount: f64,
    /// Fields whose mutation raises a sensitive-mutation alert
    pub sensitive_fields: Vec<String>,
    /// Regex patterns for admin-only endpoints
    pub admin_endpoints: Vec<String>,
    /// Account create/delete actions per hour before a churn alert
    pub account_churn_threshold: usize,
    /// Window for the account-churn detector, in seconds
    pub churn_window_secs: i64,
    /// Export actions within the export window before an export-abuse alert
    pub max_exports_per_hour: usize,
    /// Window for the export-abuse detector, in seconds
    pub export_window_secs: i64,
    /// Failed logins per (identifier, ip) before an alert
    pub max_failed_logins: usize,
    /// Sliding window for failed-login tracking, in seconds
    pub failed_login_window_secs: i64,
    /// Failed logins from a single IP before that IP is blocked
    pub ip_block_threshold: usize,
    /// Duration of an automatic IP block, in seconds
    pub ip_block_secs: i64,
    /// High/critical alerts within the violation window before auto-suspension
    pub auto_suspend_violations: usize,
    /// Rolling window for violation counting, in seconds
    pub violation_window_secs: i64,
    /// Duration of an automatic account suspension, in seconds
    pub suspend_secs: i64,
    /// Distance between consecutive locations that flags a geo anomaly, in km
    pub geo_anomaly_distance_km: f64,
    /// Maximum elapsed time for the geo-anomaly comparison, in seconds
    pub geo_anomaly_window_secs: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            activity_retention_secs: 300,
            rapid_action_window_secs: 60,
            max_actions_per_minute: 60,
            off_hours_start: 23,
            off_hours_end: 5,
            utc_offset_hours: 0,
            bulk_access_threshold: 50,
            suspicious_payment_amount: 50_000.0,
            sensitive_fields: vec![
                "role".to_string(),
                "is_admin".to_string(),
                "permissions".to_string(),
                "fee".to_string(),
                "balance".to_string(),
                "status".to_string(),
            ],
            admin_endpoints: vec![
                "^/api/admin".to_string(),
                "^/api/users/delete".to_string(),
                "^/api/wallet/admin".to_string(),
            ],
            account_churn_threshold: 5,
            churn_window_secs: 3600,
            max_exports_per_hour: 10,
            export_window_secs: 3600,
            max_failed_logins: 5,
            failed_login_window_secs: 900,
            ip_block_threshold: 10,
            ip_block_secs: 3600,
            auto_suspend_violations: 3,
            violation_window_secs: 86_400,
            suspend_secs: 86_400,
            geo_anomaly_distance_km: 500.0,
            geo_anomaly_window_secs: 7200,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input: InputConfig {
                event_file: PathBuf::from("events.jsonl"),
            },
            thresholds: Thresholds::default(),
            storage: StorageConfig {
                db_path: PathBuf::from("alerts.db"),
            },
            notify: NotifyConfig {
                enabled: false,
                webhook_url: None,
            },
            geoip: GeoIpConfig { db_path: None },
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
