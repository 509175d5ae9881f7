//! Durable alert storage.
//!
//! Alerts are the only durably persisted entity; all window and enforcement
//! state is in-memory. The trait keeps the engine independent of the backing
//! store so tests can run against an in-memory database.

pub mod sqlite_store;

pub use sqlite_store::SqliteAlertStore;

use thiserror::Error;

use crate::models::{
    ActivityType, ActorKind, Alert, AlertFilter, AlertStats, AlertStatus, Severity,
};

/// Errors that can occur during alert storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Alert not found: {0}")]
    NotFound(i64),
}

/// A fully-specified alert about to be persisted. The store assigns the id.
#[derive(Debug, Clone)]
pub struct NewAlert {
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
}

/// Trait for alert storage backends
pub trait AlertStore: Send + Sync {
    /// Persist a new alert with status `new`; returns the assigned id
    fn create(&self, alert: &NewAlert) -> Result<i64, StoreError>;

    /// Fetch one alert, including its action log
    fn get(&self, id: i64) -> Result<Option<Alert>, StoreError>;

    /// List alerts, newest first. Action logs are not populated here.
    fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError>;

    /// Recent alerts for one actor, newest first
    fn alerts_for_actor(&self, actor_id: &str, limit: usize) -> Result<Vec<Alert>, StoreError>;

    /// Overwrite status and review fields and append a status-change action.
    /// Any status may follow any other.
    fn update_status(
        &self,
        id: i64,
        status: AlertStatus,
        reviewer: &str,
        notes: Option<&str>,
        now: i64,
    ) -> Result<(), StoreError>;

    /// Append a free-form action without touching status
    fn append_action(
        &self,
        id: i64,
        action: &str,
        taken_by: Option<&str>,
        notes: Option<&str>,
        now: i64,
    ) -> Result<(), StoreError>;

    /// Apply one status change to many alerts; returns how many were updated
    fn bulk_update_status(
        &self,
        ids: &[i64],
        status: AlertStatus,
        reviewer: &str,
        now: i64,
    ) -> Result<usize, StoreError>;

    /// Record that a user-facing warning was dispatched for this alert
    fn mark_warning_sent(&self, id: i64, now: i64) -> Result<(), StoreError>;

    /// Count an actor's high/critical, non-false-positive alerts since the
    /// given timestamp. Feeds the auto-suspension rule.
    fn count_actor_violations(&self, actor_id: &str, since: i64) -> Result<usize, StoreError>;

    /// Aggregate dashboard statistics
    fn stats(&self, now: i64) -> Result<AlertStats, StoreError>;
}
