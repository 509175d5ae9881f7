//! SQLite implementation of the AlertStore trait

use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

use super::{AlertStore, NewAlert, StoreError};
use crate::models::{
    ActivityType, ActorKind, Alert, AlertAction, AlertFilter, AlertStats, AlertStatus, Severity,
};

const DEFAULT_LIST_LIMIT: usize = 100;

/// SQLite-backed alert storage
pub struct SqliteAlertStore {
    conn: Mutex<Connection>,
}

impl SqliteAlertStore {
    /// Open (or create) the alert database at the specified path
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteAlertStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory database (useful for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteAlertStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn row_to_alert(row: &Row<'_>) -> Result<Alert, rusqlite::Error> {
        let actor_kind: String = row.get(3)?;
        let activity_type: String = row.get(7)?;
        let severity: String = row.get(8)?;
        let details: String = row.get(11)?;
        let status: String = row.get(12)?;

        Ok(Alert {
            id: row.get(0)?,
            created_at: row.get(1)?,
            actor_id: row.get(2)?,
            actor_kind: ActorKind::parse(&actor_kind).unwrap_or(ActorKind::EndUser),
            display_name: row.get(4)?,
            email: row.get(5)?,
            role: row.get(6)?,
            activity_type: ActivityType::parse(&activity_type).unwrap_or(ActivityType::Other),
            severity: Severity::parse(&severity).unwrap_or(Severity::Low),
            confidence: row.get(9)?,
            description: row.get(10)?,
            details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
            status: AlertStatus::parse(&status).unwrap_or(AlertStatus::New),
            reviewed_by: row.get(13)?,
            reviewed_at: row.get(14)?,
            review_notes: row.get(15)?,
            warning_sent: row.get::<_, i64>(16)? != 0,
            warning_at: row.get(17)?,
            actions: Vec::new(),
        })
    }

    fn load_actions(conn: &Connection, alert_id: i64) -> Result<Vec<AlertAction>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT action, taken_by, taken_at, notes FROM alert_actions
             WHERE alert_id = ? ORDER BY id ASC",
        )?;
        let actions = stmt
            .query_map(params![alert_id], |row| {
                Ok(AlertAction {
                    action: row.get(0)?,
                    taken_by: row.get(1)?,
                    taken_at: row.get(2)?,
                    notes: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(actions)
    }

    const SELECT_COLUMNS: &'static str = "id, created_at, actor_id, actor_kind, display_name, \
         email, role, activity_type, severity, confidence, description, details, status, \
         reviewed_by, reviewed_at, review_notes, warning_sent, warning_at";
}

impl AlertStore for SqliteAlertStore {
    fn create(&self, alert: &NewAlert) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alerts
             (created_at, actor_id, actor_kind, display_name, email, role,
              activity_type, severity, confidence, description, details, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'new')",
            params![
                alert.created_at,
                alert.actor_id,
                alert.actor_kind.as_str(),
                alert.display_name,
                alert.email,
                alert.role,
                alert.activity_type.as_str(),
                alert.severity.as_str(),
                alert.confidence,
                alert.description,
                alert.details.to_string(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Option<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM alerts WHERE id = ?", Self::SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;

        match stmt.query_row(params![id], Self::row_to_alert) {
            Ok(mut alert) => {
                alert.actions = Self::load_actions(&conn, id)?;
                Ok(Some(alert))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let mut conditions: Vec<&str> = Vec::new();
        let mut bindings: Vec<SqlValue> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            bindings.push(SqlValue::from(status.as_str().to_string()));
        }
        if let Some(severity) = filter.severity {
            conditions.push("severity = ?");
            bindings.push(SqlValue::from(severity.as_str().to_string()));
        }
        if let Some(activity_type) = filter.activity_type {
            conditions.push("activity_type = ?");
            bindings.push(SqlValue::from(activity_type.as_str().to_string()));
        }
        if let Some(actor_kind) = filter.actor_kind {
            conditions.push("actor_kind = ?");
            bindings.push(SqlValue::from(actor_kind.as_str().to_string()));
        }
        if let Some(since) = filter.since {
            conditions.push("created_at >= ?");
            bindings.push(SqlValue::from(since));
        }
        if let Some(until) = filter.until {
            conditions.push("created_at <= ?");
            bindings.push(SqlValue::from(until));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        bindings.push(SqlValue::from(limit as i64));

        let sql = format!(
            "SELECT {} FROM alerts{} ORDER BY created_at DESC, id DESC LIMIT ?",
            Self::SELECT_COLUMNS,
            where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let alerts = stmt
            .query_map(params_from_iter(bindings.iter()), Self::row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    fn alerts_for_actor(&self, actor_id: &str, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM alerts WHERE actor_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ?",
            Self::SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let alerts = stmt
            .query_map(params![actor_id, limit as i64], Self::row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    fn update_status(
        &self,
        id: i64,
        status: AlertStatus,
        reviewer: &str,
        notes: Option<&str>,
        now: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE alerts SET status = ?, reviewed_by = ?, reviewed_at = ?, review_notes = ?
             WHERE id = ?",
            params![status.as_str(), reviewer, now, notes, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }

        conn.execute(
            "INSERT INTO alert_actions (alert_id, action, taken_by, taken_at, notes)
             VALUES (?, ?, ?, ?, ?)",
            params![
                id,
                format!("Status changed to {}", status.as_str()),
                reviewer,
                now,
                notes
            ],
        )?;
        Ok(())
    }

    fn append_action(
        &self,
        id: i64,
        action: &str,
        taken_by: Option<&str>,
        notes: Option<&str>,
        now: i64,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn
            .query_row("SELECT 1 FROM alerts WHERE id = ?", params![id], |_| Ok(true))
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::NotFound(id));
        }

        conn.execute(
            "INSERT INTO alert_actions (alert_id, action, taken_by, taken_at, notes)
             VALUES (?, ?, ?, ?, ?)",
            params![id, action, taken_by, now, notes],
        )?;
        Ok(())
    }

    fn bulk_update_status(
        &self,
        ids: &[i64],
        status: AlertStatus,
        reviewer: &str,
        now: i64,
    ) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut updated = 0;
        for &id in ids {
            let n = conn.execute(
                "UPDATE alerts SET status = ?, reviewed_by = ?, reviewed_at = ? WHERE id = ?",
                params![status.as_str(), reviewer, now, id],
            )?;
            if n > 0 {
                conn.execute(
                    "INSERT INTO alert_actions (alert_id, action, taken_by, taken_at)
                     VALUES (?, ?, ?, ?)",
                    params![
                        id,
                        format!("Bulk status change to {}", status.as_str()),
                        reviewer,
                        now
                    ],
                )?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn mark_warning_sent(&self, id: i64, now: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE alerts SET warning_sent = 1, warning_at = ? WHERE id = ?",
            params![now, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn count_actor_violations(&self, actor_id: &str, since: i64) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts
             WHERE actor_id = ?
               AND severity IN ('high', 'critical')
               AND status != 'false_positive'
               AND created_at >= ?",
            params![actor_id, since],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn stats(&self, now: i64) -> Result<AlertStats, StoreError> {
        let conn = self.conn.lock().unwrap();

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM alerts", [], |r| r.get(0))?;
        let new_alerts: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE status = 'new'",
            [],
            |r| r.get(0),
        )?;

        let day_start = now - now.rem_euclid(86_400);
        let today: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE created_at >= ?",
            params![day_start],
            |r| r.get(0),
        )?;
        let week: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE created_at >= ?",
            params![now - 7 * 86_400],
            |r| r.get(0),
        )?;

        let mut stmt =
            conn.prepare("SELECT severity, COUNT(*) FROM alerts GROUP BY severity")?;
        let by_severity = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT activity_type, COUNT(*) FROM alerts
             GROUP BY activity_type ORDER BY COUNT(*) DESC LIMIT 10",
        )?;
        let by_type = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AlertStats {
            total: total as u64,
            new_alerts: new_alerts as u64,
            today: today as u64,
            week: week as u64,
            by_severity,
            by_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteAlertStore {
        SqliteAlertStore::in_memory().expect("Failed to create in-memory store")
    }

    fn new_alert(actor_id: &str, severity: Severity, created_at: i64) -> NewAlert {
        NewAlert {
            created_at,
            actor_id: Some(actor_id.to_string()),
            actor_kind: ActorKind::EndUser,
            display_name: Some("Test User".to_string()),
            email: Some("user@example.com".to_string()),
            role: None,
            activity_type: ActivityType::RateAbuse,
            severity,
            confidence: 80,
            description: "test alert".to_string(),
            details: json!({ "ip_address": "1.2.3.4" }),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = create_test_store();
        let id = store.create(&new_alert("u1", Severity::High, 1000)).unwrap();

        let alert = store.get(id).unwrap().unwrap();
        assert_eq!(alert.id, id);
        assert_eq!(alert.status, AlertStatus::New);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.confidence, 80);
        assert_eq!(alert.details["ip_address"], "1.2.3.4");
        assert!(!alert.warning_sent);
        assert!(alert.actions.is_empty());

        assert!(store.get(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_list_filters() {
        let store = create_test_store();
        store.create(&new_alert("u1", Severity::High, 1000)).unwrap();
        store.create(&new_alert("u2", Severity::Low, 2000)).unwrap();
        store.create(&new_alert("u3", Severity::High, 3000)).unwrap();

        let all = store.list(&AlertFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        // Newest first
        assert_eq!(all[0].created_at, 3000);

        let high = store
            .list(&AlertFilter {
                severity: Some(Severity::High),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(high.len(), 2);

        let ranged = store
            .list(&AlertFilter {
                since: Some(1500),
                until: Some(2500),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].created_at, 2000);

        let limited = store
            .list(&AlertFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_update_status_overwrite_semantics() {
        let store = create_test_store();
        let id = store.create(&new_alert("u1", Severity::High, 1000)).unwrap();

        store
            .update_status(id, AlertStatus::Resolved, "admin-1", Some("checked"), 2000)
            .unwrap();
        // Same status again is accepted, not an error
        store
            .update_status(id, AlertStatus::Resolved, "admin-1", None, 2100)
            .unwrap();
        // And so is going backwards
        store
            .update_status(id, AlertStatus::New, "admin-2", None, 2200)
            .unwrap();

        let alert = store.get(id).unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::New);
        assert_eq!(alert.reviewed_by.as_deref(), Some("admin-2"));
        // One action per transition, including the repeated one
        assert_eq!(alert.actions.len(), 3);
        assert_eq!(alert.actions[0].action, "Status changed to resolved");
    }

    #[test]
    fn test_update_status_twice_same_status_keeps_status() {
        let store = create_test_store();
        let id = store.create(&new_alert("u1", Severity::High, 1000)).unwrap();

        store
            .update_status(id, AlertStatus::Confirmed, "admin-1", None, 2000)
            .unwrap();
        store
            .update_status(id, AlertStatus::Confirmed, "admin-1", None, 2100)
            .unwrap();

        let alert = store.get(id).unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Confirmed);
        assert_eq!(alert.actions.len(), 2);
    }

    #[test]
    fn test_update_status_missing_alert() {
        let store = create_test_store();
        let result = store.update_status(42, AlertStatus::Resolved, "admin", None, 1000);
        assert!(matches!(result, Err(StoreError::NotFound(42))));
    }

    #[test]
    fn test_append_action() {
        let store = create_test_store();
        let id = store.create(&new_alert("u1", Severity::High, 1000)).unwrap();

        store
            .append_action(id, "Called the user", Some("admin-1"), Some("no answer"), 2000)
            .unwrap();

        let alert = store.get(id).unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::New, "append_action must not change status");
        assert_eq!(alert.actions.len(), 1);
        assert_eq!(alert.actions[0].action, "Called the user");

        assert!(matches!(
            store.append_action(999, "x", None, None, 2000),
            Err(StoreError::NotFound(999))
        ));
    }

    #[test]
    fn test_bulk_update_status() {
        let store = create_test_store();
        let a = store.create(&new_alert("u1", Severity::High, 1000)).unwrap();
        let b = store.create(&new_alert("u2", Severity::High, 1001)).unwrap();

        let updated = store
            .bulk_update_status(&[a, b, 999], AlertStatus::FalsePositive, "admin-1", 2000)
            .unwrap();
        assert_eq!(updated, 2);

        let alert = store.get(a).unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::FalsePositive);
        assert_eq!(alert.actions.len(), 1);
    }

    #[test]
    fn test_mark_warning_sent() {
        let store = create_test_store();
        let id = store.create(&new_alert("u1", Severity::Critical, 1000)).unwrap();

        store.mark_warning_sent(id, 1001).unwrap();
        let alert = store.get(id).unwrap().unwrap();
        assert!(alert.warning_sent);
        assert_eq!(alert.warning_at, Some(1001));
    }

    #[test]
    fn test_count_actor_violations() {
        let store = create_test_store();
        store.create(&new_alert("u1", Severity::High, 1000)).unwrap();
        store.create(&new_alert("u1", Severity::Critical, 2000)).unwrap();
        store.create(&new_alert("u1", Severity::Low, 2500)).unwrap();
        let fp = store.create(&new_alert("u1", Severity::High, 3000)).unwrap();
        store.create(&new_alert("u2", Severity::High, 3000)).unwrap();

        // False positives do not count
        store
            .update_status(fp, AlertStatus::FalsePositive, "admin", None, 3100)
            .unwrap();

        assert_eq!(store.count_actor_violations("u1", 0).unwrap(), 2);
        assert_eq!(store.count_actor_violations("u1", 1500).unwrap(), 1);
    }

    #[test]
    fn test_alerts_for_actor() {
        let store = create_test_store();
        store.create(&new_alert("u1", Severity::High, 1000)).unwrap();
        store.create(&new_alert("u1", Severity::Low, 2000)).unwrap();
        store.create(&new_alert("u2", Severity::High, 3000)).unwrap();

        let alerts = store.alerts_for_actor("u1", 50).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].created_at, 2000);
    }

    #[test]
    fn test_stats() {
        let store = create_test_store();
        let now = 10 * 86_400;
        store.create(&new_alert("u1", Severity::High, now - 100)).unwrap();
        store.create(&new_alert("u2", Severity::High, now - 2 * 86_400)).unwrap();
        store.create(&new_alert("u3", Severity::Low, now - 8 * 86_400)).unwrap();

        let stats = store.stats(now).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.new_alerts, 3);
        assert_eq!(stats.today, 1);
        assert_eq!(stats.week, 2);

        let high = stats.by_severity.iter().find(|(s, _)| s == "high").unwrap();
        assert_eq!(high.1, 2);
        let by_type_total: u64 = stats.by_type.iter().map(|(_, c)| c).sum();
        assert_eq!(by_type_total, 3);
    }

    #[test]
    fn test_on_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.db");

        let store = SqliteAlertStore::new(&path).unwrap();
        let id = store.create(&new_alert("u1", Severity::High, 1000)).unwrap();
        drop(store);

        // Reopen: the alert survived
        let store = SqliteAlertStore::new(&path).unwrap();
        assert!(store.get(id).unwrap().is_some());
    }
}
