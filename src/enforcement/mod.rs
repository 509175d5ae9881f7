//! Time-bounded enforcement registries: blocked IPs and suspended accounts.
//!
//! Entries are evicted lazily: a lookup past `expires_at` removes the entry
//! and reports it absent. The registries are instance-local; another process
//! instance has its own view.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

/// One block or suspension.
#[derive(Debug, Clone, Serialize)]
pub struct EnforcementEntry {
    pub key: String,
    pub reason: String,
    pub created_at: i64,
    pub expires_at: i64,
}

/// A map of keys to expiring entries. Lookups evict expired entries; explicit
/// `clear` removes one regardless of expiry.
#[derive(Default)]
struct TtlRegistry {
    entries: HashMap<String, EnforcementEntry>,
}

impl TtlRegistry {
    fn set(&mut self, key: &str, reason: &str, ttl_secs: i64, now: i64) {
        self.entries.insert(
            key.to_string(),
            EnforcementEntry {
                key: key.to_string(),
                reason: reason.to_string(),
                created_at: now,
                expires_at: now + ttl_secs,
            },
        );
    }

    /// Active iff `now <= expires_at`; expired entries are removed here.
    fn check(&mut self, key: &str, now: i64) -> Option<EnforcementEntry> {
        match self.entries.get(key) {
            Some(entry) if now <= entry.expires_at => Some(entry.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn clear(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    fn active(&mut self, now: i64) -> Vec<EnforcementEntry> {
        self.entries.retain(|_, e| now <= e.expires_at);
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.expires_at);
        entries
    }
}

/// The two symmetric registries behind per-registry locks. All operations
/// are infallible: an unreadable registry cannot happen with in-process
/// state, and lookups always answer.
pub struct EnforcementEngine {
    blocked_ips: RwLock<TtlRegistry>,
    suspensions: RwLock<TtlRegistry>,
    default_block_secs: i64,
    default_suspend_secs: i64,
}

impl EnforcementEngine {
    pub fn new(default_block_secs: i64, default_suspend_secs: i64) -> Self {
        EnforcementEngine {
            blocked_ips: RwLock::new(TtlRegistry::default()),
            suspensions: RwLock::new(TtlRegistry::default()),
            default_block_secs,
            default_suspend_secs,
        }
    }

    pub fn block_ip(&self, ip: &str, reason: &str, ttl_secs: Option<i64>, now: i64) {
        let ttl = ttl_secs.unwrap_or(self.default_block_secs);
        self.blocked_ips.write().unwrap().set(ip, reason, ttl, now);
        log::warn!("IP {} blocked for {}s: {}", ip, ttl, reason);
    }

    pub fn is_ip_blocked(&self, ip: &str, now: i64) -> Option<EnforcementEntry> {
        self.blocked_ips.write().unwrap().check(ip, now)
    }

    pub fn unblock_ip(&self, ip: &str) -> bool {
        let removed = self.blocked_ips.write().unwrap().clear(ip);
        if removed {
            log::info!("IP {} unblocked", ip);
        }
        removed
    }

    pub fn blocked_ips(&self, now: i64) -> Vec<EnforcementEntry> {
        self.blocked_ips.write().unwrap().active(now)
    }

    pub fn suspend(&self, actor_id: &str, reason: &str, ttl_secs: Option<i64>, now: i64) {
        let ttl = ttl_secs.unwrap_or(self.default_suspend_secs);
        self.suspensions.write().unwrap().set(actor_id, reason, ttl, now);
        log::warn!("Account {} suspended for {}s: {}", actor_id, ttl, reason);
    }

    pub fn is_suspended(&self, actor_id: &str, now: i64) -> Option<EnforcementEntry> {
        self.suspensions.write().unwrap().check(actor_id, now)
    }

    pub fn unsuspend(&self, actor_id: &str) -> bool {
        let removed = self.suspensions.write().unwrap().clear(actor_id);
        if removed {
            log::info!("Account {} unsuspended", actor_id);
        }
        removed
    }

    pub fn suspended_users(&self, now: i64) -> Vec<EnforcementEntry> {
        self.suspensions.write().unwrap().active(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EnforcementEngine {
        EnforcementEngine::new(3600, 86_400)
    }

    #[test]
    fn test_block_and_check() {
        let e = engine();
        e.block_ip("1.2.3.4", "too many failures", None, 1000);

        let entry = e.is_ip_blocked("1.2.3.4", 1001).unwrap();
        assert_eq!(entry.reason, "too many failures");
        assert_eq!(entry.expires_at, 1000 + 3600);

        assert!(e.is_ip_blocked("5.6.7.8", 1001).is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let e = engine();
        e.block_ip("1.2.3.4", "r", Some(100), 1000);

        // Active up to and including expires_at, absent strictly after
        assert!(e.is_ip_blocked("1.2.3.4", 1100).is_some());
        assert!(e.is_ip_blocked("1.2.3.4", 1101).is_none());
        // Lazy eviction: the entry is gone even when asked about earlier times
        assert!(e.is_ip_blocked("1.2.3.4", 1050).is_none());
    }

    #[test]
    fn test_explicit_unblock() {
        let e = engine();
        e.block_ip("1.2.3.4", "r", None, 1000);

        assert!(e.unblock_ip("1.2.3.4"));
        assert!(e.is_ip_blocked("1.2.3.4", 1001).is_none());
        assert!(!e.unblock_ip("1.2.3.4"));
    }

    #[test]
    fn test_set_replaces_entry() {
        let e = engine();
        e.block_ip("1.2.3.4", "first", Some(10), 1000);
        e.block_ip("1.2.3.4", "second", Some(1000), 1005);

        let entry = e.is_ip_blocked("1.2.3.4", 1500).unwrap();
        assert_eq!(entry.reason, "second");
    }

    #[test]
    fn test_suspension_lifecycle() {
        let e = engine();
        e.suspend("u1", "violations", None, 1000);

        assert!(e.is_suspended("u1", 1000 + 86_400).is_some());
        assert!(e.is_suspended("u1", 1000 + 86_401).is_none());

        e.suspend("u2", "violations", None, 1000);
        assert!(e.unsuspend("u2"));
        assert!(e.is_suspended("u2", 1001).is_none());
    }

    #[test]
    fn test_active_listing_skips_expired() {
        let e = engine();
        e.block_ip("1.1.1.1", "a", Some(50), 1000);
        e.block_ip("2.2.2.2", "b", Some(500), 1000);

        let active = e.blocked_ips(1100);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].key, "2.2.2.2");
    }
}
