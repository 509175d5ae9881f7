//! Failed-login tracking for brute force detection
//!
//! Attempts are counted in two sliding windows at once: per
//! (identifier, source IP) pair for identity-scoped alerting, and per source
//! IP alone for the IP-block escalation path.

use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Default)]
struct AttemptWindow {
    timestamps: Vec<i64>,
}

impl AttemptWindow {
    /// Add a timestamp, prune the window, and return the resulting count
    fn add_and_count(&mut self, timestamp: i64, window_secs: i64) -> usize {
        let cutoff = timestamp - window_secs;
        self.timestamps.retain(|&t| t > cutoff);
        self.timestamps.push(timestamp);
        self.timestamps.len()
    }
}

/// Tracks failed authentication attempts in sliding windows.
pub struct FailedLoginTracker {
    per_pair: HashMap<String, AttemptWindow>,
    per_ip: HashMap<String, AttemptWindow>,
    window_secs: i64,
}

impl FailedLoginTracker {
    pub fn new(window_secs: i64) -> Self {
        FailedLoginTracker {
            per_pair: HashMap::new(),
            per_ip: HashMap::new(),
            window_secs,
        }
    }

    /// Record one failed attempt. Returns the in-window counts for the
    /// (identifier, ip) pair and for the ip alone, including this attempt.
    pub fn record(&mut self, identifier: &str, ip: IpAddr, now: i64) -> (usize, usize) {
        let pair_key = format!("{}-{}", identifier, ip);
        let pair_count = self
            .per_pair
            .entry(pair_key)
            .or_default()
            .add_and_count(now, self.window_secs);

        let ip_count = self
            .per_ip
            .entry(ip.to_string())
            .or_default()
            .add_and_count(now, self.window_secs);

        (pair_count, ip_count)
    }

    /// Current in-window count for a (identifier, ip) pair
    pub fn pair_count(&self, identifier: &str, ip: IpAddr, now: i64) -> usize {
        let cutoff = now - self.window_secs;
        self.per_pair
            .get(&format!("{}-{}", identifier, ip))
            .map(|w| w.timestamps.iter().filter(|&&t| t > cutoff).count())
            .unwrap_or(0)
    }

    /// Current in-window count for a source IP
    pub fn ip_count(&self, ip: IpAddr, now: i64) -> usize {
        let cutoff = now - self.window_secs;
        self.per_ip
            .get(&ip.to_string())
            .map(|w| w.timestamps.iter().filter(|&&t| t > cutoff).count())
            .unwrap_or(0)
    }

    /// Drop keys whose windows have fully drained.
    pub fn prune_idle(&mut self, now: i64) {
        let cutoff = now - self.window_secs;
        for map in [&mut self.per_pair, &mut self.per_ip] {
            map.retain(|_, w| {
                w.timestamps.retain(|&t| t > cutoff);
                !w.timestamps.is_empty()
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ip(s: &str) -> IpAddr {
        IpAddr::from_str(s).unwrap()
    }

    #[test]
    fn test_pair_and_ip_counts() {
        let mut tracker = FailedLoginTracker::new(900);
        let t = 1_700_000_000;

        // Two identities attacked from the same IP
        tracker.record("alice@example.com", ip("9.9.9.9"), t);
        tracker.record("bob@example.com", ip("9.9.9.9"), t + 1);
        let (pair, ip_total) = tracker.record("alice@example.com", ip("9.9.9.9"), t + 2);

        assert_eq!(pair, 2);
        assert_eq!(ip_total, 3);
    }

    #[test]
    fn test_window_expiry() {
        let mut tracker = FailedLoginTracker::new(900);
        let t = 1_700_000_000;

        tracker.record("alice@example.com", ip("1.1.1.1"), t);
        tracker.record("alice@example.com", ip("1.1.1.1"), t + 100);

        // Past the 15-minute window the first attempt no longer counts
        let (pair, _) = tracker.record("alice@example.com", ip("1.1.1.1"), t + 950);
        assert_eq!(pair, 2);
        assert_eq!(tracker.pair_count("alice@example.com", ip("1.1.1.1"), t + 950), 2);
    }

    #[test]
    fn test_different_ips_tracked_separately() {
        let mut tracker = FailedLoginTracker::new(900);
        let t = 1_700_000_000;

        tracker.record("alice@example.com", ip("1.1.1.1"), t);
        tracker.record("alice@example.com", ip("2.2.2.2"), t + 1);

        assert_eq!(tracker.ip_count(ip("1.1.1.1"), t + 1), 1);
        assert_eq!(tracker.ip_count(ip("2.2.2.2"), t + 1), 1);
        assert_eq!(tracker.pair_count("alice@example.com", ip("1.1.1.1"), t + 1), 1);
    }

    #[test]
    fn test_prune_idle() {
        let mut tracker = FailedLoginTracker::new(60);

        tracker.record("alice@example.com", ip("1.1.1.1"), 1000);
        tracker.prune_idle(2000);

        assert_eq!(tracker.pair_count("alice@example.com", ip("1.1.1.1"), 2000), 0);
        assert_eq!(tracker.ip_count(ip("1.1.1.1"), 2000), 0);
    }
}
