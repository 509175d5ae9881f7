use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Geographic coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Calculate the great-circle distance between two points using the Haversine
/// formula. Returns distance in kilometers.
pub fn haversine_distance(loc1: GeoLocation, loc2: GeoLocation) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = loc1.latitude.to_radians();
    let lat2_rad = loc2.latitude.to_radians();
    let delta_lat = (loc2.latitude - loc1.latitude).to_radians();
    let delta_lon = (loc2.longitude - loc1.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Last known location per tracking key. Size-1 history: each observation
/// overwrites the previous sample and hands it back for comparison.
pub struct LocationTable {
    samples: HashMap<String, (i64, GeoLocation)>,
    /// Samples older than this are treated as absent and dropped by the sweep
    retention_secs: i64,
}

impl LocationTable {
    pub fn new(retention_secs: i64) -> Self {
        LocationTable {
            samples: HashMap::new(),
            retention_secs,
        }
    }

    /// Store the new sample and return the one it replaced, if any.
    pub fn observe(
        &mut self,
        key: &str,
        now: i64,
        location: GeoLocation,
    ) -> Option<(i64, GeoLocation)> {
        self.samples.insert(key.to_string(), (now, location))
    }

    /// Drop samples past the retention horizon.
    pub fn prune_idle(&mut self, now: i64) {
        let cutoff = now - self.retention_secs;
        self.samples.retain(|_, (ts, _)| *ts > cutoff);
    }

    pub fn key_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nyc() -> GeoLocation {
        GeoLocation {
            latitude: 40.7128,
            longitude: -74.0060,
        }
    }

    fn la() -> GeoLocation {
        GeoLocation {
            latitude: 34.0522,
            longitude: -118.2437,
        }
    }

    #[test]
    fn test_haversine_known_distance() {
        // New York to Los Angeles: ~3944 km
        let distance = haversine_distance(nyc(), la());
        assert!(
            (distance - 3944.0).abs() < 50.0,
            "NYC to LA should be ~3944 km, got {}",
            distance
        );
    }

    #[test]
    fn test_haversine_symmetry() {
        assert!((haversine_distance(nyc(), la()) - haversine_distance(la(), nyc())).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_identity() {
        assert_eq!(haversine_distance(nyc(), nyc()), 0.0);
    }

    #[test]
    fn test_observe_returns_previous_sample() {
        let mut table = LocationTable::new(86_400);

        assert!(table.observe("end_user-1", 1000, nyc()).is_none());

        let prev = table.observe("end_user-1", 2000, la()).unwrap();
        assert_eq!(prev.0, 1000);
        assert!((prev.1.latitude - nyc().latitude).abs() < 1e-9);
    }

    #[test]
    fn test_prune_idle() {
        let mut table = LocationTable::new(100);

        table.observe("end_user-1", 1000, nyc());
        table.observe("end_user-2", 1500, la());

        table.prune_idle(1550);
        assert_eq!(table.key_count(), 1);
    }
}
