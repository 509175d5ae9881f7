//! IP geolocation using a MaxMind GeoLite2 database
//!
//! Resolves event source IPs to coordinates for the impossible-travel rule.
//! The database file must be downloaded separately from MaxMind (free with
//! registration); when no database is configured the engine simply runs
//! without location resolution.

use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::detection::GeoLocation;

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Location data missing for IP address")]
    NoLocation,

    #[error("Database file not found: {0}")]
    FileNotFound(String),
}

/// GeoIP lookup service backed by a GeoLite2-City database
pub struct GeoIpService {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoIpService {
    /// Open a MaxMind database file
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        Ok(GeoIpService {
            reader: Arc::new(reader),
        })
    }

    /// Look up the coordinates of an IP address
    pub fn lookup(&self, ip: &IpAddr) -> Result<GeoLocation, GeoError> {
        let city: geoip2::City = self.reader.lookup(*ip).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::DatabaseOpen(other),
        })?;

        let location = city.location.ok_or(GeoError::NoLocation)?;
        let latitude = location.latitude.ok_or(GeoError::NoLocation)?;
        let longitude = location.longitude.ok_or(GeoError::NoLocation)?;

        Ok(GeoLocation {
            latitude,
            longitude,
        })
    }

    /// Look up an IP address, returning None instead of an error
    ///
    /// Private and unroutable addresses are not in the database; the engine
    /// treats an unresolvable IP as "no location" rather than a failure.
    pub fn lookup_optional(&self, ip: &IpAddr) -> Option<GeoLocation> {
        self.lookup(ip).ok()
    }
}

impl Clone for GeoIpService {
    fn clone(&self) -> Self {
        GeoIpService {
            reader: Arc::clone(&self.reader),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // These tests require a GeoLite2-City.mmdb file to be present and are
    // skipped when it is not.

    fn get_test_service() -> Option<GeoIpService> {
        let paths = [
            "GeoLite2-City.mmdb",
            "../GeoLite2-City.mmdb",
            "assets/GeoLite2-City.mmdb",
        ];

        for path in &paths {
            if let Ok(service) = GeoIpService::new(path) {
                return Some(service);
            }
        }
        None
    }

    #[test]
    fn test_file_not_found() {
        let result = GeoIpService::new("nonexistent.mmdb");
        assert!(matches!(result, Err(GeoError::FileNotFound(_))));
    }

    #[test]
    fn test_private_ip_not_found() {
        if let Some(service) = get_test_service() {
            let private_ip = IpAddr::from_str("192.168.1.1").unwrap();
            assert!(service.lookup(&private_ip).is_err());
            assert!(service.lookup_optional(&private_ip).is_none());
        }
    }

    #[test]
    fn test_public_ip_lookup() {
        if let Some(service) = get_test_service() {
            let google_dns = IpAddr::from_str("8.8.8.8").unwrap();
            if let Ok(location) = service.lookup(&google_dns) {
                assert!(location.latitude >= -90.0 && location.latitude <= 90.0);
                assert!(location.longitude >= -180.0 && location.longitude <= 180.0);
            }
        }
    }

    #[test]
    fn test_clone_shares_reader() {
        if let Some(service) = get_test_service() {
            let cloned = service.clone();
            let ip = IpAddr::from_str("8.8.8.8").unwrap();
            let _ = service.lookup_optional(&ip);
            let _ = cloned.lookup_optional(&ip);
        }
    }
}
