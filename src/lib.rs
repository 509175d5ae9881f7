pub mod clock;
pub mod config;
pub mod detection;
pub mod directory;
pub mod enforcement;
pub mod engine;
pub mod geolocation;
pub mod input;
pub mod models;
pub mod notify;
pub mod persistence;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, Thresholds};
pub use detection::{Detector, GeoLocation, Observation};
pub use engine::queue::IngestQueue;
pub use engine::SecurityEngine;
pub use geolocation::GeoIpService;
pub use models::{ActivityEvent, Alert, AlertStatus, Severity};
pub use notify::{NotificationDispatcher, NotificationQueue};
pub use persistence::{AlertStore, SqliteAlertStore};
