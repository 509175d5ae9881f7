pub mod alert;
pub mod event;

pub use alert::{
    ActivityType, Alert, AlertAction, AlertCandidate, AlertFilter, AlertStats, AlertStatus,
    Severity,
};
pub use event::{ActionKind, ActivityEvent, ActorKind};
