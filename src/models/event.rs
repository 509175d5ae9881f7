use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::detection::geo::GeoLocation;

/// Category of the actor that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    EndUser,
    Practitioner,
    Staff,
    Administrator,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::EndUser => "end_user",
            ActorKind::Practitioner => "practitioner",
            ActorKind::Staff => "staff",
            ActorKind::Administrator => "administrator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "end_user" => Some(ActorKind::EndUser),
            "practitioner" => Some(ActorKind::Practitioner),
            "staff" => Some(ActorKind::Staff),
            "administrator" => Some(ActorKind::Administrator),
            _ => None,
        }
    }
}

/// Kind of application action an event represents. Closed set; the emitting
/// layer maps anything it cannot classify to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Login,
    DataAccess,
    Modification,
    Payment,
    CreateAccount,
    DeleteAccount,
    Export,
    Other,
}

impl ActionKind {
    /// Account-lifecycle actions tracked by the churn detector.
    pub fn is_account_churn(&self) -> bool {
        matches!(self, ActionKind::CreateAccount | ActionKind::DeleteAccount)
    }
}

/// A single user action event, as emitted by the request layer.
///
/// `actor_id` is optional: some events (e.g. anonymous auth failures) carry
/// no resolved identity. `location` may be supplied by the event itself or
/// filled in from a GeoIP lookup of `source_ip`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: i64,
    pub actor_id: Option<String>,
    pub actor_kind: ActorKind,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub action: ActionKind,
    pub endpoint: String,
    pub http_method: String,
    pub source_ip: IpAddr,
    pub user_agent: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub affected_records: Option<u64>,
    pub previous_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
    pub location: Option<GeoLocation>,
}

impl ActivityEvent {
    /// Tracking key for per-actor sliding windows. None when the event has
    /// no resolved identity.
    pub fn actor_key(&self) -> Option<String> {
        self.actor_id
            .as_ref()
            .map(|id| format!("{}-{}", self.actor_kind.as_str(), id))
    }
}
