//! User warning notifications
//!
//! High-severity alerts trigger a warning message to the affected actor.
//! Delivery goes through a configured webhook so the surrounding system
//! can route the message to email, in-app inbox, or anything else.

use crate::config::NotifyConfig;
use crate::models::{ActorKind, Severity};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during notification dispatch
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification channel closed")]
    ChannelClosed,
}

/// A warning message addressed to a single actor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub actor_id: String,
    pub actor_kind: ActorKind,
    pub title: String,
    pub message: String,
    pub priority: String,
}

impl Notification {
    /// Build the standard security warning for an alert of the given severity
    pub fn security_warning(
        actor_id: &str,
        actor_kind: ActorKind,
        description: &str,
        severity: Severity,
    ) -> Self {
        let priority = if severity >= Severity::Critical {
            "urgent"
        } else {
            "high"
        };
        Notification {
            actor_id: actor_id.to_string(),
            actor_kind,
            title: "Security Alert".to_string(),
            message: format!(
                "Unusual activity was detected on your account: {}. \
                 If this was not you, contact support immediately.",
                description
            ),
            priority: priority.to_string(),
        }
    }
}

/// Async notification dispatcher
///
/// Runs as a tokio task, receiving notifications from the channel and
/// POSTing them to the configured webhook. Delivery failures are logged
/// and the notification is dropped, never retried.
pub struct NotificationDispatcher {
    config: NotifyConfig,
    client: Client,
}

impl NotificationDispatcher {
    pub fn new(config: NotifyConfig) -> Self {
        NotificationDispatcher {
            config,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a channel pair for queueing notifications
    pub fn create_channel() -> (mpsc::Sender<Notification>, mpsc::Receiver<Notification>) {
        mpsc::channel(100)
    }

    /// Run the dispatch loop until the channel closes
    pub async fn run(self, mut rx: mpsc::Receiver<Notification>) {
        log::info!("Notification dispatcher started");

        while let Some(notification) = rx.recv().await {
            if !self.config.enabled {
                continue;
            }

            log::info!(
                "Dispatching warning to {} ({})",
                notification.actor_id,
                notification.priority
            );

            if let Err(e) = self.send(&notification).await {
                log::error!("Failed to dispatch notification: {}", e);
            }
        }

        log::info!("Notification dispatcher stopped");
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = match self.config.webhook_url {
            Some(ref url) => url,
            None => {
                log::debug!("No notification webhook configured, dropping message");
                return Ok(());
            }
        };

        let response = self.client.post(url).json(notification).send().await?;

        if !response.status().is_success() {
            log::warn!(
                "Notification webhook returned non-success status: {}",
                response.status()
            );
        }

        Ok(())
    }
}

/// Sync-friendly handle for queueing notifications
///
/// Uses try_send so callers on the hot path never block. When the queue
/// is full the notification is dropped and a warning logged.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Notification>,
}

impl NotificationQueue {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        NotificationQueue { tx }
    }

    /// Queue a notification for dispatch (non-blocking)
    ///
    /// Returns true if the notification was accepted.
    pub fn queue(&self, notification: Notification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Notification queue full, dropping warning");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("Notification queue closed");
                false
            }
        }
    }

    /// Queue a notification (async version)
    pub async fn queue_async(&self, notification: Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification)
            .await
            .map_err(|_| NotifyError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
