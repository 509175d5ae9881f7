//! Bounded ingestion queue decoupling the request path from analysis
//!
//! Producers hand events off with a non-blocking try_send; when analysis
//! falls behind, events are dropped and counted rather than applying
//! backpressure to the application. A panicking detector loses only the
//! event that triggered it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::models::ActivityEvent;

use super::SecurityEngine;

const DEFAULT_QUEUE_DEPTH: usize = 1024;

/// Sender half handed to event producers
#[derive(Clone)]
pub struct IngestQueue {
    tx: mpsc::Sender<ActivityEvent>,
}

impl IngestQueue {
    /// Create a queue with the default depth
    pub fn new() -> (Self, mpsc::Receiver<ActivityEvent>) {
        Self::with_depth(DEFAULT_QUEUE_DEPTH)
    }

    pub fn with_depth(depth: usize) -> (Self, mpsc::Receiver<ActivityEvent>) {
        let (tx, rx) = mpsc::channel(depth);
        (IngestQueue { tx }, rx)
    }

    /// Submit an event for analysis (non-blocking)
    ///
    /// Returns true if the event was accepted. A full or closed queue drops
    /// the event with a warning; the caller is never blocked or failed.
    pub fn submit(&self, event: ActivityEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Ingest queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("Ingest queue closed, dropping event");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drain the queue into the engine until all senders drop
///
/// Runs as a tokio task. Analysis itself is synchronous and fail-open; a
/// panic in the engine is contained to the offending event.
pub async fn run_worker(engine: Arc<SecurityEngine>, mut rx: mpsc::Receiver<ActivityEvent>) {
    log::info!("Analysis worker started");

    while let Some(event) = rx.recv().await {
        let result = catch_unwind(AssertUnwindSafe(|| engine.report_activity(&event)));
        match result {
            Ok(alerts) => {
                if !alerts.is_empty() {
                    log::debug!("Event raised {} alert(s)", alerts.len());
                }
            }
            Err(_) => log::error!("Analysis panicked on an event; event dropped"),
        }
    }

    log::info!("Analysis worker stopped");
}
