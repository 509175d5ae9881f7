//! User directory integration
//!
//! Auto-suspension needs to reach whatever system owns the user accounts.
//! The trait keeps that seam narrow; deployments plug in their own
//! implementation, and the default just logs the request.

use std::error::Error;

/// External account management hook
pub trait UserDirectory: Send + Sync {
    /// Deactivate an account. Called when a user is auto-suspended.
    fn deactivate(&self, actor_id: &str, reason: &str) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Reactivate a previously deactivated account
    fn reactivate(&self, actor_id: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// Default directory that records requests in the log and does nothing else
pub struct LogOnlyDirectory;

impl UserDirectory for LogOnlyDirectory {
    fn deactivate(&self, actor_id: &str, reason: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::warn!("Account deactivation requested for {}: {}", actor_id, reason);
        Ok(())
    }

    fn reactivate(&self, actor_id: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        log::info!("Account reactivation requested for {}", actor_id);
        Ok(())
    }
}
