// # Notifier Trait
//
// Defines the interface for delivering change reports to subscribers.
//
// ## Implementations
//
// - Telegram Bot API: `modelwatch-notify-telegram` crate
//
// ## Responsibility boundary
//
// Notifiers render and deliver; they make no decisions. The engine decides
// what to report and to whom, and calls `notify` once per subscriber.
// A failed delivery to one subscriber must not affect the others: the
// engine logs the error and carries on, and the already-persisted state is
// never rolled back.

use async_trait::async_trait;

use crate::diff::ChangeReport;
use crate::error::Result;
use crate::model::SubscriberId;

/// Trait for notification sink implementations
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one structured change report to one subscriber
    ///
    /// # Returns
    ///
    /// - `Ok(())`: delivered
    /// - `Err(Error)`: delivery failed for this subscriber only
    async fn notify(&self, subscriber: SubscriberId, report: &ChangeReport) -> Result<()>;
}

/// Helper trait for constructing notifiers from configuration
pub trait NotifierFactory: Send + Sync {
    /// Create a Notifier instance from configuration
    fn create(&self, config: &serde_json::Value) -> Result<Box<dyn Notifier>>;
}
