use async_trait::async_trait;
use rentora_shared::RentalEvent;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification transport failed: {0}")]
    Transport(String),

    #[error("Notification payload could not be encoded: {0}")]
    Encoding(String),
}

/// Outbound notifications. Delivery is best-effort: callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &RentalEvent, recipient: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the tracing log. Used when no broker is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &RentalEvent, recipient: &str) -> Result<(), NotifyError> {
        tracing::info!(
            event = event.name(),
            reservation_id = %event.reservation_id(),
            recipient,
            "Notification dispatched"
        );
        Ok(())
    }
}
