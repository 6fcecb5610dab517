pub mod outbox;
pub mod twilio;

use async_trait::async_trait;

use crate::models::{ConfirmationDetails, DeliveryReceipt};

pub use outbox::OutboxNotifier;
pub use twilio::TwilioSmsNotifier;

/// Outbound patient messaging. Delivery problems come back in the receipt
/// rather than as errors.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_otp(&self, phone_number: &str, code: &str) -> DeliveryReceipt;

    async fn send_confirmation(&self, phone_number: &str, details: &ConfirmationDetails) -> DeliveryReceipt;
}
