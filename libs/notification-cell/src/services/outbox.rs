use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::{otp_message, ConfirmationDetails, DeliveryReceipt, MessageKind, OutboundMessage};
use super::NotificationService;

/// Keeps every message in memory instead of sending it. Used when no SMS
/// provider is configured.
#[derive(Clone, Default)]
pub struct OutboxNotifier {
    sent: Arc<RwLock<Vec<OutboundMessage>>>,
    failing: Arc<AtomicBool>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send reports a delivery failure.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.read().await.clone()
    }

    /// Code carried by the newest OTP message sent to `phone_number`.
    pub async fn last_code_for(&self, phone_number: &str) -> Option<String> {
        self.sent
            .read()
            .await
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Otp && m.to == phone_number)
            .and_then(|m| m.body.split_whitespace().next().map(str::to_string))
    }

    async fn record(&self, to: &str, body: String, kind: MessageKind) -> DeliveryReceipt {
        if self.failing.load(Ordering::SeqCst) {
            return DeliveryReceipt::failed("outbox is set to fail");
        }

        debug!("Outbox message to {}: {}", to, body);
        self.sent.write().await.push(OutboundMessage {
            to: to.to_string(),
            body,
            kind,
        });
        DeliveryReceipt::delivered()
    }
}

#[async_trait]
impl NotificationService for OutboxNotifier {
    async fn send_otp(&self, phone_number: &str, code: &str) -> DeliveryReceipt {
        self.record(phone_number, otp_message(code), MessageKind::Otp).await
    }

    async fn send_confirmation(&self, phone_number: &str, details: &ConfirmationDetails) -> DeliveryReceipt {
        info!("Recording confirmation for appointment {}", details.appointment_id);
        self.record(phone_number, details.message(), MessageKind::Confirmation).await
    }
}
