use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Outcome of a single outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryReceipt {
    pub fn delivered() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

/// What the patient is told once the booking is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationDetails {
    pub appointment_id: Uuid,
    pub patient_name: String,
    pub doctor_name: String,
    pub date: NaiveDate,
    pub time_display: String,
}

impl ConfirmationDetails {
    pub fn message(&self) -> String {
        format!(
            "Hi {}, your appointment with Dr. {} on {} at {} is confirmed. Ref: {}",
            self.patient_name,
            self.doctor_name,
            self.date.format("%d %b %Y"),
            self.time_display,
            self.appointment_id,
        )
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("SMS provider request failed: {0}")]
    Transport(String),

    #[error("SMS provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// A message as recorded by the outbox notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    pub body: String,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Otp,
    Confirmation,
}

pub fn otp_message(code: &str) -> String {
    format!("{} is your verification code for booking your appointment. It expires in a few minutes.", code)
}
