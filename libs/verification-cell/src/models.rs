use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const OTP_LENGTH: usize = 6;

/// The passcode currently bound to a phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpRecord {
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub appointment_id: Option<Uuid>,
}

impl OtpRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && !self.is_expired_at(now)
    }
}

/// Returned from issuance; the code goes to the delivery channel only.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("The verification code is invalid")]
    InvalidCode,

    #[error("The verification code has expired")]
    Expired,
}
