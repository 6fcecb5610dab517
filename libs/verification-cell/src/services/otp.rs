// libs/verification-cell/src/services/otp.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::BookingConfig;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{IssuedCode, OtpError, OtpRecord, OTP_LENGTH};

/// Issues and checks one-time passcodes, one live code per phone number.
pub struct OtpChallengeService {
    records: RwLock<HashMap<String, OtpRecord>>,
    resend_counts: RwLock<HashMap<String, u32>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl OtpChallengeService {
    pub fn new(config: &BookingConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &BookingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            resend_counts: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(config.otp_ttl_seconds),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh code for `phone_number`, superseding any earlier one.
    pub async fn issue(&self, phone_number: &str, appointment_id: Option<Uuid>) -> IssuedCode {
        let code = generate_code();
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.ttl;

        let record = OtpRecord {
            phone_number: phone_number.to_string(),
            code: code.clone(),
            issued_at,
            expires_at,
            consumed: false,
            appointment_id,
        };

        let superseded = self.records
            .write()
            .await
            .insert(phone_number.to_string(), record)
            .is_some_and(|prior| !prior.consumed);

        if superseded {
            let mut counts = self.resend_counts.write().await;
            let count = counts.entry(phone_number.to_string()).or_insert(0);
            *count += 1;
            debug!("Superseded live code for phone ending {} (resend #{})", phone_tail(phone_number), count);
        }

        info!("Issued verification code for phone ending {}, expires at {}", phone_tail(phone_number), expires_at);
        IssuedCode { code, expires_at }
    }

    /// Check `code` against the live record. Succeeds at most once per code.
    pub async fn verify(&self, phone_number: &str, code: &str) -> Result<OtpRecord, OtpError> {
        let now = self.clock.now();
        let mut records = self.records.write().await;

        let record = match records.get_mut(phone_number) {
            Some(record) if !record.consumed => record,
            _ => {
                warn!("No live verification code for phone ending {}", phone_tail(phone_number));
                return Err(OtpError::InvalidCode);
            }
        };

        if record.is_expired_at(now) {
            warn!("Expired verification code presented for phone ending {}", phone_tail(phone_number));
            return Err(OtpError::Expired);
        }

        if !is_well_formed(code) || record.code != code.trim() {
            warn!("Wrong verification code for phone ending {}", phone_tail(phone_number));
            return Err(OtpError::InvalidCode);
        }

        record.consumed = true;
        let verified = record.clone();
        drop(records);

        self.resend_counts.write().await.remove(phone_number);
        info!("Verification succeeded for phone ending {}", phone_tail(phone_number));
        Ok(verified)
    }

    /// Live (unconsumed, unexpired) record for the phone, if any.
    pub async fn active_record(&self, phone_number: &str) -> Option<OtpRecord> {
        let now = self.clock.now();
        self.records
            .read()
            .await
            .get(phone_number)
            .filter(|r| r.is_active_at(now))
            .cloned()
    }

    pub async fn resend_count(&self, phone_number: &str) -> u32 {
        self.resend_counts.read().await.get(phone_number).copied().unwrap_or(0)
    }

    /// Drop the phone's record without verifying it, but only if it was
    /// issued for `appointment_id`. A newer code issued for another booking
    /// on the same phone is left alone. Returns whether a record was dropped.
    pub async fn invalidate(&self, phone_number: &str, appointment_id: Uuid) -> bool {
        let mut records = self.records.write().await;
        let owned = records
            .get(phone_number)
            .is_some_and(|r| r.appointment_id == Some(appointment_id));
        if !owned {
            debug!("Kept verification code for phone ending {}, issued for another booking", phone_tail(phone_number));
            return false;
        }

        records.remove(phone_number);
        drop(records);
        self.resend_counts.write().await.remove(phone_number);
        true
    }

    /// Remove consumed and expired records, and the resend counts of phones
    /// left without a record. Returns how many records were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.is_active_at(now));
        let removed = before - records.len();

        self.resend_counts
            .write()
            .await
            .retain(|phone, _| records.contains_key(phone));
        drop(records);

        if removed > 0 {
            debug!("Purged {} stale verification records", removed);
        }
        removed
    }
}

fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", value, width = OTP_LENGTH)
}

fn is_well_formed(code: &str) -> bool {
    let code = code.trim();
    code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}

fn phone_tail(phone_number: &str) -> &str {
    let start = phone_number.len().saturating_sub(4);
    phone_number.get(start..).unwrap_or(phone_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_zero_padded_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert!(is_well_formed(&code), "bad code {}", code);
        }
    }

    #[test]
    fn malformed_codes_rejected() {
        assert!(!is_well_formed("12345"));
        assert!(!is_well_formed("12345a"));
        assert!(!is_well_formed("1234567"));
        assert!(is_well_formed(" 000042 "));
    }

    #[test]
    fn phone_tail_is_last_four() {
        assert_eq!(phone_tail("9876543210"), "3210");
        assert_eq!(phone_tail("12"), "12");
    }
}
