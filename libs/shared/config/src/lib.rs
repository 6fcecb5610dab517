use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,
    pub twilio_base_url: String,
    pub twilio_country_code: String,
    pub admin_token: String,
    /// JSON list of doctors served when Supabase is not configured.
    pub doctors_file: Option<String>,
    pub booking: BookingConfig,
}

/// Tunables shared by the booking cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfig {
    pub otp_ttl_seconds: i64,
    pub hold_ttl_seconds: i64,
    pub operation_timeout_seconds: u64,
    pub hold_sweep_interval_seconds: u64,
    pub session_idle_seconds: i64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            otp_ttl_seconds: 300,
            hold_ttl_seconds: 900,
            operation_timeout_seconds: 10,
            hold_sweep_interval_seconds: 60,
            session_idle_seconds: 3600,
        }
    }
}

/// Upper bound for every TTL, one week.
const MAX_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const MAX_OPERATION_TIMEOUT_SECONDS: u64 = 300;
const MAX_SWEEP_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

impl BookingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            otp_ttl_seconds: parse_in_range("OTP_TTL_SECONDS", defaults.otp_ttl_seconds, 1, MAX_TTL_SECONDS),
            hold_ttl_seconds: parse_in_range("HOLD_TTL_SECONDS", defaults.hold_ttl_seconds, 1, MAX_TTL_SECONDS),
            operation_timeout_seconds: parse_in_range(
                "OPERATION_TIMEOUT_SECONDS",
                defaults.operation_timeout_seconds,
                1,
                MAX_OPERATION_TIMEOUT_SECONDS,
            ),
            hold_sweep_interval_seconds: parse_in_range(
                "HOLD_SWEEP_INTERVAL_SECONDS",
                defaults.hold_sweep_interval_seconds,
                1,
                MAX_SWEEP_INTERVAL_SECONDS,
            ),
            session_idle_seconds: parse_in_range(
                "SESSION_IDLE_SECONDS",
                defaults.session_idle_seconds,
                60,
                MAX_TTL_SECONDS,
            ),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            port: parse_or("PORT", 3000),
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using in-memory storage");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID")
                .unwrap_or_else(|_| {
                    warn!("TWILIO_ACCOUNT_SID not set, SMS delivery disabled");
                    String::new()
                }),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_from_number: env::var("TWILIO_FROM_NUMBER").unwrap_or_default(),
            twilio_base_url: env::var("TWILIO_BASE_URL")
                .unwrap_or_else(|_| "https://api.twilio.com".to_string()),
            twilio_country_code: env::var("TWILIO_COUNTRY_CODE")
                .unwrap_or_else(|_| "+91".to_string()),
            admin_token: env::var("ADMIN_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("ADMIN_TOKEN not set, admin routes will reject every request");
                    String::new()
                }),
            doctors_file: env::var("DOCTORS_FILE").ok(),
            booking: BookingConfig::from_env(),
        };

        if !config.is_configured() {
            warn!("Supabase not configured - doctors and appointments are kept in memory");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_sms_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_from_number.is_empty()
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value ({}), using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn parse_in_range<T>(key: &str, default: T, min: T, max: T) -> T
where
    T: FromStr + PartialOrd + Copy + Display,
{
    clamp_to(key, parse_or(key, default), min, max)
}

fn clamp_to<T: PartialOrd + Copy + Display>(key: &str, value: T, min: T, max: T) -> T {
    if value < min {
        warn!("{} is {}, raising to {}", key, value, min);
        min
    } else if value > max {
        warn!("{} is {}, lowering to {}", key, value, max);
        max
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ttl_raised_to_minimum() {
        assert_eq!(clamp_to("HOLD_TTL_SECONDS", -900_i64, 1, MAX_TTL_SECONDS), 1);
        assert_eq!(clamp_to("OPERATION_TIMEOUT_SECONDS", 0_u64, 1, MAX_OPERATION_TIMEOUT_SECONDS), 1);
    }

    #[test]
    fn huge_ttl_lowered_to_maximum() {
        assert_eq!(clamp_to("OTP_TTL_SECONDS", i64::MAX, 1, MAX_TTL_SECONDS), MAX_TTL_SECONDS);
    }

    #[test]
    fn values_in_range_kept() {
        assert_eq!(clamp_to("HOLD_TTL_SECONDS", 900_i64, 1, MAX_TTL_SECONDS), 900);
    }

    #[test]
    fn unset_variable_uses_default() {
        assert_eq!(
            parse_in_range("CLINIC_BOOKING_TEST_UNSET_SECONDS", 300_i64, 1, MAX_TTL_SECONDS),
            300
        );
    }
}
