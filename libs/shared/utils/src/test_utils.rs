use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use shared_config::{AppConfig, BookingConfig};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub twilio_base_url: String,
    pub admin_token: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            twilio_base_url: "http://localhost:54322".to_string(),
            admin_token: "test-admin-token".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_twilio(url: &str) -> Self {
        Self {
            twilio_base_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            port: 0,
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            twilio_account_sid: "AC-test".to_string(),
            twilio_auth_token: "twilio-test-token".to_string(),
            twilio_from_number: "+15005550006".to_string(),
            twilio_base_url: self.twilio_base_url.clone(),
            twilio_country_code: "+91".to_string(),
            admin_token: self.admin_token.clone(),
            doctors_file: None,
            booking: BookingConfig::default(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_response(doctor_id: &str, first_name: &str, last_name: &str, specialty: &str) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "first_name": first_name,
            "last_name": last_name,
            "specialties": [specialty],
            "qualification": "MBBS, MD",
            "experience_years": 12,
            "profile_image_url": null,
            "is_available": true
        })
    }

    /// A pending appointment row as PostgREST returns it.
    pub fn pending_appointment_response(
        appointment_id: &str,
        doctor_id: &str,
        date: &str,
        time: &str,
        created_at: DateTime<Utc>,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "doctor_id": doctor_id,
            "appointment_date": date,
            "appointment_time": time,
            "patient_name": "Asha Verma",
            "phone_number": "9876543210",
            "email": null,
            "age": 34,
            "gender": "female",
            "reason": "Follow-up",
            "status": "pending_verification",
            "created_at": created_at.to_rfc3339(),
            "hold_expires_at": (created_at + Duration::minutes(15)).to_rfc3339(),
            "confirmed_at": null
        })
    }

    pub fn confirmed_appointment_response(
        appointment_id: &str,
        doctor_id: &str,
        date: &str,
        time: &str,
    ) -> serde_json::Value {
        let created_at = Utc::now() - Duration::minutes(3);
        json!({
            "id": appointment_id,
            "doctor_id": doctor_id,
            "appointment_date": date,
            "appointment_time": time,
            "patient_name": "Asha Verma",
            "phone_number": "9876543210",
            "email": "asha@example.com",
            "age": 34,
            "gender": "female",
            "reason": null,
            "status": "confirmed",
            "created_at": created_at.to_rfc3339(),
            "hold_expires_at": null,
            "confirmed_at": Utc::now().to_rfc3339()
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }

    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}
