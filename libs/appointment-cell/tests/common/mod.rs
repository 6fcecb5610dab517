#![allow(dead_code)]

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{Gender, NewAppointment, PatientDetails, PatientDetailsForm, SlotKey};
use appointment_cell::services::{BookingWorkflow, InMemorySlotStore, SessionRegistry};
use doctor_cell::models::{Doctor, TimeSlot};
use doctor_cell::services::InMemoryDoctorDirectory;
use notification_cell::services::OutboxNotifier;
use shared_config::BookingConfig;
use shared_utils::clock::ManualClock;
use verification_cell::services::OtpChallengeService;

pub const PHONE: &str = "9876543210";

pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

pub fn sunday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

pub fn slot(hour: u32, minute: u32) -> TimeSlot {
    TimeSlot::from_hm(hour, minute).unwrap()
}

pub fn doctor(first_name: &str, last_name: &str) -> Doctor {
    Doctor {
        id: Uuid::new_v4(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        specialties: vec!["General Medicine".to_string()],
        qualification: Some("MBBS".to_string()),
        experience_years: Some(8),
        profile_image_url: None,
        is_available: true,
    }
}

pub fn patient() -> PatientDetails {
    PatientDetails {
        patient_name: "Asha Verma".to_string(),
        phone_number: PHONE.to_string(),
        email: Some("asha@example.com".to_string()),
        age: 34,
        gender: Gender::Female,
        reason: Some("Follow-up".to_string()),
    }
}

pub fn patient_form() -> PatientDetailsForm {
    PatientDetailsForm {
        patient_name: Some("Asha Verma".to_string()),
        phone_number: Some(PHONE.to_string()),
        email: Some("asha@example.com".to_string()),
        age: Some(34),
        gender: Some("female".to_string()),
        reason: Some("Follow-up".to_string()),
    }
}

pub fn request(doctor_id: Uuid, date: NaiveDate, time: TimeSlot) -> NewAppointment {
    NewAppointment {
        id: Uuid::new_v4(),
        slot: SlotKey { doctor_id, date, time },
        patient: patient(),
    }
}

pub fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap())
}

pub fn config() -> BookingConfig {
    BookingConfig {
        otp_ttl_seconds: 300,
        hold_ttl_seconds: 900,
        operation_timeout_seconds: 5,
        ..BookingConfig::default()
    }
}

/// A workflow over in-memory collaborators sharing one manual clock.
pub struct Harness {
    pub doctors: Vec<Doctor>,
    pub store: Arc<InMemorySlotStore>,
    pub otp: Arc<OtpChallengeService>,
    pub outbox: OutboxNotifier,
    pub sessions: Arc<SessionRegistry>,
    pub workflow: Arc<BookingWorkflow>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        let clock = clock();
        let config = config();
        let doctors = vec![doctor("Meera", "Iyer"), doctor("Rahul", "Kapoor")];

        let directory = Arc::new(InMemoryDoctorDirectory::new(doctors.clone()));
        let store = Arc::new(InMemorySlotStore::with_clock(&config, Arc::new(clock.clone())));
        let otp = Arc::new(OtpChallengeService::with_clock(&config, Arc::new(clock.clone())));
        let outbox = OutboxNotifier::new();
        let sessions = Arc::new(SessionRegistry::with_clock(&config, Arc::new(clock.clone())));

        let workflow = Arc::new(BookingWorkflow::with_clock(
            directory,
            store.clone(),
            otp.clone(),
            Arc::new(outbox.clone()),
            &config,
            Arc::new(clock.clone()),
        ));

        Self { doctors, store, otp, outbox, sessions, workflow, clock }
    }

    pub fn doctor_id(&self) -> Uuid {
        self.doctors[0].id
    }
}
