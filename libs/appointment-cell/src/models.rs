// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::models::TimeSlot;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeSlot,
    pub patient_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub age: u32,
    pub gender: Gender,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    /// Set while the appointment is an unconfirmed hold.
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.appointment_date,
            time: self.appointment_time,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == AppointmentStatus::Confirmed
    }

    /// A pending hold past its expiry no longer blocks the slot.
    pub fn is_hold_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == AppointmentStatus::PendingVerification
            && self.hold_expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether the hold was placed with exactly these patient details.
    pub fn is_held_for(&self, patient: &PatientDetails) -> bool {
        self.patient_name == patient.patient_name
            && self.phone_number == patient.phone_number
            && self.email == patient.email
            && self.age == patient.age
            && self.gender == patient.gender
            && self.reason == patient.reason
    }

    /// Whether this appointment currently occupies its slot.
    pub fn blocks_slot_at(&self, now: DateTime<Utc>) -> bool {
        self.is_confirmed() || !self.is_hold_expired_at(now)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    PendingVerification,
    Confirmed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::PendingVerification => write!(f, "pending_verification"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[serde(alias = "Male", alias = "MALE", alias = "m")]
    Male,
    #[serde(alias = "Female", alias = "FEMALE", alias = "f")]
    Female,
    #[serde(alias = "Other", alias = "OTHER")]
    Other,
}

impl Gender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

// ==============================================================================
// SLOTS
// ==============================================================================

/// The unique identity of a bookable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeSlot,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.doctor_id, self.date, self.time)
    }
}

/// A candidate slot as shown to the patient. Booked slots stay in the
/// list so they can be rendered disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeSlot,
    pub is_booked: bool,
}

impl AppointmentSlot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            date: self.date,
            time: self.time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotChangeKind {
    Reserved,
    Confirmed,
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotChangeEvent {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: TimeSlot,
    pub kind: SlotChangeKind,
    pub at: DateTime<Utc>,
}

impl SlotChangeEvent {
    pub fn new(key: SlotKey, kind: SlotChangeKind, at: DateTime<Utc>) -> Self {
        Self {
            doctor_id: key.doctor_id,
            date: key.date,
            time: key.time,
            kind,
            at,
        }
    }

    /// Whether the slot is taken after this change.
    pub fn is_booked(&self) -> bool {
        !matches!(self.kind, SlotChangeKind::Released)
    }
}

// ==============================================================================
// PATIENT DETAILS
// ==============================================================================

/// Raw patient form as submitted; every field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientDetailsForm {
    pub patient_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub reason: Option<String>,
}

/// Patient details that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDetails {
    pub patient_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub age: u32,
    pub gender: Gender,
    pub reason: Option<String>,
}

/// Request to place a hold on a slot. The id is chosen by the caller so a
/// retried request can be matched to a hold it already placed.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub id: Uuid,
    pub slot: SlotKey,
    pub patient: PatientDetails,
}

// ==============================================================================
// WORKFLOW
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    SelectDoctor = 1,
    SelectDateTime = 2,
    PatientDetails = 3,
    OtpVerification = 4,
    Confirmed = 5,
}

impl BookingStep {
    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn previous(&self) -> Option<BookingStep> {
        match self {
            BookingStep::SelectDoctor => None,
            BookingStep::SelectDateTime => Some(BookingStep::SelectDoctor),
            BookingStep::PatientDetails => Some(BookingStep::SelectDateTime),
            BookingStep::OtpVerification => Some(BookingStep::PatientDetails),
            // A confirmed booking cannot be walked back.
            BookingStep::Confirmed => None,
        }
    }
}

impl fmt::Display for BookingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStep::SelectDoctor => "select_doctor",
            BookingStep::SelectDateTime => "select_date_time",
            BookingStep::PatientDetails => "patient_details",
            BookingStep::OtpVerification => "otp_verification",
            BookingStep::Confirmed => "confirmed",
        };
        write!(f, "{}", name)
    }
}

/// Result of sending a verification code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpDispatch {
    pub phone_number: String,
    pub expires_at: DateTime<Utc>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("Slot {0} is already booked")]
    Conflict(SlotKey),

    #[error("{time} is not offered on {date}")]
    NotOffered { date: NaiveDate, time: TimeSlot },

    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Hold on appointment {0} has expired")]
    HoldExpired(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("Validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    Conflict(String),

    #[error("The verification code is invalid")]
    InvalidCode,

    #[error("The verification code has expired")]
    Expired,

    #[error("Could not deliver verification code: {0}")]
    DeliveryFailed(String),

    #[error("Cannot {action} from step {step}")]
    InvalidTransition { step: BookingStep, action: &'static str },

    #[error("A request for this booking is already in progress")]
    OperationInProgress,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("Something went wrong, please try again: {0}")]
    Unexpected(String),
}

impl BookingError {
    pub fn validation(field: &str, message: &str) -> Self {
        BookingError::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<SlotError> for BookingError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::Conflict(key) => BookingError::Conflict(format!(
                "{} on {} was just booked by someone else, please choose another time",
                key.time, key.date
            )),
            SlotError::HoldExpired(_) => BookingError::Conflict(
                "Your hold on this slot has expired, please choose a time again".to_string(),
            ),
            SlotError::NotOffered { date, time } => BookingError::validation(
                "appointment_time",
                &format!("{} is not offered on {}", time, date),
            ),
            SlotError::NotFound(id) => BookingError::NotFound(format!("Appointment {} not found", id)),
            SlotError::Storage(msg) => BookingError::Unexpected(msg),
        }
    }
}
