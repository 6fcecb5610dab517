// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::{Appointment, AppointmentStatus, NewAppointment, SlotError};

/// Statuses reachable from `current`. Status only moves forward.
pub fn valid_transitions(current: AppointmentStatus) -> &'static [AppointmentStatus] {
    match current {
        AppointmentStatus::PendingVerification => &[AppointmentStatus::Confirmed],
        AppointmentStatus::Confirmed => &[],
    }
}

pub fn can_transition(current: AppointmentStatus, next: AppointmentStatus) -> bool {
    valid_transitions(current).contains(&next)
}

/// A fresh hold on the requested slot.
pub fn new_pending(request: NewAppointment, now: DateTime<Utc>, hold_ttl: Duration) -> Appointment {
    let NewAppointment { id, slot, patient } = request;
    Appointment {
        id,
        doctor_id: slot.doctor_id,
        appointment_date: slot.date,
        appointment_time: slot.time,
        patient_name: patient.patient_name,
        phone_number: patient.phone_number,
        email: patient.email,
        age: patient.age,
        gender: patient.gender,
        reason: patient.reason,
        status: AppointmentStatus::PendingVerification,
        created_at: now,
        hold_expires_at: Some(now + hold_ttl),
        confirmed_at: None,
    }
}

/// The confirmed form of a pending appointment. Fails once the hold has
/// lapsed.
pub fn confirm(appointment: &Appointment, now: DateTime<Utc>) -> Result<Appointment, SlotError> {
    if appointment.is_hold_expired_at(now) {
        return Err(SlotError::HoldExpired(appointment.id));
    }
    if !can_transition(appointment.status, AppointmentStatus::Confirmed) {
        return Err(SlotError::Storage(format!(
            "appointment {} cannot move from {} to confirmed",
            appointment.id, appointment.status
        )));
    }

    debug!("Appointment {} moving to confirmed", appointment.id);
    Ok(Appointment {
        status: AppointmentStatus::Confirmed,
        hold_expires_at: None,
        confirmed_at: Some(now),
        ..appointment.clone()
    })
}
