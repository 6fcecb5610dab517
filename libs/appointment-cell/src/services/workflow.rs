// libs/appointment-cell/src/services/workflow.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::models::{Doctor, TimeSlot};
use doctor_cell::services::directory::DoctorDirectory;
use notification_cell::models::ConfirmationDetails;
use notification_cell::services::NotificationService;
use shared_config::BookingConfig;
use shared_utils::clock::{Clock, SystemClock};
use verification_cell::models::OtpError;
use verification_cell::services::OtpChallengeService;

use crate::models::{
    Appointment, AppointmentSlot, BookingError, BookingStep, NewAppointment, OtpDispatch,
    PatientDetails, PatientDetailsForm, SlotError, SlotKey,
};
use crate::services::availability::AvailabilityResolver;
use crate::services::reservation::SlotReservationStore;
use crate::services::validation::validate_patient_details;

/// Everything one visitor has chosen so far. Owned by the session registry
/// and only ever changed through `BookingWorkflow`.
#[derive(Debug, Clone, Serialize)]
pub struct BookingSession {
    pub id: Uuid,
    pub step: BookingStep,
    pub doctors: Vec<Doctor>,
    pub selected_doctor: Option<Doctor>,
    pub selected_date: Option<NaiveDate>,
    pub available_slots: Vec<AppointmentSlot>,
    pub selected_slot: Option<TimeSlot>,
    pub patient: Option<PatientDetails>,
    pub appointment: Option<Appointment>,
    /// Id used for the current reservation attempt, kept across retries.
    #[serde(skip_serializing)]
    pub reservation_id: Option<Uuid>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingSession {
    fn new(id: Uuid, doctors: Vec<Doctor>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            step: BookingStep::SelectDoctor,
            doctors,
            selected_doctor: None,
            selected_date: None,
            available_slots: Vec::new(),
            selected_slot: None,
            patient: None,
            appointment: None,
            reservation_id: None,
            otp_expires_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The pending appointment still holding a slot, if any.
    pub fn pending_appointment(&self) -> Option<&Appointment> {
        self.appointment.as_ref().filter(|a| !a.is_confirmed())
    }

    fn require_step(&self, expected: BookingStep, action: &'static str) -> Result<(), BookingError> {
        if self.step != expected {
            return Err(BookingError::InvalidTransition { step: self.step, action });
        }
        Ok(())
    }

    fn clear_slot_selection(&mut self) {
        self.selected_slot = None;
        self.appointment = None;
        self.reservation_id = None;
        self.otp_expires_at = None;
    }

    fn return_to_slot_selection(&mut self) {
        self.clear_slot_selection();
        self.step = BookingStep::SelectDateTime;
    }
}

pub struct BookingWorkflow {
    directory: Arc<dyn DoctorDirectory>,
    store: Arc<dyn SlotReservationStore>,
    resolver: AvailabilityResolver,
    otp: Arc<OtpChallengeService>,
    notifier: Arc<dyn NotificationService>,
    operation_timeout: StdDuration,
    clock: Arc<dyn Clock>,
}

impl BookingWorkflow {
    pub fn new(
        directory: Arc<dyn DoctorDirectory>,
        store: Arc<dyn SlotReservationStore>,
        otp: Arc<OtpChallengeService>,
        notifier: Arc<dyn NotificationService>,
        config: &BookingConfig,
    ) -> Self {
        Self::with_clock(directory, store, otp, notifier, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        directory: Arc<dyn DoctorDirectory>,
        store: Arc<dyn SlotReservationStore>,
        otp: Arc<OtpChallengeService>,
        notifier: Arc<dyn NotificationService>,
        config: &BookingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            resolver: AvailabilityResolver::new(store.clone()),
            store,
            otp,
            notifier,
            operation_timeout: StdDuration::from_secs(config.operation_timeout_seconds),
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn SlotReservationStore> {
        &self.store
    }

    pub fn resolver(&self) -> &AvailabilityResolver {
        &self.resolver
    }

    pub fn directory(&self) -> &Arc<dyn DoctorDirectory> {
        &self.directory
    }

    async fn bounded<T>(&self, what: &'static str, fut: impl Future<Output = T>) -> Result<T, BookingError> {
        timeout(self.operation_timeout, fut).await.map_err(|_| {
            warn!("Timed out after {:?} waiting for {}", self.operation_timeout, what);
            BookingError::Timeout(what)
        })
    }

    async fn load_doctors(&self) -> Result<Vec<Doctor>, BookingError> {
        self.bounded("doctor directory", self.directory.fetch_doctors())
            .await?
            .map_err(|e| BookingError::Unexpected(e.to_string()))
    }

    /// Record the outcome of a step on the session.
    pub fn settle<T>(
        &self,
        session: &mut BookingSession,
        result: Result<T, BookingError>,
    ) -> Result<T, BookingError> {
        session.updated_at = self.clock.now();
        session.last_error = result.as_ref().err().map(|e| e.to_string());
        result
    }

    /// New session at step 1 with the doctor list loaded.
    #[instrument(skip(self))]
    pub async fn start_session(&self) -> Result<BookingSession, BookingError> {
        let doctors = self.load_doctors().await?;
        let session = BookingSession::new(Uuid::new_v4(), doctors, self.clock.now());
        info!("Started booking session {} with {} doctors", session.id, session.doctors.len());
        Ok(session)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn select_doctor(&self, session: &mut BookingSession, doctor_id: Uuid) -> Result<(), BookingError> {
        session.require_step(BookingStep::SelectDoctor, "select a doctor")?;

        let doctor = session
            .doctors
            .iter()
            .find(|d| d.id == doctor_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("Doctor {} not found", doctor_id)))?;

        debug!("Selected doctor {}", doctor.full_name());
        session.selected_doctor = Some(doctor);
        session.selected_date = None;
        session.available_slots.clear();
        session.clear_slot_selection();
        session.step = BookingStep::SelectDateTime;
        Ok(())
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn select_date(
        &self,
        session: &mut BookingSession,
        date: NaiveDate,
    ) -> Result<Vec<AppointmentSlot>, BookingError> {
        session.require_step(BookingStep::SelectDateTime, "select a date")?;
        let doctor_id = selected_doctor_id(session)?;

        let slots = self
            .bounded("slot listing", self.resolver.get_available_slots(doctor_id, date))
            .await??;

        session.selected_date = Some(date);
        session.selected_slot = None;
        session.available_slots = slots.clone();
        Ok(slots)
    }

    /// Reload the slot list for the chosen date.
    pub async fn refresh_slots(&self, session: &mut BookingSession) -> Result<Vec<AppointmentSlot>, BookingError> {
        session.require_step(BookingStep::SelectDateTime, "refresh slots")?;
        let doctor_id = selected_doctor_id(session)?;
        let date = session
            .selected_date
            .ok_or_else(|| BookingError::validation("date", "Please select a date"))?;

        let slots = self
            .bounded("slot listing", self.resolver.get_available_slots(doctor_id, date))
            .await??;
        session.available_slots = slots.clone();
        Ok(slots)
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn select_slot(&self, session: &mut BookingSession, time: TimeSlot) -> Result<(), BookingError> {
        session.require_step(BookingStep::SelectDateTime, "select a time")?;
        let doctor_id = selected_doctor_id(session)?;
        let date = session
            .selected_date
            .ok_or_else(|| BookingError::validation("date", "Please select a date"))?;

        let slot = self
            .bounded("slot listing", self.resolver.find_slot(doctor_id, date, time))
            .await??
            .ok_or_else(|| {
                BookingError::validation("appointment_time", &format!("{} is not offered on {}", time, date))
            })?;

        if slot.is_booked {
            if let Some(listed) = session.available_slots.iter_mut().find(|s| s.time == time) {
                listed.is_booked = true;
            }
            return Err(BookingError::Conflict(format!(
                "{} on {} is already booked, please choose another time",
                time, date
            )));
        }

        session.selected_slot = Some(time);
        session.step = BookingStep::PatientDetails;
        Ok(())
    }

    /// Validate the form, hold the slot and send a verification code. A
    /// failed delivery still leaves the session waiting for a code so the
    /// visitor can ask for a resend.
    #[instrument(skip(self, session, form), fields(session_id = %session.id))]
    pub async fn submit_details(
        &self,
        session: &mut BookingSession,
        form: PatientDetailsForm,
    ) -> Result<OtpDispatch, BookingError> {
        session.require_step(BookingStep::PatientDetails, "submit patient details")?;
        let patient = validate_patient_details(&form).map_err(BookingError::Validation)?;

        let key = SlotKey {
            doctor_id: selected_doctor_id(session)?,
            date: session
                .selected_date
                .ok_or_else(|| BookingError::validation("date", "Please select a date"))?,
            time: session
                .selected_slot
                .ok_or_else(|| BookingError::validation("appointment_time", "Please select a time"))?,
        };

        let appointment = match self.hold_slot(session, key, &patient).await? {
            Ok(appointment) => appointment,
            Err(SlotError::Conflict(key)) => {
                warn!("Slot {} taken before the hold was placed", key);
                session.return_to_slot_selection();
                self.reload_quietly(session).await;
                return Err(SlotError::Conflict(key).into());
            }
            Err(e) => return Err(e.into()),
        };

        info!("Holding {} for appointment {}", key, appointment.id);
        session.patient = Some(patient);
        session.appointment = Some(appointment);
        session.step = BookingStep::OtpVerification;

        self.send_code(session).await
    }

    /// Reserve `key` under the session's reservation id. A reservation that
    /// outlives the operation timeout may still have been committed, so the
    /// store is asked for it before giving up. Retries reuse the same id and
    /// get the committed hold back instead of a conflict.
    async fn hold_slot(
        &self,
        session: &mut BookingSession,
        key: SlotKey,
        patient: &PatientDetails,
    ) -> Result<Result<Appointment, SlotError>, BookingError> {
        let id = *session.reservation_id.get_or_insert_with(Uuid::new_v4);
        let request = NewAppointment { id, slot: key, patient: patient.clone() };

        let reserved = match self.bounded("slot reservation", self.store.reserve(request)).await {
            Ok(reserved) => reserved,
            Err(timed_out) => match self.bounded("slot reservation", self.store.get_appointment(id)).await {
                Ok(Ok(committed)) if committed.slot_key() == key => {
                    info!("Recovered hold {} after a slow reservation", id);
                    Ok(committed)
                }
                _ => return Err(timed_out),
            },
        };

        match reserved {
            Ok(held) if !held.is_held_for(patient) => {
                debug!("Hold {} was placed with earlier details, replacing it", held.id);
                self.bounded("hold release", self.store.release(held.id)).await??;

                let id = Uuid::new_v4();
                session.reservation_id = Some(id);
                let request = NewAppointment { id, slot: key, patient: patient.clone() };
                self.bounded("slot reservation", self.store.reserve(request)).await
            }
            other => Ok(other),
        }
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn resend_otp(&self, session: &mut BookingSession) -> Result<OtpDispatch, BookingError> {
        session.require_step(BookingStep::OtpVerification, "resend the code")?;
        let phone = pending_phone(session)?;
        debug!("Resend requested ({} previous resends)", self.otp.resend_count(&phone).await);
        self.send_code(session).await
    }

    async fn send_code(&self, session: &mut BookingSession) -> Result<OtpDispatch, BookingError> {
        let phone = pending_phone(session)?;
        let appointment_id = session.appointment.as_ref().map(|a| a.id);

        let issued = self
            .bounded("code issuance", self.otp.issue(&phone, appointment_id))
            .await?;
        session.otp_expires_at = Some(issued.expires_at);

        let receipt = self
            .bounded("code delivery", self.notifier.send_otp(&phone, &issued.code))
            .await?;
        if !receipt.success {
            let reason = receipt.error.unwrap_or_else(|| "unknown delivery error".to_string());
            warn!("Verification code delivery failed: {}", reason);
            return Err(BookingError::DeliveryFailed(reason));
        }

        Ok(OtpDispatch { phone_number: phone, expires_at: issued.expires_at })
    }

    /// Check the code and confirm the held appointment.
    #[instrument(skip(self, session, code), fields(session_id = %session.id))]
    pub async fn verify_otp(&self, session: &mut BookingSession, code: &str) -> Result<Appointment, BookingError> {
        session.require_step(BookingStep::OtpVerification, "verify the code")?;
        let phone = pending_phone(session)?;
        let appointment_id = session
            .appointment
            .as_ref()
            .map(|a| a.id)
            .ok_or_else(|| BookingError::Unexpected("no appointment is being held".to_string()))?;

        // A newer code for the same phone may belong to another booking;
        // reject before `verify` consumes it.
        let bound_elsewhere = self
            .bounded("code lookup", self.otp.active_record(&phone))
            .await?
            .and_then(|record| record.appointment_id)
            .is_some_and(|id| id != appointment_id);
        if bound_elsewhere {
            warn!("Live code for {} was issued for a different appointment", appointment_id);
            return Err(BookingError::InvalidCode);
        }

        let record = self
            .bounded("code verification", self.otp.verify(&phone, code.trim()))
            .await?
            .map_err(|e| match e {
                OtpError::InvalidCode => BookingError::InvalidCode,
                OtpError::Expired => BookingError::Expired,
            })?;

        if record.appointment_id.is_some_and(|id| id != appointment_id) {
            warn!("Code for {} was issued for a different appointment", appointment_id);
            return Err(BookingError::InvalidCode);
        }

        let confirmed = match self.bounded("confirmation", self.store.confirm(appointment_id)).await? {
            Ok(confirmed) => confirmed,
            Err(e @ (SlotError::HoldExpired(_) | SlotError::NotFound(_))) => {
                warn!("Could not confirm {}: {}", appointment_id, e);
                session.return_to_slot_selection();
                self.reload_quietly(session).await;
                return Err(SlotError::HoldExpired(appointment_id).into());
            }
            Err(e) => return Err(e.into()),
        };

        session.appointment = Some(confirmed.clone());
        session.otp_expires_at = None;
        session.step = BookingStep::Confirmed;
        info!("Appointment {} confirmed", confirmed.id);

        self.notify_confirmed(session, &confirmed).await;
        Ok(confirmed)
    }

    async fn notify_confirmed(&self, session: &BookingSession, appointment: &Appointment) {
        let details = ConfirmationDetails {
            appointment_id: appointment.id,
            patient_name: appointment.patient_name.clone(),
            doctor_name: session
                .selected_doctor
                .as_ref()
                .map(Doctor::full_name)
                .unwrap_or_default(),
            date: appointment.appointment_date,
            time_display: appointment.appointment_time.display(),
        };

        match self
            .bounded("confirmation message", self.notifier.send_confirmation(&appointment.phone_number, &details))
            .await
        {
            Ok(receipt) if receipt.success => debug!("Confirmation sent for {}", appointment.id),
            Ok(receipt) => warn!(
                "Confirmation message for {} failed: {}",
                appointment.id,
                receipt.error.unwrap_or_default()
            ),
            Err(e) => warn!("Confirmation message for {} failed: {}", appointment.id, e),
        }
    }

    /// Move back one step. Leaving code verification gives up the hold.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn go_back(&self, session: &mut BookingSession) -> Result<(), BookingError> {
        let previous = session.step.previous().ok_or(BookingError::InvalidTransition {
            step: session.step,
            action: "go back",
        })?;

        match session.step {
            BookingStep::OtpVerification => {
                self.abandon_hold(session).await?;
                session.appointment = None;
                session.reservation_id = None;
                session.otp_expires_at = None;
            }
            BookingStep::PatientDetails => {
                self.release_stray_hold(session).await?;
                session.selected_slot = None;
            }
            BookingStep::SelectDateTime => {
                session.selected_doctor = None;
                session.selected_date = None;
                session.available_slots.clear();
            }
            BookingStep::SelectDoctor | BookingStep::Confirmed => {}
        }

        debug!("Moved back from {} to {}", session.step, previous);
        session.step = previous;
        Ok(())
    }

    /// Start over from step 1 keeping the same session id.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn book_another(&self, session: &mut BookingSession) -> Result<(), BookingError> {
        self.abandon_hold(session).await?;
        self.release_stray_hold(session).await?;
        let doctors = self.load_doctors().await?;
        *session = BookingSession::new(session.id, doctors, self.clock.now());
        Ok(())
    }

    async fn abandon_hold(&self, session: &BookingSession) -> Result<(), BookingError> {
        let Some(pending) = session.pending_appointment() else {
            return Ok(());
        };

        match self.bounded("hold release", self.store.release(pending.id)).await? {
            Ok(()) | Err(SlotError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.otp.invalidate(&pending.phone_number, pending.id).await;
        info!("Released hold {} on {}", pending.id, pending.slot_key());
        Ok(())
    }

    /// Release a hold that a timed-out reservation may have left behind
    /// without the session ever seeing it.
    async fn release_stray_hold(&self, session: &mut BookingSession) -> Result<(), BookingError> {
        let Some(id) = session.reservation_id.take() else {
            return Ok(());
        };
        if session.appointment.as_ref().is_some_and(|a| a.id == id) {
            return Ok(());
        }

        match self.bounded("hold release", self.store.release(id)).await? {
            Ok(()) | Err(SlotError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn reload_quietly(&self, session: &mut BookingSession) {
        if let Err(e) = self.refresh_slots(session).await {
            warn!("Could not refresh slots after conflict: {}", e);
        }
    }
}

fn selected_doctor_id(session: &BookingSession) -> Result<Uuid, BookingError> {
    session
        .selected_doctor
        .as_ref()
        .map(|d| d.id)
        .ok_or_else(|| BookingError::validation("doctor_id", "Please select a doctor"))
}

fn pending_phone(session: &BookingSession) -> Result<String, BookingError> {
    session
        .appointment
        .as_ref()
        .map(|a| a.phone_number.clone())
        .ok_or_else(|| BookingError::Unexpected("no appointment is being held".to_string()))
}
