// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use doctor_cell::models::TimeSlot;
use doctor_cell::services::slots;
use shared_config::{AppConfig, BookingConfig};
use shared_database::{ApiError, SupabaseClient};
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, SlotChangeEvent, SlotChangeKind, SlotError,
    SlotKey,
};
use crate::services::events::{SlotEventHub, SlotEventReceiver};
use crate::services::lifecycle;
use crate::services::reservation::SlotReservationStore;

const APPOINTMENTS: &str = "/rest/v1/appointments";

/// Store backed by the `appointments` table. A unique index on
/// (doctor_id, appointment_date, appointment_time) makes the insert in
/// `reserve` the arbiter between concurrent callers.
pub struct SupabaseSlotStore {
    supabase: Arc<SupabaseClient>,
    events: SlotEventHub,
    hold_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SupabaseSlotStore {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(
            Arc::new(SupabaseClient::new(config)),
            &config.booking,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        supabase: Arc<SupabaseClient>,
        config: &BookingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            supabase,
            events: SlotEventHub::new(),
            hold_ttl: Duration::seconds(config.hold_ttl_seconds),
            clock,
        }
    }

    fn timestamp(at: DateTime<Utc>) -> String {
        urlencoding::encode(&at.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
    }

    fn time_column(time: TimeSlot) -> String {
        time.time().format("%H:%M:%S").to_string()
    }

    fn slot_filter(key: &SlotKey) -> String {
        format!(
            "doctor_id=eq.{}&appointment_date=eq.{}&appointment_time=eq.{}",
            key.doctor_id,
            key.date,
            Self::time_column(key.time)
        )
    }

    fn row(appointment: &Appointment) -> Value {
        json!({
            "id": appointment.id,
            "doctor_id": appointment.doctor_id,
            "appointment_date": appointment.appointment_date,
            "appointment_time": Self::time_column(appointment.appointment_time),
            "patient_name": appointment.patient_name,
            "phone_number": appointment.phone_number,
            "email": appointment.email,
            "age": appointment.age,
            "gender": appointment.gender,
            "reason": appointment.reason,
            "status": appointment.status,
            "created_at": appointment.created_at,
            "hold_expires_at": appointment.hold_expires_at,
            "confirmed_at": appointment.confirmed_at,
        })
    }

    fn storage_error(context: &str, err: anyhow::Error) -> SlotError {
        error!("{}: {}", context, err);
        SlotError::Storage(format!("{}: {}", context, err))
    }

    async fn fetch(&self, query: &str) -> Result<Vec<Appointment>, SlotError> {
        let path = format!("{}?{}", APPOINTMENTS, query);
        self.supabase
            .request::<Vec<Appointment>>(Method::GET, &path, None, None)
            .await
            .map_err(|e| Self::storage_error("Failed to fetch appointments", e))
    }

    async fn delete(&self, query: &str) -> Result<Vec<Appointment>, SlotError> {
        let path = format!("{}?{}", APPOINTMENTS, query);
        self.supabase
            .request_with_headers::<Vec<Appointment>>(
                Method::DELETE,
                &path,
                None,
                None,
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(|e| Self::storage_error("Failed to delete appointments", e))
    }

    async fn publish_all(&self, removed: &[Appointment], kind: SlotChangeKind, at: DateTime<Utc>) {
        for appointment in removed {
            self.events
                .publish(SlotChangeEvent::new(appointment.slot_key(), kind, at))
                .await;
        }
    }
}

#[async_trait]
impl SlotReservationStore for SupabaseSlotStore {
    async fn check_availability(&self, key: &SlotKey) -> Result<bool, SlotError> {
        let now = self.clock.now();
        let rows = self.fetch(&Self::slot_filter(key)).await?;
        Ok(!rows.iter().any(|a| a.blocks_slot_at(now)))
    }

    async fn booked_times(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, SlotError> {
        let now = self.clock.now();
        let query = format!(
            "doctor_id=eq.{}&appointment_date=eq.{}&order=appointment_time.asc",
            doctor_id, date
        );
        let rows = self.fetch(&query).await?;
        Ok(rows
            .into_iter()
            .filter(|a| a.blocks_slot_at(now))
            .map(|a| a.appointment_time)
            .collect())
    }

    async fn reserve(&self, request: NewAppointment) -> Result<Appointment, SlotError> {
        let key = request.slot;
        if !slots::is_offered(key.date, key.time) {
            return Err(SlotError::NotOffered { date: key.date, time: key.time });
        }

        let now = self.clock.now();

        // Clear a lapsed hold on this slot so the insert can take its place.
        let stale_query = format!(
            "{}&status=eq.pending_verification&hold_expires_at=lte.{}",
            Self::slot_filter(&key),
            Self::timestamp(now)
        );
        let stale = self.delete(&stale_query).await?;
        if !stale.is_empty() {
            debug!("Replaced {} expired hold(s) on {}", stale.len(), key);
            self.publish_all(&stale, SlotChangeKind::Released, now).await;
        }

        let request_id = request.id;
        let pending = lifecycle::new_pending(request, now, self.hold_ttl);
        let result = self.supabase
            .request_with_headers::<Vec<Appointment>>(
                Method::POST,
                APPOINTMENTS,
                None,
                Some(Self::row(&pending)),
                Some(SupabaseClient::return_representation()),
            )
            .await;

        let appointment = match result {
            Ok(mut rows) if !rows.is_empty() => rows.remove(0),
            Ok(_) => pending,
            Err(e) => {
                let conflict = e
                    .downcast_ref::<ApiError>()
                    .is_some_and(ApiError::is_conflict);
                if conflict {
                    // A retried request finds the row its first attempt wrote.
                    if let Ok(existing) = self.get_appointment(request_id).await {
                        if existing.slot_key() == key && existing.blocks_slot_at(now) {
                            debug!("Reservation {} replayed on {}", request_id, key);
                            return Ok(existing);
                        }
                    }
                    warn!("Reservation conflict on {}", key);
                    return Err(SlotError::Conflict(key));
                }
                return Err(Self::storage_error("Failed to reserve slot", e));
            }
        };

        self.events
            .publish(SlotChangeEvent::new(key, SlotChangeKind::Reserved, now))
            .await;
        info!("Reserved {} for appointment {}", key, appointment.id);
        Ok(appointment)
    }

    async fn confirm(&self, appointment_id: Uuid) -> Result<Appointment, SlotError> {
        let now = self.clock.now();
        let path = format!(
            "{}?id=eq.{}&status=eq.pending_verification&hold_expires_at=gt.{}",
            APPOINTMENTS,
            appointment_id,
            Self::timestamp(now)
        );
        let update = json!({
            "status": AppointmentStatus::Confirmed,
            "hold_expires_at": Value::Null,
            "confirmed_at": now,
        });

        let mut updated = self.supabase
            .request_with_headers::<Vec<Appointment>>(
                Method::PATCH,
                &path,
                None,
                Some(update),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(|e| Self::storage_error("Failed to confirm appointment", e))?;

        if !updated.is_empty() {
            let confirmed = updated.remove(0);
            self.events
                .publish(SlotChangeEvent::new(confirmed.slot_key(), SlotChangeKind::Confirmed, now))
                .await;
            info!("Confirmed appointment {}", appointment_id);
            return Ok(confirmed);
        }

        // Nothing matched: already confirmed, hold lapsed, or gone.
        let current = self.get_appointment(appointment_id).await?;
        if current.is_confirmed() {
            return Ok(current);
        }

        warn!("Hold on appointment {} expired before confirmation", appointment_id);
        let removed = self
            .delete(&format!("id=eq.{}&status=eq.pending_verification", appointment_id))
            .await?;
        self.publish_all(&removed, SlotChangeKind::Released, now).await;
        Err(lifecycle::confirm(&current, now)
            .err()
            .unwrap_or(SlotError::HoldExpired(appointment_id)))
    }

    async fn release(&self, appointment_id: Uuid) -> Result<(), SlotError> {
        let now = self.clock.now();
        let removed = self
            .delete(&format!("id=eq.{}&status=eq.pending_verification", appointment_id))
            .await?;

        if removed.is_empty() {
            // Confirmed appointments stay; a missing one is reported.
            self.get_appointment(appointment_id).await?;
            return Ok(());
        }

        self.publish_all(&removed, SlotChangeKind::Released, now).await;
        info!("Released hold {}", appointment_id);
        Ok(())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, SlotError> {
        self.fetch(&format!("id=eq.{}", appointment_id))
            .await?
            .into_iter()
            .next()
            .ok_or(SlotError::NotFound(appointment_id))
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, SlotError> {
        self.fetch("order=appointment_date.asc,appointment_time.asc,created_at.asc")
            .await
    }

    async fn release_expired_holds(&self) -> Result<usize, SlotError> {
        let now = self.clock.now();
        let removed = self
            .delete(&format!(
                "status=eq.pending_verification&hold_expires_at=lte.{}",
                Self::timestamp(now)
            ))
            .await?;

        self.publish_all(&removed, SlotChangeKind::Released, now).await;
        if !removed.is_empty() {
            info!("Released {} expired holds", removed.len());
        }
        Ok(removed.len())
    }

    async fn subscribe(&self, doctor_id: Uuid, date: NaiveDate) -> SlotEventReceiver {
        self.events.subscribe(doctor_id, date).await
    }

    async fn prune_idle_channels(&self) -> usize {
        self.events.prune_idle().await
    }
}
