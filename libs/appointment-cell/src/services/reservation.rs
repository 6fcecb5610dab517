// libs/appointment-cell/src/services/reservation.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::models::TimeSlot;
use doctor_cell::services::slots;
use shared_config::BookingConfig;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::{
    Appointment, AppointmentStatus, NewAppointment, SlotChangeEvent, SlotChangeKind,
    SlotError, SlotKey,
};
use crate::services::events::{SlotEventHub, SlotEventReceiver};
use crate::services::lifecycle;

/// Authoritative record of which slots are taken. `reserve` is the only way
/// to claim a slot and must be atomic against concurrent callers.
#[async_trait]
pub trait SlotReservationStore: Send + Sync {
    /// True if nothing currently occupies the slot.
    async fn check_availability(&self, key: &SlotKey) -> Result<bool, SlotError>;

    /// Times currently occupied for the doctor on the date.
    async fn booked_times(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, SlotError>;

    /// Claim the slot and create a pending appointment holding it.
    async fn reserve(&self, request: NewAppointment) -> Result<Appointment, SlotError>;

    /// Turn a live hold into a confirmed appointment. Confirming an
    /// already-confirmed appointment returns it unchanged.
    async fn confirm(&self, appointment_id: Uuid) -> Result<Appointment, SlotError>;

    /// Drop a pending hold. Confirmed appointments are left alone.
    async fn release(&self, appointment_id: Uuid) -> Result<(), SlotError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, SlotError>;

    async fn list_appointments(&self) -> Result<Vec<Appointment>, SlotError>;

    /// Remove expired holds, returning how many slots were freed.
    async fn release_expired_holds(&self) -> Result<usize, SlotError>;

    async fn subscribe(&self, doctor_id: Uuid, date: NaiveDate) -> SlotEventReceiver;

    /// Close event channels nobody is listening to. Returns how many closed.
    async fn prune_idle_channels(&self) -> usize;
}

#[derive(Default)]
struct Slots {
    by_key: HashMap<SlotKey, Uuid>,
    appointments: HashMap<Uuid, Appointment>,
}

impl Slots {
    fn remove(&mut self, appointment_id: Uuid) -> Option<Appointment> {
        let appointment = self.appointments.remove(&appointment_id)?;
        if self.by_key.get(&appointment.slot_key()) == Some(&appointment_id) {
            self.by_key.remove(&appointment.slot_key());
        }
        Some(appointment)
    }
}

/// Process-local store. The check and the claim in `reserve` run under one
/// write lock.
pub struct InMemorySlotStore {
    slots: RwLock<Slots>,
    events: SlotEventHub,
    hold_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl InMemorySlotStore {
    pub fn new(config: &BookingConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &BookingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            events: SlotEventHub::new(),
            hold_ttl: Duration::seconds(config.hold_ttl_seconds),
            clock,
        }
    }

    pub fn events(&self) -> &SlotEventHub {
        &self.events
    }
}

#[async_trait]
impl SlotReservationStore for InMemorySlotStore {
    async fn check_availability(&self, key: &SlotKey) -> Result<bool, SlotError> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        let occupied = slots
            .by_key
            .get(key)
            .and_then(|id| slots.appointments.get(id))
            .is_some_and(|a| a.blocks_slot_at(now));
        Ok(!occupied)
    }

    async fn booked_times(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<TimeSlot>, SlotError> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        let mut times: Vec<TimeSlot> = slots
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.appointment_date == date)
            .filter(|a| a.blocks_slot_at(now))
            .map(|a| a.appointment_time)
            .collect();
        times.sort();
        Ok(times)
    }

    async fn reserve(&self, request: NewAppointment) -> Result<Appointment, SlotError> {
        let key = request.slot;
        if !slots::is_offered(key.date, key.time) {
            return Err(SlotError::NotOffered { date: key.date, time: key.time });
        }

        let now = self.clock.now();
        let mut released = None;

        let appointment = {
            let mut slots = self.slots.write().await;

            if let Some(existing_id) = slots.by_key.get(&key).copied() {
                let existing = slots
                    .appointments
                    .get(&existing_id)
                    .filter(|existing| existing.blocks_slot_at(now));
                if let Some(existing) = existing {
                    if existing.id == request.id {
                        debug!("Reservation {} replayed on {}", existing.id, key);
                        return Ok(existing.clone());
                    }
                    warn!("Reservation conflict on {}", key);
                    return Err(SlotError::Conflict(key));
                }
                debug!("Replacing expired hold {} on {}", existing_id, key);
                slots.remove(existing_id);
                released = Some(SlotChangeEvent::new(key, SlotChangeKind::Released, now));
            }

            if slots.appointments.contains_key(&request.id) {
                return Err(SlotError::Storage(format!(
                    "appointment id {} already holds another slot",
                    request.id
                )));
            }

            let appointment = lifecycle::new_pending(request, now, self.hold_ttl);
            slots.by_key.insert(key, appointment.id);
            slots.appointments.insert(appointment.id, appointment.clone());
            appointment
        };

        if let Some(event) = released {
            self.events.publish(event).await;
        }
        self.events
            .publish(SlotChangeEvent::new(key, SlotChangeKind::Reserved, now))
            .await;

        info!("Reserved {} for appointment {}", key, appointment.id);
        Ok(appointment)
    }

    async fn confirm(&self, appointment_id: Uuid) -> Result<Appointment, SlotError> {
        let now = self.clock.now();

        let (key, outcome) = {
            let mut slots = self.slots.write().await;
            let current = slots
                .appointments
                .get(&appointment_id)
                .cloned()
                .ok_or(SlotError::NotFound(appointment_id))?;

            if current.is_confirmed() {
                return Ok(current);
            }

            let outcome = lifecycle::confirm(&current, now);
            match &outcome {
                Ok(confirmed) => {
                    slots.appointments.insert(appointment_id, confirmed.clone());
                }
                Err(SlotError::HoldExpired(id)) => {
                    slots.remove(*id);
                }
                Err(_) => {}
            }
            (current.slot_key(), outcome)
        };

        match &outcome {
            Ok(_) => {
                self.events
                    .publish(SlotChangeEvent::new(key, SlotChangeKind::Confirmed, now))
                    .await;
                info!("Confirmed appointment {}", appointment_id);
            }
            Err(SlotError::HoldExpired(_)) => {
                warn!("Hold on appointment {} expired before confirmation", appointment_id);
                self.events
                    .publish(SlotChangeEvent::new(key, SlotChangeKind::Released, now))
                    .await;
            }
            Err(_) => {}
        }

        outcome
    }

    async fn release(&self, appointment_id: Uuid) -> Result<(), SlotError> {
        let now = self.clock.now();
        let removed = {
            let mut slots = self.slots.write().await;
            let status = slots
                .appointments
                .get(&appointment_id)
                .map(|a| a.status)
                .ok_or(SlotError::NotFound(appointment_id))?;
            if status == AppointmentStatus::Confirmed {
                return Ok(());
            }
            slots.remove(appointment_id)
        };

        if let Some(appointment) = removed {
            self.events
                .publish(SlotChangeEvent::new(appointment.slot_key(), SlotChangeKind::Released, now))
                .await;
            info!("Released hold {} on {}", appointment_id, appointment.slot_key());
        }
        Ok(())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, SlotError> {
        self.slots
            .read()
            .await
            .appointments
            .get(&appointment_id)
            .cloned()
            .ok_or(SlotError::NotFound(appointment_id))
    }

    async fn list_appointments(&self) -> Result<Vec<Appointment>, SlotError> {
        let mut appointments: Vec<Appointment> =
            self.slots.read().await.appointments.values().cloned().collect();
        appointments.sort_by_key(|a| (a.appointment_date, a.appointment_time, a.created_at));
        Ok(appointments)
    }

    async fn release_expired_holds(&self) -> Result<usize, SlotError> {
        let now = self.clock.now();
        let expired: Vec<Appointment> = {
            let mut slots = self.slots.write().await;
            let ids: Vec<Uuid> = slots
                .appointments
                .values()
                .filter(|a| a.is_hold_expired_at(now))
                .map(|a| a.id)
                .collect();
            ids.into_iter().filter_map(|id| slots.remove(id)).collect()
        };

        for appointment in &expired {
            self.events
                .publish(SlotChangeEvent::new(appointment.slot_key(), SlotChangeKind::Released, now))
                .await;
        }

        if !expired.is_empty() {
            info!("Released {} expired holds", expired.len());
        }
        Ok(expired.len())
    }

    async fn subscribe(&self, doctor_id: Uuid, date: NaiveDate) -> SlotEventReceiver {
        self.events.subscribe(doctor_id, date).await
    }

    async fn prune_idle_channels(&self) -> usize {
        self.events.prune_idle().await
    }
}
