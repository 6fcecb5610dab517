use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::debug;
use uuid::Uuid;

use doctor_cell::models::{SlotTemplate, TimeSlot};
use doctor_cell::services::slots;

use crate::models::{AppointmentSlot, SlotError};
use crate::services::reservation::SlotReservationStore;

/// Builds the slot list for a doctor and date from the business-hours
/// templates and the store's current bookings.
#[derive(Clone)]
pub struct AvailabilityResolver {
    store: Arc<dyn SlotReservationStore>,
}

impl AvailabilityResolver {
    pub fn new(store: Arc<dyn SlotReservationStore>) -> Self {
        Self { store }
    }

    pub fn templates_for(date: NaiveDate) -> &'static [SlotTemplate] {
        SlotTemplate::for_date(date)
    }

    pub fn is_sunday(date: NaiveDate) -> bool {
        date.weekday() == Weekday::Sun
    }

    /// Every candidate slot in chronological order, booked ones included.
    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AppointmentSlot>, SlotError> {
        debug!("Calculating slots for doctor {} on {} (sunday: {})", doctor_id, date, Self::is_sunday(date));

        let booked: HashSet<TimeSlot> = self.store
            .booked_times(doctor_id, date)
            .await?
            .into_iter()
            .collect();

        let candidates: Vec<AppointmentSlot> = slots::slots_for_date(date)
            .into_iter()
            .map(|time| AppointmentSlot {
                doctor_id,
                date,
                time,
                is_booked: booked.contains(&time),
            })
            .collect();

        debug!(
            "Found {} slots, {} booked",
            candidates.len(),
            candidates.iter().filter(|s| s.is_booked).count()
        );
        Ok(candidates)
    }

    /// The slot entry for `time`, or `None` when the date does not offer it.
    pub async fn find_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: TimeSlot,
    ) -> Result<Option<AppointmentSlot>, SlotError> {
        if !slots::is_offered(date, time) {
            return Ok(None);
        }
        Ok(self
            .get_available_slots(doctor_id, date)
            .await?
            .into_iter()
            .find(|slot| slot.time == time))
    }
}
