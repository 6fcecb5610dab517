// libs/doctor-cell/src/services/slots.rs
use chrono::NaiveDate;

use crate::models::{SlotTemplate, TimeSlot, SLOT_STEP_MINUTES};

/// Time slots from start to end in 15-minute steps. The end boundary is
/// included when it lands on a step. An invalid or inverted window yields
/// nothing.
pub fn generate(start_hour: u32, start_minute: u32, end_hour: u32, end_minute: u32) -> Vec<TimeSlot> {
    if start_hour > 23 || end_hour > 23 || start_minute > 59 || end_minute > 59 {
        return Vec::new();
    }

    let start = start_hour * 60 + start_minute;
    let end = end_hour * 60 + end_minute;

    (start..=end)
        .step_by(SLOT_STEP_MINUTES as usize)
        .filter_map(|minutes| TimeSlot::from_hm(minutes / 60, minutes % 60))
        .collect()
}

pub fn template_slots(template: SlotTemplate) -> Vec<TimeSlot> {
    let (start_hour, start_minute, end_hour, end_minute) = template.window();
    generate(start_hour, start_minute, end_hour, end_minute)
}

/// Every candidate slot for a calendar date, in chronological order.
pub fn slots_for_date(date: NaiveDate) -> Vec<TimeSlot> {
    let mut slots: Vec<TimeSlot> = SlotTemplate::for_date(date)
        .iter()
        .flat_map(|template| template_slots(*template))
        .collect();
    slots.sort();
    slots.dedup();
    slots
}

/// Whether `slot` is offered at all on `date`.
pub fn is_offered(date: NaiveDate, slot: TimeSlot) -> bool {
    SlotTemplate::for_date(date)
        .iter()
        .any(|template| template_slots(*template).contains(&slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_window_is_empty() {
        assert!(generate(16, 0, 9, 30).is_empty());
    }

    #[test]
    fn end_off_step_is_excluded() {
        let slots = generate(9, 0, 9, 40);
        let labels: Vec<String> = slots.iter().map(|s| s.display()).collect();
        assert_eq!(labels, vec!["09:00 AM", "09:15 AM", "09:30 AM"]);
    }

    #[test]
    fn single_point_window() {
        assert_eq!(generate(18, 0, 18, 0).len(), 1);
    }

    #[test]
    fn out_of_range_input() {
        assert!(generate(24, 0, 25, 0).is_empty());
        assert!(generate(9, 60, 10, 0).is_empty());
    }
}
