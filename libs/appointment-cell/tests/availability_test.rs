mod common;

use std::sync::Arc;

use chrono::{Datelike, Duration, Weekday};
use uuid::Uuid;

use appointment_cell::services::{AvailabilityResolver, InMemorySlotStore, SlotReservationStore};

use common::*;

fn resolver() -> (AvailabilityResolver, Arc<InMemorySlotStore>) {
    let store = Arc::new(InMemorySlotStore::with_clock(&config(), Arc::new(clock())));
    (AvailabilityResolver::new(store.clone()), store)
}

#[tokio::test]
async fn test_weekday_lists_morning_then_evening() {
    let (resolver, _store) = resolver();
    let slots = resolver.get_available_slots(Uuid::new_v4(), monday()).await.unwrap();

    let displays: Vec<String> = slots.iter().map(|s| s.time.display()).collect();
    assert_eq!(displays.first().map(String::as_str), Some("09:30 AM"));
    assert!(displays.contains(&"04:00 PM".to_string()));
    assert!(displays.contains(&"06:00 PM".to_string()));
    assert_eq!(displays.last().map(String::as_str), Some("09:00 PM"));
    assert!(!displays.contains(&"05:00 PM".to_string()));

    // 09:30-16:00 and 18:00-21:00 inclusive, every 15 minutes
    assert_eq!(slots.len(), 27 + 13);
    assert!(slots.windows(2).all(|pair| pair[0].time < pair[1].time));
    assert!(slots.iter().all(|s| !s.is_booked));
}

#[tokio::test]
async fn test_every_weekday_steps_by_fifteen_minutes() {
    let (resolver, _store) = resolver();
    let doctor_id = Uuid::new_v4();

    for offset in 0..6 {
        let date = monday() + Duration::days(offset);
        assert_ne!(date.weekday(), Weekday::Sun);

        let slots = resolver.get_available_slots(doctor_id, date).await.unwrap();
        assert_eq!(slots.len(), 40, "slot count on {}", date);
        assert_eq!(slots[0].time, slot(9, 30));
        assert_eq!(slots[39].time, slot(21, 0));

        let gaps: Vec<u32> = slots
            .windows(2)
            .map(|pair| pair[1].time.minute_of_day() - pair[0].time.minute_of_day())
            .collect();
        // One break between the 16:00 and 18:00 windows, 15 minutes everywhere else.
        assert_eq!(gaps.iter().filter(|&&gap| gap == 120).count(), 1, "break on {}", date);
        assert!(gaps.iter().all(|&gap| gap == 15 || gap == 120), "gaps on {}: {:?}", date, gaps);
        let break_at = gaps.iter().position(|&gap| gap == 120).unwrap();
        assert_eq!(slots[break_at].time, slot(16, 0));
    }
}

#[tokio::test]
async fn test_sunday_only_offers_short_morning() {
    let (resolver, _store) = resolver();
    let slots = resolver.get_available_slots(Uuid::new_v4(), sunday()).await.unwrap();

    assert_eq!(slots.first().unwrap().time.display(), "09:30 AM");
    assert_eq!(slots.last().unwrap().time.display(), "01:00 PM");
    assert_eq!(slots.len(), 15);
    assert!(AvailabilityResolver::is_sunday(sunday()));
}

#[tokio::test]
async fn test_sunday_afternoon_is_not_offered() {
    let (resolver, _store) = resolver();
    let doctor_id = Uuid::new_v4();

    let morning = resolver.find_slot(doctor_id, sunday(), slot(9, 30)).await.unwrap();
    assert!(morning.is_some_and(|s| !s.is_booked));

    let afternoon = resolver.find_slot(doctor_id, sunday(), slot(14, 0)).await.unwrap();
    assert!(afternoon.is_none());
}

#[tokio::test]
async fn test_booked_slots_stay_visible() {
    let (resolver, store) = resolver();
    let doctor_id = Uuid::new_v4();
    store.reserve(request(doctor_id, monday(), slot(18, 30))).await.unwrap();

    let slots = resolver.get_available_slots(doctor_id, monday()).await.unwrap();
    let booked: Vec<_> = slots.iter().filter(|s| s.is_booked).collect();

    assert_eq!(slots.len(), 40);
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].time, slot(18, 30));
}

#[tokio::test]
async fn test_bookings_do_not_leak_across_doctors_or_dates() {
    let (resolver, store) = resolver();
    let doctor_id = Uuid::new_v4();
    store.reserve(request(doctor_id, monday(), slot(9, 30))).await.unwrap();

    let other_doctor = resolver.get_available_slots(Uuid::new_v4(), monday()).await.unwrap();
    assert!(other_doctor.iter().all(|s| !s.is_booked));

    let other_date = resolver.get_available_slots(doctor_id, sunday()).await.unwrap();
    assert!(other_date.iter().all(|s| !s.is_booked));
}

#[tokio::test]
async fn test_listing_is_idempotent() {
    let (resolver, store) = resolver();
    let doctor_id = Uuid::new_v4();
    store.reserve(request(doctor_id, monday(), slot(10, 15))).await.unwrap();

    let first = resolver.get_available_slots(doctor_id, monday()).await.unwrap();
    let second = resolver.get_available_slots(doctor_id, monday()).await.unwrap();

    assert_eq!(first, second);
}
