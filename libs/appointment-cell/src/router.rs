// libs/appointment-cell/src/router.rs
use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;

/// Slot listing, booking session steps and the admin listings.
pub fn booking_routes(state: BookingState) -> Router {
    let slot_routes = Router::new()
        .route("/slots/{doctor_id}", get(list_slots))
        .route("/slots/{doctor_id}/events", get(slot_events));

    let session_routes = Router::new()
        .route("/bookings", post(start_booking))
        .route("/bookings/{session_id}", get(get_booking))
        .route("/bookings/{session_id}/doctor", post(select_doctor))
        .route("/bookings/{session_id}/date", post(select_date))
        .route("/bookings/{session_id}/slot", post(select_slot))
        .route("/bookings/{session_id}/details", post(submit_details))
        .route("/bookings/{session_id}/otp/resend", post(resend_otp))
        .route("/bookings/{session_id}/otp/verify", post(verify_otp))
        .route("/bookings/{session_id}/back", post(go_back))
        .route("/bookings/{session_id}/reset", post(book_another));

    let admin_routes = Router::new()
        .route("/admin/appointments", get(admin_list_appointments))
        .route("/admin/doctors", get(admin_list_doctors));

    Router::new()
        .merge(slot_routes)
        .merge(session_routes)
        .merge(admin_routes)
        .with_state(state)
}
