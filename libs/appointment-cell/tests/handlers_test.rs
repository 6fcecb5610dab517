mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::handlers::BookingState;
use appointment_cell::models::{SlotChangeEvent, SlotChangeKind, SlotKey};
use appointment_cell::router::booking_routes;
use appointment_cell::services::SlotReservationStore;
use shared_utils::clock::Clock;

use common::*;

const ADMIN_TOKEN: &str = "test-admin-token";

fn app(harness: &Harness) -> Router {
    booking_routes(BookingState {
        workflow: harness.workflow.clone(),
        sessions: harness.sessions.clone(),
        admin_token: ADMIN_TOKEN.into(),
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_list_slots_for_sunday() {
    let harness = Harness::new();
    let app = app(&harness);

    let uri = format!("/slots/{}?date=2026-10-18", harness.doctor_id());
    let (status, body) = send(&app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 15);
    assert_eq!(slots[0]["time"]["display"], "09:30 AM");
    assert_eq!(slots[14]["time"]["display"], "01:00 PM");
}

#[tokio::test]
async fn test_list_slots_for_unknown_doctor() {
    let harness = Harness::new();
    let app = app(&harness);

    let uri = format!("/slots/{}?date=2026-10-19", uuid::Uuid::new_v4());
    let (status, _) = send(&app, "GET", &uri, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_booking_flow_over_http() {
    let harness = Harness::new();
    let app = app(&harness);

    let (status, session) = send(&app, "POST", "/bookings", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = session["id"].as_str().unwrap().to_string();

    let (status, session) = send(
        &app,
        "POST",
        &format!("/bookings/{}/doctor", id),
        Some(json!({ "doctor_id": harness.doctor_id() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["step"], "select_date_time");

    let (status, session) = send(
        &app,
        "POST",
        &format!("/bookings/{}/date", id),
        Some(json!({ "date": "2026-10-19" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["available_slots"].as_array().unwrap().len(), 40);

    let (status, session) = send(
        &app,
        "POST",
        &format!("/bookings/{}/slot", id),
        Some(json!({ "time": "06:15 PM" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["step"], "patient_details");

    let (status, sent) = send(
        &app,
        "POST",
        &format!("/bookings/{}/details", id),
        Some(json!({
            "patient_name": "Asha Verma",
            "phone_number": PHONE,
            "age": 34,
            "gender": "female"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["session"]["step"], "otp_verification");
    assert_eq!(sent["otp"]["phone_number"], PHONE);
    assert!(sent["session"]["appointment"]["id"].is_string());

    let code = harness.outbox.last_code_for(PHONE).await.unwrap();
    let (status, session) = send(
        &app,
        "POST",
        &format!("/bookings/{}/otp/verify", id),
        Some(json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["step"], "confirmed");
    assert_eq!(session["appointment"]["status"], "confirmed");
}

#[tokio::test]
async fn test_invalid_details_return_bad_request() {
    let harness = Harness::new();
    let app = app(&harness);

    let (_, session) = send(&app, "POST", "/bookings", None).await;
    let id = session["id"].as_str().unwrap().to_string();
    send(&app, "POST", &format!("/bookings/{}/doctor", id), Some(json!({ "doctor_id": harness.doctor_id() }))).await;
    send(&app, "POST", &format!("/bookings/{}/date", id), Some(json!({ "date": "2026-10-19" }))).await;
    send(&app, "POST", &format!("/bookings/{}/slot", id), Some(json!({ "time": "09:30 AM" }))).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/bookings/{}/details", id),
        Some(json!({
            "patient_name": "Asha Verma",
            "phone_number": "12345",
            "age": 34,
            "gender": "female"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("phone_number"));

    let (_, snapshot) = send(&app, "GET", &format!("/bookings/{}", id), None).await;
    assert_eq!(snapshot["step"], "patient_details");
    assert!(snapshot["last_error"].is_string());
}

#[tokio::test]
async fn test_wrong_code_is_unprocessable() {
    let harness = Harness::new();
    let app = app(&harness);

    let (_, session) = send(&app, "POST", "/bookings", None).await;
    let id = session["id"].as_str().unwrap().to_string();
    send(&app, "POST", &format!("/bookings/{}/doctor", id), Some(json!({ "doctor_id": harness.doctor_id() }))).await;
    send(&app, "POST", &format!("/bookings/{}/date", id), Some(json!({ "date": "2026-10-19" }))).await;
    send(&app, "POST", &format!("/bookings/{}/slot", id), Some(json!({ "time": "09:30 AM" }))).await;
    send(&app, "POST", &format!("/bookings/{}/details", id), Some(serde_json::to_value(patient_form()).unwrap())).await;

    let code = harness.outbox.last_code_for(PHONE).await.unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };
    let (status, _) = send(&app, "POST", &format!("/bookings/{}/otp/verify", id), Some(json!({ "code": wrong }))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_busy_session_returns_conflict() {
    let harness = Harness::new();
    let app = app(&harness);

    let (_, session) = send(&app, "POST", "/bookings", None).await;
    let id: uuid::Uuid = session["id"].as_str().unwrap().parse().unwrap();

    let _guard = harness.sessions.lock(id).await.unwrap();
    let (status, body) = send(&app, "POST", &format!("/bookings/{}/back", id), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already in progress"));
}

#[tokio::test]
async fn test_back_from_first_step_is_bad_request() {
    let harness = Harness::new();
    let app = app(&harness);

    let (_, session) = send(&app, "POST", "/bookings", None).await;
    let id = session["id"].as_str().unwrap().to_string();
    let (status, _) = send(&app, "POST", &format!("/bookings/{}/back", id), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let harness = Harness::new();
    let app = app(&harness);

    let (status, _) = send(&app, "GET", "/admin/appointments", None).await;
    assert!(status.is_client_error());

    let request = Request::builder()
        .uri("/admin/appointments")
        .header(header::AUTHORIZATION, "Bearer wrong-token")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_lists_appointments_and_doctors() {
    let harness = Harness::new();
    let app = app(&harness);
    harness
        .store
        .reserve(request(harness.doctor_id(), monday(), slot(9, 30)))
        .await
        .unwrap();

    for (uri, key, total) in [("/admin/appointments", "appointments", 1usize), ("/admin/doctors", "doctors", 2usize)] {
        let request = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["total"], total);
        assert_eq!(body[key].as_array().unwrap().len(), total);
    }
}

#[tokio::test]
async fn test_lagging_event_stream_is_told_to_resync() {
    let harness = Harness::new();
    let app = app(&harness);
    let doctor_id = harness.doctor_id();

    let request = Request::builder()
        .uri(format!("/slots/{}/events?date=2026-10-19", doctor_id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let key = SlotKey { doctor_id, date: monday(), time: slot(9, 30) };
    for _ in 0..100 {
        harness
            .store
            .events()
            .publish(SlotChangeEvent::new(key, SlotChangeKind::Reserved, harness.clock.now()))
            .await;
    }

    let mut body = response.into_body().into_data_stream();
    let frame = body.next().await.unwrap().unwrap();
    let text = String::from_utf8_lossy(&frame);
    assert!(text.contains("event: resync"), "unexpected frame: {}", text);
}
