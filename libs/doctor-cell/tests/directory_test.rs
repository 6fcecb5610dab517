use assert_matches::assert_matches;
use serde_json::json;
use tokio_test::assert_ok;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::services::{DirectoryError, DoctorDirectory, SupabaseDoctorDirectory};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn directory_for(server: &MockServer) -> SupabaseDoctorDirectory {
    SupabaseDoctorDirectory::new(&TestConfig::with_supabase(&server.uri()).to_app_config())
}

#[tokio::test]
async fn test_fetch_doctors_orders_by_last_name() {
    let server = MockServer::start().await;
    let directory = directory_for(&server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("order", "last_name.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(&MockSupabaseResponses::new_id(), "Meera", "Iyer", "Pediatrics"),
            MockSupabaseResponses::doctor_response(&MockSupabaseResponses::new_id(), "Rahul", "Kapoor", "Cardiology"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let doctors = directory.fetch_doctors().await.unwrap();

    assert_eq!(doctors.len(), 2);
    assert_eq!(doctors[0].full_name(), "Meera Iyer");
    assert!(doctors[1].has_specialty("cardiology"));
}

#[tokio::test]
async fn test_get_doctor_by_id() {
    let server = MockServer::start().await;
    let directory = directory_for(&server);
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_response(&doctor_id.to_string(), "Meera", "Iyer", "Pediatrics"),
        ])))
        .mount(&server)
        .await;

    let doctor = assert_ok!(directory.get_doctor(doctor_id).await);
    assert_eq!(doctor.id, doctor_id);
    assert_eq!(doctor.experience_years, Some(12));
}

#[tokio::test]
async fn test_missing_doctor_is_not_found() {
    let server = MockServer::start().await;
    let directory = directory_for(&server);
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = directory.get_doctor(doctor_id).await;
    assert_matches!(result, Err(DirectoryError::NotFound(id)) if id == doctor_id);
}

#[tokio::test]
async fn test_database_failure_is_unavailable() {
    let server = MockServer::start().await;
    let directory = directory_for(&server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let result = directory.fetch_doctors().await;
    assert_matches!(result, Err(DirectoryError::Unavailable(_)));
}

#[tokio::test]
async fn test_malformed_row_is_unavailable() {
    let server = MockServer::start().await;
    let directory = directory_for(&server);

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "not-a-uuid" }])))
        .mount(&server)
        .await;

    let result = directory.fetch_doctors().await;
    assert_matches!(result, Err(DirectoryError::Unavailable(msg)) if msg.contains("Malformed"));
}
