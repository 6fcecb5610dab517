use axum::{
    Router,
    routing::get,
};

use appointment_cell::handlers::BookingState;
use appointment_cell::router::booking_routes;
use appointment_cell::services::BookingWorkflow;
use doctor_cell::router::doctor_routes;
use shared_config::AppConfig;

use crate::state::AppServices;

pub fn create_router(config: &AppConfig, services: &AppServices) -> Router {
    let workflow = BookingWorkflow::new(
        services.directory.clone(),
        services.store.clone(),
        services.otp.clone(),
        services.notifier.clone(),
        &config.booking,
    );

    let booking_state = BookingState {
        workflow: workflow.into(),
        sessions: services.sessions.clone(),
        admin_token: config.admin_token.as_str().into(),
    };

    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/doctors", doctor_routes(services.directory.clone()))
        .merge(booking_routes(booking_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use shared_utils::test_utils::TestConfig;

    fn app() -> Router {
        let mut config = TestConfig::default().to_app_config();
        config.supabase_url = String::new();
        config.twilio_account_sid = String::new();
        let services = AppServices::from_config(&config).unwrap();
        create_router(&config, &services)
    }

    #[tokio::test]
    async fn root_reports_liveness() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Clinic booking API is running!");
    }

    #[tokio::test]
    async fn doctors_are_listed_from_the_directory() {
        let response = app()
            .oneshot(Request::builder().uri("/doctors").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["total"], 0);
    }

    #[tokio::test]
    async fn booking_session_starts_at_first_step() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/bookings")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["step"], "select_doctor");
    }
}
