// libs/appointment-cell/src/handlers.rs
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use doctor_cell::models::{DoctorListResponse, TimeSlot};
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentSlot, BookingError, OtpDispatch, PatientDetailsForm, SlotError,
};
use crate::services::sessions::SessionRegistry;
use crate::services::workflow::{BookingSession, BookingWorkflow};

#[derive(Clone)]
pub struct BookingState {
    pub workflow: Arc<BookingWorkflow>,
    pub sessions: Arc<SessionRegistry>,
    pub admin_token: Arc<str>,
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::Validation(_) => AppError::ValidationError(message),
            BookingError::Conflict(_) | BookingError::OperationInProgress => AppError::Conflict(message),
            BookingError::InvalidCode | BookingError::Expired => AppError::Verification(message),
            BookingError::DeliveryFailed(_) => AppError::ExternalService(message),
            BookingError::InvalidTransition { .. } => AppError::BadRequest(message),
            BookingError::Timeout(_) => AppError::Timeout(message),
            BookingError::NotFound(_) => AppError::NotFound(message),
            BookingError::Unexpected(_) => AppError::Internal(message),
        }
    }
}

impl From<SlotError> for AppError {
    fn from(err: SlotError) -> Self {
        BookingError::from(err).into()
    }
}

// ==============================================================================
// REQUEST / RESPONSE TYPES
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct SlotListResponse {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<AppointmentSlot>,
}

#[derive(Debug, Deserialize)]
pub struct SelectDoctorRequest {
    pub doctor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SelectDateRequest {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct SelectSlotRequest {
    pub time: TimeSlot,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct OtpSentResponse {
    pub session: BookingSession,
    pub otp: OtpDispatch,
}

#[derive(Debug, Serialize)]
pub struct AppointmentListResponse {
    pub appointments: Vec<Appointment>,
    pub total: usize,
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

pub async fn list_slots(
    State(state): State<BookingState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> Result<Json<SlotListResponse>, AppError> {
    state.workflow.directory().get_doctor(doctor_id).await?;

    let slots = state
        .workflow
        .resolver()
        .get_available_slots(doctor_id, query.date)
        .await?;

    Ok(Json(SlotListResponse { doctor_id, date: query.date, slots }))
}

/// Server-sent stream of slot changes for one doctor and date.
pub async fn slot_events(
    State(state): State<BookingState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DateQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.workflow.store().subscribe(doctor_id, query.date).await;
    debug!("Slot event subscriber for doctor {} on {}", doctor_id, query.date);

    let stream = BroadcastStream::new(receiver).filter_map(|message| match message {
        Ok(change) => {
            let data = serde_json::to_string(&change).unwrap_or_default();
            Some(Ok(Event::default().event("slot_change").data(data)))
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!("Slot event subscriber lagged, skipped {} events", skipped);
            // The client has missed changes and must refetch the slot list.
            Some(Ok(Event::default().event("resync").data(skipped.to_string())))
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keepalive"),
    )
}

// ==============================================================================
// BOOKING SESSION HANDLERS
// ==============================================================================

pub async fn start_booking(
    State(state): State<BookingState>,
) -> Result<(StatusCode, Json<BookingSession>), AppError> {
    let session = state.workflow.start_session().await?;
    state.sessions.insert(session.clone()).await;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_booking(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<BookingSession>, AppError> {
    Ok(Json(state.sessions.snapshot(session_id).await?))
}

pub async fn select_doctor(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SelectDoctorRequest>,
) -> Result<Json<BookingSession>, AppError> {
    let mut session = state.sessions.lock(session_id).await?;
    let result = state.workflow.select_doctor(&mut session, request.doctor_id).await;
    state.workflow.settle(&mut session, result)?;
    Ok(Json(session.clone()))
}

pub async fn select_date(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SelectDateRequest>,
) -> Result<Json<BookingSession>, AppError> {
    let mut session = state.sessions.lock(session_id).await?;
    let result = state.workflow.select_date(&mut session, request.date).await;
    state.workflow.settle(&mut session, result)?;
    Ok(Json(session.clone()))
}

pub async fn select_slot(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<SelectSlotRequest>,
) -> Result<Json<BookingSession>, AppError> {
    let mut session = state.sessions.lock(session_id).await?;
    let result = state.workflow.select_slot(&mut session, request.time).await;
    state.workflow.settle(&mut session, result)?;
    Ok(Json(session.clone()))
}

pub async fn submit_details(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
    Json(form): Json<PatientDetailsForm>,
) -> Result<Json<OtpSentResponse>, AppError> {
    let mut session = state.sessions.lock(session_id).await?;
    let result = state.workflow.submit_details(&mut session, form).await;
    let otp = state.workflow.settle(&mut session, result)?;
    Ok(Json(OtpSentResponse { session: session.clone(), otp }))
}

pub async fn resend_otp(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<OtpSentResponse>, AppError> {
    let mut session = state.sessions.lock(session_id).await?;
    let result = state.workflow.resend_otp(&mut session).await;
    let otp = state.workflow.settle(&mut session, result)?;
    Ok(Json(OtpSentResponse { session: session.clone(), otp }))
}

pub async fn verify_otp(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<BookingSession>, AppError> {
    let mut session = state.sessions.lock(session_id).await?;
    let result = state.workflow.verify_otp(&mut session, &request.code).await;
    state.workflow.settle(&mut session, result)?;
    Ok(Json(session.clone()))
}

pub async fn go_back(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<BookingSession>, AppError> {
    let mut session = state.sessions.lock(session_id).await?;
    let result = state.workflow.go_back(&mut session).await;
    state.workflow.settle(&mut session, result)?;
    Ok(Json(session.clone()))
}

pub async fn book_another(
    State(state): State<BookingState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<BookingSession>, AppError> {
    let mut session = state.sessions.lock(session_id).await?;
    let result = state.workflow.book_another(&mut session).await;
    state.workflow.settle(&mut session, result)?;
    Ok(Json(session.clone()))
}

// ==============================================================================
// ADMIN HANDLERS
// ==============================================================================

fn require_admin(state: &BookingState, auth: &Authorization<Bearer>) -> Result<(), AppError> {
    if state.admin_token.is_empty() || auth.token() != &*state.admin_token {
        warn!("Rejected admin request with invalid token");
        return Err(AppError::Auth("Invalid admin token".to_string()));
    }
    Ok(())
}

pub async fn admin_list_appointments(
    State(state): State<BookingState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<AppointmentListResponse>, AppError> {
    require_admin(&state, &auth)?;
    let appointments = state.workflow.store().list_appointments().await?;
    let total = appointments.len();
    Ok(Json(AppointmentListResponse { appointments, total }))
}

pub async fn admin_list_doctors(
    State(state): State<BookingState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<DoctorListResponse>, AppError> {
    require_admin(&state, &auth)?;
    let doctors = state.workflow.directory().fetch_doctors().await?;
    let total = doctors.len();
    Ok(Json(DoctorListResponse { doctors, total }))
}
