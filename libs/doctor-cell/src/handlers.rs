use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{Doctor, DoctorListResponse};
use crate::services::directory::{DirectoryError, DoctorDirectory};

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    pub specialty: Option<String>,
    pub available_only: Option<bool>,
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(id) => AppError::NotFound(format!("Doctor {} not found", id)),
            DirectoryError::Unavailable(msg) => AppError::ExternalService(msg),
        }
    }
}

pub async fn list_doctors(
    State(directory): State<Arc<dyn DoctorDirectory>>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<DoctorListResponse>, AppError> {
    let mut doctors = directory.fetch_doctors().await?;

    if let Some(specialty) = query.specialty.as_deref() {
        doctors.retain(|d| d.has_specialty(specialty));
    }
    if query.available_only.unwrap_or(false) {
        doctors.retain(|d| d.is_available);
    }

    let total = doctors.len();
    Ok(Json(DoctorListResponse { doctors, total }))
}

pub async fn get_doctor(
    State(directory): State<Arc<dyn DoctorDirectory>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Doctor>, AppError> {
    let doctor = directory.get_doctor(doctor_id).await?;
    Ok(Json(doctor))
}
