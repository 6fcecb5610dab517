use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::Doctor;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Doctor not found: {0}")]
    NotFound(Uuid),

    #[error("Doctor directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only access to doctor reference data.
#[async_trait]
pub trait DoctorDirectory: Send + Sync {
    async fn fetch_doctors(&self) -> Result<Vec<Doctor>, DirectoryError>;

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DirectoryError>;
}

pub struct SupabaseDoctorDirectory {
    supabase: SupabaseClient,
}

impl SupabaseDoctorDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn query(&self, path: &str) -> Result<Vec<Doctor>, DirectoryError> {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| {
                error!("Doctor lookup failed: {}", e);
                DirectoryError::Unavailable(e.to_string())
            })?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Doctor>, _>>()
            .map_err(|e| DirectoryError::Unavailable(format!("Malformed doctor record: {}", e)))
    }
}

#[async_trait]
impl DoctorDirectory for SupabaseDoctorDirectory {
    async fn fetch_doctors(&self) -> Result<Vec<Doctor>, DirectoryError> {
        debug!("Fetching doctor list");
        self.query("/rest/v1/doctors?order=last_name.asc").await
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DirectoryError> {
        debug!("Fetching doctor profile: {}", doctor_id);
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.query(&path)
            .await?
            .into_iter()
            .next()
            .ok_or(DirectoryError::NotFound(doctor_id))
    }
}

/// Directory backed by a fixed list, used when no database is configured
/// and by tests.
#[derive(Clone, Default)]
pub struct InMemoryDoctorDirectory {
    doctors: Arc<RwLock<HashMap<Uuid, Doctor>>>,
}

impl InMemoryDoctorDirectory {
    pub fn new(doctors: Vec<Doctor>) -> Self {
        let map = doctors.into_iter().map(|d| (d.id, d)).collect();
        Self {
            doctors: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, doctor: Doctor) {
        self.doctors.write().await.insert(doctor.id, doctor);
    }
}

#[async_trait]
impl DoctorDirectory for InMemoryDoctorDirectory {
    async fn fetch_doctors(&self) -> Result<Vec<Doctor>, DirectoryError> {
        let mut doctors: Vec<Doctor> = self.doctors.read().await.values().cloned().collect();
        doctors.sort_by(|a, b| a.last_name.cmp(&b.last_name).then_with(|| a.first_name.cmp(&b.first_name)));
        Ok(doctors)
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DirectoryError> {
        self.doctors
            .read()
            .await
            .get(&doctor_id)
            .cloned()
            .ok_or(DirectoryError::NotFound(doctor_id))
    }
}
