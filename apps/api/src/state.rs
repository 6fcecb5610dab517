use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use appointment_cell::services::{
    HoldSweeper, InMemorySlotStore, SessionRegistry, SlotReservationStore, SupabaseSlotStore,
};
use doctor_cell::models::Doctor;
use doctor_cell::services::{DoctorDirectory, InMemoryDoctorDirectory, SupabaseDoctorDirectory};
use notification_cell::services::{NotificationService, OutboxNotifier, TwilioSmsNotifier};
use shared_config::AppConfig;
use verification_cell::services::OtpChallengeService;

/// Long-lived collaborators shared by the router and the sweeper.
pub struct AppServices {
    pub directory: Arc<dyn DoctorDirectory>,
    pub store: Arc<dyn SlotReservationStore>,
    pub otp: Arc<OtpChallengeService>,
    pub notifier: Arc<dyn NotificationService>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppServices {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let (directory, store): (Arc<dyn DoctorDirectory>, Arc<dyn SlotReservationStore>) =
            if config.is_configured() {
                info!("Using Supabase for doctors and appointments");
                (
                    Arc::new(SupabaseDoctorDirectory::new(config)),
                    Arc::new(SupabaseSlotStore::new(config)),
                )
            } else {
                (
                    Arc::new(InMemoryDoctorDirectory::new(load_doctors(config)?)),
                    Arc::new(InMemorySlotStore::new(&config.booking)),
                )
            };

        let notifier: Arc<dyn NotificationService> = if config.is_sms_configured() {
            info!("Sending SMS through Twilio");
            Arc::new(TwilioSmsNotifier::new(config))
        } else {
            warn!("Twilio not configured - messages are only logged");
            Arc::new(OutboxNotifier::new())
        };

        Ok(Self {
            directory,
            store,
            otp: Arc::new(OtpChallengeService::new(&config.booking)),
            notifier,
            sessions: Arc::new(SessionRegistry::new(&config.booking)),
        })
    }

    pub fn sweeper(&self, config: &AppConfig) -> HoldSweeper {
        HoldSweeper::new(
            self.store.clone(),
            self.otp.clone(),
            self.sessions.clone(),
            &config.booking,
        )
    }
}

fn load_doctors(config: &AppConfig) -> anyhow::Result<Vec<Doctor>> {
    let Some(path) = config.doctors_file.as_deref() else {
        warn!("DOCTORS_FILE not set, the doctor list is empty");
        return Ok(Vec::new());
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read doctors file {}", path))?;
    let doctors: Vec<Doctor> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse doctors file {}", path))?;
    info!("Loaded {} doctors from {}", doctors.len(), path);
    Ok(doctors)
}
