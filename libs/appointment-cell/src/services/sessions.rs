use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use shared_config::BookingConfig;
use shared_utils::clock::{Clock, SystemClock};

use crate::models::BookingError;
use crate::services::workflow::BookingSession;

pub type SessionGuard = OwnedMutexGuard<BookingSession>;

/// Live booking sessions. Each session sits behind its own mutex; a step
/// that finds it already locked is rejected instead of queued.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<BookingSession>>>>,
    idle_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(config: &BookingConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &BookingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl: Duration::seconds(config.session_idle_seconds),
            clock,
        }
    }

    pub async fn insert(&self, session: BookingSession) -> Uuid {
        let id = session.id;
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(session)));
        id
    }

    /// Exclusive access for one step. Fails fast while another step on the
    /// same session is still running.
    pub async fn lock(&self, session_id: Uuid) -> Result<SessionGuard, BookingError> {
        let session = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("Booking session {} not found", session_id)))?;

        session.try_lock_owned().map_err(|_| {
            debug!("Rejected overlapping request for session {}", session_id);
            BookingError::OperationInProgress
        })
    }

    pub async fn snapshot(&self, session_id: Uuid) -> Result<BookingSession, BookingError> {
        let session = self
            .sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("Booking session {} not found", session_id)))?;
        let snapshot = session.lock().await.clone();
        Ok(snapshot)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop sessions untouched for longer than the idle TTL. Sessions with a
    /// step in flight are kept.
    pub async fn prune_idle(&self) -> usize {
        let cutoff = self.clock.now() - self.idle_ttl;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(guard) => guard.updated_at > cutoff,
            Err(_) => true,
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!("Pruned {} idle booking sessions", pruned);
        }
        pruned
    }
}
