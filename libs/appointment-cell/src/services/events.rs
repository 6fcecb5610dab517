use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::models::SlotChangeEvent;

pub type SlotEventSender = broadcast::Sender<SlotChangeEvent>;
pub type SlotEventReceiver = broadcast::Receiver<SlotChangeEvent>;

const CHANNEL_CAPACITY: usize = 64;

/// Fan-out of slot changes, one channel per (doctor, date).
#[derive(Clone, Default)]
pub struct SlotEventHub {
    channels: Arc<RwLock<HashMap<(Uuid, NaiveDate), SlotEventSender>>>,
}

impl SlotEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, doctor_id: Uuid, date: NaiveDate) -> SlotEventReceiver {
        let mut channels = self.channels.write().await;
        channels
            .entry((doctor_id, date))
            .or_insert_with(|| {
                debug!("Opened slot channel for doctor {} on {}", doctor_id, date);
                broadcast::channel(CHANNEL_CAPACITY).0
            })
            .subscribe()
    }

    /// Deliver to current subscribers. A channel nobody listens to any more
    /// is dropped.
    pub async fn publish(&self, event: SlotChangeEvent) {
        let key = (event.doctor_id, event.date);

        let delivered = {
            let channels = self.channels.read().await;
            match channels.get(&key) {
                Some(sender) => sender.send(event).is_ok(),
                None => return,
            }
        };

        if !delivered {
            let mut channels = self.channels.write().await;
            if channels.get(&key).is_some_and(|s| s.receiver_count() == 0) {
                channels.remove(&key);
                debug!("Closed idle slot channel for doctor {} on {}", key.0, key.1);
            }
        }
    }

    /// Drop channels whose subscribers have all gone away, including ones
    /// that never saw an event.
    pub async fn prune_idle(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let closed = before - channels.len();
        if closed > 0 {
            debug!("Closed {} idle slot channels", closed);
        }
        closed
    }

    pub async fn active_channels(&self) -> usize {
        self.channels.read().await.len()
    }
}
