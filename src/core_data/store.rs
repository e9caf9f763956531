//! In-memory event persistence.

use std::collections::VecDeque;
use std::sync::Mutex;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::secrets::Credentials;

/// One sensor value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub origin: i64,
}

/// A batch of readings reported by one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned on ingestion when empty.
    #[serde(default)]
    pub id: String,
    pub device: String,
    #[serde(default)]
    pub origin: i64,
    /// Set on ingestion.
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("event '{0}' already exists")]
    DuplicateId(String),
}

/// Bounded event store. When full, the oldest event is evicted.
pub struct EventStore {
    user: String,
    max_events: usize,
    events: DashMap<String, Event>,
    order: Mutex<VecDeque<String>>,
}

impl EventStore {
    /// Open the store with the credentials obtained from the secret provider.
    pub fn open(credentials: &Credentials, max_events: usize) -> Self {
        tracing::info!(user = %credentials.username, max_events, "Event store opened");
        Self {
            user: credentials.username.clone(),
            max_events: max_events.max(1),
            events: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
        }
    }

    pub fn add(&self, event: Event) -> Result<(), StoreError> {
        let mut order = self.order.lock().expect("event store mutex poisoned");
        if self.events.contains_key(&event.id) {
            return Err(StoreError::DuplicateId(event.id));
        }

        while order.len() >= self.max_events {
            if let Some(oldest) = order.pop_front() {
                self.events.remove(&oldest);
                tracing::trace!(id = %oldest, "Evicted oldest event");
            }
        }

        order.push_back(event.id.clone());
        self.events.insert(event.id.clone(), event);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Event> {
        self.events.get(id).map(|e| e.value().clone())
    }

    pub fn count(&self) -> usize {
        self.events.len()
    }

    pub fn count_for_device(&self, device: &str) -> usize {
        self.events.iter().filter(|e| e.device == device).count()
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("user", &self.user)
            .field("max_events", &self.max_events)
            .field("count", &self.count())
            .finish()
    }
}
