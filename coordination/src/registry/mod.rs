//! Model Registry: rotation over the local model pool and live health metadata
//!
//! Models are handed out round-robin from a cursor, skipping entries that
//! have been reported unhealthy. The cursor and the health table share one
//! lock so a rotation decision never observes a half-applied health update.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("all {pool_size} models in the pool are unhealthy")]
    PoolExhausted { pool_size: usize },

    #[error("model {0} is not in the pool")]
    UnknownModel(String),
}

/// Live health metadata for a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHealth {
    /// Whether the model is currently offered by rotation
    pub healthy: bool,
    /// Mean latency of successful calls in milliseconds
    pub avg_latency_ms: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Last time the healthy flag changed (Unix seconds)
    pub last_changed_secs: u64,
    pub status_message: Option<String>,
}

impl ModelHealth {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            avg_latency_ms: 0,
            success_count: 0,
            failure_count: 0,
            last_changed_secs: unix_now(),
            status_message: None,
        }
    }

    /// Compute success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f32 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f32 / total as f32
        }
    }

    fn record_latency(&mut self, latency_ms: u64) {
        self.avg_latency_ms =
            (self.avg_latency_ms * self.success_count + latency_ms) / (self.success_count + 1);
        self.success_count += 1;
    }
}

/// A model name paired with its health, as returned by [`ModelRegistry::snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub health: ModelHealth,
}

#[derive(Debug)]
struct Slot {
    entry: ModelEntry,
    unhealthy_since: Option<Instant>,
}

#[derive(Debug)]
struct RegistryState {
    slots: Vec<Slot>,
    cursor: usize,
}

/// Ordered model pool with a rotation cursor and per-model health.
#[derive(Debug)]
pub struct ModelRegistry {
    state: Mutex<RegistryState>,
    unhealthy_cooldown: Option<Duration>,
}

impl ModelRegistry {
    pub fn new<I, S>(pool: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots = pool
            .into_iter()
            .map(|name| Slot {
                entry: ModelEntry {
                    name: name.into(),
                    health: ModelHealth::healthy(),
                },
                unhealthy_since: None,
            })
            .collect();
        Self {
            state: Mutex::new(RegistryState { slots, cursor: 0 }),
            unhealthy_cooldown: None,
        }
    }

    pub fn shared<I, S>(pool: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self::new(pool))
    }

    /// Re-admit unhealthy models to rotation once `cooldown` has elapsed.
    pub fn with_unhealthy_cooldown(mut self, cooldown: Option<Duration>) -> Self {
        self.unhealthy_cooldown = cooldown;
        self
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next healthy model after the cursor. Visits each entry at most once.
    pub fn next_model(&self) -> Result<String, RegistryError> {
        let mut state = self.lock();
        let len = state.slots.len();
        let now = Instant::now();

        for offset in 0..len {
            let idx = (state.cursor + offset) % len;
            let slot = &mut state.slots[idx];

            if !slot.entry.health.healthy {
                let cooled = match (self.unhealthy_cooldown, slot.unhealthy_since) {
                    (Some(cooldown), Some(since)) => now.duration_since(since) >= cooldown,
                    _ => false,
                };
                if !cooled {
                    continue;
                }
                info!(model = %slot.entry.name, "Cooldown elapsed, re-admitting model to rotation");
                slot.entry.health.healthy = true;
                slot.entry.health.status_message = Some("re-admitted after cooldown".into());
                slot.entry.health.last_changed_secs = unix_now();
                slot.unhealthy_since = None;
            }

            let name = slot.entry.name.clone();
            state.cursor = (idx + 1) % len;
            return Ok(name);
        }

        warn!(pool_size = len, "No healthy model left in the pool");
        Err(RegistryError::PoolExhausted { pool_size: len })
    }

    /// Mark a model healthy (`ok = true`) or unhealthy. Idempotent.
    pub fn report_health(&self, name: &str, ok: bool) {
        let mut state = self.lock();
        let Some(slot) = state.slots.iter_mut().find(|s| s.entry.name == name) else {
            warn!(model = %name, "Health report for model outside the pool ignored");
            return;
        };

        let health = &mut slot.entry.health;
        if !ok {
            health.failure_count += 1;
        }
        if health.healthy == ok {
            return;
        }

        health.healthy = ok;
        health.last_changed_secs = unix_now();
        if ok {
            health.status_message = None;
            slot.unhealthy_since = None;
            info!(model = %name, "Model restored to healthy");
        } else {
            health.status_message = Some("call failed".into());
            slot.unhealthy_since = Some(Instant::now());
            warn!(model = %name, "Model marked unhealthy");
        }
    }

    /// Record a successful call's latency.
    pub fn record_latency(&self, name: &str, latency_ms: u64) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.iter_mut().find(|s| s.entry.name == name) {
            slot.entry.health.record_latency(latency_ms);
        }
    }

    /// Cursor back to the first model.
    pub fn reset_rotation(&self) {
        self.lock().cursor = 0;
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().slots.iter().any(|s| s.entry.name == name)
    }

    pub fn health(&self, name: &str) -> Result<ModelHealth, RegistryError> {
        self.lock()
            .slots
            .iter()
            .find(|s| s.entry.name == name)
            .map(|s| s.entry.health.clone())
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))
    }

    pub fn healthy_count(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|s| s.entry.health.healthy)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every entry, in pool order.
    pub fn snapshot(&self) -> Vec<ModelEntry> {
        self.lock().slots.iter().map(|s| s.entry.clone()).collect()
    }
}
