//! Alert sinks.
//!
//! The pipeline never decides how an alert is delivered. It hands each
//! [`AlertEvent`] to an [`AlertSink`]; the host picks the sink.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::models::{AlertEvent, AlertKind};

pub trait AlertSink: Send + Sync {
    fn emit(&self, event: AlertEvent);
}

/// Writes every alert as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, event: AlertEvent) {
        let treatment = event.treatment_id.as_deref().unwrap_or("-");
        let entity = event.entity_id.as_deref().unwrap_or("-");
        match event.kind {
            AlertKind::SafeDateReached => info!(
                kind = %event.kind,
                treatment_id = treatment,
                entity_id = entity,
                "{}",
                event.message
            ),
            _ => warn!(
                kind = %event.kind,
                treatment_id = treatment,
                entity_id = entity,
                "{}",
                event.message
            ),
        }
    }
}

/// Buffers alerts until the host drains them.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    events: Mutex<Vec<AlertEvent>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered alert, oldest first.
    pub fn drain(&self) -> Vec<AlertEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn snapshot(&self) -> Vec<AlertEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AlertEvent>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AlertSink for MemoryAlertSink {
    fn emit(&self, event: AlertEvent) {
        self.lock().push(event);
    }
}

/// Fans one alert out to several sinks.
pub struct FanoutAlertSink<'a> {
    sinks: Vec<&'a dyn AlertSink>,
}

impl<'a> FanoutAlertSink<'a> {
    pub fn new(sinks: Vec<&'a dyn AlertSink>) -> Self {
        Self { sinks }
    }
}

impl AlertSink for FanoutAlertSink<'_> {
    fn emit(&self, event: AlertEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
