//! Audit trail for booking writes and lifecycle decisions.
//!
//! Events are fire-and-forget: a sink must never fail the booking call that emitted them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::booking::BookingId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Booking,
    Lifecycle,
    SideEffect,
    Persistence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Who acted, on which booking, under which correlation id. Shared by every event of one call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub booking_id: Option<BookingId>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        booking_id: Option<BookingId>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { booking_id, correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub booking_id: Option<BookingId>,
    pub correlation_id: String,
    pub actor: String,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            category,
            outcome,
            booking_id: context.booking_id.clone(),
            correlation_id: context.correlation_id.clone(),
            actor: context.actor.clone(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Attaches the booking once it exists; creation events start without one.
    pub fn for_booking(mut self, booking_id: &BookingId) -> Self {
        self.booking_id = Some(booking_id.clone());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn metadata_summary(&self) -> String {
        let pairs: Vec<String> =
            self.metadata.iter().map(|(key, value)| format!("{key}={value}")).collect();
        pairs.join(" ")
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Writes each event as a structured `tracing` record under the `audit` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let booking_id = event.booking_id.as_ref().map(|id| id.0.as_str()).unwrap_or("-");
        let metadata = event.metadata_summary();
        match event.outcome {
            AuditOutcome::Failed => tracing::warn!(
                target: "audit",
                event_name = %event.event_type,
                event_id = %event.event_id,
                correlation_id = %event.correlation_id,
                booking_id,
                actor = %event.actor,
                outcome = %event.outcome,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Success | AuditOutcome::Rejected => tracing::info!(
                target: "audit",
                event_name = %event.event_type,
                event_id = %event.event_id,
                correlation_id = %event.correlation_id,
                booking_id,
                actor = %event.actor,
                outcome = %event.outcome,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.with_events(|events| events.to_vec())
    }

    pub fn event_types(&self) -> Vec<String> {
        self.with_events(|events| events.iter().map(|event| event.event_type.clone()).collect())
    }

    pub fn events_for(&self, booking_id: &BookingId) -> Vec<AuditEvent> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|event| event.booking_id.as_ref() == Some(booking_id))
                .cloned()
                .collect()
        })
    }

    fn with_events<T>(&self, read: impl FnOnce(&[AuditEvent]) -> T) -> T {
        match self.events.lock() {
            Ok(events) => read(&events),
            Err(poisoned) => read(&poisoned.into_inner()),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(event);
    }
}
