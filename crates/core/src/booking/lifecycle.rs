use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::booking::{Booking, BookingStatus};
use crate::errors::DomainError;

/// Who is asking for a status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingActor {
    Student,
    Consultant,
    /// The platform itself, e.g. refunds.
    System,
}

impl BookingActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Consultant => "consultant",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "consultant" => Some(Self::Consultant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub to: BookingStatus,
    pub actor: BookingActor,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl TransitionRequest {
    pub fn new(to: BookingStatus, actor: BookingActor, at: DateTime<Utc>) -> Self {
        Self { to, actor, reason: None, at }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub actor: BookingActor,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BookingStateMachine;

impl BookingStateMachine {
    pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
        use BookingStatus::{Cancelled, Completed, Confirmed, InProgress, Pending, Refunded};

        matches!(
            (from, to),
            (Pending, Confirmed)
                | (Confirmed, InProgress)
                | (InProgress, Completed)
                | (Pending | Confirmed | InProgress, Cancelled | Refunded)
        )
    }

    /// Whether `actor` may request `from -> to`. Does not check the edge itself.
    pub fn can_trigger(actor: BookingActor, _from: BookingStatus, to: BookingStatus) -> bool {
        use BookingStatus::{Cancelled, Completed, Confirmed, InProgress, Refunded};

        match to {
            Confirmed | InProgress | Completed => actor == BookingActor::Consultant,
            Cancelled => matches!(actor, BookingActor::Student | BookingActor::Consultant),
            Refunded => actor == BookingActor::System,
            BookingStatus::Pending => false,
        }
    }

    pub fn apply(
        &self,
        booking: &mut Booking,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, DomainError> {
        let from = booking.status;
        let TransitionRequest { to, actor, reason, at } = request;
        booking.transition_to(to, actor, reason, at)?;
        Ok(TransitionOutcome { from, to, actor })
    }

    pub fn apply_with_audit<S>(
        &self,
        booking: &mut Booking,
        request: TransitionRequest,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let (from, to, actor) = (booking.status, request.to, request.actor);
        let result = self.apply(booking, request);
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::new(
                    audit,
                    "booking.transition_applied",
                    AuditCategory::Lifecycle,
                    AuditOutcome::Success,
                )
                .for_booking(&booking.id)
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str())
                .with_metadata("actor", outcome.actor.as_str()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    audit,
                    "booking.transition_rejected",
                    AuditCategory::Lifecycle,
                    AuditOutcome::Rejected,
                )
                .for_booking(&booking.id)
                .with_metadata("from", from.as_str())
                .with_metadata("to", to.as_str())
                .with_metadata("actor", actor.as_str())
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}
