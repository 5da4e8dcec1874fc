use thiserror::Error;

use crate::booking::lifecycle::BookingActor;
use crate::domain::booking::{BookingId, BookingStatus};
use crate::domain::service::ServiceId;
use crate::forms::submission::SubmissionId;
use crate::forms::validator::FieldError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid booking transition from {} to {}", from.as_str(), to.as_str())]
    InvalidBookingTransition { from: BookingStatus, to: BookingStatus },
    #[error("{} may not move a booking from {} to {}", actor.as_str(), from.as_str(), to.as_str())]
    TransitionNotPermitted { actor: BookingActor, from: BookingStatus, to: BookingStatus },
    #[error("review rejected: {0}")]
    ReviewRejected(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Storage failures as seen by the engine. Adapters translate their own errors into this.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage conflict: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

impl PersistenceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BookingError {
    #[error("no signed-in user")]
    Unauthenticated,
    #[error("submission failed validation with {} field error(s)", .0.len())]
    ValidationFailed(Vec<FieldError>),
    #[error("price tier {index} does not exist; service has {available}")]
    InvalidPriceTier { index: usize, available: usize },
    #[error("rush selection {requested:?} is not offered; available turnarounds {offered:?}")]
    InvalidRushSelection { requested: Option<u32>, offered: Vec<u32> },
    #[error("submission targets service {submitted}, not {expected}")]
    ServiceMismatch { expected: ServiceId, submitted: ServiceId },
    #[error("submission {0} was already used with a different payload")]
    IdempotencyConflict(SubmissionId),
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),
    #[error("booking {0} was changed by another request; reload and retry")]
    ConcurrentUpdate(BookingId),
    #[error("booking could not be persisted: {0}")]
    PersistenceFailed(#[from] PersistenceError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl BookingError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::ValidationFailed(_) => "validation_failed",
            Self::InvalidPriceTier { .. } => "invalid_price_tier",
            Self::InvalidRushSelection { .. } => "invalid_rush_selection",
            Self::ServiceMismatch { .. } => "service_mismatch",
            Self::IdempotencyConflict(_) => "idempotency_conflict",
            Self::BookingNotFound(_) => "booking_not_found",
            Self::ConcurrentUpdate(_) => "concurrent_update",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::Domain(_) => "domain",
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::ValidationFailed(errors) => errors,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<PersistenceError> for ApplicationError {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "Please sign in to book a service.",
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The booking could not be found.",
            Self::Conflict { .. } => {
                "This booking request was already submitted with different details."
            }
            Self::ServiceUnavailable { .. } => "Couldn't complete booking, try again.",
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Unauthorized { correlation_id, .. }
            | Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

const UNASSIGNED: &str = "unassigned";

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = UNASSIGNED.to_owned();
        match value {
            ApplicationError::Domain(_) => {
                Self::BadRequest { message: "domain validation failed".to_owned(), correlation_id }
            }
            ApplicationError::Booking(error) => match error {
                BookingError::Unauthenticated => {
                    Self::Unauthorized { message: error.to_string(), correlation_id }
                }
                BookingError::BookingNotFound(_) => {
                    Self::NotFound { message: error.to_string(), correlation_id }
                }
                BookingError::IdempotencyConflict(_) | BookingError::ConcurrentUpdate(_) => {
                    Self::Conflict { message: error.to_string(), correlation_id }
                }
                BookingError::PersistenceFailed(_) => Self::ServiceUnavailable {
                    message: "booking storage unavailable".to_owned(),
                    correlation_id,
                },
                BookingError::ValidationFailed(_)
                | BookingError::InvalidPriceTier { .. }
                | BookingError::InvalidRushSelection { .. }
                | BookingError::ServiceMismatch { .. }
                | BookingError::Domain(_) => {
                    Self::BadRequest { message: error.to_string(), correlation_id }
                }
            },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
