//! Collaborators the booking engine talks to. Implementations live in `peerbook-db` or in the
//! embedding application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::booking::{Booking, BookingId, BookingStatus};
use crate::domain::conversation::{Conversation, ConversationId, Message};
use crate::domain::interaction::InteractionRecord;
use crate::domain::service::{Service, ServiceId};
use crate::domain::user::{CurrentUser, UserId};
use crate::errors::PersistenceError;
use crate::forms::submission::SubmissionId;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<CurrentUser>;
}

/// Identity fixed at construction, for tools and tests that act on behalf of a known user.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity(pub Option<CurrentUser>);

impl StaticIdentity {
    pub fn student(id: impl Into<String>) -> Self {
        Self(Some(CurrentUser { id: UserId(id.into()), role: "student".to_owned() }))
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<CurrentUser> {
        self.0.clone()
    }
}

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn find(&self, id: &ServiceId) -> Result<Option<Service>, PersistenceError>;
    async fn save(&self, service: &Service) -> Result<(), PersistenceError>;
}

/// The part of a stored booking an update was computed from. A write only applies while the
/// row still holds these values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpectedState {
    pub status: BookingStatus,
    pub rating: Option<u8>,
}

impl ExpectedState {
    pub fn of(booking: &Booking) -> Self {
        Self { status: booking.status, rating: booking.rating }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.status == booking.status && self.rating == booking.rating
    }
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Fails with [`PersistenceError::Conflict`] when the student already has a booking for
    /// the same submission id.
    async fn insert(&self, booking: &Booking) -> Result<(), PersistenceError>;
    /// Compare-and-set of the lifecycle and review columns. Fails with
    /// [`PersistenceError::Conflict`] when the stored row no longer matches `expected` and
    /// with [`PersistenceError::NotFound`] when there is no such booking.
    async fn update(
        &self,
        booking: &Booking,
        expected: ExpectedState,
    ) -> Result<(), PersistenceError>;
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, PersistenceError>;
    async fn find_by_submission(
        &self,
        student_id: &UserId,
        submission_id: &SubmissionId,
    ) -> Result<Option<Booking>, PersistenceError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Atomically returns the existing conversation for the candidate's (student, consultant)
    /// pair, or stores the candidate. The flag is true when the candidate was stored.
    async fn insert_or_fetch(
        &self,
        candidate: &Conversation,
    ) -> Result<(Conversation, bool), PersistenceError>;
    async fn find(&self, id: &ConversationId) -> Result<Option<Conversation>, PersistenceError>;
    /// Links the booking if the conversation has none yet and touches no other field. Returns
    /// whether the link was written; an existing link is never replaced.
    async fn attach_booking(
        &self,
        id: &ConversationId,
        booking_id: &BookingId,
        at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError>;
}

#[async_trait]
pub trait MessageDelivery: Send + Sync {
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message, PersistenceError>;
}

#[async_trait]
pub trait InteractionLog: Send + Sync {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), PersistenceError>;
}
