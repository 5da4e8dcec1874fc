use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use peerbook_core::booking::ports::{
    BookingStore, ConversationStore, ExpectedState, InteractionLog, MessageDelivery,
    ServiceCatalog,
};
use peerbook_core::domain::booking::{Booking, BookingId};
use peerbook_core::domain::conversation::{Conversation, ConversationId, Message, MessageId};
use peerbook_core::domain::interaction::InteractionRecord;
use peerbook_core::domain::service::{Service, ServiceId};
use peerbook_core::domain::user::UserId;
use peerbook_core::errors::PersistenceError;
use peerbook_core::forms::SubmissionId;

#[derive(Default)]
pub struct InMemoryServiceCatalog {
    services: RwLock<HashMap<String, Service>>,
}

#[async_trait]
impl ServiceCatalog for InMemoryServiceCatalog {
    async fn find(&self, id: &ServiceId) -> Result<Option<Service>, PersistenceError> {
        let services = self.services.read().await;
        Ok(services.get(&id.0).cloned())
    }

    async fn save(&self, service: &Service) -> Result<(), PersistenceError> {
        let mut services = self.services.write().await;
        services.insert(service.id.0.clone(), service.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<String, Booking>>,
}

impl InMemoryBookingStore {
    pub async fn len(&self) -> usize {
        self.bookings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bookings.read().await.is_empty()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), PersistenceError> {
        let mut bookings = self.bookings.write().await;
        if bookings.contains_key(&booking.id.0) {
            return Err(PersistenceError::Conflict(format!("booking {} exists", booking.id)));
        }
        if bookings.values().any(|existing| {
            existing.student_id == booking.student_id
                && existing.submission_id == booking.submission_id
        }) {
            return Err(PersistenceError::Conflict(format!(
                "submission {} already booked by {}",
                booking.submission_id, booking.student_id
            )));
        }
        bookings.insert(booking.id.0.clone(), booking.clone());
        Ok(())
    }

    async fn update(
        &self,
        booking: &Booking,
        expected: ExpectedState,
    ) -> Result<(), PersistenceError> {
        let mut bookings = self.bookings.write().await;
        let existing = bookings
            .get_mut(&booking.id.0)
            .ok_or_else(|| PersistenceError::NotFound(format!("booking {}", booking.id)))?;
        if !expected.matches(existing) {
            return Err(PersistenceError::Conflict(format!(
                "booking {} is {}, expected {}",
                booking.id,
                existing.status.as_str(),
                expected.status.as_str()
            )));
        }
        *existing = booking.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, PersistenceError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id.0).cloned())
    }

    async fn find_by_submission(
        &self,
        student_id: &UserId,
        submission_id: &SubmissionId,
    ) -> Result<Option<Booking>, PersistenceError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .find(|booking| {
                &booking.student_id == student_id && &booking.submission_id == submission_id
            })
            .cloned())
    }
}

#[derive(Default)]
struct ConversationState {
    conversations: HashMap<String, Conversation>,
    messages: Vec<Message>,
}

/// Conversation and message storage behind one lock, so the pair upsert and message append
/// see a consistent view.
#[derive(Default)]
pub struct InMemoryConversationStore {
    state: RwLock<ConversationState>,
}

impl InMemoryConversationStore {
    pub async fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let state = self.state.read().await;
        state
            .messages
            .iter()
            .filter(|message| &message.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.read().await.conversations.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn insert_or_fetch(
        &self,
        candidate: &Conversation,
    ) -> Result<(Conversation, bool), PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.conversations.values().find(|conversation| {
            conversation.student_id == candidate.student_id
                && conversation.consultant_id == candidate.consultant_id
        }) {
            return Ok((existing.clone(), false));
        }
        state.conversations.insert(candidate.id.0.clone(), candidate.clone());
        Ok((candidate.clone(), true))
    }

    async fn find(&self, id: &ConversationId) -> Result<Option<Conversation>, PersistenceError> {
        let state = self.state.read().await;
        Ok(state.conversations.get(&id.0).cloned())
    }

    async fn attach_booking(
        &self,
        id: &ConversationId,
        booking_id: &BookingId,
        at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let mut state = self.state.write().await;
        let existing = state
            .conversations
            .get_mut(&id.0)
            .ok_or_else(|| PersistenceError::NotFound(format!("conversation {id}")))?;
        Ok(existing.attach_booking(booking_id, at))
    }
}

#[async_trait]
impl MessageDelivery for InMemoryConversationStore {
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message, PersistenceError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(&conversation_id.0)
            .ok_or_else(|| PersistenceError::NotFound(format!("conversation {conversation_id}")))?;
        let sender = conversation.participant(sender_id).ok_or_else(|| {
            PersistenceError::Conflict(format!(
                "{sender_id} is not a participant of conversation {conversation_id}"
            ))
        })?;

        let message = Message {
            id: MessageId(Uuid::new_v4().to_string()),
            conversation_id: conversation_id.clone(),
            sender_id: sender_id.clone(),
            content: content.to_owned(),
            is_read: false,
            created_at: Utc::now(),
        };
        conversation.record_message(sender, content, message.created_at);
        state.messages.push(message.clone());
        Ok(message)
    }
}

#[derive(Default)]
pub struct InMemoryInteractionLog {
    records: RwLock<Vec<InteractionRecord>>,
}

impl InMemoryInteractionLog {
    pub async fn records(&self) -> Vec<InteractionRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl InteractionLog for InMemoryInteractionLog {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), PersistenceError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
