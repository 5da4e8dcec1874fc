use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use crate::booking::lifecycle::{BookingActor, BookingStateMachine, TransitionRequest};
use crate::booking::ports::{
    BookingStore, ConversationStore, ExpectedState, IdentityProvider, InteractionLog,
    MessageDelivery,
};
use crate::booking::retry::RetryPolicy;
use crate::booking::{BookingEngine, BookingQuote, Clock, SystemClock};
use crate::domain::booking::{Booking, BookingId, BookingStatus};
use crate::domain::conversation::{Conversation, ConversationId};
use crate::domain::interaction::{InteractionRecord, InteractionType};
use crate::domain::service::Service;
use crate::domain::user::UserId;
use crate::errors::{BookingError, PersistenceError};
use crate::forms::submission::BookingSubmission;
use crate::forms::validator::{DeterministicSubmissionValidator, SubmissionValidator};

use super::pricing::{DeterministicPricingCalculator, PricingCalculator};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    Conversation,
    SeedMessage,
    Interaction,
}

impl SideEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::SeedMessage => "seed_message",
            Self::Interaction => "interaction",
        }
    }
}

/// A best-effort step that did not complete. The booking itself stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffectFailure {
    pub effect: SideEffect,
    pub cause: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingReceipt {
    pub booking: Booking,
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    pub side_effect_failures: Vec<SideEffectFailure>,
    /// True when an earlier call with the same submission already stored the booking.
    pub replayed: bool,
}

impl BookingReceipt {
    pub fn is_complete(&self) -> bool {
        self.side_effect_failures.is_empty()
    }
}

/// Storage and messaging collaborators, grouped so the orchestrator constructor stays small.
#[derive(Clone)]
pub struct BookingPorts {
    pub identity: Arc<dyn IdentityProvider>,
    pub bookings: Arc<dyn BookingStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageDelivery>,
    pub interactions: Arc<dyn InteractionLog>,
}

pub struct BookingOrchestrator<
    V = DeterministicSubmissionValidator,
    P = DeterministicPricingCalculator,
> {
    engine: BookingEngine<V, P>,
    ports: BookingPorts,
    state_machine: BookingStateMachine,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl<V, P> BookingOrchestrator<V, P> {
    pub fn new(engine: BookingEngine<V, P>, ports: BookingPorts) -> Self {
        Self {
            engine,
            ports,
            state_machine: BookingStateMachine,
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn engine(&self) -> &BookingEngine<V, P> {
        &self.engine
    }
}

impl<V, P> BookingOrchestrator<V, P>
where
    V: SubmissionValidator,
    P: PricingCalculator,
{
    pub async fn create_booking_for_current_user(
        &self,
        service: &Service,
        submission: &BookingSubmission,
    ) -> Result<BookingReceipt, BookingError> {
        let user = self.ports.identity.current_user().await;
        self.create_booking(user.as_ref().map(|user| &user.id), service, submission).await
    }

    /// Validates, prices and stores a booking, then opens the conversation, posts the seed
    /// message and records the interaction. Only the booking write can fail the call. A
    /// submission id the student already used is answered from the stored booking first.
    pub async fn create_booking(
        &self,
        buyer_id: Option<&UserId>,
        service: &Service,
        submission: &BookingSubmission,
    ) -> Result<BookingReceipt, BookingError> {
        let buyer_id = buyer_id
            .filter(|id| !id.0.trim().is_empty())
            .ok_or(BookingError::Unauthenticated)?;
        let correlation_id = new_correlation_id();
        let audit = AuditContext::new(None, &correlation_id, buyer_id.0.clone());

        // A replay answers from the stored booking even if the service changed since.
        if let Some(existing) = self.find_existing(buyer_id, submission, &correlation_id).await? {
            return self.replay(existing, service, submission, &audit).await;
        }

        if let Err(error) = self.engine.check_selection(service, submission) {
            self.reject(&audit, service, &error);
            return Err(error);
        }
        let now = self.clock.now();
        let quote = match self.engine.validate_and_price(service, submission, now) {
            Ok(quote) => quote,
            Err(error) => {
                self.reject(&audit, service, &error);
                return Err(error);
            }
        };

        let booking = self.build_booking(buyer_id, service, submission, quote, now);
        let store = &self.ports.bookings;
        let record = &booking;
        match self.retry.run("booking.insert", move || store.insert(record)).await {
            Ok(()) => {}
            Err(PersistenceError::Conflict(_)) => {
                // Lost a race with a concurrent call carrying the same submission id.
                let existing = self.find_existing(buyer_id, submission, &correlation_id).await?;
                return match existing {
                    Some(existing) => self.replay(existing, service, submission, &audit).await,
                    None => Err(self.persistence_failed(
                        &audit,
                        PersistenceError::Conflict(format!(
                            "submission {} conflicted but no booking was found",
                            submission.submission_id
                        )),
                    )),
                };
            }
            Err(error) => return Err(self.persistence_failed(&audit, error)),
        }

        tracing::info!(
            event_name = "booking.created",
            correlation_id = %correlation_id,
            booking_id = %booking.id,
            service_id = %service.id,
            final_price = %booking.final_price,
            is_rush = booking.is_rush,
            "booking created"
        );
        self.audit.emit(
            AuditEvent::new(
                &audit,
                "booking.created",
                AuditCategory::Booking,
                AuditOutcome::Success,
            )
            .for_booking(&booking.id)
            .with_metadata("service_id", service.id.0.clone())
            .with_metadata("final_price", booking.final_price.to_string()),
        );

        let mut failures = Vec::new();
        let conversation_id = match self.open_conversation(&booking).await {
            Ok((conversation, _created)) => {
                self.post_seed_message(&conversation, service, &booking, &audit, &mut failures)
                    .await;
                Some(conversation.id)
            }
            Err(error) => {
                let effect = SideEffect::Conversation;
                self.side_effect_failed(&audit, &booking, effect, &error, &mut failures);
                None
            }
        };

        let interaction = InteractionRecord {
            student_id: booking.student_id.clone(),
            consultant_id: booking.consultant_id.clone(),
            interaction_type: InteractionType::Booked,
            service_type: booking.service_type,
            occurred_at: booking.created_at,
        };
        if let Err(error) = self.ports.interactions.record_interaction(&interaction).await {
            let effect = SideEffect::Interaction;
            self.side_effect_failed(&audit, &booking, effect, &error, &mut failures);
        }

        Ok(BookingReceipt {
            booking,
            conversation_id,
            side_effect_failures: failures,
            replayed: false,
        })
    }

    /// Opens the conversation for a stored booking if it is missing, linking the booking when
    /// the thread has none yet.
    pub async fn ensure_conversation(
        &self,
        booking: &Booking,
    ) -> Result<ConversationId, BookingError> {
        let (conversation, _created) = self.open_conversation(booking).await?;
        Ok(conversation.id)
    }

    pub async fn transition_booking(
        &self,
        booking_id: &BookingId,
        to: BookingStatus,
        actor: BookingActor,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.load(booking_id).await?;
        let expected = ExpectedState::of(&booking);
        let audit =
            AuditContext::new(Some(booking.id.clone()), new_correlation_id(), actor.as_str());
        let mut request = TransitionRequest::new(to, actor, self.clock.now());
        request.reason = reason;

        let outcome = self.state_machine.apply_with_audit(
            &mut booking,
            request,
            self.audit.as_ref(),
            &audit,
        )?;
        self.store_update(&booking, expected, &audit).await?;

        tracing::info!(
            event_name = "booking.transition_applied",
            correlation_id = %audit.correlation_id,
            booking_id = %booking.id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            actor = outcome.actor.as_str(),
            "booking status changed"
        );
        Ok(booking)
    }

    pub async fn attach_review(
        &self,
        booking_id: &BookingId,
        actor: BookingActor,
        rating: u8,
        review_text: Option<String>,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.load(booking_id).await?;
        let expected = ExpectedState::of(&booking);
        let audit =
            AuditContext::new(Some(booking.id.clone()), new_correlation_id(), actor.as_str());

        booking.attach_review(actor, rating, review_text, self.clock.now())?;
        self.store_update(&booking, expected, &audit).await?;

        tracing::info!(
            event_name = "booking.review_attached",
            correlation_id = %audit.correlation_id,
            booking_id = %booking.id,
            rating,
            "review attached"
        );
        Ok(booking)
    }

    async fn load(&self, booking_id: &BookingId) -> Result<Booking, BookingError> {
        let store = &self.ports.bookings;
        self.retry
            .run("booking.find", move || store.find_by_id(booking_id))
            .await?
            .ok_or_else(|| BookingError::BookingNotFound(booking_id.clone()))
    }

    /// Writes the change only if nobody else moved the booking since it was loaded.
    async fn store_update(
        &self,
        booking: &Booking,
        expected: ExpectedState,
        audit: &AuditContext,
    ) -> Result<(), BookingError> {
        let store = &self.ports.bookings;
        match self.retry.run("booking.update", move || store.update(booking, expected)).await {
            Ok(()) => Ok(()),
            Err(PersistenceError::Conflict(cause)) => {
                tracing::warn!(
                    event_name = "booking.concurrent_update",
                    correlation_id = %audit.correlation_id,
                    booking_id = %booking.id,
                    expected_status = expected.status.as_str(),
                    cause = %cause,
                    "booking changed underneath the update"
                );
                self.audit.emit(
                    AuditEvent::new(
                        audit,
                        "booking.concurrent_update",
                        AuditCategory::Persistence,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("expected_status", expected.status.as_str()),
                );
                Err(BookingError::ConcurrentUpdate(booking.id.clone()))
            }
            Err(PersistenceError::NotFound(_)) => {
                Err(BookingError::BookingNotFound(booking.id.clone()))
            }
            Err(error) => Err(self.persistence_failed(audit, error)),
        }
    }

    async fn find_existing(
        &self,
        buyer_id: &UserId,
        submission: &BookingSubmission,
        correlation_id: &str,
    ) -> Result<Option<Booking>, BookingError> {
        let store = &self.ports.bookings;
        let submission_id = &submission.submission_id;
        self.retry
            .run("booking.find_by_submission", move || {
                store.find_by_submission(buyer_id, submission_id)
            })
            .await
            .map_err(|error| {
                tracing::error!(
                    event_name = "booking.persistence_failed",
                    correlation_id,
                    error = %error,
                    "idempotency lookup failed"
                );
                BookingError::PersistenceFailed(error)
            })
    }

    async fn replay(
        &self,
        existing: Booking,
        service: &Service,
        submission: &BookingSubmission,
        audit: &AuditContext,
    ) -> Result<BookingReceipt, BookingError> {
        if existing.submission_fingerprint != submission.fingerprint() {
            tracing::warn!(
                event_name = "booking.idempotency_conflict",
                correlation_id = %audit.correlation_id,
                booking_id = %existing.id,
                submission_id = %submission.submission_id,
                "submission id reused with a different payload"
            );
            self.audit.emit(
                AuditEvent::new(
                    audit,
                    "booking.idempotency_conflict",
                    AuditCategory::Booking,
                    AuditOutcome::Rejected,
                )
                .for_booking(&existing.id),
            );
            return Err(BookingError::IdempotencyConflict(submission.submission_id.clone()));
        }

        tracing::info!(
            event_name = "booking.replayed",
            correlation_id = %audit.correlation_id,
            booking_id = %existing.id,
            "returning stored booking for repeated submission"
        );
        self.audit.emit(
            AuditEvent::new(
                audit,
                "booking.replayed",
                AuditCategory::Booking,
                AuditOutcome::Success,
            )
            .for_booking(&existing.id),
        );

        let mut failures = Vec::new();
        let conversation_id = match self.open_conversation(&existing).await {
            Ok((conversation, created)) => {
                if created {
                    self.post_seed_message(&conversation, service, &existing, audit, &mut failures)
                        .await;
                }
                Some(conversation.id)
            }
            Err(error) => {
                let effect = SideEffect::Conversation;
                self.side_effect_failed(audit, &existing, effect, &error, &mut failures);
                None
            }
        };

        Ok(BookingReceipt {
            booking: existing,
            conversation_id,
            side_effect_failures: failures,
            replayed: true,
        })
    }

    async fn open_conversation(
        &self,
        booking: &Booking,
    ) -> Result<(Conversation, bool), PersistenceError> {
        let now = self.clock.now();
        let candidate = Conversation::new(
            ConversationId(Uuid::new_v4().to_string()),
            booking.student_id.clone(),
            booking.consultant_id.clone(),
            Some(booking.id.clone()),
            now,
        );
        let store = &self.ports.conversations;
        let candidate = &candidate;
        let (mut conversation, created) = self
            .retry
            .run("conversation.insert_or_fetch", move || store.insert_or_fetch(candidate))
            .await?;

        if !created && conversation.booking_id.is_none() {
            let (id, booking_id) = (&conversation.id, &booking.id);
            let linked = self
                .retry
                .run("conversation.attach_booking", move || {
                    store.attach_booking(id, booking_id, now)
                })
                .await?;
            if linked {
                conversation.attach_booking(&booking.id, now);
            }
        }
        Ok((conversation, created))
    }

    async fn post_seed_message(
        &self,
        conversation: &Conversation,
        service: &Service,
        booking: &Booking,
        audit: &AuditContext,
        failures: &mut Vec<SideEffectFailure>,
    ) {
        let content = seed_message(service, booking);
        if let Err(error) = self
            .ports
            .messages
            .append_message(&conversation.id, &booking.student_id, &content)
            .await
        {
            self.side_effect_failed(audit, booking, SideEffect::SeedMessage, &error, failures);
        }
    }

    fn build_booking(
        &self,
        buyer_id: &UserId,
        service: &Service,
        submission: &BookingSubmission,
        quote: BookingQuote,
        now: DateTime<Utc>,
    ) -> Booking {
        let BookingQuote { submission: normalized, pricing, currency, promised_delivery_at } =
            quote;
        Booking {
            id: BookingId(Uuid::new_v4().to_string()),
            submission_id: normalized.submission_id,
            submission_fingerprint: submission.fingerprint(),
            student_id: buyer_id.clone(),
            consultant_id: service.consultant_id.clone(),
            service_id: service.id.clone(),
            service_type: service.service_type,
            base_price: pricing.base_price,
            price_tier_index: normalized.price_tier_index,
            price_tier_description: pricing.price_tier_description,
            price_modifier: pricing.modifier,
            price_modifier_source: pricing.modifier_source,
            rush_multiplier: pricing.rush_multiplier,
            rush_hours: pricing.rush_hours,
            final_price: pricing.final_price,
            currency,
            is_rush: normalized.rush_hours.is_some(),
            scheduled_at: normalized.scheduled_time,
            promised_delivery_at,
            status: BookingStatus::Pending,
            details: normalized.details,
            special_instructions: normalized.special_instructions,
            created_at: now,
            updated_at: now,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            rating: None,
            review_text: None,
            reviewed_at: None,
        }
    }

    fn reject(&self, audit: &AuditContext, service: &Service, error: &BookingError) {
        tracing::info!(
            event_name = "booking.rejected",
            correlation_id = %audit.correlation_id,
            service_id = %service.id,
            error_class = error.error_class(),
            field_errors = error.field_errors().len(),
            "booking request rejected"
        );
        self.audit.emit(
            AuditEvent::new(
                audit,
                "booking.rejected",
                AuditCategory::Booking,
                AuditOutcome::Rejected,
            )
            .with_metadata("service_id", service.id.0.clone())
            .with_metadata("error_class", error.error_class()),
        );
    }

    fn persistence_failed(&self, audit: &AuditContext, error: PersistenceError) -> BookingError {
        tracing::error!(
            event_name = "booking.persistence_failed",
            correlation_id = %audit.correlation_id,
            error = %error,
            "booking write failed"
        );
        self.audit.emit(
            AuditEvent::new(
                audit,
                "booking.persistence_failed",
                AuditCategory::Persistence,
                AuditOutcome::Failed,
            )
            .with_metadata("error", error.to_string()),
        );
        BookingError::PersistenceFailed(error)
    }

    fn side_effect_failed(
        &self,
        audit: &AuditContext,
        booking: &Booking,
        effect: SideEffect,
        error: &PersistenceError,
        failures: &mut Vec<SideEffectFailure>,
    ) {
        tracing::warn!(
            event_name = "booking.side_effect_failed",
            correlation_id = %audit.correlation_id,
            booking_id = %booking.id,
            effect = effect.as_str(),
            error = %error,
            "booking side effect failed"
        );
        self.audit.emit(
            AuditEvent::new(
                audit,
                "booking.side_effect_failed",
                AuditCategory::SideEffect,
                AuditOutcome::Failed,
            )
            .for_booking(&booking.id)
            .with_metadata("effect", effect.as_str())
            .with_metadata("error", error.to_string()),
        );
        failures.push(SideEffectFailure { effect, cause: error.to_string() });
    }
}

fn new_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

/// First message in the thread, written on the student's behalf.
pub fn seed_message(service: &Service, booking: &Booking) -> String {
    let mut summary = format!(
        "New booking: {} ({}) for {} {}. Delivery by {} UTC",
        service.title,
        booking.price_tier_description,
        booking.final_price,
        booking.currency,
        booking.promised_delivery_at.format("%Y-%m-%d %H:%M"),
    );
    if let Some(hours) = booking.rush_hours {
        summary.push_str(&format!(", rush {hours}h"));
    }
    summary.push('.');

    let body = match booking.special_instructions.as_deref().map(str::trim) {
        Some(instructions) if !instructions.is_empty() => instructions.to_owned(),
        _ => format!(
            "Hi! I just booked your {} service and I'm looking forward to working with you.",
            service.service_type.display_name()
        ),
    };
    format!("{summary}\n\n{body}")
}
