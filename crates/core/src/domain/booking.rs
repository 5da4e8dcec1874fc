use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::booking::lifecycle::{BookingActor, BookingStateMachine};
use crate::domain::service::{ServiceId, ServiceType};
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::forms::submission::{AnswerValue, SubmissionId, TestScores, UploadedFile};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Refunded)
    }
}

/// Where the non-rush price multiplier of a booking came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceModifierSource {
    None,
    Category { value: String },
    WordCountTier { label: String },
}

/// Shape-specific answers kept with a booking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BookingDetails {
    Essay(EssayDetails),
    Interview(InterviewDetails),
    Tutoring(TutoringDetails),
    Generic(GenericDetails),
}

impl BookingDetails {
    pub fn custom_fields(&self) -> &BTreeMap<String, AnswerValue> {
        match self {
            Self::Essay(details) => &details.custom_fields,
            Self::Interview(details) => &details.custom_fields,
            Self::Tutoring(details) => &details.custom_fields,
            Self::Generic(details) => &details.answers,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EssayDetails {
    pub category: Option<String>,
    pub prompt: Option<String>,
    pub content: EssayContent,
    pub word_count: u32,
    pub word_count_tier: Option<String>,
    #[serde(default)]
    pub improvement_goals: Vec<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, AnswerValue>,
}

/// Any subset of the three channels may be filled; the first non-empty one in
/// text, link, upload order is the one shown to the consultant.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssayContent {
    pub text: Option<String>,
    pub google_doc_link: Option<String>,
    pub uploaded_file: Option<UploadedFile>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EssaySource<'a> {
    Text(&'a str),
    GoogleDoc(&'a str),
    Upload(&'a UploadedFile),
}

impl EssayContent {
    pub fn primary(&self) -> Option<EssaySource<'_>> {
        if let Some(text) = self.text.as_deref().filter(|text| !text.trim().is_empty()) {
            return Some(EssaySource::Text(text));
        }
        if let Some(link) = self.google_doc_link.as_deref().filter(|link| !link.trim().is_empty())
        {
            return Some(EssaySource::GoogleDoc(link));
        }
        self.uploaded_file.as_ref().map(EssaySource::Upload)
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterviewDetails {
    pub interview_type: Option<String>,
    pub school: Option<String>,
    #[serde(default)]
    pub example_questions: Vec<String>,
    pub preparation_focus: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, AnswerValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TutoringDetails {
    pub current_scores: TestScores,
    pub target_scores: TestScores,
    #[serde(default)]
    pub weak_areas: Vec<String>,
    #[serde(default)]
    pub preferred_times: Vec<String>,
    pub session_frequency: Option<String>,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, AnswerValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericDetails {
    #[serde(default)]
    pub answers: BTreeMap<String, AnswerValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub submission_id: SubmissionId,
    pub submission_fingerprint: String,
    pub student_id: UserId,
    pub consultant_id: UserId,
    pub service_id: ServiceId,
    pub service_type: ServiceType,
    pub base_price: Decimal,
    pub price_tier_index: usize,
    pub price_tier_description: String,
    pub price_modifier: Decimal,
    pub price_modifier_source: PriceModifierSource,
    pub rush_multiplier: Decimal,
    pub rush_hours: Option<u32>,
    pub final_price: Decimal,
    pub currency: String,
    pub is_rush: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub promised_delivery_at: DateTime<Utc>,
    pub status: BookingStatus,
    pub details: BookingDetails,
    pub special_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub rating: Option<u8>,
    pub review_text: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        BookingStateMachine::can_transition(self.status, next)
    }

    pub fn transition_to(
        &mut self,
        next: BookingStatus,
        actor: BookingActor,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidBookingTransition { from: self.status, to: next });
        }
        if !BookingStateMachine::can_trigger(actor, self.status, next) {
            return Err(DomainError::TransitionNotPermitted { actor, from: self.status, to: next });
        }

        match next {
            BookingStatus::Completed => self.completed_at = Some(at),
            BookingStatus::Cancelled | BookingStatus::Refunded => {
                self.cancelled_at = Some(at);
                self.cancellation_reason = reason;
            }
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::InProgress => {}
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }

    pub fn attach_review(
        &mut self,
        actor: BookingActor,
        rating: u8,
        review_text: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != BookingStatus::Completed {
            return Err(DomainError::ReviewRejected(format!(
                "booking {} is {}, reviews require a completed booking",
                self.id,
                self.status.as_str()
            )));
        }
        if actor != BookingActor::Student {
            return Err(DomainError::ReviewRejected("only the student may review".into()));
        }
        if self.rating.is_some() {
            return Err(DomainError::ReviewRejected(format!(
                "booking {} already has a review",
                self.id
            )));
        }
        if !(1..=5).contains(&rating) {
            return Err(DomainError::ReviewRejected(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }

        self.rating = Some(rating);
        self.review_text = review_text.filter(|text| !text.trim().is_empty());
        self.reviewed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        Booking, BookingDetails, BookingId, BookingStatus, EssayContent, EssaySource,
        GenericDetails, PriceModifierSource,
    };
    use crate::booking::lifecycle::BookingActor;
    use crate::domain::service::{ServiceId, ServiceType};
    use crate::domain::user::UserId;
    use crate::errors::DomainError;
    use crate::forms::submission::{SubmissionId, UploadedFile};

    pub(crate) fn booking(status: BookingStatus) -> Booking {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Booking {
            id: BookingId("bk-1".to_owned()),
            submission_id: SubmissionId("sub-1".to_owned()),
            submission_fingerprint: "fp".to_owned(),
            student_id: UserId("student-1".to_owned()),
            consultant_id: UserId("consultant-1".to_owned()),
            service_id: ServiceId("svc-1".to_owned()),
            service_type: ServiceType::Other,
            base_price: Decimal::new(100, 0),
            price_tier_index: 0,
            price_tier_description: "Standard".to_owned(),
            price_modifier: Decimal::ONE,
            price_modifier_source: PriceModifierSource::None,
            rush_multiplier: Decimal::ONE,
            rush_hours: None,
            final_price: Decimal::new(10000, 2),
            currency: "USD".to_owned(),
            is_rush: false,
            scheduled_at: None,
            promised_delivery_at: created_at,
            status,
            details: BookingDetails::Generic(GenericDetails { answers: BTreeMap::new() }),
            special_instructions: None,
            created_at,
            updated_at: created_at,
            completed_at: None,
            cancelled_at: None,
            cancellation_reason: None,
            rating: None,
            review_text: None,
            reviewed_at: None,
        }
    }

    #[test]
    fn completing_a_booking_stamps_completion_time() {
        let at = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        let mut booking = booking(BookingStatus::InProgress);

        booking
            .transition_to(BookingStatus::Completed, BookingActor::Consultant, None, at)
            .expect("in_progress -> completed");

        assert_eq!(booking.status, BookingStatus::Completed);
        assert_eq!(booking.completed_at, Some(at));
        assert_eq!(booking.updated_at, at);
    }

    #[test]
    fn cancellation_records_reason() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut booking = booking(BookingStatus::Pending);

        booking
            .transition_to(
                BookingStatus::Cancelled,
                BookingActor::Student,
                Some("schedule changed".to_owned()),
                at,
            )
            .expect("pending -> cancelled");

        assert_eq!(booking.cancelled_at, Some(at));
        assert_eq!(booking.cancellation_reason.as_deref(), Some("schedule changed"));
    }

    #[test]
    fn completed_booking_cannot_be_cancelled() {
        let mut booking = booking(BookingStatus::Completed);
        let error = booking
            .transition_to(BookingStatus::Cancelled, BookingActor::Student, None, Utc::now())
            .expect_err("completed is terminal");

        assert!(matches!(
            error,
            DomainError::InvalidBookingTransition {
                from: BookingStatus::Completed,
                to: BookingStatus::Cancelled
            }
        ));
    }

    #[test]
    fn student_cannot_confirm_their_own_booking() {
        let mut booking = booking(BookingStatus::Pending);
        let error = booking
            .transition_to(BookingStatus::Confirmed, BookingActor::Student, None, Utc::now())
            .expect_err("only the consultant confirms");

        assert!(matches!(error, DomainError::TransitionNotPermitted { .. }));
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[test]
    fn review_requires_completion_and_is_accepted_once() {
        let mut pending = booking(BookingStatus::Confirmed);
        assert!(pending.attach_review(BookingActor::Student, 5, None, Utc::now()).is_err());

        let mut completed = booking(BookingStatus::Completed);
        completed
            .attach_review(BookingActor::Student, 4, Some("Very helpful".to_owned()), Utc::now())
            .expect("first review");
        assert_eq!(completed.rating, Some(4));

        let error = completed
            .attach_review(BookingActor::Student, 5, None, Utc::now())
            .expect_err("second review");
        assert!(matches!(error, DomainError::ReviewRejected(_)));
    }

    #[test]
    fn review_rating_must_be_in_range() {
        let mut completed = booking(BookingStatus::Completed);
        assert!(completed.attach_review(BookingActor::Student, 0, None, Utc::now()).is_err());
        assert!(completed.attach_review(BookingActor::Student, 6, None, Utc::now()).is_err());
        assert!(completed.attach_review(BookingActor::Consultant, 5, None, Utc::now()).is_err());
    }

    #[test]
    fn first_non_empty_essay_channel_wins() {
        let file =
            UploadedFile { name: "essay.docx".to_owned(), size_bytes: 10, content_type: None };
        let content = EssayContent {
            text: Some("  ".to_owned()),
            google_doc_link: Some("https://docs.google.com/document/d/abc".to_owned()),
            uploaded_file: Some(file.clone()),
        };

        assert_eq!(
            content.primary(),
            Some(EssaySource::GoogleDoc("https://docs.google.com/document/d/abc"))
        );

        let upload_only =
            EssayContent { uploaded_file: Some(file.clone()), ..EssayContent::default() };
        assert_eq!(upload_only.primary(), Some(EssaySource::Upload(&file)));
        assert!(EssayContent::default().is_empty());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::InProgress,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
            BookingStatus::Refunded,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
    }
}
