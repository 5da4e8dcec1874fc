use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::booking::BookingDetails;
use crate::domain::service::ServiceId;

/// Answer keys with fixed meaning for the built-in form shapes. Consultant-defined fields use
/// their own schema id.
pub mod keys {
    pub const PRICE_TIER_INDEX: &str = "priceTierIndex";
    pub const RUSH_HOURS: &str = "rushHours";
    pub const SCHEDULED_TIME: &str = "scheduledTime";
    pub const SERVICE_ID: &str = "serviceId";

    pub const ESSAY_CATEGORY: &str = "essayCategory";
    pub const ESSAY_PROMPT: &str = "essayPrompt";
    pub const ESSAY_TEXT: &str = "essayText";
    pub const GOOGLE_DOC_LINK: &str = "googleDocLink";
    pub const UPLOADED_FILE: &str = "uploadedFile";
    pub const ESSAY_CONTENT: &str = "essayContent";
    pub const WORD_COUNT: &str = "wordCount";
    pub const IMPROVEMENT_GOALS: &str = "improvementGoals";

    pub const INTERVIEW_TYPE: &str = "interviewType";
    pub const INTERVIEW_SCHOOL: &str = "interviewSchool";
    pub const EXAMPLE_QUESTIONS: &str = "exampleQuestions";
    pub const PREPARATION_FOCUS: &str = "preparationFocus";

    pub const CURRENT_SCORES: &str = "currentScores";
    pub const TARGET_SCORES: &str = "targetScores";
    pub const WEAK_AREAS: &str = "weakAreas";
    pub const PREFERRED_TIMES: &str = "preferredTimes";
    pub const SESSION_FREQUENCY: &str = "sessionFrequency";

    pub const SPECIAL_INSTRUCTIONS: &str = "specialInstructions";
}

/// Client-generated token identifying one press of the submit button.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionId(pub String);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl UploadedFile {
    pub fn extension(&self) -> Option<String> {
        self.name.rsplit_once('.').map(|(_, extension)| extension.to_ascii_lowercase())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sat: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<u8>,
}

impl TestScores {
    pub fn is_empty(&self) -> bool {
        self.sat.is_none() && self.act.is_none()
    }
}

/// One answer as it arrives from the booking form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Number(#[serde(with = "rust_decimal::serde::float")] Decimal),
    Text(String),
    Choices(Vec<String>),
    File(UploadedFile),
    Scores(TestScores),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn choices<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Choices(values.into_iter().map(Into::into).collect())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(value) => value.trim().is_empty(),
            Self::Choices(values) => values.iter().all(|value| value.trim().is_empty()),
            Self::Scores(scores) => scores.is_empty(),
            Self::File(file) => file.name.trim().is_empty(),
            Self::Flag(_) | Self::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.trim()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => value.trim().parse::<Decimal>().ok(),
            _ => None,
        }
    }

    /// Single values are accepted where a list is expected.
    pub fn as_choices(&self) -> Option<Vec<String>> {
        match self {
            Self::Choices(values) => Some(
                values
                    .iter()
                    .map(|value| value.trim().to_owned())
                    .filter(|value| !value.is_empty())
                    .collect(),
            ),
            Self::Text(value) if !value.trim().is_empty() => Some(vec![value.trim().to_owned()]),
            _ => None,
        }
    }

    pub fn matches(&self, expected: &str) -> bool {
        let expected = expected.trim();
        match self {
            Self::Text(value) => value.trim() == expected,
            Self::Number(value) => expected.parse::<Decimal>().is_ok_and(|other| other == *value),
            Self::Flag(value) => expected.parse::<bool>().is_ok_and(|other| other == *value),
            Self::Choices(values) => values.iter().any(|value| value.trim() == expected),
            Self::File(_) | Self::Scores(_) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingSubmission {
    pub submission_id: SubmissionId,
    pub service_id: ServiceId,
    pub price_tier_index: usize,
    #[serde(default)]
    pub is_rush: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rush_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answers: BTreeMap<String, AnswerValue>,
}

impl BookingSubmission {
    pub fn new(
        submission_id: impl Into<String>,
        service_id: ServiceId,
        price_tier_index: usize,
    ) -> Self {
        Self {
            submission_id: SubmissionId(submission_id.into()),
            service_id,
            price_tier_index,
            is_rush: false,
            rush_hours: None,
            scheduled_time: None,
            answers: BTreeMap::new(),
        }
    }

    pub fn with_answer(mut self, key: impl Into<String>, value: AnswerValue) -> Self {
        self.answers.insert(key.into(), value);
        self
    }

    pub fn with_rush(mut self, hours: u32) -> Self {
        self.is_rush = true;
        self.rush_hours = Some(hours);
        self
    }

    pub fn with_scheduled_time(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_time = Some(at);
        self
    }

    /// Present and non-blank answer for `key`.
    pub fn answer(&self, key: &str) -> Option<&AnswerValue> {
        self.answers.get(key).filter(|value| !value.is_blank())
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.answer(key).and_then(AnswerValue::as_text).map(str::to_owned)
    }

    /// Stable hash of the whole payload, used to tell a replay from a conflicting reuse of the
    /// same submission id.
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::to_vec(self).unwrap_or_else(|_| format!("{self:?}").into_bytes());
        let digest = Sha256::digest(&payload);
        digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

/// A submission that passed validation, reduced to typed booking data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSubmission {
    pub submission_id: SubmissionId,
    pub service_id: ServiceId,
    pub price_tier_index: usize,
    /// Set only when rush was requested with an offered turnaround.
    pub rush_hours: Option<u32>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub details: BookingDetails,
    pub special_instructions: Option<String>,
    pub fingerprint: String,
}

impl NormalizedSubmission {
    pub fn is_rush(&self) -> bool {
        self.rush_hours.is_some()
    }
}
