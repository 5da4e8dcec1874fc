use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::booking::{
    BookingDetails, EssayContent, EssayDetails, GenericDetails, InterviewDetails, TutoringDetails,
};
use crate::domain::service::Service;
use crate::forms::configuration::{
    EssayReviewForm, InterviewPrepForm, ScoreType, ServiceFormConfiguration, TutoringForm,
};
use crate::forms::defaults::default_form_configuration;
use crate::forms::schema::{FieldType, FormFieldSchema};
use crate::forms::submission::{
    keys, AnswerValue, BookingSubmission, NormalizedSubmission, TestScores, UploadedFile,
};

pub const SAT_RANGE: (u16, u16) = (400, 1600);
pub const ACT_RANGE: (u8, u8) = (1, 36);

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorReason {
    MissingRequired,
    OutOfRange,
    InvalidEnumValue,
    NoContentProvided,
    InvalidFormat,
    FileRejected,
}

impl FieldErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRequired => "missing_required",
            Self::OutOfRange => "out_of_range",
            Self::InvalidEnumValue => "invalid_enum_value",
            Self::NoContentProvided => "no_content_provided",
            Self::InvalidFormat => "invalid_format",
            Self::FileRejected => "file_rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub reason: FieldErrorReason,
    pub message: String,
}

impl FieldError {
    pub fn new(
        field: impl Into<String>,
        reason: FieldErrorReason,
        message: impl Into<String>,
    ) -> Self {
        Self { field: field.into(), reason, message: message.into() }
    }
}

pub trait SubmissionValidator: Send + Sync {
    fn validate(
        &self,
        service: &Service,
        submission: &BookingSubmission,
    ) -> Result<NormalizedSubmission, Vec<FieldError>>;
}

#[derive(Default)]
pub struct DeterministicSubmissionValidator;

impl SubmissionValidator for DeterministicSubmissionValidator {
    fn validate(
        &self,
        service: &Service,
        submission: &BookingSubmission,
    ) -> Result<NormalizedSubmission, Vec<FieldError>> {
        validate_submission(service, submission)
    }
}

/// Checks every rule in one pass and reports all violations together.
pub fn validate_submission(
    service: &Service,
    submission: &BookingSubmission,
) -> Result<NormalizedSubmission, Vec<FieldError>> {
    let mut checks = Checks { submission, errors: Vec::new() };

    if submission.service_id != service.id {
        checks.push(
            keys::SERVICE_ID,
            FieldErrorReason::InvalidEnumValue,
            format!("submission targets service {}, not {}", submission.service_id, service.id),
        );
    }
    let rush_hours = checks.selection(service);

    let custom_fields = checks.custom_fields(service.form_configuration.custom_fields());
    // A custom form never waives the checks fixed by the service type.
    let fixed_form;
    let rules = match &service.form_configuration {
        ServiceFormConfiguration::Custom(_) => {
            fixed_form = default_form_configuration(service.service_type);
            &fixed_form
        }
        configured => configured,
    };
    let details = match rules {
        ServiceFormConfiguration::EssayReview(form) => {
            BookingDetails::Essay(checks.essay(form, custom_fields))
        }
        ServiceFormConfiguration::InterviewPrep(form) => {
            BookingDetails::Interview(checks.interview(form, custom_fields))
        }
        ServiceFormConfiguration::Tutoring(form) => {
            BookingDetails::Tutoring(checks.tutoring(form, custom_fields))
        }
        ServiceFormConfiguration::Custom(_) => {
            BookingDetails::Generic(GenericDetails { answers: custom_fields })
        }
    };

    if !checks.errors.is_empty() {
        return Err(checks.errors);
    }

    Ok(NormalizedSubmission {
        submission_id: submission.submission_id.clone(),
        service_id: submission.service_id.clone(),
        price_tier_index: submission.price_tier_index,
        rush_hours,
        scheduled_time: submission.scheduled_time,
        details,
        special_instructions: submission.text(keys::SPECIAL_INSTRUCTIONS),
        fingerprint: submission.fingerprint(),
    })
}

struct Checks<'a> {
    submission: &'a BookingSubmission,
    errors: Vec<FieldError>,
}

impl<'a> Checks<'a> {
    fn push(&mut self, field: &str, reason: FieldErrorReason, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, reason, message));
    }

    fn missing(&mut self, field: &str, label: &str) {
        self.push(field, FieldErrorReason::MissingRequired, format!("{label} is required"));
    }

    fn answer(&self, key: &str) -> Option<&'a AnswerValue> {
        self.submission.answer(key)
    }

    /// Returns the rush turnaround to price with, `None` for a standard booking.
    fn selection(&mut self, service: &Service) -> Option<u32> {
        let index = self.submission.price_tier_index;
        if service.tier(index).is_none() {
            self.push(
                keys::PRICE_TIER_INDEX,
                FieldErrorReason::OutOfRange,
                format!(
                    "price tier {index} does not exist; the service has {} tier(s)",
                    service.price_tiers.len()
                ),
            );
        }

        if !self.submission.is_rush {
            return None;
        }
        match self.submission.rush_hours {
            None => {
                self.missing(keys::RUSH_HOURS, "Rush turnaround");
                None
            }
            Some(hours) if service.rush_multiplier(hours).is_none() => {
                let message = if service.rush_available {
                    format!("{hours}h is not an offered rush turnaround")
                } else {
                    "this service does not offer rush delivery".to_owned()
                };
                self.push(keys::RUSH_HOURS, FieldErrorReason::InvalidEnumValue, message);
                None
            }
            Some(hours) => Some(hours),
        }
    }

    fn text(&mut self, key: &str) -> Option<String> {
        match self.answer(key)? {
            AnswerValue::Text(value) => Some(value.trim().to_owned()),
            _ => {
                self.push(key, FieldErrorReason::InvalidFormat, "expected a text answer");
                None
            }
        }
    }

    fn choices(&mut self, key: &str) -> Vec<String> {
        match self.answer(key) {
            None => Vec::new(),
            Some(value) => match value.as_choices() {
                Some(choices) => choices,
                None => {
                    self.push(key, FieldErrorReason::InvalidFormat, "expected a list of values");
                    Vec::new()
                }
            },
        }
    }

    fn scores(&mut self, key: &str, label: &str, score_type: ScoreType) -> TestScores {
        let scores = match self.answer(key) {
            None => return TestScores::default(),
            Some(AnswerValue::Scores(scores)) => *scores,
            Some(_) => {
                self.push(key, FieldErrorReason::InvalidFormat, "expected SAT and/or ACT scores");
                return TestScores::default();
            }
        };

        if let Some(sat) = scores.sat {
            if !score_type.accepts_sat() {
                self.push(key, FieldErrorReason::InvalidEnumValue, "SAT scores are not accepted");
            } else if !(SAT_RANGE.0..=SAT_RANGE.1).contains(&sat) {
                self.push(
                    key,
                    FieldErrorReason::OutOfRange,
                    format!("{label} SAT score must be {}-{}", SAT_RANGE.0, SAT_RANGE.1),
                );
            }
        }
        if let Some(act) = scores.act {
            if !score_type.accepts_act() {
                self.push(key, FieldErrorReason::InvalidEnumValue, "ACT scores are not accepted");
            } else if !(ACT_RANGE.0..=ACT_RANGE.1).contains(&act) {
                self.push(
                    key,
                    FieldErrorReason::OutOfRange,
                    format!("{label} ACT score must be {}-{}", ACT_RANGE.0, ACT_RANGE.1),
                );
            }
        }
        scores
    }

    fn essay(
        &mut self,
        form: &EssayReviewForm,
        custom_fields: BTreeMap<String, AnswerValue>,
    ) -> EssayDetails {
        let categories = &form.essay_categories;
        let category = if categories.enabled {
            match self.text(keys::ESSAY_CATEGORY) {
                None if categories.required && self.answer(keys::ESSAY_CATEGORY).is_none() => {
                    self.missing(keys::ESSAY_CATEGORY, "Essay category");
                    None
                }
                Some(value) if categories.option(&value).is_none() => {
                    self.push(
                        keys::ESSAY_CATEGORY,
                        FieldErrorReason::InvalidEnumValue,
                        format!("`{value}` is not an offered essay category"),
                    );
                    None
                }
                other => other,
            }
        } else {
            None
        };

        let prompt = if form.prompt_field.enabled {
            let prompt = self.text(keys::ESSAY_PROMPT);
            if prompt.is_none()
                && form.prompt_field.required
                && self.answer(keys::ESSAY_PROMPT).is_none()
            {
                self.missing(keys::ESSAY_PROMPT, "Essay prompt");
            }
            prompt
        } else {
            None
        };

        let content = self.essay_content(form);

        let mut word_count = 0;
        let mut word_count_tier = None;
        match self.answer(keys::WORD_COUNT) {
            None => self.missing(keys::WORD_COUNT, "Word count"),
            Some(value) => match value.as_number() {
                None => self.push(
                    keys::WORD_COUNT,
                    FieldErrorReason::InvalidFormat,
                    "word count must be a number",
                ),
                Some(number) => match positive_whole(number) {
                    None => self.push(
                        keys::WORD_COUNT,
                        FieldErrorReason::OutOfRange,
                        "word count must be a positive whole number",
                    ),
                    Some(count) => {
                        word_count = count;
                        if form.word_count_limits.enabled {
                            match form.word_count_limits.tier_for(count) {
                                Some(tier) => word_count_tier = Some(tier.label.clone()),
                                None => self.push(
                                    keys::WORD_COUNT,
                                    FieldErrorReason::OutOfRange,
                                    format!("{count} words is outside every offered length tier"),
                                ),
                            }
                        }
                    }
                },
            },
        }

        let improvement_goals = if form.improvement_goals.enabled {
            let goals = self.choices(keys::IMPROVEMENT_GOALS);
            if !form.improvement_goals.allow_custom {
                if let Some(unknown) =
                    goals.iter().find(|goal| !form.improvement_goals.options.contains(goal))
                {
                    self.push(
                        keys::IMPROVEMENT_GOALS,
                        FieldErrorReason::InvalidEnumValue,
                        format!("`{unknown}` is not an offered improvement goal"),
                    );
                }
            }
            goals
        } else {
            Vec::new()
        };

        EssayDetails {
            category,
            prompt,
            content,
            word_count,
            word_count_tier,
            improvement_goals,
            custom_fields,
        }
    }

    fn essay_content(&mut self, form: &EssayReviewForm) -> EssayContent {
        let methods = form.submission_methods;
        let mut content = EssayContent::default();
        let mut provided = false;

        if self.answer(keys::ESSAY_TEXT).is_some() {
            provided = true;
            if !methods.text_paste {
                self.push(
                    keys::ESSAY_TEXT,
                    FieldErrorReason::InvalidEnumValue,
                    "pasting essay text is not enabled",
                );
            } else {
                content.text = self.text(keys::ESSAY_TEXT);
            }
        }

        if self.answer(keys::GOOGLE_DOC_LINK).is_some() {
            provided = true;
            if !methods.google_doc_link {
                self.push(
                    keys::GOOGLE_DOC_LINK,
                    FieldErrorReason::InvalidEnumValue,
                    "Google Doc links are not enabled",
                );
            } else if let Some(link) = self.text(keys::GOOGLE_DOC_LINK) {
                if is_web_url(&link) {
                    content.google_doc_link = Some(link);
                } else {
                    self.push(
                        keys::GOOGLE_DOC_LINK,
                        FieldErrorReason::InvalidFormat,
                        "document link must be an http(s) URL",
                    );
                }
            }
        }

        if let Some(value) = self.answer(keys::UPLOADED_FILE) {
            provided = true;
            match value {
                _ if !methods.file_upload => self.push(
                    keys::UPLOADED_FILE,
                    FieldErrorReason::InvalidEnumValue,
                    "file uploads are not enabled",
                ),
                AnswerValue::File(file) => content.uploaded_file = Some(file.clone()),
                _ => self.push(
                    keys::UPLOADED_FILE,
                    FieldErrorReason::InvalidFormat,
                    "expected an uploaded file",
                ),
            }
        }

        if !provided {
            self.push(
                keys::ESSAY_CONTENT,
                FieldErrorReason::NoContentProvided,
                "provide the essay as text, a Google Doc link, or an upload",
            );
        }
        content
    }

    fn interview(
        &mut self,
        form: &InterviewPrepForm,
        custom_fields: BTreeMap<String, AnswerValue>,
    ) -> InterviewDetails {
        let types = &form.interview_types;
        let interview_type = if types.enabled {
            match self.text(keys::INTERVIEW_TYPE) {
                None if self.answer(keys::INTERVIEW_TYPE).is_none() => {
                    self.missing(keys::INTERVIEW_TYPE, "Interview type");
                    None
                }
                Some(value)
                    if !types.allow_custom
                        && !types.options.iter().any(|option| option.value == value) =>
                {
                    self.push(
                        keys::INTERVIEW_TYPE,
                        FieldErrorReason::InvalidEnumValue,
                        format!("`{value}` is not an offered interview type"),
                    );
                    None
                }
                other => other,
            }
        } else {
            None
        };

        let school = if form.school_field.enabled {
            let school = self.text(keys::INTERVIEW_SCHOOL);
            if school.is_none()
                && form.school_field.required
                && self.answer(keys::INTERVIEW_SCHOOL).is_none()
            {
                self.missing(keys::INTERVIEW_SCHOOL, "School or organization");
            }
            school
        } else {
            None
        };

        let example_questions = if form.example_questions.enabled {
            let questions = self.choices(keys::EXAMPLE_QUESTIONS);
            if questions.is_empty()
                && form.example_questions.required
                && self.answer(keys::EXAMPLE_QUESTIONS).is_none()
            {
                self.missing(keys::EXAMPLE_QUESTIONS, "Example questions");
            }
            if questions.len() > form.example_questions.max_questions {
                self.push(
                    keys::EXAMPLE_QUESTIONS,
                    FieldErrorReason::OutOfRange,
                    format!(
                        "at most {} example questions are accepted",
                        form.example_questions.max_questions
                    ),
                );
            }
            questions
        } else {
            Vec::new()
        };

        InterviewDetails {
            interview_type,
            school,
            example_questions,
            preparation_focus: self.text(keys::PREPARATION_FOCUS),
            custom_fields,
        }
    }

    fn tutoring(
        &mut self,
        form: &TutoringForm,
        custom_fields: BTreeMap<String, AnswerValue>,
    ) -> TutoringDetails {
        let score_type = form.current_scores.score_type;

        let current_scores = if form.current_scores.enabled {
            if form.current_scores.required && self.answer(keys::CURRENT_SCORES).is_none() {
                self.missing(keys::CURRENT_SCORES, "Current scores");
            }
            self.scores(keys::CURRENT_SCORES, "current", score_type)
        } else {
            TestScores::default()
        };

        let target_scores = if form.target_scores.enabled {
            if form.target_scores.required && self.answer(keys::TARGET_SCORES).is_none() {
                self.missing(keys::TARGET_SCORES, "Target scores");
            }
            self.scores(keys::TARGET_SCORES, "target", score_type)
        } else {
            TestScores::default()
        };

        let weak_areas = if form.weak_areas.enabled {
            let areas = self.choices(keys::WEAK_AREAS);
            let options = &form.weak_areas.options;
            if let Some(unknown) = areas.iter().find(|area| !options.contains(area)) {
                self.push(
                    keys::WEAK_AREAS,
                    FieldErrorReason::InvalidEnumValue,
                    format!("`{unknown}` is not an offered focus area"),
                );
            }
            if !form.weak_areas.allow_multiple && areas.len() > 1 {
                self.push(
                    keys::WEAK_AREAS,
                    FieldErrorReason::OutOfRange,
                    "only one focus area may be selected",
                );
            }
            areas
        } else {
            Vec::new()
        };

        let preferences = form.session_preferences;
        let preferred_times = if preferences.enabled && preferences.time_slots {
            self.choices(keys::PREFERRED_TIMES)
        } else {
            Vec::new()
        };
        let session_frequency = if preferences.enabled && preferences.frequency {
            self.text(keys::SESSION_FREQUENCY)
        } else {
            None
        };

        TutoringDetails {
            current_scores,
            target_scores,
            weak_areas,
            preferred_times,
            session_frequency,
            custom_fields,
        }
    }

    /// Consultant-defined questions. Fields whose condition does not hold are skipped and left
    /// out of the stored answers.
    fn custom_fields(&mut self, fields: &[FormFieldSchema]) -> BTreeMap<String, AnswerValue> {
        let mut accepted = BTreeMap::new();

        for field in fields {
            if let Some(condition) = &field.conditional {
                let shown = self
                    .answer(&condition.field_id)
                    .is_some_and(|value| value.matches(&condition.equals));
                if !shown {
                    continue;
                }
            }

            let Some(value) = self.answer(&field.id) else {
                if field.is_required() {
                    self.missing(&field.id, &field.label);
                }
                continue;
            };

            if field.field_type == FieldType::Checkbox && field.options.is_empty() {
                match value {
                    AnswerValue::Flag(false) if field.is_required() => {
                        self.missing(&field.id, &field.label)
                    }
                    AnswerValue::Flag(_) => {}
                    _ => self.push(
                        &field.id,
                        FieldErrorReason::InvalidFormat,
                        "expected true or false",
                    ),
                }
                accepted.insert(field.id.clone(), value.clone());
                continue;
            }

            let before = self.errors.len();
            self.check_field(field, value);
            if self.errors.len() == before {
                accepted.insert(field.id.clone(), value.clone());
            }
        }

        accepted
    }

    fn check_field(&mut self, field: &FormFieldSchema, value: &AnswerValue) {
        let rules = field.validation.clone().unwrap_or_default();
        let id = field.id.as_str();

        match field.field_type {
            FieldType::Number | FieldType::Wordcount => {
                let Some(number) = value.as_number() else {
                    let message = format!("{} must be a number", field.label);
                    self.push(id, FieldErrorReason::InvalidFormat, message);
                    return;
                };
                if rules.min.is_some_and(|min| number < min)
                    || rules.max.is_some_and(|max| number > max)
                {
                    let message = range_message(&field.label, rules.min, rules.max);
                    self.push(id, FieldErrorReason::OutOfRange, message);
                }
            }
            FieldType::Select | FieldType::Radio | FieldType::Category => {
                let Some(choice) = value.as_text() else {
                    self.push(id, FieldErrorReason::InvalidFormat, "expected a single choice");
                    return;
                };
                if field.option(choice).is_none() {
                    self.push(
                        id,
                        FieldErrorReason::InvalidEnumValue,
                        format!("`{choice}` is not an option of {}", field.label),
                    );
                }
            }
            FieldType::Multiselect | FieldType::Checkbox => {
                let Some(choices) = value.as_choices() else {
                    self.push(id, FieldErrorReason::InvalidFormat, "expected a list of choices");
                    return;
                };
                if let Some(unknown) = choices.iter().find(|choice| field.option(choice).is_none())
                {
                    self.push(
                        id,
                        FieldErrorReason::InvalidEnumValue,
                        format!("`{unknown}` is not an option of {}", field.label),
                    );
                }
            }
            FieldType::File => {
                let AnswerValue::File(file) = value else {
                    self.push(id, FieldErrorReason::InvalidFormat, "expected an uploaded file");
                    return;
                };
                if let Some(message) = reject_file(file, &rules.file_types, rules.max_file_size) {
                    self.push(id, FieldErrorReason::FileRejected, message);
                }
            }
            FieldType::Date
            | FieldType::Time
            | FieldType::Url
            | FieldType::Text
            | FieldType::Textarea => {
                let Some(text) = value.as_text() else {
                    let message = format!("{} must be text", field.label);
                    self.push(id, FieldErrorReason::InvalidFormat, message);
                    return;
                };
                let well_formed = match field.field_type {
                    FieldType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok(),
                    FieldType::Time => NaiveTime::parse_from_str(text, "%H:%M").is_ok(),
                    FieldType::Url => is_web_url(text),
                    _ => true,
                };
                if !well_formed {
                    self.push(
                        id,
                        FieldErrorReason::InvalidFormat,
                        format!("{} is not a valid {}", field.label, field.field_type.as_str()),
                    );
                    return;
                }

                let length = text.chars().count();
                if rules.min_length.is_some_and(|min| length < min)
                    || rules.max_length.is_some_and(|max| length > max)
                {
                    self.push(
                        id,
                        FieldErrorReason::OutOfRange,
                        length_message(&field.label, rules.min_length, rules.max_length),
                    );
                }

                if let Some(pattern) = rules.pattern.as_deref() {
                    if Regex::new(pattern).is_ok_and(|regex| !regex.is_match(text)) {
                        let message = rules
                            .pattern_message
                            .clone()
                            .unwrap_or_else(|| format!("{} has an unexpected format", field.label));
                        self.push(id, FieldErrorReason::InvalidFormat, message);
                    }
                }
            }
        }
    }
}

fn positive_whole(number: Decimal) -> Option<u32> {
    if number <= Decimal::ZERO || !number.fract().is_zero() {
        return None;
    }
    number.to_u32()
}

fn is_web_url(value: &str) -> bool {
    url::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
        .unwrap_or(false)
}

fn reject_file(
    file: &UploadedFile,
    file_types: &[String],
    max_file_size: Option<u64>,
) -> Option<String> {
    if !file_types.is_empty() {
        let extension = file.extension().unwrap_or_default();
        let accepted = file_types
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&extension));
        if !accepted {
            return Some(format!("{} must be one of: {}", file.name, file_types.join(", ")));
        }
    }
    if let Some(limit) = max_file_size {
        if file.size_bytes > limit.saturating_mul(BYTES_PER_MB) {
            return Some(format!("{} is larger than {limit} MB", file.name));
        }
    }
    None
}

fn range_message(label: &str, min: Option<Decimal>, max: Option<Decimal>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{label} must be between {min} and {max}"),
        (Some(min), None) => format!("{label} must be at least {min}"),
        (None, Some(max)) => format!("{label} must be at most {max}"),
        (None, None) => format!("{label} is out of range"),
    }
}

fn length_message(label: &str, min: Option<usize>, max: Option<usize>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{label} must be {min} to {max} characters"),
        (Some(min), None) => format!("{label} must be at least {min} characters"),
        (None, Some(max)) => format!("{label} must be at most {max} characters"),
        (None, None) => format!("{label} has an invalid length"),
    }
}
