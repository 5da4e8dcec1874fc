use std::collections::HashSet;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::forms::schema::{FieldOption, FormFieldSchema};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormType {
    EssayReview,
    InterviewPrep,
    Tutoring,
    Custom,
}

impl FormType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EssayReview => "essay_review",
            Self::InterviewPrep => "interview_prep",
            Self::Tutoring => "tutoring",
            Self::Custom => "custom",
        }
    }
}

/// Intake schema of one service, one shape per form type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "form_type", rename_all = "snake_case")]
pub enum ServiceFormConfiguration {
    EssayReview(EssayReviewForm),
    InterviewPrep(InterviewPrepForm),
    Tutoring(TutoringForm),
    Custom(CustomForm),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EssayReviewForm {
    pub essay_categories: EssayCategories,
    pub word_count_limits: WordCountLimits,
    pub prompt_field: ToggleField,
    pub improvement_goals: GoalList,
    pub submission_methods: SubmissionMethods,
    #[serde(default)]
    pub custom_fields: Vec<FormFieldSchema>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssayCategories {
    pub enabled: bool,
    pub required: bool,
    pub options: Vec<FieldOption>,
}

impl EssayCategories {
    pub fn option(&self, value: &str) -> Option<&FieldOption> {
        self.options.iter().find(|option| option.value == value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCountLimits {
    /// When enabled the matching tier drives pricing; otherwise the table is display-only.
    pub enabled: bool,
    pub tiers: Vec<WordCountTier>,
}

impl WordCountLimits {
    pub fn tier_for(&self, word_count: u32) -> Option<&WordCountTier> {
        self.tiers.iter().find(|tier| tier.contains(word_count))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCountTier {
    pub min: u32,
    pub max: u32,
    pub label: String,
    pub price_modifier: Decimal,
}

impl WordCountTier {
    pub fn contains(&self, word_count: u32) -> bool {
        (self.min..=self.max).contains(&word_count)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleField {
    pub enabled: bool,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl ToggleField {
    pub fn is_required(&self) -> bool {
        self.enabled && self.required
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalList {
    pub enabled: bool,
    pub options: Vec<String>,
    pub allow_custom: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMethods {
    pub text_paste: bool,
    pub file_upload: bool,
    pub google_doc_link: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterviewPrepForm {
    pub interview_types: InterviewTypes,
    pub example_questions: ExampleQuestions,
    pub school_field: ToggleField,
    #[serde(default)]
    pub custom_fields: Vec<FormFieldSchema>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewTypes {
    pub enabled: bool,
    pub options: Vec<FieldOption>,
    pub allow_custom: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleQuestions {
    pub enabled: bool,
    pub required: bool,
    pub max_questions: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TutoringForm {
    pub current_scores: CurrentScores,
    pub target_scores: ToggleField,
    pub weak_areas: WeakAreas,
    pub session_preferences: SessionPreferences,
    #[serde(default)]
    pub custom_fields: Vec<FormFieldSchema>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Sat,
    Act,
    Both,
}

impl ScoreType {
    pub fn accepts_sat(&self) -> bool {
        matches!(self, Self::Sat | Self::Both)
    }

    pub fn accepts_act(&self) -> bool {
        matches!(self, Self::Act | Self::Both)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentScores {
    pub enabled: bool,
    pub required: bool,
    pub score_type: ScoreType,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakAreas {
    pub enabled: bool,
    pub options: Vec<String>,
    pub allow_multiple: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPreferences {
    pub enabled: bool,
    pub time_slots: bool,
    pub frequency: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomForm {
    pub fields: Vec<FormFieldSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_button_text: Option<String>,
}

impl ServiceFormConfiguration {
    pub fn form_type(&self) -> FormType {
        match self {
            Self::EssayReview(_) => FormType::EssayReview,
            Self::InterviewPrep(_) => FormType::InterviewPrep,
            Self::Tutoring(_) => FormType::Tutoring,
            Self::Custom(_) => FormType::Custom,
        }
    }

    /// Consultant-defined questions, evaluated by the generic field rules.
    pub fn custom_fields(&self) -> &[FormFieldSchema] {
        match self {
            Self::EssayReview(form) => &form.custom_fields,
            Self::InterviewPrep(form) => &form.custom_fields,
            Self::Tutoring(form) => &form.custom_fields,
            Self::Custom(form) => &form.fields,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        validate_fields(self.custom_fields())?;

        match self {
            Self::EssayReview(form) => validate_essay_form(form),
            Self::InterviewPrep(form) => {
                if form.example_questions.enabled && form.example_questions.max_questions == 0 {
                    return Err(DomainError::InvariantViolation(
                        "example_questions.max_questions must be greater than zero".into(),
                    ));
                }
                Ok(())
            }
            Self::Tutoring(form) => {
                if form.weak_areas.enabled && form.weak_areas.options.is_empty() {
                    return Err(DomainError::InvariantViolation(
                        "weak_areas is enabled without any options".into(),
                    ));
                }
                Ok(())
            }
            Self::Custom(_) => Ok(()),
        }
    }
}

fn validate_essay_form(form: &EssayReviewForm) -> Result<(), DomainError> {
    let methods = form.submission_methods;
    if !(methods.text_paste || methods.file_upload || methods.google_doc_link) {
        return Err(DomainError::InvariantViolation(
            "essay form must allow at least one submission method".into(),
        ));
    }

    if form.essay_categories.enabled && form.essay_categories.options.is_empty() {
        return Err(DomainError::InvariantViolation(
            "essay categories are enabled without any options".into(),
        ));
    }

    if let Some(option) = form
        .essay_categories
        .options
        .iter()
        .find(|option| option.price_modifier.is_some_and(|modifier| modifier <= Decimal::ZERO))
    {
        return Err(DomainError::InvariantViolation(format!(
            "essay category `{}` has a non-positive price modifier",
            option.value
        )));
    }

    let mut tiers: Vec<&WordCountTier> = form.word_count_limits.tiers.iter().collect();
    tiers.sort_by_key(|tier| tier.min);
    for tier in &tiers {
        if tier.min > tier.max {
            return Err(DomainError::InvariantViolation(format!(
                "word count tier `{}` has min above max",
                tier.label
            )));
        }
        if tier.price_modifier <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(format!(
                "word count tier `{}` has a non-positive price modifier",
                tier.label
            )));
        }
    }
    for pair in tiers.windows(2) {
        if pair[1].min <= pair[0].max {
            return Err(DomainError::InvariantViolation(format!(
                "word count tiers `{}` and `{}` overlap",
                pair[0].label, pair[1].label
            )));
        }
    }

    Ok(())
}

fn validate_fields(fields: &[FormFieldSchema]) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.id.trim().is_empty() {
            return Err(DomainError::InvariantViolation("form field id must not be empty".into()));
        }
        if !seen.insert(field.id.as_str()) {
            return Err(DomainError::InvariantViolation(format!(
                "duplicate form field id `{}`",
                field.id
            )));
        }
        if (field.field_type.is_single_choice() || field.field_type.is_multi_choice())
            && field.options.is_empty()
            && field.field_type != crate::forms::schema::FieldType::Checkbox
        {
            return Err(DomainError::InvariantViolation(format!(
                "choice field `{}` declares no options",
                field.id
            )));
        }
        if let Some(pattern) = field.validation.as_ref().and_then(|rules| rules.pattern.as_deref())
        {
            Regex::new(pattern).map_err(|error| {
                DomainError::InvariantViolation(format!(
                    "field `{}` has an invalid pattern: {error}",
                    field.id
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ServiceFormConfiguration, WordCountTier};
    use crate::domain::service::ServiceType;
    use crate::forms::defaults::default_form_configuration;
    use crate::forms::schema::{FieldType, FieldValidation, FormFieldSchema};

    fn essay_form() -> super::EssayReviewForm {
        match default_form_configuration(ServiceType::EssayReview) {
            ServiceFormConfiguration::EssayReview(form) => form,
            other => panic!("expected essay form, got {:?}", other.form_type()),
        }
    }

    #[test]
    fn word_count_tier_lookup_is_inclusive() {
        let form = essay_form();
        let limits = &form.word_count_limits;

        assert_eq!(limits.tier_for(250).map(|tier| tier.label.as_str()), Some("Short Essay"));
        assert_eq!(limits.tier_for(251).map(|tier| tier.label.as_str()), Some("Medium Essay"));
        assert_eq!(limits.tier_for(650).map(|tier| tier.label.as_str()), Some("Full Essay"));
        assert_eq!(limits.tier_for(5000), None);
    }

    #[test]
    fn overlapping_word_count_tiers_are_rejected() {
        let mut form = essay_form();
        form.word_count_limits.tiers.push(WordCountTier {
            min: 600,
            max: 700,
            label: "Overlap".to_owned(),
            price_modifier: Decimal::ONE,
        });

        let error = ServiceFormConfiguration::EssayReview(form)
            .validate()
            .expect_err("overlap must be rejected");
        assert!(error.to_string().contains("overlap"));
    }

    #[test]
    fn duplicate_custom_field_ids_are_rejected() {
        let mut form = essay_form();
        form.custom_fields = vec![
            FormFieldSchema::new("school", FieldType::Text, "School"),
            FormFieldSchema::new("school", FieldType::Text, "School again"),
        ];

        assert!(ServiceFormConfiguration::EssayReview(form).validate().is_err());
    }

    #[test]
    fn invalid_pattern_is_rejected_at_configuration_time() {
        let config = ServiceFormConfiguration::Custom(super::CustomForm {
            fields: vec![FormFieldSchema::new("code", FieldType::Text, "Code").with_validation(
                FieldValidation { pattern: Some("([a-z".to_owned()), ..FieldValidation::default() },
            )],
            submit_button_text: None,
        });

        let error = config.validate().expect_err("bad regex");
        assert!(error.to_string().contains("invalid pattern"));
    }

    #[test]
    fn essay_form_requires_a_submission_channel() {
        let mut form = essay_form();
        form.submission_methods.text_paste = false;
        form.submission_methods.file_upload = false;
        form.submission_methods.google_doc_link = false;

        assert!(ServiceFormConfiguration::EssayReview(form).validate().is_err());
    }

    #[test]
    fn configuration_serializes_with_form_type_tag() {
        let config = default_form_configuration(ServiceType::InterviewPrep);
        let json = serde_json::to_value(&config).expect("serialize");

        assert_eq!(json["form_type"], "interview_prep");
        let back: ServiceFormConfiguration = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, config);
    }
}
