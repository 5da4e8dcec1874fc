//! Starting intake schemas handed to a consultant when a new service is created.

use rust_decimal::Decimal;

use crate::domain::service::ServiceType;
use crate::forms::configuration::{
    CurrentScores, CustomForm, EssayCategories, EssayReviewForm, ExampleQuestions, GoalList,
    InterviewPrepForm, InterviewTypes, ScoreType, ServiceFormConfiguration, SessionPreferences,
    SubmissionMethods, ToggleField, TutoringForm, WeakAreas, WordCountLimits, WordCountTier,
};
use crate::forms::schema::FieldOption;

pub fn default_form_configuration(service_type: ServiceType) -> ServiceFormConfiguration {
    match service_type {
        ServiceType::EssayReview => ServiceFormConfiguration::EssayReview(essay_review_form()),
        ServiceType::InterviewPrep => {
            ServiceFormConfiguration::InterviewPrep(interview_prep_form())
        }
        ServiceType::SatTutoring | ServiceType::ActTutoring | ServiceType::TestPrep => {
            ServiceFormConfiguration::Tutoring(tutoring_form(service_type))
        }
        ServiceType::ApplicationStrategy | ServiceType::Other => {
            ServiceFormConfiguration::Custom(CustomForm::default())
        }
    }
}

pub fn essay_categories() -> Vec<FieldOption> {
    vec![
        FieldOption::new("common_app_personal", "Common App Personal Statement (650 words)")
            .with_price_modifier(Decimal::new(12, 1)),
        FieldOption::new("supplemental_short", "Supplemental Essay (100-250 words)")
            .with_price_modifier(Decimal::new(8, 1)),
        FieldOption::new("supplemental_medium", "Supplemental Essay (250-500 words)")
            .with_price_modifier(Decimal::ONE),
        FieldOption::new("scholarship", "Scholarship Essay")
            .with_price_modifier(Decimal::new(11, 1)),
        FieldOption::new("grad_school", "Graduate School Statement")
            .with_price_modifier(Decimal::new(13, 1)),
        FieldOption::new("other", "Other").with_price_modifier(Decimal::ONE),
    ]
}

fn essay_review_form() -> EssayReviewForm {
    EssayReviewForm {
        essay_categories: EssayCategories {
            enabled: true,
            required: true,
            options: essay_categories(),
        },
        // Shipped as a reference table; pricing keys off the category until a consultant
        // switches the tiers on.
        word_count_limits: WordCountLimits {
            enabled: false,
            tiers: vec![
                word_count_tier(0, 250, "Short Essay", Decimal::new(8, 1)),
                word_count_tier(251, 500, "Medium Essay", Decimal::ONE),
                word_count_tier(501, 650, "Full Essay", Decimal::new(12, 1)),
                word_count_tier(651, 1000, "Long Essay", Decimal::new(15, 1)),
            ],
        },
        prompt_field: ToggleField { enabled: true, required: false, placeholder: None },
        improvement_goals: GoalList {
            enabled: true,
            allow_custom: true,
            options: [
                "Grammar and clarity",
                "Story structure and flow",
                "Making it more compelling",
                "Cutting down word count",
                "Adding personal voice",
                "Strengthening conclusion",
                "Better topic alignment",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        },
        submission_methods: SubmissionMethods {
            text_paste: true,
            file_upload: true,
            google_doc_link: true,
        },
        custom_fields: Vec::new(),
    }
}

fn word_count_tier(min: u32, max: u32, label: &str, modifier: Decimal) -> WordCountTier {
    WordCountTier { min, max, label: label.to_owned(), price_modifier: modifier }
}

fn interview_prep_form() -> InterviewPrepForm {
    InterviewPrepForm {
        interview_types: InterviewTypes {
            enabled: true,
            allow_custom: false,
            options: vec![
                FieldOption::new("alumni", "Alumni Interview"),
                FieldOption::new("admissions", "Admissions Officer Interview"),
                FieldOption::new("scholarship", "Scholarship Interview"),
                FieldOption::new("video", "Video Interview Practice"),
            ],
        },
        example_questions: ExampleQuestions { enabled: true, required: false, max_questions: 10 },
        school_field: ToggleField { enabled: true, required: true, placeholder: None },
        custom_fields: Vec::new(),
    }
}

fn tutoring_form(service_type: ServiceType) -> TutoringForm {
    let score_type = match service_type {
        ServiceType::SatTutoring => ScoreType::Sat,
        ServiceType::ActTutoring => ScoreType::Act,
        _ => ScoreType::Both,
    };

    TutoringForm {
        current_scores: CurrentScores { enabled: true, required: false, score_type },
        target_scores: ToggleField { enabled: true, required: true, placeholder: None },
        weak_areas: WeakAreas {
            enabled: true,
            allow_multiple: true,
            options: [
                "SAT Math",
                "SAT Reading",
                "SAT Writing",
                "ACT Math",
                "ACT English",
                "ACT Reading",
                "ACT Science",
                "Test Strategy",
                "Time Management",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        },
        session_preferences: SessionPreferences {
            enabled: true,
            time_slots: true,
            frequency: true,
        },
        custom_fields: Vec::new(),
    }
}
