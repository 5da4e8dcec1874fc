use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::forms::configuration::{FormType, ServiceFormConfiguration};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceId(pub String);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    EssayReview,
    InterviewPrep,
    SatTutoring,
    ActTutoring,
    TestPrep,
    ApplicationStrategy,
    Other,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EssayReview => "essay_review",
            Self::InterviewPrep => "interview_prep",
            Self::SatTutoring => "sat_tutoring",
            Self::ActTutoring => "act_tutoring",
            Self::TestPrep => "test_prep",
            Self::ApplicationStrategy => "application_strategy",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "essay_review" => Some(Self::EssayReview),
            "interview_prep" => Some(Self::InterviewPrep),
            "sat_tutoring" => Some(Self::SatTutoring),
            "act_tutoring" => Some(Self::ActTutoring),
            "test_prep" => Some(Self::TestPrep),
            "application_strategy" => Some(Self::ApplicationStrategy),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Form shape a new service of this type starts with.
    pub fn default_form_type(&self) -> FormType {
        match self {
            Self::EssayReview => FormType::EssayReview,
            Self::InterviewPrep => FormType::InterviewPrep,
            Self::SatTutoring | Self::ActTutoring | Self::TestPrep => FormType::Tutoring,
            Self::ApplicationStrategy | Self::Other => FormType::Custom,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::EssayReview => "essay review",
            Self::InterviewPrep => "interview prep",
            Self::SatTutoring => "SAT tutoring",
            Self::ActTutoring => "ACT tutoring",
            Self::TestPrep => "test prep",
            Self::ApplicationStrategy => "application strategy",
            Self::Other => "consulting",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Async,
    Scheduled,
    Instant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTier {
    pub price: Decimal,
    pub description: String,
}

impl PriceTier {
    pub fn new(price: Decimal, description: impl Into<String>) -> Self {
        Self { price, description: description.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub consultant_id: UserId,
    pub title: String,
    pub service_type: ServiceType,
    pub price_tiers: Vec<PriceTier>,
    pub delivery_type: DeliveryType,
    pub standard_turnaround_hours: Option<u32>,
    pub duration_minutes: Option<u32>,
    pub rush_available: bool,
    /// Requested turnaround in hours mapped to its price multiplier. The keys are the only
    /// legal rush selections.
    #[serde(default)]
    pub rush_turnarounds: BTreeMap<u32, Decimal>,
    pub form_configuration: ServiceFormConfiguration,
}

impl Service {
    pub fn tier(&self, index: usize) -> Option<&PriceTier> {
        self.price_tiers.get(index)
    }

    /// Multiplier for a rush selection, `None` when rush is unavailable or `hours` is not an
    /// offered turnaround.
    pub fn rush_multiplier(&self, hours: u32) -> Option<Decimal> {
        if !self.rush_available {
            return None;
        }
        self.rush_turnarounds.get(&hours).copied()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation("service id must not be empty".into()));
        }

        if self.price_tiers.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "service {} must declare at least one price tier",
                self.id
            )));
        }

        if let Some((index, _)) =
            self.price_tiers.iter().enumerate().find(|(_, tier)| tier.price < Decimal::ZERO)
        {
            return Err(DomainError::InvariantViolation(format!(
                "service {} price tier {index} has a negative price",
                self.id
            )));
        }

        for (hours, multiplier) in &self.rush_turnarounds {
            if *hours == 0 {
                return Err(DomainError::InvariantViolation(format!(
                    "service {} rush turnaround keys must be positive hours",
                    self.id
                )));
            }
            if *multiplier <= Decimal::ZERO {
                return Err(DomainError::InvariantViolation(format!(
                    "service {} rush multiplier for {hours}h must be greater than zero",
                    self.id
                )));
            }
        }

        if self.rush_available && self.rush_turnarounds.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "service {} offers rush delivery without any rush turnarounds",
                self.id
            )));
        }

        // Essay, interview and tutoring services keep their fixed form so its checks always run.
        let form_type = self.form_configuration.form_type();
        if form_type != self.service_type.default_form_type() {
            return Err(DomainError::InvariantViolation(format!(
                "service {} of type {} cannot use a {} form",
                self.id,
                self.service_type.as_str(),
                form_type.as_str()
            )));
        }

        self.form_configuration.validate()
    }
}
