use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::booking::{BookingDetails, PriceModifierSource};
use crate::domain::service::{Service, ServiceId};
use crate::errors::{BookingError, DomainError};
use crate::forms::configuration::ServiceFormConfiguration;
use crate::forms::submission::NormalizedSubmission;

pub const MONEY_SCALE: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub service_id: ServiceId,
    pub currency: String,
    pub steps: Vec<PricingTraceStep>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub base_price: Decimal,
    pub price_tier_description: String,
    pub modifier: Decimal,
    pub modifier_source: PriceModifierSource,
    pub rush_multiplier: Decimal,
    pub rush_hours: Option<u32>,
    pub final_price: Decimal,
    pub trace: PricingTrace,
}

pub trait PricingCalculator: Send + Sync {
    fn price(
        &self,
        service: &Service,
        submission: &NormalizedSubmission,
        currency: &str,
    ) -> Result<PricingBreakdown, BookingError>;
}

#[derive(Default)]
pub struct DeterministicPricingCalculator;

impl PricingCalculator for DeterministicPricingCalculator {
    fn price(
        &self,
        service: &Service,
        submission: &NormalizedSubmission,
        currency: &str,
    ) -> Result<PricingBreakdown, BookingError> {
        price_with_trace(service, submission, currency)
    }
}

/// Rounds to cents, halves away from zero, always carrying two decimal places.
pub fn round_money(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// `base x modifier x rush`, rounded once at the end.
pub fn price_with_trace(
    service: &Service,
    submission: &NormalizedSubmission,
    currency: &str,
) -> Result<PricingBreakdown, BookingError> {
    let tier = service.tier(submission.price_tier_index).ok_or(BookingError::InvalidPriceTier {
        index: submission.price_tier_index,
        available: service.price_tiers.len(),
    })?;
    let base_price = tier.price;

    let (modifier, modifier_source) = price_modifier(service, &submission.details)?;

    let rush_multiplier = match submission.rush_hours {
        None => Decimal::ONE,
        Some(hours) => service.rush_multiplier(hours).ok_or_else(|| {
            BookingError::InvalidRushSelection {
                requested: Some(hours),
                offered: offered_turnarounds(service),
            }
        })?,
    };

    let modified = checked_product(service, base_price, modifier)?;
    let unrounded = checked_product(service, modified, rush_multiplier)?;
    let final_price = round_money(unrounded);

    let mut steps = vec![PricingTraceStep {
        stage: "base".to_owned(),
        detail: format!("tier {} ({})", submission.price_tier_index, tier.description),
        amount: base_price,
    }];
    steps.push(PricingTraceStep {
        stage: "modifier".to_owned(),
        detail: match &modifier_source {
            PriceModifierSource::None => "no modifier".to_owned(),
            PriceModifierSource::Category { value } => format!("category {value} x{modifier}"),
            PriceModifierSource::WordCountTier { label } => {
                format!("length tier {label} x{modifier}")
            }
        },
        amount: modified,
    });
    steps.push(PricingTraceStep {
        stage: "rush".to_owned(),
        detail: match submission.rush_hours {
            Some(hours) => format!("{hours}h turnaround x{rush_multiplier}"),
            None => "standard turnaround".to_owned(),
        },
        amount: unrounded,
    });
    steps.push(PricingTraceStep {
        stage: "rounding".to_owned(),
        detail: "2 decimal places, half away from zero".to_owned(),
        amount: final_price,
    });

    Ok(PricingBreakdown {
        base_price,
        price_tier_description: tier.description.clone(),
        modifier,
        modifier_source,
        rush_multiplier,
        rush_hours: submission.rush_hours,
        final_price,
        trace: PricingTrace {
            service_id: service.id.clone(),
            currency: currency.to_owned(),
            steps,
        },
    })
}

fn checked_product(
    service: &Service,
    amount: Decimal,
    factor: Decimal,
) -> Result<Decimal, BookingError> {
    amount.checked_mul(factor).ok_or_else(|| {
        BookingError::Domain(DomainError::InvariantViolation(format!(
            "price of service {} overflows ({amount} x {factor})",
            service.id
        )))
    })
}

pub fn offered_turnarounds(service: &Service) -> Vec<u32> {
    if !service.rush_available {
        return Vec::new();
    }
    service.rush_turnarounds.keys().copied().collect()
}

/// Word-count tiers, when switched on, replace the category modifier. The two never stack.
fn price_modifier(
    service: &Service,
    details: &BookingDetails,
) -> Result<(Decimal, PriceModifierSource), BookingError> {
    let (ServiceFormConfiguration::EssayReview(form), BookingDetails::Essay(essay)) =
        (&service.form_configuration, details)
    else {
        return Ok((Decimal::ONE, PriceModifierSource::None));
    };

    if form.word_count_limits.enabled {
        let tier = form.word_count_limits.tier_for(essay.word_count).ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "no length tier covers {} words",
                essay.word_count
            ))
        })?;
        return Ok((
            tier.price_modifier,
            PriceModifierSource::WordCountTier { label: tier.label.clone() },
        ));
    }

    let selected = essay
        .category
        .as_deref()
        .and_then(|value| form.essay_categories.option(value))
        .and_then(|option| option.price_modifier.map(|modifier| (option.value.clone(), modifier)));

    Ok(match selected {
        Some((value, modifier)) => (modifier, PriceModifierSource::Category { value }),
        None => (Decimal::ONE, PriceModifierSource::None),
    })
}
