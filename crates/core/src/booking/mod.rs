pub mod delivery;
pub mod lifecycle;
pub mod orchestrator;
pub mod ports;
pub mod pricing;
pub mod retry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::service::Service;
use crate::errors::BookingError;
use crate::forms::submission::{BookingSubmission, NormalizedSubmission};
use crate::forms::validator::{DeterministicSubmissionValidator, SubmissionValidator};

use self::delivery::DeliveryScheduler;
use self::pricing::{
    offered_turnarounds, DeterministicPricingCalculator, PricingBreakdown, PricingCalculator,
};

pub const DEFAULT_CURRENCY: &str = "USD";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Live quote for a submission: what the buyer would pay and when it would be delivered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingQuote {
    pub submission: NormalizedSubmission,
    pub pricing: PricingBreakdown,
    pub currency: String,
    pub promised_delivery_at: DateTime<Utc>,
}

impl BookingQuote {
    pub fn final_price(&self) -> rust_decimal::Decimal {
        self.pricing.final_price
    }
}

/// The pure half of booking: validation, pricing and delivery, with no I/O.
pub struct BookingEngine<V, P> {
    validator: V,
    pricing: P,
    scheduler: DeliveryScheduler,
    currency: String,
}

impl<V, P> BookingEngine<V, P> {
    pub fn new(
        validator: V,
        pricing: P,
        scheduler: DeliveryScheduler,
        currency: impl Into<String>,
    ) -> Self {
        Self { validator, pricing, scheduler, currency: currency.into() }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }
}

impl Default for BookingEngine<DeterministicSubmissionValidator, DeterministicPricingCalculator> {
    fn default() -> Self {
        Self::new(
            DeterministicSubmissionValidator,
            DeterministicPricingCalculator,
            DeliveryScheduler::default(),
            DEFAULT_CURRENCY,
        )
    }
}

impl<V, P> BookingEngine<V, P>
where
    V: SubmissionValidator,
    P: PricingCalculator,
{
    /// Rejects submissions aimed at another service or selecting a tier or rush turnaround the
    /// service does not offer.
    pub fn check_selection(
        &self,
        service: &Service,
        submission: &BookingSubmission,
    ) -> Result<(), BookingError> {
        if submission.service_id != service.id {
            return Err(BookingError::ServiceMismatch {
                expected: service.id.clone(),
                submitted: submission.service_id.clone(),
            });
        }

        if service.tier(submission.price_tier_index).is_none() {
            return Err(BookingError::InvalidPriceTier {
                index: submission.price_tier_index,
                available: service.price_tiers.len(),
            });
        }

        if submission.is_rush {
            let offered = submission.rush_hours.and_then(|hours| service.rush_multiplier(hours));
            if offered.is_none() {
                return Err(BookingError::InvalidRushSelection {
                    requested: submission.rush_hours,
                    offered: offered_turnarounds(service),
                });
            }
        }

        Ok(())
    }

    pub fn validate_and_price(
        &self,
        service: &Service,
        submission: &BookingSubmission,
        now: DateTime<Utc>,
    ) -> Result<BookingQuote, BookingError> {
        let normalized = self
            .validator
            .validate(service, submission)
            .map_err(BookingError::ValidationFailed)?;
        let pricing = self.pricing.price(service, &normalized, &self.currency)?;
        let promised_delivery_at =
            self.scheduler.promised_delivery_at(service, now, &normalized)?;

        Ok(BookingQuote {
            submission: normalized,
            pricing,
            currency: self.currency.clone(),
            promised_delivery_at,
        })
    }
}

/// [`BookingEngine::validate_and_price`] with the default engine.
pub fn validate_and_price(
    service: &Service,
    submission: &BookingSubmission,
    now: DateTime<Utc>,
) -> Result<BookingQuote, BookingError> {
    BookingEngine::default().validate_and_price(service, submission, now)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{validate_and_price, BookingEngine};
    use crate::domain::service::{DeliveryType, PriceTier, Service, ServiceId, ServiceType};
    use crate::domain::user::UserId;
    use crate::errors::BookingError;
    use crate::forms::defaults::default_form_configuration;
    use crate::forms::submission::{keys, AnswerValue, BookingSubmission};
    use crate::forms::validator::FieldErrorReason;

    fn essay_service() -> Service {
        Service {
            id: ServiceId("svc-essay".to_owned()),
            consultant_id: UserId("consultant-1".to_owned()),
            title: "Personal statement review".to_owned(),
            service_type: ServiceType::EssayReview,
            price_tiers: vec![PriceTier::new(Decimal::new(100, 0), "Standard")],
            delivery_type: DeliveryType::Async,
            standard_turnaround_hours: Some(48),
            duration_minutes: None,
            rush_available: true,
            rush_turnarounds: BTreeMap::from([(24, Decimal::new(15, 1))]),
            form_configuration: default_form_configuration(ServiceType::EssayReview),
        }
    }

    fn essay_submission() -> BookingSubmission {
        BookingSubmission::new("sub-1", ServiceId("svc-essay".to_owned()), 0)
            .with_answer(keys::ESSAY_CATEGORY, AnswerValue::text("common_app_personal"))
            .with_answer(keys::ESSAY_TEXT, AnswerValue::text("My essay"))
            .with_answer(keys::WORD_COUNT, AnswerValue::Number(Decimal::new(600, 0)))
    }

    #[test]
    fn quote_combines_price_and_delivery() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let quote = validate_and_price(&essay_service(), &essay_submission(), now).expect("quote");

        assert_eq!(quote.final_price().to_string(), "120.00");
        assert_eq!(quote.currency, "USD");
        assert_eq!(quote.promised_delivery_at, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn rush_quote_uses_rush_turnaround_for_delivery() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let quote = validate_and_price(&essay_service(), &essay_submission().with_rush(24), now)
            .expect("quote");

        assert_eq!(quote.final_price().to_string(), "180.00");
        assert_eq!(quote.promised_delivery_at, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn quote_returns_field_errors() {
        let mut submission = essay_submission();
        submission.answers.remove(keys::ESSAY_CATEGORY);

        let error = validate_and_price(&essay_service(), &submission, Utc::now())
            .expect_err("category missing");

        assert_eq!(error.field_errors().len(), 1);
        assert_eq!(error.field_errors()[0].reason, FieldErrorReason::MissingRequired);
    }

    #[test]
    fn selection_checks_report_typed_errors() {
        let engine = BookingEngine::default();
        let service = essay_service();

        let mut wrong_tier = essay_submission();
        wrong_tier.price_tier_index = 2;
        assert_eq!(
            engine.check_selection(&service, &wrong_tier),
            Err(BookingError::InvalidPriceTier { index: 2, available: 1 })
        );

        assert_eq!(
            engine.check_selection(&service, &essay_submission().with_rush(6)),
            Err(BookingError::InvalidRushSelection { requested: Some(6), offered: vec![24] })
        );

        let mut elsewhere = essay_submission();
        elsewhere.service_id = ServiceId("svc-other".to_owned());
        assert!(matches!(
            engine.check_selection(&service, &elsewhere),
            Err(BookingError::ServiceMismatch { .. })
        ));

        assert_eq!(engine.check_selection(&service, &essay_submission().with_rush(24)), Ok(()));
    }
}
