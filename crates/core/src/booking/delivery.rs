use chrono::{DateTime, Duration, Utc};

use crate::domain::service::{DeliveryType, Service};
use crate::errors::DomainError;
use crate::forms::submission::NormalizedSubmission;

pub const DEFAULT_TURNAROUND_HOURS: u32 = 48;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryScheduler {
    default_turnaround_hours: u32,
}

impl Default for DeliveryScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TURNAROUND_HOURS)
    }
}

impl DeliveryScheduler {
    pub fn new(default_turnaround_hours: u32) -> Self {
        Self { default_turnaround_hours }
    }

    /// First match wins: scheduled slot, rush turnaround, the service's standard turnaround,
    /// then the configured fallback. A turnaround past the calendar's range is an error.
    pub fn promised_delivery_at(
        &self,
        service: &Service,
        now: DateTime<Utc>,
        submission: &NormalizedSubmission,
    ) -> Result<DateTime<Utc>, DomainError> {
        if service.delivery_type == DeliveryType::Scheduled {
            if let Some(at) = submission.scheduled_time {
                return Ok(at);
            }
        }

        let hours = submission
            .rush_hours
            .or(service.standard_turnaround_hours)
            .unwrap_or(self.default_turnaround_hours);
        now.checked_add_signed(Duration::hours(i64::from(hours))).ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "a {hours}h turnaround from {now} is out of range"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::DeliveryScheduler;
    use crate::domain::booking::{BookingDetails, GenericDetails};
    use crate::domain::service::{DeliveryType, PriceTier, Service, ServiceId, ServiceType};
    use crate::domain::user::UserId;
    use crate::errors::DomainError;
    use crate::forms::defaults::default_form_configuration;
    use crate::forms::submission::{NormalizedSubmission, SubmissionId};

    fn service(delivery_type: DeliveryType, standard: Option<u32>) -> Service {
        Service {
            id: ServiceId("svc-1".to_owned()),
            consultant_id: UserId("consultant-1".to_owned()),
            title: "Strategy call".to_owned(),
            service_type: ServiceType::Other,
            price_tiers: vec![PriceTier::new(Decimal::new(50, 0), "Standard")],
            delivery_type,
            standard_turnaround_hours: standard,
            duration_minutes: None,
            rush_available: true,
            rush_turnarounds: BTreeMap::from([(12, Decimal::new(2, 0))]),
            form_configuration: default_form_configuration(ServiceType::Other),
        }
    }

    fn submission(rush_hours: Option<u32>) -> NormalizedSubmission {
        NormalizedSubmission {
            submission_id: SubmissionId("sub-1".to_owned()),
            service_id: ServiceId("svc-1".to_owned()),
            price_tier_index: 0,
            rush_hours,
            scheduled_time: None,
            details: BookingDetails::Generic(GenericDetails::default()),
            special_instructions: None,
            fingerprint: "fp".to_owned(),
        }
    }

    #[test]
    fn standard_turnaround_is_added_to_now() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let at = DeliveryScheduler::default()
            .promised_delivery_at(&service(DeliveryType::Async, Some(48)), now, &submission(None))
            .expect("in range");

        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn scheduled_slot_beats_rush_and_rush_beats_standard() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let slot = Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).unwrap();
        let scheduler = DeliveryScheduler::default();

        let mut scheduled = submission(Some(12));
        scheduled.scheduled_time = Some(slot);
        let booked_slot = scheduler
            .promised_delivery_at(&service(DeliveryType::Scheduled, Some(48)), now, &scheduled)
            .expect("slot");
        assert_eq!(booked_slot, slot);

        // A slot on an async service is ignored.
        let rushed = scheduler
            .promised_delivery_at(&service(DeliveryType::Async, Some(48)), now, &scheduled)
            .expect("rush");
        assert_eq!(rushed, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn configured_fallback_applies_without_a_standard_turnaround() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let service = service(DeliveryType::Instant, None);

        assert_eq!(
            DeliveryScheduler::default().promised_delivery_at(&service, now, &submission(None)),
            Ok(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap())
        );
        assert_eq!(
            DeliveryScheduler::new(72).promised_delivery_at(&service, now, &submission(None)),
            Ok(Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn turnaround_past_the_calendar_is_an_error() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let service = service(DeliveryType::Async, Some(u32::MAX));

        let error = DeliveryScheduler::default()
            .promised_delivery_at(&service, now, &submission(None))
            .expect_err("out of range");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }
}
