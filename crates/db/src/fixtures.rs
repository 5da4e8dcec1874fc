//! Demo catalog used by `peerbook seed` and by tests across the workspace.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use peerbook_core::booking::ports::ServiceCatalog;
use peerbook_core::domain::booking::{
    Booking, BookingDetails, BookingId, BookingStatus, EssayContent, EssayDetails, GenericDetails,
    PriceModifierSource,
};
use peerbook_core::domain::service::{DeliveryType, PriceTier, Service, ServiceId, ServiceType};
use peerbook_core::domain::user::UserId;
use peerbook_core::errors::PersistenceError;
use peerbook_core::forms::{default_form_configuration, SubmissionId};

pub const DEMO_CONSULTANT_ID: &str = "consultant-demo";

/// Service types seeded by [`seed_demo_services`].
pub const DEMO_SERVICE_TYPES: &[ServiceType] = &[
    ServiceType::EssayReview,
    ServiceType::InterviewPrep,
    ServiceType::SatTutoring,
    ServiceType::ApplicationStrategy,
];

pub fn demo_service_id(service_type: ServiceType) -> ServiceId {
    ServiceId(format!("svc-{}", service_type.as_str().replace('_', "-")))
}

pub fn demo_service(service_type: ServiceType) -> Service {
    let (title, price_tiers, delivery_type, turnaround, duration) = match service_type {
        ServiceType::EssayReview => (
            "Personal statement review",
            vec![
                PriceTier::new(Decimal::new(100, 0), "Single essay"),
                PriceTier::new(Decimal::new(250, 0), "Essay plus one revision"),
            ],
            DeliveryType::Async,
            Some(72),
            None,
        ),
        ServiceType::InterviewPrep => (
            "Mock admissions interview",
            vec![PriceTier::new(Decimal::new(80, 0), "45 minute session")],
            DeliveryType::Scheduled,
            None,
            Some(45),
        ),
        ServiceType::SatTutoring | ServiceType::ActTutoring | ServiceType::TestPrep => (
            "Test prep tutoring",
            vec![
                PriceTier::new(Decimal::new(60, 0), "One session"),
                PriceTier::new(Decimal::new(200, 0), "Four sessions"),
            ],
            DeliveryType::Scheduled,
            None,
            Some(60),
        ),
        ServiceType::ApplicationStrategy | ServiceType::Other => (
            "Application strategy call",
            vec![PriceTier::new(Decimal::new(120, 0), "Strategy package")],
            DeliveryType::Async,
            Some(96),
            None,
        ),
    };

    let rush_turnarounds = match delivery_type {
        DeliveryType::Async => {
            BTreeMap::from([(24, Decimal::new(15, 1)), (48, Decimal::new(125, 2))])
        }
        DeliveryType::Scheduled | DeliveryType::Instant => BTreeMap::new(),
    };

    Service {
        id: demo_service_id(service_type),
        consultant_id: UserId(DEMO_CONSULTANT_ID.to_owned()),
        title: title.to_owned(),
        service_type,
        price_tiers,
        delivery_type,
        standard_turnaround_hours: turnaround,
        duration_minutes: duration,
        rush_available: !rush_turnarounds.is_empty(),
        rush_turnarounds,
        form_configuration: default_form_configuration(service_type),
    }
}

pub fn demo_services() -> Vec<Service> {
    DEMO_SERVICE_TYPES.iter().copied().map(demo_service).collect()
}

pub async fn seed_demo_services(
    catalog: &dyn ServiceCatalog,
) -> Result<Vec<ServiceId>, PersistenceError> {
    let mut seeded = Vec::new();
    for service in demo_services() {
        catalog.save(&service).await?;
        seeded.push(service.id);
    }
    Ok(seeded)
}

fn fixture_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap_or_default()
}

/// A pending booking at the first tier of `service`, for store tests that do not need the
/// engine to price it.
pub fn sample_booking(service: &Service, student_id: &str, submission_id: &str) -> Booking {
    let created_at = fixture_time();
    let tier = service.price_tiers.first();
    let base_price = tier.map(|tier| tier.price).unwrap_or_default();

    let details = match service.service_type {
        ServiceType::EssayReview => BookingDetails::Essay(EssayDetails {
            category: Some("personal_statement".to_owned()),
            prompt: Some("Tell us about a challenge you overcame.".to_owned()),
            content: EssayContent {
                text: Some("When the robotics team lost its sponsor...".to_owned()),
                google_doc_link: None,
                uploaded_file: None,
            },
            word_count: 650,
            word_count_tier: None,
            improvement_goals: vec!["structure".to_owned(), "voice".to_owned()],
            custom_fields: BTreeMap::new(),
        }),
        _ => BookingDetails::Generic(GenericDetails::default()),
    };

    Booking {
        id: BookingId(format!("bk-{submission_id}")),
        submission_id: SubmissionId(submission_id.to_owned()),
        submission_fingerprint: format!("fp-{submission_id}"),
        student_id: UserId(student_id.to_owned()),
        consultant_id: service.consultant_id.clone(),
        service_id: service.id.clone(),
        service_type: service.service_type,
        base_price,
        price_tier_index: 0,
        price_tier_description: tier.map(|tier| tier.description.clone()).unwrap_or_default(),
        price_modifier: Decimal::ONE,
        price_modifier_source: PriceModifierSource::None,
        rush_multiplier: Decimal::ONE,
        rush_hours: None,
        final_price: base_price.round_dp(2),
        currency: "USD".to_owned(),
        is_rush: false,
        scheduled_at: None,
        promised_delivery_at: created_at
            + Duration::hours(i64::from(service.standard_turnaround_hours.unwrap_or(48))),
        status: BookingStatus::Pending,
        details,
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

#[cfg(test)]
mod tests {
    use peerbook_core::domain::service::ServiceType;

    use super::{demo_service, demo_services, seed_demo_services, DEMO_SERVICE_TYPES};
    use crate::repositories::InMemoryServiceCatalog;
    use peerbook_core::booking::ports::ServiceCatalog;

    #[test]
    fn every_demo_service_passes_validation() {
        for service in demo_services() {
            service.validate().unwrap_or_else(|error| panic!("{}: {error}", service.id));
        }
        for service_type in [ServiceType::ActTutoring, ServiceType::TestPrep, ServiceType::Other] {
            demo_service(service_type).validate().expect("valid demo service");
        }
    }

    #[tokio::test]
    async fn seeding_is_repeatable() {
        let catalog = InMemoryServiceCatalog::default();
        let first = seed_demo_services(&catalog).await.expect("seed");
        let second = seed_demo_services(&catalog).await.expect("reseed");

        assert_eq!(first, second);
        assert_eq!(first.len(), DEMO_SERVICE_TYPES.len());
        for id in &first {
            assert!(catalog.find(id).await.expect("find").is_some());
        }
    }
}
