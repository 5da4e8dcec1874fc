use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;

use peerbook_core::booking::ports::ServiceCatalog;
use peerbook_core::domain::service::{DeliveryType, PriceTier, Service, ServiceId, ServiceType};
use peerbook_core::domain::user::UserId;
use peerbook_core::errors::PersistenceError;
use peerbook_core::forms::ServiceFormConfiguration;

use super::{column, to_optional_u32, RepositoryError};
use crate::DbPool;

const SERVICE_COLUMNS: &str = "id, consultant_id, title, service_type, delivery_type,
    standard_turnaround_hours, duration_minutes, rush_available, price_tiers_json,
    rush_turnarounds_json, form_configuration_json";

pub struct SqlServiceCatalog {
    pool: DbPool,
}

impl SqlServiceCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_row(&self, id: &ServiceId) -> Result<Option<Service>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_service).transpose()
    }

    async fn save_row(&self, service: &Service) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO services (id, consultant_id, title, service_type, delivery_type,
                                   standard_turnaround_hours, duration_minutes, rush_available,
                                   price_tiers_json, rush_turnarounds_json,
                                   form_configuration_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 consultant_id = excluded.consultant_id,
                 title = excluded.title,
                 service_type = excluded.service_type,
                 delivery_type = excluded.delivery_type,
                 standard_turnaround_hours = excluded.standard_turnaround_hours,
                 duration_minutes = excluded.duration_minutes,
                 rush_available = excluded.rush_available,
                 price_tiers_json = excluded.price_tiers_json,
                 rush_turnarounds_json = excluded.rush_turnarounds_json,
                 form_configuration_json = excluded.form_configuration_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&service.id.0)
        .bind(&service.consultant_id.0)
        .bind(&service.title)
        .bind(service.service_type.as_str())
        .bind(delivery_type_as_str(service.delivery_type))
        .bind(service.standard_turnaround_hours.map(i64::from))
        .bind(service.duration_minutes.map(i64::from))
        .bind(service.rush_available)
        .bind(serde_json::to_string(&service.price_tiers)?)
        .bind(serde_json::to_string(&service.rush_turnarounds)?)
        .bind(serde_json::to_string(&service.form_configuration)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ServiceCatalog for SqlServiceCatalog {
    async fn find(&self, id: &ServiceId) -> Result<Option<Service>, PersistenceError> {
        Ok(self.find_row(id).await?)
    }

    async fn save(&self, service: &Service) -> Result<(), PersistenceError> {
        Ok(self.save_row(service).await?)
    }
}

fn delivery_type_as_str(delivery_type: DeliveryType) -> &'static str {
    match delivery_type {
        DeliveryType::Async => "async",
        DeliveryType::Scheduled => "scheduled",
        DeliveryType::Instant => "instant",
    }
}

fn parse_delivery_type(value: &str) -> Result<DeliveryType, RepositoryError> {
    match value {
        "async" => Ok(DeliveryType::Async),
        "scheduled" => Ok(DeliveryType::Scheduled),
        "instant" => Ok(DeliveryType::Instant),
        other => Err(RepositoryError::Decode(format!("unknown delivery type `{other}`"))),
    }
}

fn row_to_service(row: &SqliteRow) -> Result<Service, RepositoryError> {
    let service_type: String = column(row, "service_type")?;
    let delivery_type: String = column(row, "delivery_type")?;
    let price_tiers: String = column(row, "price_tiers_json")?;
    let rush_turnarounds: String = column(row, "rush_turnarounds_json")?;
    let form_configuration: String = column(row, "form_configuration_json")?;

    Ok(Service {
        id: ServiceId(column(row, "id")?),
        consultant_id: UserId(column(row, "consultant_id")?),
        title: column(row, "title")?,
        service_type: ServiceType::parse(&service_type).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown service type `{service_type}`"))
        })?,
        price_tiers: serde_json::from_str::<Vec<PriceTier>>(&price_tiers)?,
        delivery_type: parse_delivery_type(&delivery_type)?,
        standard_turnaround_hours: to_optional_u32(
            "standard_turnaround_hours",
            column(row, "standard_turnaround_hours")?,
        )?,
        duration_minutes: to_optional_u32("duration_minutes", column(row, "duration_minutes")?)?,
        rush_available: column(row, "rush_available")?,
        rush_turnarounds: serde_json::from_str::<BTreeMap<u32, Decimal>>(&rush_turnarounds)?,
        form_configuration: serde_json::from_str::<ServiceFormConfiguration>(&form_configuration)?,
    })
}

#[cfg(test)]
mod tests {
    use peerbook_core::booking::ports::ServiceCatalog;
    use peerbook_core::domain::service::{ServiceId, ServiceType};

    use super::SqlServiceCatalog;
    use crate::fixtures::demo_service;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn service_round_trips_with_form_configuration() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let catalog = SqlServiceCatalog::new(pool);

        let service = demo_service(ServiceType::EssayReview);
        catalog.save(&service).await.expect("save");

        let found = catalog.find(&service.id).await.expect("find");
        assert_eq!(found, Some(service.clone()));

        let mut renamed = service;
        renamed.title = "Supplemental essay sprint".to_owned();
        catalog.save(&renamed).await.expect("upsert");
        let found = catalog.find(&renamed.id).await.expect("find").expect("present");
        assert_eq!(found.title, "Supplemental essay sprint");

        let missing = catalog.find(&ServiceId("svc-missing".to_owned())).await.expect("find");
        assert_eq!(missing, None);
    }
}
