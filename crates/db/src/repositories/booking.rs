use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use peerbook_core::booking::ports::{BookingStore, ExpectedState};
use peerbook_core::domain::booking::{
    Booking, BookingDetails, BookingId, BookingStatus, PriceModifierSource,
};
use peerbook_core::domain::service::{ServiceId, ServiceType};
use peerbook_core::domain::user::UserId;
use peerbook_core::errors::PersistenceError;
use peerbook_core::forms::SubmissionId;

use super::{
    column, parse_decimal, parse_optional_timestamp, parse_timestamp, to_optional_u32,
    RepositoryError,
};
use crate::DbPool;

const BOOKING_COLUMNS: &str = "id, submission_id, submission_fingerprint, student_id,
    consultant_id, service_id, service_type, base_price, price_tier_index,
    price_tier_description, price_modifier, price_modifier_source_json, rush_multiplier,
    rush_hours, final_price, currency, is_rush, scheduled_at, promised_delivery_at, status,
    details_json, special_instructions, created_at, updated_at, completed_at, cancelled_at,
    cancellation_reason, rating, review_text, reviewed_at";

pub struct SqlBookingStore {
    pool: DbPool,
}

impl SqlBookingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_row(&self, booking: &Booking) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                     ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&booking.id.0)
        .bind(&booking.submission_id.0)
        .bind(&booking.submission_fingerprint)
        .bind(&booking.student_id.0)
        .bind(&booking.consultant_id.0)
        .bind(&booking.service_id.0)
        .bind(booking.service_type.as_str())
        .bind(booking.base_price.to_string())
        .bind(tier_index_to_i64(booking.price_tier_index)?)
        .bind(&booking.price_tier_description)
        .bind(booking.price_modifier.to_string())
        .bind(serde_json::to_string(&booking.price_modifier_source)?)
        .bind(booking.rush_multiplier.to_string())
        .bind(booking.rush_hours.map(i64::from))
        .bind(booking.final_price.to_string())
        .bind(&booking.currency)
        .bind(booking.is_rush)
        .bind(booking.scheduled_at.map(|at| at.to_rfc3339()))
        .bind(booking.promised_delivery_at.to_rfc3339())
        .bind(booking.status.as_str())
        .bind(serde_json::to_string(&booking.details)?)
        .bind(&booking.special_instructions)
        .bind(booking.created_at.to_rfc3339())
        .bind(booking.updated_at.to_rfc3339())
        .bind(booking.completed_at.map(|at| at.to_rfc3339()))
        .bind(booking.cancelled_at.map(|at| at.to_rfc3339()))
        .bind(&booking.cancellation_reason)
        .bind(booking.rating.map(i64::from))
        .bind(&booking.review_text)
        .bind(booking.reviewed_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Only lifecycle and review columns change after creation, and only while the row still
    /// holds the status and rating the caller read.
    async fn update_row(
        &self,
        booking: &Booking,
        expected: ExpectedState,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE bookings SET
                 status = ?,
                 updated_at = ?,
                 completed_at = ?,
                 cancelled_at = ?,
                 cancellation_reason = ?,
                 rating = ?,
                 review_text = ?,
                 reviewed_at = ?
             WHERE id = ? AND status = ? AND rating IS ?",
        )
        .bind(booking.status.as_str())
        .bind(booking.updated_at.to_rfc3339())
        .bind(booking.completed_at.map(|at| at.to_rfc3339()))
        .bind(booking.cancelled_at.map(|at| at.to_rfc3339()))
        .bind(&booking.cancellation_reason)
        .bind(booking.rating.map(i64::from))
        .bind(&booking.review_text)
        .bind(booking.reviewed_at.map(|at| at.to_rfc3339()))
        .bind(&booking.id.0)
        .bind(expected.status.as_str())
        .bind(expected.rating.map(i64::from))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM bookings WHERE id = ?")
                .bind(&booking.id.0)
                .fetch_optional(&self.pool)
                .await?;
        match current {
            None => Err(RepositoryError::NotFound(format!("booking {}", booking.id))),
            Some(status) => Err(RepositoryError::Rejected(format!(
                "booking {} is {status}, expected {}",
                booking.id,
                expected.status.as_str()
            ))),
        }
    }

    async fn find_by_id_row(&self, id: &BookingId) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_booking).transpose()
    }

    async fn find_by_submission_row(
        &self,
        student_id: &UserId,
        submission_id: &SubmissionId,
    ) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE student_id = ? AND submission_id = ?"
        ))
        .bind(&student_id.0)
        .bind(&submission_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_booking).transpose()
    }

    pub async fn list_for_student(
        &self,
        student_id: &UserId,
    ) -> Result<Vec<Booking>, PersistenceError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE student_id = ? ORDER BY created_at DESC"
        ))
        .bind(&student_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(row_to_booking).collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl BookingStore for SqlBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), PersistenceError> {
        Ok(self.insert_row(booking).await?)
    }

    async fn update(
        &self,
        booking: &Booking,
        expected: ExpectedState,
    ) -> Result<(), PersistenceError> {
        Ok(self.update_row(booking, expected).await?)
    }

    async fn find_by_id(&self, id: &BookingId) -> Result<Option<Booking>, PersistenceError> {
        Ok(self.find_by_id_row(id).await?)
    }

    async fn find_by_submission(
        &self,
        student_id: &UserId,
        submission_id: &SubmissionId,
    ) -> Result<Option<Booking>, PersistenceError> {
        Ok(self.find_by_submission_row(student_id, submission_id).await?)
    }
}

fn tier_index_to_i64(index: usize) -> Result<i64, RepositoryError> {
    i64::try_from(index)
        .map_err(|_| RepositoryError::Decode(format!("price tier index {index} is out of range")))
}

fn row_to_booking(row: &SqliteRow) -> Result<Booking, RepositoryError> {
    let service_type: String = column(row, "service_type")?;
    let status: String = column(row, "status")?;
    let price_tier_index: i64 = column(row, "price_tier_index")?;
    let modifier_source: String = column(row, "price_modifier_source_json")?;
    let details: String = column(row, "details_json")?;
    let rating: Option<i64> = column(row, "rating")?;

    Ok(Booking {
        id: BookingId(column(row, "id")?),
        submission_id: SubmissionId(column(row, "submission_id")?),
        submission_fingerprint: column(row, "submission_fingerprint")?,
        student_id: UserId(column(row, "student_id")?),
        consultant_id: UserId(column(row, "consultant_id")?),
        service_id: ServiceId(column(row, "service_id")?),
        service_type: ServiceType::parse(&service_type).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown service type `{service_type}`"))
        })?,
        base_price: parse_decimal("base_price", &column::<String>(row, "base_price")?)?,
        price_tier_index: usize::try_from(price_tier_index).map_err(|_| {
            RepositoryError::Decode(format!("price_tier_index {price_tier_index} is negative"))
        })?,
        price_tier_description: column(row, "price_tier_description")?,
        price_modifier: parse_decimal(
            "price_modifier",
            &column::<String>(row, "price_modifier")?,
        )?,
        price_modifier_source: serde_json::from_str::<PriceModifierSource>(&modifier_source)?,
        rush_multiplier: parse_decimal(
            "rush_multiplier",
            &column::<String>(row, "rush_multiplier")?,
        )?,
        rush_hours: to_optional_u32("rush_hours", column(row, "rush_hours")?)?,
        final_price: parse_decimal("final_price", &column::<String>(row, "final_price")?)?,
        currency: column(row, "currency")?,
        is_rush: column(row, "is_rush")?,
        scheduled_at: parse_optional_timestamp("scheduled_at", column(row, "scheduled_at")?)?,
        promised_delivery_at: parse_timestamp(
            "promised_delivery_at",
            &column::<String>(row, "promised_delivery_at")?,
        )?,
        status: BookingStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown booking status `{status}`")))?,
        details: serde_json::from_str::<BookingDetails>(&details)?,
        special_instructions: column(row, "special_instructions")?,
        created_at: parse_timestamp("created_at", &column::<String>(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", &column::<String>(row, "updated_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", column(row, "completed_at")?)?,
        cancelled_at: parse_optional_timestamp("cancelled_at", column(row, "cancelled_at")?)?,
        cancellation_reason: column(row, "cancellation_reason")?,
        rating: rating
            .map(|value| {
                u8::try_from(value)
                    .map_err(|_| RepositoryError::Decode(format!("rating {value} is out of range")))
            })
            .transpose()?,
        review_text: column(row, "review_text")?,
        reviewed_at: parse_optional_timestamp("reviewed_at", column(row, "reviewed_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use peerbook_core::booking::lifecycle::BookingActor;
    use peerbook_core::booking::ports::{BookingStore, ExpectedState, ServiceCatalog};
    use peerbook_core::domain::booking::{BookingId, BookingStatus};
    use peerbook_core::domain::service::ServiceType;
    use peerbook_core::domain::user::UserId;
    use peerbook_core::errors::PersistenceError;
    use peerbook_core::forms::SubmissionId;

    use super::SqlBookingStore;
    use crate::fixtures::{demo_service, sample_booking};
    use crate::repositories::SqlServiceCatalog;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn booking_round_trips_every_column() {
        let pool = migrated_pool().await;
        let service = demo_service(ServiceType::EssayReview);
        SqlServiceCatalog::new(pool.clone()).save(&service).await.expect("save service");
        let store = SqlBookingStore::new(pool);

        let booking = sample_booking(&service, "student-1", "sub-1");
        store.insert(&booking).await.expect("insert");

        let by_id = store.find_by_id(&booking.id).await.expect("find by id");
        assert_eq!(by_id.as_ref(), Some(&booking));

        let by_submission = store
            .find_by_submission(&booking.student_id, &booking.submission_id)
            .await
            .expect("find by submission");
        assert_eq!(by_submission, Some(booking));
    }

    #[tokio::test]
    async fn duplicate_submission_for_same_student_is_a_conflict() {
        let pool = migrated_pool().await;
        let service = demo_service(ServiceType::EssayReview);
        SqlServiceCatalog::new(pool.clone()).save(&service).await.expect("save service");
        let store = SqlBookingStore::new(pool);

        let first = sample_booking(&service, "student-1", "sub-1");
        store.insert(&first).await.expect("first insert");

        let mut second = sample_booking(&service, "student-1", "sub-1");
        second.id = BookingId("bk-second".to_owned());
        let error = store.insert(&second).await.expect_err("duplicate submission");
        assert!(matches!(error, PersistenceError::Conflict(_)));

        let mut other_student = sample_booking(&service, "student-2", "sub-1");
        other_student.id = BookingId("bk-other".to_owned());
        store.insert(&other_student).await.expect("same token, different student");

        let missing = store
            .find_by_submission(&UserId("student-3".to_owned()), &SubmissionId("sub-1".to_owned()))
            .await
            .expect("lookup");
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn update_persists_lifecycle_and_review_columns() {
        let pool = migrated_pool().await;
        let service = demo_service(ServiceType::EssayReview);
        SqlServiceCatalog::new(pool.clone()).save(&service).await.expect("save service");
        let store = SqlBookingStore::new(pool);

        let mut booking = sample_booking(&service, "student-1", "sub-1");
        store.insert(&booking).await.expect("insert");
        let expected = ExpectedState::of(&booking);

        let start = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        for (step, (status, actor)) in [
            (BookingStatus::Confirmed, BookingActor::Consultant),
            (BookingStatus::InProgress, BookingActor::Consultant),
            (BookingStatus::Completed, BookingActor::Consultant),
        ]
        .into_iter()
        .enumerate()
        {
            booking
                .transition_to(status, actor, None, start + Duration::hours(step as i64))
                .expect("transition");
        }
        booking
            .attach_review(BookingActor::Student, 5, Some("Sharp feedback".to_owned()), start)
            .expect("review");
        store.update(&booking, expected).await.expect("update");

        let stored = store.find_by_id(&booking.id).await.expect("find").expect("present");
        assert_eq!(stored.status, BookingStatus::Completed);
        assert_eq!(stored.rating, Some(5));
        assert_eq!(stored.review_text.as_deref(), Some("Sharp feedback"));
        assert_eq!(stored, booking);
    }

    #[tokio::test]
    async fn updating_an_unknown_booking_is_not_found() {
        let pool = migrated_pool().await;
        let service = demo_service(ServiceType::EssayReview);
        let store = SqlBookingStore::new(pool);

        let booking = sample_booking(&service, "student-1", "sub-1");
        let error = store
            .update(&booking, ExpectedState::of(&booking))
            .await
            .expect_err("nothing to update");
        assert!(matches!(error, PersistenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn stale_update_is_a_conflict_and_leaves_the_row_alone() {
        let pool = migrated_pool().await;
        let service = demo_service(ServiceType::EssayReview);
        SqlServiceCatalog::new(pool.clone()).save(&service).await.expect("save service");
        let store = SqlBookingStore::new(pool);

        let booking = sample_booking(&service, "student-1", "sub-1");
        store.insert(&booking).await.expect("insert");
        let read_by_both = ExpectedState::of(&booking);
        let at = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();

        let mut cancelled = booking.clone();
        cancelled
            .transition_to(BookingStatus::Cancelled, BookingActor::Student, None, at)
            .expect("cancel");
        store.update(&cancelled, read_by_both).await.expect("first writer wins");

        let mut confirmed = booking.clone();
        confirmed
            .transition_to(BookingStatus::Confirmed, BookingActor::Consultant, None, at)
            .expect("confirm");
        let error = store.update(&confirmed, read_by_both).await.expect_err("stale snapshot");
        assert!(matches!(error, PersistenceError::Conflict(_)));

        let stored = store.find_by_id(&booking.id).await.expect("find").expect("present");
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert!(stored.cancelled_at.is_some());
    }

    #[tokio::test]
    async fn second_review_on_the_same_snapshot_is_a_conflict() {
        let pool = migrated_pool().await;
        let service = demo_service(ServiceType::EssayReview);
        SqlServiceCatalog::new(pool.clone()).save(&service).await.expect("save service");
        let store = SqlBookingStore::new(pool);

        let mut booking = sample_booking(&service, "student-1", "sub-1");
        booking.status = BookingStatus::Completed;
        store.insert(&booking).await.expect("insert");
        let unreviewed = ExpectedState::of(&booking);
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();

        let mut first = booking.clone();
        first.attach_review(BookingActor::Student, 5, None, at).expect("review");
        store.update(&first, unreviewed).await.expect("first review");

        let mut second = booking.clone();
        second.attach_review(BookingActor::Student, 1, None, at).expect("review");
        let error = store.update(&second, unreviewed).await.expect_err("already reviewed");
        assert!(matches!(error, PersistenceError::Conflict(_)));

        let stored = store.find_by_id(&booking.id).await.expect("find").expect("present");
        assert_eq!(stored.rating, Some(5));
    }

    #[tokio::test]
    async fn list_for_student_returns_newest_first() {
        let pool = migrated_pool().await;
        let service = demo_service(ServiceType::EssayReview);
        SqlServiceCatalog::new(pool.clone()).save(&service).await.expect("save service");
        let store = SqlBookingStore::new(pool);

        let older = sample_booking(&service, "student-1", "sub-1");
        let mut newer = sample_booking(&service, "student-1", "sub-2");
        newer.id = BookingId("bk-newer".to_owned());
        newer.created_at = older.created_at + Duration::days(1);
        store.insert(&older).await.expect("insert older");
        store.insert(&newer).await.expect("insert newer");

        let listed = store.list_for_student(&older.student_id).await.expect("list");
        let ids: Vec<_> = listed.iter().map(|booking| booking.id.0.as_str()).collect();
        assert_eq!(ids, vec!["bk-newer", older.id.0.as_str()]);
    }
}
