use async_trait::async_trait;

use peerbook_core::booking::ports::InteractionLog;
use peerbook_core::domain::interaction::{InteractionRecord, InteractionType};
use peerbook_core::domain::service::ServiceType;
use peerbook_core::domain::user::UserId;
use peerbook_core::errors::PersistenceError;

use super::{column, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlInteractionLog {
    pool: DbPool,
}

impl SqlInteractionLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_row(&self, record: &InteractionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_interactions
                 (student_id, consultant_id, interaction_type, service_type, occurred_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.student_id.0)
        .bind(&record.consultant_id.0)
        .bind(record.interaction_type.as_str())
        .bind(record.service_type.as_str())
        .bind(record.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_for_student(
        &self,
        student_id: &UserId,
    ) -> Result<Vec<InteractionRecord>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT student_id, consultant_id, interaction_type, service_type, occurred_at
             FROM user_interactions WHERE student_id = ? ORDER BY id",
        )
        .bind(&student_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let interaction_type: String = column(row, "interaction_type")?;
            let service_type: String = column(row, "service_type")?;
            records.push(InteractionRecord {
                student_id: UserId(column(row, "student_id")?),
                consultant_id: UserId(column(row, "consultant_id")?),
                interaction_type: InteractionType::parse(&interaction_type).ok_or_else(|| {
                    let message = format!("unknown interaction type `{interaction_type}`");
                    RepositoryError::Decode(message)
                })?,
                service_type: ServiceType::parse(&service_type).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown service type `{service_type}`"))
                })?,
                occurred_at: parse_timestamp(
                    "occurred_at",
                    &column::<String>(row, "occurred_at")?,
                )?,
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl InteractionLog for SqlInteractionLog {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), PersistenceError> {
        Ok(self.insert_row(record).await?)
    }
}
