use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use peerbook_core::booking::ports::{ConversationStore, MessageDelivery};
use peerbook_core::domain::booking::BookingId;
use peerbook_core::domain::conversation::{Conversation, ConversationId, Message, MessageId};
use peerbook_core::domain::user::UserId;
use peerbook_core::errors::PersistenceError;

use super::{column, parse_optional_timestamp, parse_timestamp, to_u32, RepositoryError};
use crate::DbPool;

const CONVERSATION_COLUMNS: &str = "id, student_id, consultant_id, booking_id, last_message_at,
    last_message_preview, student_unread_count, consultant_unread_count, student_archived_at,
    consultant_archived_at, created_at, updated_at";

pub struct SqlConversationStore {
    pool: DbPool,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Relies on the unique (student_id, consultant_id) index so two racing callers both end
    /// up with the row that won.
    async fn insert_or_fetch_row(
        &self,
        candidate: &Conversation,
    ) -> Result<(Conversation, bool), RepositoryError> {
        let result = sqlx::query(&format!(
            "INSERT INTO conversations ({CONVERSATION_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, consultant_id) DO NOTHING"
        ))
        .bind(&candidate.id.0)
        .bind(&candidate.student_id.0)
        .bind(&candidate.consultant_id.0)
        .bind(candidate.booking_id.as_ref().map(|id| id.0.as_str()))
        .bind(candidate.last_message_at.map(|at| at.to_rfc3339()))
        .bind(&candidate.last_message_preview)
        .bind(i64::from(candidate.student_unread_count))
        .bind(i64::from(candidate.consultant_unread_count))
        .bind(candidate.student_archived_at.map(|at| at.to_rfc3339()))
        .bind(candidate.consultant_archived_at.map(|at| at.to_rfc3339()))
        .bind(candidate.created_at.to_rfc3339())
        .bind(candidate.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() == 1;
        let stored = self
            .find_between(&candidate.student_id, &candidate.consultant_id)
            .await?
            .ok_or_else(|| {
                RepositoryError::NotFound(format!(
                    "conversation between {} and {}",
                    candidate.student_id, candidate.consultant_id
                ))
            })?;

        Ok((stored, created))
    }

    async fn find_between(
        &self,
        student_id: &UserId,
        consultant_id: &UserId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE student_id = ? AND consultant_id = ?"
        ))
        .bind(&student_id.0)
        .bind(&consultant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn find_row(&self, id: &ConversationId) -> Result<Option<Conversation>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn attach_booking_row(
        &self,
        id: &ConversationId,
        booking_id: &BookingId,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE conversations SET booking_id = ?, updated_at = ?
             WHERE id = ? AND booking_id IS NULL",
        )
        .bind(&booking_id.0)
        .bind(at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.find_row(id).await? {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!("conversation {id}"))),
        }
    }

    async fn append_message_row(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row =
            sqlx::query(&format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"))
                .bind(&conversation_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let mut conversation = match row {
            Some(row) => row_to_conversation(&row)?,
            None => {
                return Err(RepositoryError::NotFound(format!("conversation {conversation_id}")))
            }
        };
        let sender = conversation.participant(sender_id).ok_or_else(|| {
            RepositoryError::Rejected(format!(
                "{sender_id} is not a participant of conversation {conversation_id}"
            ))
        })?;

        let message = Message {
            id: MessageId(Uuid::new_v4().to_string()),
            conversation_id: conversation_id.clone(),
            sender_id: sender_id.clone(),
            content: content.to_owned(),
            is_read: false,
            created_at: Utc::now(),
        };
        conversation.record_message(sender, content, message.created_at);

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.conversation_id.0)
        .bind(&message.sender_id.0)
        .bind(&message.content)
        .bind(message.is_read)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversations SET
                 last_message_at = ?,
                 last_message_preview = ?,
                 student_unread_count = ?,
                 consultant_unread_count = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(conversation.last_message_at.map(|at| at.to_rfc3339()))
        .bind(&conversation.last_message_preview)
        .bind(i64::from(conversation.student_unread_count))
        .bind(i64::from(conversation.consultant_unread_count))
        .bind(conversation.updated_at.to_rfc3339())
        .bind(&conversation.id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    /// Messages of one conversation, oldest first.
    pub async fn messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, is_read, created_at
             FROM messages WHERE conversation_id = ? ORDER BY created_at, rowid",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn insert_or_fetch(
        &self,
        candidate: &Conversation,
    ) -> Result<(Conversation, bool), PersistenceError> {
        Ok(self.insert_or_fetch_row(candidate).await?)
    }

    async fn find(&self, id: &ConversationId) -> Result<Option<Conversation>, PersistenceError> {
        Ok(self.find_row(id).await?)
    }

    async fn attach_booking(
        &self,
        id: &ConversationId,
        booking_id: &BookingId,
        at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        Ok(self.attach_booking_row(id, booking_id, at).await?)
    }
}

#[async_trait]
impl MessageDelivery for SqlConversationStore {
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        sender_id: &UserId,
        content: &str,
    ) -> Result<Message, PersistenceError> {
        Ok(self.append_message_row(conversation_id, sender_id, content).await?)
    }
}

fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    let booking_id: Option<String> = column(row, "booking_id")?;

    Ok(Conversation {
        id: ConversationId(column(row, "id")?),
        student_id: UserId(column(row, "student_id")?),
        consultant_id: UserId(column(row, "consultant_id")?),
        booking_id: booking_id.map(BookingId),
        last_message_at: parse_optional_timestamp(
            "last_message_at",
            column(row, "last_message_at")?,
        )?,
        last_message_preview: column(row, "last_message_preview")?,
        student_unread_count: to_u32("student_unread_count", column(row, "student_unread_count")?)?,
        consultant_unread_count: to_u32(
            "consultant_unread_count",
            column(row, "consultant_unread_count")?,
        )?,
        student_archived_at: parse_optional_timestamp(
            "student_archived_at",
            column(row, "student_archived_at")?,
        )?,
        consultant_archived_at: parse_optional_timestamp(
            "consultant_archived_at",
            column(row, "consultant_archived_at")?,
        )?,
        created_at: parse_timestamp("created_at", &column::<String>(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", &column::<String>(row, "updated_at")?)?,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<Message, RepositoryError> {
    Ok(Message {
        id: MessageId(column(row, "id")?),
        conversation_id: ConversationId(column(row, "conversation_id")?),
        sender_id: UserId(column(row, "sender_id")?),
        content: column(row, "content")?,
        is_read: column(row, "is_read")?,
        created_at: parse_timestamp("created_at", &column::<String>(row, "created_at")?)?,
    })
}
