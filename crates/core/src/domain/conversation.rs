use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::booking::BookingId;
use crate::domain::user::UserId;

pub const PREVIEW_CHARS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Participant {
    Student,
    Consultant,
}

/// The single thread between one student and one consultant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub student_id: UserId,
    pub consultant_id: UserId,
    /// The booking that opened the thread. Later bookings between the same pair reuse the
    /// conversation without replacing it.
    pub booking_id: Option<BookingId>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub student_unread_count: u32,
    pub consultant_unread_count: u32,
    pub student_archived_at: Option<DateTime<Utc>>,
    pub consultant_archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        id: ConversationId,
        student_id: UserId,
        consultant_id: UserId,
        booking_id: Option<BookingId>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            student_id,
            consultant_id,
            booking_id,
            last_message_at: None,
            last_message_preview: None,
            student_unread_count: 0,
            consultant_unread_count: 0,
            student_archived_at: None,
            consultant_archived_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn participant(&self, user_id: &UserId) -> Option<Participant> {
        if &self.student_id == user_id {
            Some(Participant::Student)
        } else if &self.consultant_id == user_id {
            Some(Participant::Consultant)
        } else {
            None
        }
    }

    /// Returns true when `booking_id` was recorded, false when the thread already had one.
    pub fn attach_booking(&mut self, booking_id: &BookingId, at: DateTime<Utc>) -> bool {
        if self.booking_id.is_some() {
            return false;
        }
        self.booking_id = Some(booking_id.clone());
        self.updated_at = at;
        true
    }

    pub fn record_message(&mut self, sender: Participant, content: &str, at: DateTime<Utc>) {
        self.last_message_at = Some(at);
        self.last_message_preview = Some(preview(content));
        match sender {
            Participant::Student => {
                self.consultant_unread_count = self.consultant_unread_count.saturating_add(1)
            }
            Participant::Consultant => {
                self.student_unread_count = self.student_unread_count.saturating_add(1)
            }
        }
        self.updated_at = at;
    }

    pub fn mark_read_by(&mut self, reader: Participant, at: DateTime<Utc>) {
        match reader {
            Participant::Student => self.student_unread_count = 0,
            Participant::Consultant => self.consultant_unread_count = 0,
        }
        self.updated_at = at;
    }

    /// Hides the thread for one side only.
    pub fn archive_for(&mut self, side: Participant, at: DateTime<Utc>) {
        match side {
            Participant::Student => self.student_archived_at = Some(at),
            Participant::Consultant => self.consultant_archived_at = Some(at),
        }
        self.updated_at = at;
    }

    pub fn is_archived_for(&self, side: Participant) -> bool {
        match side {
            Participant::Student => self.student_archived_at.is_some(),
            Participant::Consultant => self.consultant_archived_at.is_some(),
        }
    }
}

pub fn preview(content: &str) -> String {
    content.trim().chars().take(PREVIEW_CHARS).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
