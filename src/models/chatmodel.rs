// models/chatmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat line scoped to a request, and to one negotiation when `quote_id` is set.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub request_id: Uuid,
    pub quote_id: Option<Uuid>,
    pub content: String,
    pub is_delivered: bool,
    pub is_read: bool,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn in_thread(&self, request_id: Uuid, quote_id: Option<Uuid>) -> bool {
        self.request_id == request_id && self.quote_id == quote_id
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}
