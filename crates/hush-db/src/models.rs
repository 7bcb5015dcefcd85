/// Database row types — these map directly to SQLite rows.
/// Distinct from hush-types models to keep the DB layer independent.
use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use hush_types::models::{ChatKind, User};
use hush_types::views::{MessageView, SenderView};

use crate::{from_db_time, parse_uuid};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub is_activated: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn to_user(&self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            nickname: self.nickname.clone(),
            is_activated: self.is_activated,
            created_at: from_db_time(&self.created_at)?,
        })
    }
}

/// A message joined with its sender's public profile.
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub sender_nickname: String,
    pub ciphertext: String,
    pub created_at: String,
    pub updated_at: String,
}

impl MessageRow {
    /// View with the ciphertext still in `message_text`.
    pub fn to_view(&self) -> Result<MessageView> {
        Ok(MessageView {
            id: parse_uuid(&self.id)?,
            chat_id: parse_uuid(&self.chat_id)?,
            sender: SenderView {
                id: parse_uuid(&self.sender_id)?,
                first_name: self.sender_first_name.clone(),
                last_name: self.sender_last_name.clone(),
                nickname: self.sender_nickname.clone(),
            },
            message_text: self.ciphertext.clone(),
            created_at: from_db_time(&self.created_at)?,
            updated_at: from_db_time(&self.updated_at)?,
        })
    }
}

pub struct ChatRow {
    pub id: String,
    pub kind: String,
    pub name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChatRow {
    pub fn kind(&self) -> Result<ChatKind> {
        ChatKind::parse(&self.kind)
            .ok_or_else(|| anyhow::anyhow!("corrupt chat kind '{}' on chat '{}'", self.kind, self.id))
    }

    pub fn id(&self) -> Result<Uuid> {
        parse_uuid(&self.id)
    }

    pub fn timestamps(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        Ok((from_db_time(&self.created_at)?, from_db_time(&self.updated_at)?))
    }
}
