use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::TokenPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub is_activated: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn token_payload(&self) -> TokenPayload {
        TokenPayload {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            nickname: self.nickname.clone(),
        }
    }
}

/// Refresh-token state for one user. At most one live refresh token exists
/// per user; issuing a new one overwrites the previous value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub code: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Messages are only ever stored encrypted. `ciphertext` is the base64
/// envelope produced by the message cipher.
#[derive(Debug, Clone)]
pub struct EncryptedMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Direct,
    Group,
}

impl ChatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chat {
    pub id: Uuid,
    pub kind: ChatKind,
    pub name: Option<String>,
    pub member_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
