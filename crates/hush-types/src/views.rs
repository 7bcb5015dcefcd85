use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::TokenPayload;
use crate::models::{Chat, ChatKind, EncryptedMessage};

/// Public profile of a message author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderView {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
}

impl From<&TokenPayload> for SenderView {
    fn from(user: &TokenPayload) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            nickname: user.nickname.clone(),
        }
    }
}

/// A message as it leaves the system. `message_text` holds ciphertext while
/// inside the core and plaintext once it has been through decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: SenderView,
    pub message_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageView {
    /// View of a stored message; `message_text` is still ciphertext.
    pub fn encrypted(message: &EncryptedMessage, sender: SenderView) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            sender,
            message_text: message.ciphertext.clone(),
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub id: Uuid,
    pub kind: ChatKind,
    pub name: Option<String>,
    pub member_ids: Vec<Uuid>,
    pub messages: Vec<MessageView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatView {
    pub fn new(chat: &Chat, messages: Vec<MessageView>) -> Self {
        Self {
            id: chat.id,
            kind: chat.kind,
            name: chat.name.clone(),
            member_ids: chat.member_ids.clone(),
            messages,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
        }
    }
}

/// Every response shape that carries message text. The set is closed: adding
/// a shape means adding a variant and its decryption routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// A single message with its sender.
    Message(MessageView),
    /// A page of chat history.
    MessagePage(Vec<MessageView>),
    /// A chat with its nested message list.
    Chat(ChatView),
    /// A chat list, each chat with its nested messages.
    ChatList(Vec<ChatView>),
}
