use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::views::{ChatView, MessageView, ResponsePayload};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated and registered
    Ready { user_id: Uuid },

    /// A direct chat was created with this user as a member
    OnCreateChat(ChatView),

    /// A new message in one of the user's chats, already decrypted
    OnReceiveMessage(MessageView),

    /// A command from this connection failed
    OnError { message: String, status: u16 },
}

impl GatewayEvent {
    /// The push event for a single message or chat. Pages and chat lists are
    /// only ever returned over HTTP, so they have none.
    pub fn push(payload: ResponsePayload) -> Option<Self> {
        match payload {
            ResponsePayload::Message(message) => Some(Self::OnReceiveMessage(message)),
            ResponsePayload::Chat(chat) => Some(Self::OnCreateChat(chat)),
            ResponsePayload::MessagePage(_) | ResponsePayload::ChatList(_) => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Open a direct chat with another user, seeded with a first message
    CreateChat {
        receiver_id: Uuid,
        message_text: String,
    },

    /// Post a message to an existing chat
    CreateMessage { chat_id: Uuid, message_text: String },
}
