//! Decryption of outgoing response payloads.
//!
//! Each [`ResponsePayload`] variant knows where its message text lives. The
//! routines here never touch their input; they build a new payload with the
//! plaintext substituted, so chat-level routines can simply delegate to the
//! message routine for every nested element.

use tracing::warn;

use hush_types::views::{ChatView, MessageView, ResponsePayload};

use crate::cipher::MessageCipher;

/// Shown in place of a message whose envelope cannot be decrypted.
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "This message could not be decrypted.";

/// Decrypt every message body in `payload`.
///
/// A message that fails to decrypt is replaced with
/// [`UNDECRYPTABLE_PLACEHOLDER`]; the rest of the payload is unaffected.
pub fn decrypt_payload(cipher: &MessageCipher, payload: &ResponsePayload) -> ResponsePayload {
    match payload {
        ResponsePayload::Message(message) => {
            ResponsePayload::Message(decrypt_message(cipher, message))
        }
        ResponsePayload::MessagePage(messages) => {
            ResponsePayload::MessagePage(decrypt_messages(cipher, messages))
        }
        ResponsePayload::Chat(chat) => ResponsePayload::Chat(decrypt_chat(cipher, chat)),
        ResponsePayload::ChatList(chats) => ResponsePayload::ChatList(
            chats.iter().map(|chat| decrypt_chat(cipher, chat)).collect(),
        ),
    }
}

fn decrypt_message(cipher: &MessageCipher, message: &MessageView) -> MessageView {
    let message_text = match cipher.decrypt(&message.message_text) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "Message {} in chat {} could not be decrypted: {}",
                message.id, message.chat_id, e
            );
            UNDECRYPTABLE_PLACEHOLDER.to_string()
        }
    };

    MessageView {
        message_text,
        ..message.clone()
    }
}

fn decrypt_messages(cipher: &MessageCipher, messages: &[MessageView]) -> Vec<MessageView> {
    messages
        .iter()
        .map(|message| decrypt_message(cipher, message))
        .collect()
}

fn decrypt_chat(cipher: &MessageCipher, chat: &ChatView) -> ChatView {
    ChatView {
        messages: decrypt_messages(cipher, &chat.messages),
        ..chat.clone()
    }
}
