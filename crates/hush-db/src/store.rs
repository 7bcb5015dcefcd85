//! Storage seams used by the token service and the chat gateway.
//!
//! Both traits are synchronous: implementations do blocking I/O, so async
//! callers run them on `tokio::task::spawn_blocking`. Errors are
//! infrastructure failures and are propagated unchanged.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use hush_types::models::{
    AccessSession, Chat, EncryptedMessage, OtpCredential, PasswordResetCredential, User,
};
use hush_types::views::{ChatView, MessageView};

/// Per-user credential records. Every write is a single-row, last-write-wins
/// upsert; `None` from a setter means the owning user does not exist.
pub trait CredentialStore: Send + Sync {
    fn get_access_session(&self, user_id: Uuid) -> Result<Option<AccessSession>>;

    /// Overwrite the user's refresh token. `None` logs the user out.
    fn set_refresh_token(&self, user_id: Uuid, token: Option<&str>)
    -> Result<Option<AccessSession>>;

    /// Replace the stored refresh token only if it still equals `expected`.
    /// Returns whether the swap happened.
    fn swap_refresh_token(&self, user_id: Uuid, expected: &str, new: &str) -> Result<bool>;

    fn get_otp(&self, user_id: Uuid) -> Result<Option<OtpCredential>>;

    fn set_otp(
        &self,
        user_id: Uuid,
        code: Option<u32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<OtpCredential>>;

    fn get_password_reset_token(&self, user_id: Uuid) -> Result<Option<PasswordResetCredential>>;

    fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<PasswordResetCredential>>;

    /// Null out OTP codes and reset tokens whose expiry is at or before `now`.
    /// Returns how many records were cleared.
    fn clear_expired_credentials(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Chats, membership and encrypted messages.
pub trait ChatStore: Send + Sync {
    fn get_user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Return the direct chat between the two users, creating it if needed.
    fn get_or_create_direct_chat(&self, creator_id: Uuid, receiver_id: Uuid) -> Result<Chat>;

    fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>>;

    fn is_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool>;

    fn insert_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        ciphertext: &str,
    ) -> Result<EncryptedMessage>;

    /// Up to `limit` messages that precede the message `before`, oldest
    /// first. Views carry ciphertext in `message_text`.
    fn messages_page(
        &self,
        chat_id: Uuid,
        limit: u32,
        before: Option<Uuid>,
    ) -> Result<Vec<MessageView>>;

    /// The user's chats, most recently active first, each with its latest
    /// `preview` messages (still encrypted).
    fn chats_for_user(&self, user_id: Uuid, preview: u32) -> Result<Vec<ChatView>>;
}
