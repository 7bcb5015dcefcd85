use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use hush_auth::TokenService;
use hush_crypto::{MessageCipher, decrypt_payload};
use hush_db::ChatStore;
use hush_types::api::TokenPayload;
use hush_types::events::{GatewayCommand, GatewayEvent};
use hush_types::models::Chat;
use hush_types::views::{ChatView, MessageView, ResponsePayload, SenderView};

use crate::dispatcher::Dispatcher;
use crate::error::GatewayError;

/// Identity of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub user: TokenPayload,
    pub conn_id: Uuid,
}

/// Executes chat commands: persist encrypted, then push decrypted.
#[derive(Clone)]
pub struct ChatGateway {
    dispatcher: Dispatcher,
    store: Arc<dyn ChatStore>,
    cipher: MessageCipher,
    tokens: TokenService,
}

impl ChatGateway {
    pub fn new(
        dispatcher: Dispatcher,
        store: Arc<dyn ChatStore>,
        cipher: MessageCipher,
        tokens: TokenService,
    ) -> Self {
        Self {
            dispatcher,
            store,
            cipher,
            tokens,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Resolve the access token presented at connect time.
    pub fn authenticate(&self, access_token: &str) -> Option<TokenPayload> {
        self.tokens.verify_access_token(access_token)
    }

    /// Run one command. Failures go back to the originating connection only.
    pub async fn handle_command(&self, ctx: &ConnectionContext, cmd: GatewayCommand) {
        let result = match cmd {
            GatewayCommand::CreateChat {
                receiver_id,
                message_text,
            } => self.create_chat(ctx, receiver_id, message_text).await,
            GatewayCommand::CreateMessage {
                chat_id,
                message_text,
            } => self.create_message(ctx, chat_id, message_text).await,
        };

        if let Err(e) = result {
            self.report_error(ctx, &e).await;
        }
    }

    pub async fn report_error(&self, ctx: &ConnectionContext, error: &GatewayError) {
        match error {
            GatewayError::Encryption(_) | GatewayError::Storage(_) | GatewayError::NotPushable => {
                warn!("Command from user {} failed: {}", ctx.user.id, error)
            }
            _ => debug!("Command from user {} rejected: {}", ctx.user.id, error),
        }
        self.dispatcher
            .send_to_connection(ctx.user.id, ctx.conn_id, error.to_event())
            .await;
    }

    /// Open (or reuse) the direct chat with `receiver_id` and post the first
    /// message. The receiver and the sender's other connections get the chat.
    async fn create_chat(
        &self,
        ctx: &ConnectionContext,
        receiver_id: Uuid,
        message_text: String,
    ) -> Result<(), GatewayError> {
        let sender_id = ctx.user.id;
        if receiver_id == sender_id {
            return Err(GatewayError::SelfChat);
        }
        require_text(&message_text)?;
        let ciphertext = self.cipher.encrypt(&message_text)?;

        let store = self.store.clone();
        let chat = tokio::task::spawn_blocking(move || -> Result<Chat, GatewayError> {
            if store.get_user(receiver_id)?.is_none() {
                return Err(GatewayError::UserNotFound);
            }
            Ok(store.get_or_create_direct_chat(sender_id, receiver_id)?)
        })
        .await??;

        let _order = self.dispatcher.lock_chat(chat.id).await;
        let message = self.persist(chat.id, &ctx.user, ciphertext).await?;

        let view = ChatView::new(&chat, vec![message]);
        let event = self.push_event(ResponsePayload::Chat(view))?;

        info!("User {} opened chat {} with {}", sender_id, chat.id, receiver_id);

        self.dispatcher.send_to_user(receiver_id, &event).await;
        self.dispatcher
            .send_to_user_except(sender_id, Some(ctx.conn_id), &event)
            .await;
        Ok(())
    }

    /// Post to an existing chat and push to every other connection of its
    /// members. Nothing is pushed unless the message was stored.
    async fn create_message(
        &self,
        ctx: &ConnectionContext,
        chat_id: Uuid,
        message_text: String,
    ) -> Result<(), GatewayError> {
        require_text(&message_text)?;
        let ciphertext = self.cipher.encrypt(&message_text)?;

        let store = self.store.clone();
        let sender_id = ctx.user.id;
        let chat = tokio::task::spawn_blocking(move || -> Result<Chat, GatewayError> {
            let chat = store.get_chat(chat_id)?.ok_or(GatewayError::ChatNotFound)?;
            if !chat.member_ids.contains(&sender_id) {
                return Err(GatewayError::NotMember);
            }
            Ok(chat)
        })
        .await??;

        let _order = self.dispatcher.lock_chat(chat_id).await;
        let message = self.persist(chat_id, &ctx.user, ciphertext).await?;

        let event = self.push_event(ResponsePayload::Message(message))?;
        let mut delivered = 0;
        for member in &chat.member_ids {
            delivered += self
                .dispatcher
                .send_to_user_except(*member, Some(ctx.conn_id), &event)
                .await;
        }
        debug!("Message in chat {} pushed to {} connections", chat_id, delivered);
        Ok(())
    }

    /// Decrypt an outgoing payload and wrap it as a push event.
    fn push_event(&self, payload: ResponsePayload) -> Result<GatewayEvent, GatewayError> {
        GatewayEvent::push(decrypt_payload(&self.cipher, &payload))
            .ok_or(GatewayError::NotPushable)
    }

    async fn persist(
        &self,
        chat_id: Uuid,
        sender: &TokenPayload,
        ciphertext: String,
    ) -> Result<MessageView, GatewayError> {
        let store = self.store.clone();
        let sender_id = sender.id;
        let stored = tokio::task::spawn_blocking(move || {
            store.insert_message(chat_id, sender_id, &ciphertext)
        })
        .await??;

        Ok(MessageView::encrypted(&stored, SenderView::from(sender)))
    }
}

fn require_text(text: &str) -> Result<(), GatewayError> {
    if text.trim().is_empty() {
        return Err(GatewayError::EmptyMessage);
    }
    Ok(())
}
