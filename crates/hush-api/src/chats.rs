use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use hush_crypto::decrypt_payload;
use hush_db::ChatStore;
use hush_types::api::TokenPayload;
use hush_types::views::{MessageView, ResponsePayload};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Messages shown with each chat in the chat list.
const CHAT_PREVIEW: u32 = 1;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: pass the `id` of the oldest message already shown to fetch
    /// the page before it.
    pub before: Option<Uuid>,
}

fn default_limit() -> u32 {
    50
}

/// The caller's chats, most recently active first, each with its latest
/// message decrypted.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(user): Extension<TokenPayload>,
) -> ApiResult<Json<ResponsePayload>> {
    let st = state.clone();
    let chats = tokio::task::spawn_blocking(move || st.db.chats_for_user(user.id, CHAT_PREVIEW))
        .await??;

    Ok(Json(decrypt_payload(
        &state.cipher,
        &ResponsePayload::ChatList(chats),
    )))
}

/// One page of a chat's history, oldest first. Members only.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(user): Extension<TokenPayload>,
) -> ApiResult<Json<ResponsePayload>> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);

    let st = state.clone();
    let page = tokio::task::spawn_blocking(move || -> ApiResult<Vec<MessageView>> {
        if st.db.get_chat(chat_id)?.is_none() {
            return Err(ApiError::ChatNotFound);
        }
        if !st.db.is_member(chat_id, user.id)? {
            return Err(ApiError::NotMember);
        }
        Ok(st.db.messages_page(chat_id, limit, query.before)?)
    })
    .await??;

    Ok(Json(decrypt_payload(
        &state.cipher,
        &ResponsePayload::MessagePage(page),
    )))
}
