use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use tracing::trace;

use hush_gateway::{ConnectionState, handle_connection};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    token: Option<String>,
}

/// Authenticate before upgrading: a connection that cannot name its user is
/// refused with 401 and never reaches the gateway. Browsers cannot set headers
/// on a WebSocket handshake, so `?token=` is accepted as well.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    trace!("Gateway connection {:?}", ConnectionState::Connecting);

    let token = auth
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
        .or(query.token)
        .ok_or(ApiError::Unauthorized)?;

    let user = state
        .gateway
        .authenticate(&token)
        .ok_or(ApiError::Unauthorized)?;
    trace!("Gateway connection {:?} as {}", ConnectionState::Authenticated, user.id);

    let gateway = state.gateway.clone();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, gateway, user)))
}
