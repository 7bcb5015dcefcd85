//! HTTP surface: account lifecycle, chat history and the gateway upgrade.

pub mod auth;
pub mod chats;
pub mod error;
pub mod gateway;
pub mod mailer;
pub mod middleware;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use error::ApiError;
pub use mailer::{LogMailer, Mailer};
pub use state::{AppState, AppStateInner};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/password/forgot", post(auth::forgot_password))
        .route("/auth/password/reset", post(auth::reset_password))
        .route("/gateway", get(gateway::ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/activate", post(auth::activate))
        .route("/auth/otp/resend", post(auth::resend_otp))
        .route("/auth/logout", post(auth::logout))
        .route("/chats", get(chats::list_chats))
        .route("/chats/{chat_id}/messages", get(chats::get_messages))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> &'static str {
    "ok"
}
