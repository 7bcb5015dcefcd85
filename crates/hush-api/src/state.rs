use std::sync::Arc;

use hush_auth::TokenService;
use hush_crypto::MessageCipher;
use hush_db::Database;
use hush_gateway::ChatGateway;

use crate::mailer::Mailer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub tokens: TokenService,
    pub cipher: MessageCipher,
    pub gateway: ChatGateway,
    pub mailer: Arc<dyn Mailer>,
    /// Mark the refresh cookie `Secure`. Off only for plain-HTTP development.
    pub cookie_secure: bool,
}
