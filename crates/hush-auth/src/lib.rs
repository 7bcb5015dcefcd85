//! Credential lifecycle: JWT access/refresh pairs, one-time passcodes and
//! password-reset tokens. All state lives behind [`hush_db::CredentialStore`].

pub mod clock;
pub mod config;
pub mod error;
pub mod tokens;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TokenConfig;
pub use error::AuthError;
pub use tokens::TokenService;
