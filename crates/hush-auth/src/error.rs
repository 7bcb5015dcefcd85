use thiserror::Error;

/// Infrastructure failures only. A bad, expired or mismatched credential is
/// never an error: verification returns `None`/`false` instead.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential storage failed: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("credential lifetime {0} is out of range")]
    LifetimeOutOfRange(chrono::Duration),
}

pub type Result<T> = std::result::Result<T, AuthError>;
