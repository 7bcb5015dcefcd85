use thiserror::Error;

use hush_crypto::CryptoError;
use hush_types::events::GatewayEvent;

/// Why a gateway command was rejected. Reported back only to the connection
/// that sent it, as an `onError` event.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Malformed command")]
    MalformedCommand,

    #[error("Message text must not be empty")]
    EmptyMessage,

    #[error("Cannot start a chat with yourself")]
    SelfChat,

    #[error("User not found")]
    UserNotFound,

    #[error("Chat not found")]
    ChatNotFound,

    #[error("You are not a member of this chat")]
    NotMember,

    #[error("message encryption failed: {0}")]
    Encryption(#[from] CryptoError),

    #[error("storage failed: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("response payload has no push event")]
    NotPushable,
}

impl GatewayError {
    pub fn status(&self) -> u16 {
        match self {
            Self::MalformedCommand | Self::EmptyMessage | Self::SelfChat => 400,
            Self::NotMember => 403,
            Self::UserNotFound | Self::ChatNotFound => 404,
            Self::Encryption(_) | Self::Storage(_) | Self::NotPushable => 500,
        }
    }

    /// The event sent to the client. Internal failures are not described.
    pub fn to_event(&self) -> GatewayEvent {
        let message = match self {
            Self::Encryption(_) | Self::Storage(_) | Self::NotPushable => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        GatewayEvent::OnError {
            message,
            status: self.status(),
        }
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Storage(anyhow::anyhow!("blocking task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_not_leaked() {
        let event = GatewayError::Storage(anyhow::anyhow!("disk I/O error at /var/db")).to_event();
        assert_eq!(
            event,
            GatewayEvent::OnError {
                message: "Internal server error".into(),
                status: 500
            }
        );
    }

    #[test]
    fn client_errors_carry_their_message() {
        assert_eq!(
            GatewayError::NotMember.to_event(),
            GatewayEvent::OnError {
                message: "You are not a member of this chat".into(),
                status: 403
            }
        );
    }
}
