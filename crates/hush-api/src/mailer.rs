use tracing::info;

/// Out-of-band delivery of activation codes and reset tokens.
///
/// Called from blocking context. A failed delivery is logged by the caller
/// and never retried; the user can request a fresh code.
pub trait Mailer: Send + Sync {
    fn send_activation_code(&self, email: &str, code: u32) -> anyhow::Result<()>;

    fn send_password_reset(&self, email: &str, token: &str) -> anyhow::Result<()>;
}

/// Development mailer: the log line is the delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_activation_code(&self, email: &str, code: u32) -> anyhow::Result<()> {
        info!(target: "hush::mail", "Activation code for {}: {:06}", email, code);
        Ok(())
    }

    fn send_password_reset(&self, email: &str, token: &str) -> anyhow::Result<()> {
        info!(target: "hush::mail", "Password reset token for {}: {}", email, token);
        Ok(())
    }
}
