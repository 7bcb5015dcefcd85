use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, info, warn};
use uuid::Uuid;

use hush_crypto::keys::{generate_otp_code, generate_reset_token};
use hush_db::CredentialStore;
use hush_types::api::{Claims, TokenPair, TokenPayload, TokenType};

use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::error::{AuthError, Result};

/// Issues, verifies and rotates every short-lived credential.
///
/// Verification never fails loudly: a bad, expired or mismatched credential
/// yields `None`/`false`. Only storage and signing failures are errors.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: TokenConfig,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: TokenConfig, store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        // Expiry is checked against `clock` below, with no leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            validation,
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    // -- Access / refresh tokens --

    /// Sign a new pair and make its refresh token the user's only valid one.
    pub fn issue_token_pair(&self, payload: &TokenPayload) -> Result<TokenPair> {
        let pair = self.sign_pair(payload)?;

        self.store
            .set_refresh_token(payload.id, Some(&pair.refresh_token))?
            .ok_or_else(|| AuthError::Storage(anyhow::anyhow!("no user {}", payload.id)))?;

        info!("Issued token pair for user {}", payload.id);
        Ok(pair)
    }

    pub fn verify_access_token(&self, token: &str) -> Option<TokenPayload> {
        self.decode(token, TokenType::Access).map(|claims| claims.user)
    }

    /// Exchange a refresh token for a fresh pair.
    ///
    /// The presented token must be validly signed, unexpired and still the
    /// one on record. The record is compared and replaced in one atomic step,
    /// so a token can be rotated at most once.
    pub fn rotate_tokens(&self, refresh_token: &str) -> Result<Option<TokenPair>> {
        let Some(claims) = self.decode(refresh_token, TokenType::Refresh) else {
            return Ok(None);
        };
        let user_id = claims.user.id;

        let pair = self.sign_pair(&claims.user)?;
        if !self
            .store
            .swap_refresh_token(user_id, refresh_token, &pair.refresh_token)?
        {
            warn!("Rejected stale or revoked refresh token for user {}", user_id);
            return Ok(None);
        }

        debug!("Rotated tokens for user {}", user_id);
        Ok(Some(pair))
    }

    /// Log the user out everywhere by forgetting their refresh token.
    pub fn revoke(&self, user_id: Uuid) -> Result<()> {
        self.store.set_refresh_token(user_id, None)?;
        info!("Revoked refresh token for user {}", user_id);
        Ok(())
    }

    // -- One-time passcodes --

    /// Store a fresh passcode for the user and return it for delivery.
    /// `None` if the user does not exist.
    pub fn issue_otp(&self, user_id: Uuid) -> Result<Option<u32>> {
        let code = generate_otp_code();
        let expires_at = self.expiry(self.config.otp_ttl)?;

        Ok(self
            .store
            .set_otp(user_id, Some(code), Some(expires_at))?
            .map(|_| code))
    }

    pub fn verify_otp(&self, user_id: Uuid, supplied: &str) -> Result<bool> {
        let Some(otp) = self.store.get_otp(user_id)? else {
            return Ok(false);
        };
        let stored = otp.code.map(|code| code.to_string());
        Ok(self.is_live_match(stored.as_deref(), otp.expires_at, supplied))
    }

    /// Verify the passcode and, if it matches, clear it so it cannot be reused.
    pub fn consume_otp(&self, user_id: Uuid, supplied: &str) -> Result<bool> {
        if !self.verify_otp(user_id, supplied)? {
            return Ok(false);
        }
        self.store.set_otp(user_id, None, None)?;
        Ok(true)
    }

    // -- Password reset tokens --

    /// Store a fresh reset token for the user and return it for delivery.
    /// `None` if the user does not exist.
    pub fn issue_password_reset_token(&self, user_id: Uuid) -> Result<Option<String>> {
        let token = generate_reset_token();
        let expires_at = self.expiry(self.config.reset_ttl)?;

        Ok(self
            .store
            .set_password_reset_token(user_id, Some(&token), Some(expires_at))?
            .map(|_| token))
    }

    /// Check the reset token and clear it on success. Single use.
    pub fn verify_and_consume_password_reset_token(
        &self,
        user_id: Uuid,
        supplied: &str,
    ) -> Result<bool> {
        let Some(reset) = self.store.get_password_reset_token(user_id)? else {
            return Ok(false);
        };
        if !self.is_live_match(reset.token.as_deref(), reset.expires_at, supplied) {
            return Ok(false);
        }

        self.store.set_password_reset_token(user_id, None, None)?;
        info!("Password reset token consumed for user {}", user_id);
        Ok(true)
    }

    // -- Internals --

    fn sign_pair(&self, payload: &TokenPayload) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.sign(payload, TokenType::Access)?,
            refresh_token: self.sign(payload, TokenType::Refresh)?,
        })
    }

    fn sign(&self, payload: &TokenPayload, token_type: TokenType) -> Result<String> {
        let now = self.clock.now();
        let (ttl, key) = match token_type {
            TokenType::Access => (self.config.access_ttl, &self.access_encoding),
            TokenType::Refresh => (self.config.refresh_ttl, &self.refresh_encoding),
        };
        let expires_at = self.expiry(ttl)?;

        let claims = Claims {
            user: payload.clone(),
            token_type,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, key)?)
    }

    fn decode(&self, token: &str, expected: TokenType) -> Option<Claims> {
        let key = match expected {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };

        let claims = decode::<Claims>(token, key, &self.validation).ok()?.claims;
        if claims.token_type != expected {
            return None;
        }
        if self.clock.now().timestamp() >= claims.exp {
            return None;
        }
        Some(claims)
    }

    fn expiry(&self, ttl: Duration) -> Result<DateTime<Utc>> {
        self.clock
            .now()
            .checked_add_signed(ttl)
            .ok_or(AuthError::LifetimeOutOfRange(ttl))
    }

    /// True only for a stored, unexpired secret equal to `supplied`.
    fn is_live_match(
        &self,
        stored: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        supplied: &str,
    ) -> bool {
        let (Some(stored), Some(expires_at)) = (stored, expires_at) else {
            return false;
        };
        self.clock.now() < expires_at && constant_time_eq(stored.as_bytes(), supplied.as_bytes())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
