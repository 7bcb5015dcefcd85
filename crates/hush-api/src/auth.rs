use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{info, warn};
use uuid::Uuid;

use hush_db::queries::NewUser;
use hush_types::api::{
    ActivateRequest, AuthResponse, ForgotPasswordRequest, LoginRequest, ResetPasswordRequest,
    SignupRequest, TokenPair, TokenPayload,
};
use hush_types::models::User;

use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, AppStateInner};

pub const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_COOKIE_PATH: &str = "/auth";

const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_LEN: usize = 64;

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let email = normalize_email(&req.email);
    validate_email(&email)?;
    validate_password(&req.password)?;
    for (field, value) in [
        ("First name", &req.first_name),
        ("Last name", &req.last_name),
        ("Nickname", &req.nickname),
    ] {
        validate_name(field, value)?;
    }

    let st = state.clone();
    let (user, pair) = tokio::task::spawn_blocking(move || -> ApiResult<(User, TokenPair)> {
        if st.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::EmailTaken);
        }

        let password_hash = hash_password(&req.password)?;
        let user = st.db.create_user(&NewUser {
            email: &email,
            password_hash: &password_hash,
            first_name: req.first_name.trim(),
            last_name: req.last_name.trim(),
            nickname: req.nickname.trim(),
        })?;

        let pair = st.tokens.issue_token_pair(&user.token_payload())?;
        deliver_activation_code(&st, user.id, &user.email)?;
        Ok((user, pair))
    })
    .await??;

    info!("User {} signed up", user.id);

    let jar = jar.add(refresh_cookie(&state, &pair.refresh_token));
    Ok((StatusCode::CREATED, jar, Json(auth_response(&user, pair))))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<AuthResponse>)> {
    let email = normalize_email(&req.email);

    let st = state.clone();
    let (user, pair) = tokio::task::spawn_blocking(move || -> ApiResult<(User, TokenPair)> {
        let row = st
            .db
            .get_user_by_email(&email)?
            .ok_or(ApiError::InvalidCredentials)?;
        verify_password(&req.password, &row.password)?;

        let user = row.to_user()?;
        let pair = st.tokens.issue_token_pair(&user.token_payload())?;
        Ok((user, pair))
    })
    .await??;

    info!("User {} logged in", user.id);

    let jar = jar.add(refresh_cookie(&state, &pair.refresh_token));
    Ok((jar, Json(auth_response(&user, pair))))
}

/// Exchange the refresh cookie for a new pair. The old refresh token stops
/// working the moment this succeeds.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<AuthResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(ApiError::Unauthorized)?;

    let st = state.clone();
    let (user, pair) = tokio::task::spawn_blocking(move || -> ApiResult<(User, TokenPair)> {
        let pair = st
            .tokens
            .rotate_tokens(&presented)?
            .ok_or(ApiError::Unauthorized)?;
        let payload = st
            .tokens
            .verify_access_token(&pair.access_token)
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("fresh access token did not verify")))?;
        let user = st
            .db
            .get_user_by_id(payload.id)?
            .ok_or(ApiError::Unauthorized)?
            .to_user()?;
        Ok((user, pair))
    })
    .await??;

    let jar = jar.add(refresh_cookie(&state, &pair.refresh_token));
    Ok((jar, Json(auth_response(&user, pair))))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<TokenPayload>,
    jar: CookieJar,
) -> ApiResult<(StatusCode, CookieJar)> {
    let st = state.clone();
    tokio::task::spawn_blocking(move || st.tokens.revoke(user.id)).await??;

    let jar = jar.remove(Cookie::build(REFRESH_COOKIE).path(REFRESH_COOKIE_PATH));
    Ok((StatusCode::NO_CONTENT, jar))
}

/// Activate the account with the one-time passcode sent at signup.
pub async fn activate(
    State(state): State<AppState>,
    Extension(user): Extension<TokenPayload>,
    Json(req): Json<ActivateRequest>,
) -> ApiResult<StatusCode> {
    let st = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        if !st.tokens.consume_otp(user.id, req.code.trim())? {
            return Err(ApiError::InvalidCode);
        }
        st.db.set_activated(user.id)?;
        Ok(())
    })
    .await??;

    info!("User {} activated", user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the pending passcode with a fresh one and send it again.
pub async fn resend_otp(
    State(state): State<AppState>,
    Extension(user): Extension<TokenPayload>,
) -> ApiResult<StatusCode> {
    let st = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        let row = st
            .db
            .get_user_by_id(user.id)?
            .ok_or(ApiError::Unauthorized)?;
        if row.is_activated {
            return Err(ApiError::Validation("Account is already activated".into()));
        }
        deliver_activation_code(&st, user.id, &row.email)
    })
    .await??;

    Ok(StatusCode::ACCEPTED)
}

/// Always 202, whether or not the address belongs to an account.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<StatusCode> {
    let email = normalize_email(&req.email);

    let st = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        let Some(row) = st.db.get_user_by_email(&email)? else {
            return Ok(());
        };
        let user = row.to_user()?;
        if let Some(token) = st.tokens.issue_password_reset_token(user.id)? {
            if let Err(e) = st.mailer.send_password_reset(&user.email, &token) {
                warn!("Failed to deliver reset token to user {}: {:#}", user.id, e);
            }
        }
        Ok(())
    })
    .await??;

    Ok(StatusCode::ACCEPTED)
}

/// Set a new password with a mailed reset token. Every session is logged out.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<StatusCode> {
    let email = normalize_email(&req.email);
    validate_password(&req.password)?;

    let st = state.clone();
    let user_id = tokio::task::spawn_blocking(move || -> ApiResult<Uuid> {
        let row = st
            .db
            .get_user_by_email(&email)?
            .ok_or(ApiError::InvalidCode)?;
        let user = row.to_user()?;

        if !st
            .tokens
            .verify_and_consume_password_reset_token(user.id, req.token.trim())?
        {
            return Err(ApiError::InvalidCode);
        }

        let password_hash = hash_password(&req.password)?;
        st.db.update_password(user.id, &password_hash)?;
        st.tokens.revoke(user.id)?;
        Ok(user.id)
    })
    .await??;

    info!("User {} reset their password", user_id);
    Ok(StatusCode::NO_CONTENT)
}

// -- Helpers --

fn auth_response(user: &User, pair: TokenPair) -> AuthResponse {
    AuthResponse {
        access_token: pair.access_token,
        user: user.token_payload(),
        is_activated: user.is_activated,
    }
}

fn refresh_cookie(state: &AppStateInner, token: &str) -> Cookie<'static> {
    let max_age = state.tokens.config().refresh_ttl.num_seconds();
    Cookie::build((REFRESH_COOKIE, token.to_string()))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(time::Duration::seconds(max_age))
        .secure(state.cookie_secure)
        .build()
}

fn deliver_activation_code(state: &AppStateInner, user_id: Uuid, email: &str) -> ApiResult<()> {
    let code = state
        .tokens
        .issue_otp(user_id)?
        .ok_or(ApiError::Unauthorized)?;
    if let Err(e) = state.mailer.send_activation_code(email, code) {
        warn!("Failed to deliver activation code to user {}: {:#}", user_id, e);
    }
    Ok(())
}

fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored_hash: &str) -> ApiResult<()> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored password hash unreadable: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> ApiResult<()> {
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(ApiError::Validation("Email address is invalid".into()));
    }
    Ok(())
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_name(field: &str, value: &str) -> ApiResult<()> {
    let len = value.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "{field} must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use hush_auth::{SystemClock, TokenConfig, TokenService};
    use hush_crypto::MessageCipher;
    use hush_db::Database;
    use hush_gateway::{ChatGateway, Dispatcher};

    use super::*;
    use crate::mailer::LogMailer;

    fn state(cookie_secure: bool) -> AppStateInner {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let tokens = TokenService::new(
            TokenConfig::new("access", "refresh"),
            db.clone(),
            Arc::new(SystemClock),
        );
        let cipher = MessageCipher::new("unit passphrase").unwrap();
        let gateway = ChatGateway::new(Dispatcher::new(), db.clone(), cipher.clone(), tokens.clone());
        AppStateInner {
            db,
            tokens,
            cipher,
            gateway,
            mailer: Arc::new(LogMailer),
            cookie_secure,
        }
    }

    #[test]
    fn refresh_cookie_attributes() {
        let cookie = refresh_cookie(&state(true), "tok");
        assert_eq!(cookie.name(), REFRESH_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some(REFRESH_COOKIE_PATH));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));

        let plain = refresh_cookie(&state(false), "tok");
        assert!(!plain.to_string().contains("Secure"));
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).is_ok());
        assert!(matches!(
            verify_password("battery staple", &hash),
            Err(ApiError::InvalidCredentials)
        ));
    }

    #[test]
    fn email_is_normalised_and_checked() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("ada").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ada@localhost").is_err());
    }

    #[test]
    fn short_passwords_and_blank_names_are_rejected() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
        assert!(validate_name("Nickname", "   ").is_err());
        assert!(validate_name("Nickname", "ada").is_ok());
    }
}
