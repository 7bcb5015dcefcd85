use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Duration;

use hush_auth::TokenConfig;
use hush_crypto::keys::generate_passphrase;

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

/// Upper bound for every credential lifetime.
const MAX_LIFETIME_DAYS: i64 = 365;

/// Server settings, read once at startup. Holds secrets, so no `Debug`.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub tokens: TokenConfig,
    pub message_passphrase: String,
    pub cookie_secure: bool,
    pub cleanup_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let access_secret = required_secret(&lookup, "HUSH_JWT_ACCESS_SECRET")?;
        let refresh_secret = required_secret(&lookup, "HUSH_JWT_REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            bail!("HUSH_JWT_ACCESS_SECRET and HUSH_JWT_REFRESH_SECRET must differ");
        }

        let message_passphrase = lookup("HUSH_MESSAGE_PASSPHRASE").unwrap_or_default();
        if message_passphrase.trim().is_empty() {
            bail!(
                "HUSH_MESSAGE_PASSPHRASE is unset. Generate one and keep it safe; \
                 stored messages cannot be read without it. For example: {}",
                generate_passphrase()
            );
        }

        let lifetime = |key: &str,
                        default: &str,
                        unit: fn(i64) -> Option<Duration>|
         -> anyhow::Result<Duration> {
            let raw = parse::<i64>(&var(key, default), key)?;
            match unit(raw) {
                Some(ttl) if ttl > Duration::zero() && ttl <= Duration::days(MAX_LIFETIME_DAYS) => {
                    Ok(ttl)
                }
                _ => bail!("{key} must be positive and at most {MAX_LIFETIME_DAYS} days"),
            }
        };

        let mut tokens = TokenConfig::new(access_secret, refresh_secret);
        tokens.access_ttl = lifetime("HUSH_ACCESS_TTL_MINUTES", "15", Duration::try_minutes)?;
        tokens.refresh_ttl = lifetime("HUSH_REFRESH_TTL_DAYS", "7", Duration::try_days)?;
        tokens.otp_ttl = lifetime("HUSH_OTP_TTL_SECS", "86400", Duration::try_seconds)?;
        tokens.reset_ttl = lifetime("HUSH_RESET_TTL_SECS", "86400", Duration::try_seconds)?;

        Ok(Self {
            host: var("HUSH_HOST", "0.0.0.0"),
            port: parse(&var("HUSH_PORT", "3000"), "HUSH_PORT")?,
            db_path: var("HUSH_DB_PATH", "hush.db").into(),
            tokens,
            message_passphrase,
            cookie_secure: parse(&var("HUSH_COOKIE_SECURE", "true"), "HUSH_COOKIE_SECURE")?,
            cleanup_interval_secs: parse(
                &var("HUSH_CLEANUP_INTERVAL_SECS", "3600"),
                "HUSH_CLEANUP_INTERVAL_SECS",
            )?,
        })
    }
}

fn required_secret(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    let secret = lookup(key).unwrap_or_default();
    if secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
        bail!("{key} is unset or still a placeholder. Set it in your .env file and restart.");
    }
    Ok(secret)
}

fn parse<T>(raw: &str, key: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} has an invalid value: {raw:?}"))
}
