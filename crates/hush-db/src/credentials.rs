use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use hush_types::models::{AccessSession, OtpCredential, PasswordResetCredential};

use crate::store::CredentialStore;
use crate::{Database, OptionalExt, from_db_time, parse_uuid, to_db_time};

impl CredentialStore for Database {
    fn get_access_session(&self, user_id: Uuid) -> Result<Option<AccessSession>> {
        self.with_conn(|conn| query_access_session(conn, user_id))
    }

    fn set_refresh_token(
        &self,
        user_id: Uuid,
        token: Option<&str>,
    ) -> Result<Option<AccessSession>> {
        self.with_conn(|conn| {
            if !user_exists(conn, user_id)? {
                return Ok(None);
            }
            let now = to_db_time(Utc::now());
            conn.execute(
                "INSERT INTO access_sessions (id, user_id, refresh_token, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                     refresh_token = excluded.refresh_token,
                     updated_at = excluded.updated_at",
                rusqlite::params![Uuid::new_v4().to_string(), user_id.to_string(), token, now],
            )?;
            query_access_session(conn, user_id)
        })
    }

    fn swap_refresh_token(&self, user_id: Uuid, expected: &str, new: &str) -> Result<bool> {
        self.with_conn(|conn| {
            // Compare and overwrite in one statement: of two racing rotations
            // with the same token, only the first matches.
            let changed = conn.execute(
                "UPDATE access_sessions SET refresh_token = ?3, updated_at = ?4
                 WHERE user_id = ?1 AND refresh_token = ?2",
                rusqlite::params![user_id.to_string(), expected, new, to_db_time(Utc::now())],
            )?;
            Ok(changed == 1)
        })
    }

    fn get_otp(&self, user_id: Uuid) -> Result<Option<OtpCredential>> {
        self.with_conn(|conn| query_otp(conn, user_id))
    }

    fn set_otp(
        &self,
        user_id: Uuid,
        code: Option<u32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<OtpCredential>> {
        self.with_conn(|conn| {
            if !user_exists(conn, user_id)? {
                return Ok(None);
            }
            conn.execute(
                "INSERT INTO otp_credentials (id, user_id, code, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                     code = excluded.code,
                     expires_at = excluded.expires_at",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    code,
                    expires_at.map(to_db_time)
                ],
            )?;
            query_otp(conn, user_id)
        })
    }

    fn get_password_reset_token(&self, user_id: Uuid) -> Result<Option<PasswordResetCredential>> {
        self.with_conn(|conn| query_password_reset(conn, user_id))
    }

    fn set_password_reset_token(
        &self,
        user_id: Uuid,
        token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<PasswordResetCredential>> {
        self.with_conn(|conn| {
            if !user_exists(conn, user_id)? {
                return Ok(None);
            }
            conn.execute(
                "INSERT INTO password_resets (id, user_id, token, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                     token = excluded.token,
                     expires_at = excluded.expires_at",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    user_id.to_string(),
                    token,
                    expires_at.map(to_db_time)
                ],
            )?;
            query_password_reset(conn, user_id)
        })
    }

    fn clear_expired_credentials(&self, now: DateTime<Utc>) -> Result<usize> {
        let now = to_db_time(now);
        self.with_conn(|conn| {
            let otps = conn.execute(
                "UPDATE otp_credentials SET code = NULL, expires_at = NULL
                 WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [&now],
            )?;
            let resets = conn.execute(
                "UPDATE password_resets SET token = NULL, expires_at = NULL
                 WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                [&now],
            )?;
            Ok(otps + resets)
        })
    }
}

fn user_exists(conn: &Connection, user_id: Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ?1",
            [user_id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_access_session(conn: &Connection, user_id: Uuid) -> Result<Option<AccessSession>> {
    let row = conn
        .query_row(
            "SELECT id, refresh_token, created_at, updated_at
             FROM access_sessions WHERE user_id = ?1",
            [user_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, refresh_token, created_at, updated_at)| -> Result<AccessSession> {
        Ok(AccessSession {
            id: parse_uuid(&id)?,
            user_id,
            refresh_token,
            created_at: from_db_time(&created_at)?,
            updated_at: from_db_time(&updated_at)?,
        })
    })
    .transpose()
}

fn query_otp(conn: &Connection, user_id: Uuid) -> Result<Option<OtpCredential>> {
    let row = conn
        .query_row(
            "SELECT id, code, expires_at FROM otp_credentials WHERE user_id = ?1",
            [user_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<u32>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, code, expires_at)| -> Result<OtpCredential> {
        Ok(OtpCredential {
            id: parse_uuid(&id)?,
            user_id,
            code,
            expires_at: expires_at.as_deref().map(from_db_time).transpose()?,
        })
    })
    .transpose()
}

fn query_password_reset(conn: &Connection, user_id: Uuid) -> Result<Option<PasswordResetCredential>> {
    let row = conn
        .query_row(
            "SELECT id, token, expires_at FROM password_resets WHERE user_id = ?1",
            [user_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, token, expires_at)| -> Result<PasswordResetCredential> {
        Ok(PasswordResetCredential {
            id: parse_uuid(&id)?,
            user_id,
            token,
            expires_at: expires_at.as_deref().map(from_db_time).transpose()?,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::queries::NewUser;

    fn db_with_user() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user = db
            .create_user(&NewUser {
                email: "ada@example.com",
                password_hash: "hash",
                first_name: "Ada",
                last_name: "Lovelace",
                nickname: "ada",
            })
            .unwrap();
        (db, user.id)
    }

    #[test]
    fn refresh_token_is_overwritten_not_appended() {
        let (db, uid) = db_with_user();

        let first = db.set_refresh_token(uid, Some("one")).unwrap().unwrap();
        let second = db.set_refresh_token(uid, Some("two")).unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.refresh_token.as_deref(), Some("two"));

        db.set_refresh_token(uid, None).unwrap();
        let session = db.get_access_session(uid).unwrap().unwrap();
        assert_eq!(session.refresh_token, None);
    }

    #[test]
    fn setters_return_none_for_unknown_user() {
        let db = Database::open_in_memory().unwrap();
        let ghost = Uuid::new_v4();
        assert!(db.set_refresh_token(ghost, Some("t")).unwrap().is_none());
        assert!(db.set_otp(ghost, Some(123456), None).unwrap().is_none());
        assert!(db.set_password_reset_token(ghost, Some("t"), None).unwrap().is_none());
    }

    #[test]
    fn swap_only_matches_current_value() {
        let (db, uid) = db_with_user();
        db.set_refresh_token(uid, Some("current")).unwrap();

        assert!(!db.swap_refresh_token(uid, "stale", "next").unwrap());
        assert!(db.swap_refresh_token(uid, "current", "next").unwrap());
        assert!(!db.swap_refresh_token(uid, "current", "again").unwrap());

        let session = db.get_access_session(uid).unwrap().unwrap();
        assert_eq!(session.refresh_token.as_deref(), Some("next"));
    }

    #[test]
    fn otp_roundtrips_with_expiry() {
        let (db, uid) = db_with_user();
        let expires = Utc::now() + Duration::hours(24);

        db.set_otp(uid, Some(483920), Some(expires)).unwrap();
        let otp = db.get_otp(uid).unwrap().unwrap();
        assert_eq!(otp.code, Some(483920));
        assert_eq!(
            otp.expires_at.map(|t| t.timestamp_micros()),
            Some(expires.timestamp_micros())
        );
    }

    #[test]
    fn cleanup_clears_only_expired_credentials() {
        let (db, uid) = db_with_user();
        let now = Utc::now();

        db.set_otp(uid, Some(111111), Some(now - Duration::seconds(1))).unwrap();
        db.set_password_reset_token(uid, Some("live"), Some(now + Duration::hours(1)))
            .unwrap();

        assert_eq!(db.clear_expired_credentials(now).unwrap(), 1);
        assert_eq!(db.get_otp(uid).unwrap().unwrap().code, None);
        assert_eq!(
            db.get_password_reset_token(uid).unwrap().unwrap().token.as_deref(),
            Some("live")
        );
    }
}
