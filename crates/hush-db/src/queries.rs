use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use hush_types::models::{Chat, ChatKind, EncryptedMessage, User};
use hush_types::views::{ChatView, MessageView};

use crate::models::{ChatRow, MessageRow, UserRow};
use crate::store::ChatStore;
use crate::{Database, OptionalExt, parse_uuid, to_db_time};

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub nickname: &'a str,
}

impl Database {
    // -- Users --

    pub fn create_user(&self, new: &NewUser<'_>) -> Result<User> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, first_name, last_name, nickname, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    id.to_string(),
                    new.email,
                    new.password_hash,
                    new.first_name,
                    new.last_name,
                    new.nickname,
                    to_db_time(now)
                ],
            )?;
            Ok(())
        })?;

        Ok(User {
            id,
            email: new.email.to_string(),
            first_name: new.first_name.to_string(),
            last_name: new.last_name.to_string(),
            nickname: new.nickname.to_string(),
            is_activated: false,
            created_at: now,
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn set_activated(&self, user_id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_activated = 1, updated_at = ?2 WHERE id = ?1",
                rusqlite::params![user_id.to_string(), to_db_time(Utc::now())],
            )?;
            Ok(())
        })
    }

    pub fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![user_id.to_string(), password_hash, to_db_time(Utc::now())],
            )?;
            Ok(())
        })
    }
}

impl ChatStore for Database {
    fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        self.get_user_by_id(user_id)?
            .map(|row| row.to_user())
            .transpose()
    }

    fn get_or_create_direct_chat(&self, creator_id: Uuid, receiver_id: Uuid) -> Result<Chat> {
        let direct_key = direct_key(creator_id, receiver_id);
        self.with_conn(|conn| {
            if let Some(row) = query_chat_row(conn, "direct_key", &direct_key)? {
                return build_chat(conn, row);
            }

            let id = Uuid::new_v4();
            let now = to_db_time(Utc::now());
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO chats (id, kind, name, direct_key, created_at, updated_at)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?4)",
                rusqlite::params![id.to_string(), ChatKind::Direct.as_str(), direct_key, now],
            )?;
            for member in [creator_id, receiver_id] {
                tx.execute(
                    "INSERT INTO chat_members (chat_id, user_id) VALUES (?1, ?2)",
                    [id.to_string(), member.to_string()],
                )?;
            }
            tx.commit()?;

            let row = query_chat_row(conn, "id", &id.to_string())?
                .ok_or_else(|| anyhow!("chat {} vanished after insert", id))?;
            build_chat(conn, row)
        })
    }

    fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            query_chat_row(conn, "id", &chat_id.to_string())?
                .map(|row| build_chat(conn, row))
                .transpose()
        })
    }

    fn is_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
                    [chat_id.to_string(), user_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn insert_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        ciphertext: &str,
    ) -> Result<EncryptedMessage> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, ciphertext, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![
                    id.to_string(),
                    chat_id.to_string(),
                    sender_id.to_string(),
                    ciphertext,
                    to_db_time(now)
                ],
            )?;
            tx.execute(
                "UPDATE chats SET updated_at = ?2 WHERE id = ?1",
                [chat_id.to_string(), to_db_time(now)],
            )?;
            tx.commit()?;
            Ok(())
        })?;

        Ok(EncryptedMessage {
            id,
            chat_id,
            sender_id,
            ciphertext: ciphertext.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    fn messages_page(
        &self,
        chat_id: Uuid,
        limit: u32,
        before: Option<Uuid>,
    ) -> Result<Vec<MessageView>> {
        self.with_conn(|conn| query_messages(conn, chat_id, limit, before))
    }

    fn chats_for_user(&self, user_id: Uuid, preview: u32) -> Result<Vec<ChatView>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind, c.name, c.created_at, c.updated_at
                 FROM chats c
                 JOIN chat_members cm ON cm.chat_id = c.id
                 WHERE cm.user_id = ?1
                 ORDER BY c.updated_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], map_chat_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut chats = Vec::with_capacity(rows.len());
            for row in rows {
                let chat = build_chat(conn, row)?;
                let messages = query_messages(conn, chat.id, preview, None)?;
                chats.push(ChatView {
                    id: chat.id,
                    kind: chat.kind,
                    name: chat.name,
                    member_ids: chat.member_ids,
                    messages,
                    created_at: chat.created_at,
                    updated_at: chat.updated_at,
                });
            }
            Ok(chats)
        })
    }
}

/// Order-independent key for the direct chat between two users.
fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}", lo, hi)
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, password, first_name, last_name, nickname, is_activated, created_at
         FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                first_name: row.get(3)?,
                last_name: row.get(4)?,
                nickname: row.get(5)?,
                is_activated: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn map_chat_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn query_chat_row(conn: &Connection, column: &str, value: &str) -> Result<Option<ChatRow>> {
    let sql = format!(
        "SELECT id, kind, name, created_at, updated_at FROM chats WHERE {} = ?1",
        column
    );
    conn.query_row(&sql, [value], map_chat_row).optional()
}

fn build_chat(conn: &Connection, row: ChatRow) -> Result<Chat> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM chat_members WHERE chat_id = ?1 ORDER BY user_id")?;
    let member_ids = stmt
        .query_map([&row.id], |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .iter()
        .map(|id| parse_uuid(id))
        .collect::<Result<Vec<_>>>()?;

    let (created_at, updated_at) = row.timestamps()?;
    Ok(Chat {
        id: row.id()?,
        kind: row.kind()?,
        name: row.name,
        member_ids,
        created_at,
        updated_at,
    })
}

fn query_messages(
    conn: &Connection,
    chat_id: Uuid,
    limit: u32,
    before: Option<Uuid>,
) -> Result<Vec<MessageView>> {
    // Newest first so LIMIT keeps the latest page; reversed below. Equal
    // timestamps fall back to insertion order (rowid), and the cursor compares
    // on the same pair so ties are never skipped between pages. A cursor that
    // is not a message of this chat matches nothing.
    let mut stmt = conn.prepare(
        "SELECT m.id, m.chat_id, m.sender_id, u.first_name, u.last_name, u.nickname,
                m.ciphertext, m.created_at, m.updated_at
         FROM messages m
         JOIN users u ON m.sender_id = u.id
         WHERE m.chat_id = ?1
           AND (?2 IS NULL OR (m.created_at, m.rowid) <
                (SELECT c.created_at, c.rowid FROM messages c WHERE c.id = ?2 AND c.chat_id = ?1))
         ORDER BY m.created_at DESC, m.rowid DESC
         LIMIT ?3",
    )?;

    let rows = stmt
        .query_map(
            rusqlite::params![chat_id.to_string(), before.map(|id| id.to_string()), limit],
            |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    chat_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    sender_first_name: row.get(3)?,
                    sender_last_name: row.get(4)?,
                    sender_nickname: row.get(5)?,
                    ciphertext: row.get(6)?,
                    created_at: row.get(7)?,
                    updated_at: row.get(8)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut messages = rows
        .iter()
        .map(MessageRow::to_view)
        .collect::<Result<Vec<_>>>()?;
    messages.reverse();
    Ok(messages)
}
