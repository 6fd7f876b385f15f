use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::error;

use messagely_types::models::{
    Message, MessageDetail, NewUser, ReadReceipt, ReceivedMessage, SentMessage, User,
    UserSummary,
};

use crate::models::{ExpandedRow, UserRow};
use crate::{Database, Result, StoreError};

impl Database {
    // -- Users --

    /// Insert a new user with an already-hashed password.
    pub fn create_user(
        &self,
        user: &NewUser,
        password_hash: &str,
        join_at: DateTime<Utc>,
    ) -> Result<User> {
        self.with_conn(|conn| {
            if user_exists(conn, &user.username)? {
                return Err(StoreError::DuplicateUser(user.username.clone()));
            }

            conn.execute(
                "INSERT INTO users
                     (username, password, first_name, last_name, phone, join_at, last_login_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
                rusqlite::params![
                    user.username,
                    password_hash,
                    user.first_name,
                    user.last_name,
                    user.phone,
                    join_at
                ],
            )?;

            Ok(User {
                username: user.username.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                phone: user.phone.clone(),
                join_at,
                last_login_at: None,
            })
        })
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| user_exists(conn, username))
    }

    pub fn get_user(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, username))
    }

    pub fn touch_login(&self, username: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET last_login_at = ?2 WHERE username = ?1",
                rusqlite::params![username, at],
            )?;
            if updated == 0 {
                return Err(StoreError::UserNotFound(username.to_string()));
            }
            Ok(())
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT username, first_name, last_name, phone FROM users ORDER BY username",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(UserSummary {
                        username: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        phone: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Messages sent by `username`, recipient expanded, oldest first.
    pub fn messages_from(&self, username: &str) -> Result<Vec<SentMessage>> {
        self.with_conn(|conn| {
            require_user(conn, username)?;

            // JOIN users to expand the recipient in a single query (no N+1)
            let rows = query_expanded(
                conn,
                "SELECT m.id, m.to_username, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 LEFT JOIN users u ON u.username = m.to_username
                 WHERE m.from_username = ?1
                 ORDER BY m.id",
                username,
            )?;

            rows.into_iter()
                .map(|row| -> Result<SentMessage> {
                    let to_user = row
                        .counterpart
                        .ok_or_else(|| missing_counterpart(row.id, &row.counterpart_username))?;
                    Ok(SentMessage {
                        id: row.id,
                        to_user,
                        body: row.body,
                        sent_at: row.sent_at,
                        read_at: row.read_at,
                    })
                })
                .collect()
        })
    }

    /// Messages received by `username`, sender expanded, oldest first.
    pub fn messages_to(&self, username: &str) -> Result<Vec<ReceivedMessage>> {
        self.with_conn(|conn| {
            require_user(conn, username)?;

            let rows = query_expanded(
                conn,
                "SELECT m.id, m.from_username, m.body, m.sent_at, m.read_at,
                        u.username, u.first_name, u.last_name, u.phone
                 FROM messages m
                 LEFT JOIN users u ON u.username = m.from_username
                 WHERE m.to_username = ?1
                 ORDER BY m.id",
                username,
            )?;

            rows.into_iter()
                .map(|row| -> Result<ReceivedMessage> {
                    let from_user = row
                        .counterpart
                        .ok_or_else(|| missing_counterpart(row.id, &row.counterpart_username))?;
                    Ok(ReceivedMessage {
                        id: row.id,
                        from_user,
                        body: row.body,
                        sent_at: row.sent_at,
                        read_at: row.read_at,
                    })
                })
                .collect()
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        from_username: &str,
        to_username: &str,
        body: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<Message> {
        self.with_conn(|conn| {
            require_user(conn, from_username)?;
            require_user(conn, to_username)?;

            conn.execute(
                "INSERT INTO messages (from_username, to_username, body, sent_at, read_at)
                 VALUES (?1, ?2, ?3, ?4, NULL)",
                rusqlite::params![from_username, to_username, body, sent_at],
            )?;

            Ok(Message {
                id: conn.last_insert_rowid(),
                from_username: from_username.to_string(),
                to_username: to_username.to_string(),
                body: body.to_string(),
                sent_at,
                read_at: None,
            })
        })
    }

    /// A single message with both participants expanded.
    pub fn get_message(&self, id: i64) -> Result<MessageDetail> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.body, m.sent_at, m.read_at,
                        m.from_username, f.username, f.first_name, f.last_name, f.phone,
                        m.to_username, t.username, t.first_name, t.last_name, t.phone
                 FROM messages m
                 LEFT JOIN users f ON f.username = m.from_username
                 LEFT JOIN users t ON t.username = m.to_username
                 WHERE m.id = ?1",
            )?;

            let row = stmt
                .query_row([id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, DateTime<Utc>>(2)?,
                        row.get::<_, Option<DateTime<Utc>>>(3)?,
                        row.get::<_, String>(4)?,
                        summary_at(row, 5)?,
                        row.get::<_, String>(9)?,
                        summary_at(row, 10)?,
                    ))
                })
                .optional()?
                .ok_or(StoreError::MessageNotFound(id))?;

            let (id, body, sent_at, read_at, from_username, from_user, to_username, to_user) = row;
            let from_user = from_user.ok_or_else(|| missing_counterpart(id, &from_username))?;
            let to_user = to_user.ok_or_else(|| missing_counterpart(id, &to_username))?;

            Ok(MessageDetail {
                id,
                body,
                sent_at,
                read_at,
                from_user,
                to_user,
            })
        })
    }

    /// Set `read_at` once. Later calls return the existing receipt unchanged.
    /// The stored timestamp is never earlier than `sent_at`.
    pub fn mark_read(&self, id: i64, now: DateTime<Utc>) -> Result<ReadReceipt> {
        self.with_conn(|conn| {
            let (sent_at, read_at): (DateTime<Utc>, Option<DateTime<Utc>>) = conn
                .query_row(
                    "SELECT sent_at, read_at FROM messages WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or(StoreError::MessageNotFound(id))?;

            if let Some(read_at) = read_at {
                return Ok(ReadReceipt { id, read_at });
            }

            let read_at = now.max(sent_at);
            conn.execute(
                "UPDATE messages SET read_at = ?2 WHERE id = ?1 AND read_at IS NULL",
                rusqlite::params![id, read_at],
            )?;

            Ok(ReadReceipt { id, read_at })
        })
    }
}

fn user_exists(conn: &Connection, username: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ?1",
            [username],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn require_user(conn: &Connection, username: &str) -> Result<()> {
    if user_exists(conn, username)? {
        Ok(())
    } else {
        Err(StoreError::UserNotFound(username.to_string()))
    }
}

fn query_user(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT username, password, first_name, last_name, phone, join_at, last_login_at
         FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                username: row.get(0)?,
                password: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                phone: row.get(4)?,
                join_at: row.get(5)?,
                last_login_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Runs a message query whose columns are
/// `id, counterpart_username, body, sent_at, read_at` followed by the four
/// counterpart user columns.
fn query_expanded(conn: &Connection, sql: &str, username: &str) -> Result<Vec<ExpandedRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map([username], |row| {
            Ok(ExpandedRow {
                id: row.get(0)?,
                counterpart_username: row.get(1)?,
                body: row.get(2)?,
                sent_at: row.get(3)?,
                read_at: row.get(4)?,
                counterpart: summary_at(row, 5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Reads four LEFT JOINed user columns starting at `idx`.
fn summary_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<UserSummary>> {
    let Some(username) = row.get::<_, Option<String>>(idx)? else {
        return Ok(None);
    };

    Ok(Some(UserSummary {
        username,
        first_name: row.get(idx + 1)?,
        last_name: row.get(idx + 2)?,
        phone: row.get(idx + 3)?,
    }))
}

fn missing_counterpart(message_id: i64, username: &str) -> StoreError {
    error!(
        "Message {} references missing user '{}'",
        message_id, username
    );
    StoreError::Integrity(format!(
        "message {} references missing user '{}'",
        message_id, username
    ))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
