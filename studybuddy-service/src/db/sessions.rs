//! Bearer session storage. Only token digests are persisted.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{User, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Store a session and drop any that have already expired
    pub fn insert_session(
        &self,
        token_hash: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![format_timestamp(now)],
        )
        .map_err(DatabaseError::Query)?;

        conn.execute(
            "INSERT INTO sessions (token_hash, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                token_hash,
                user_id,
                format_timestamp(expires_at),
                format_timestamp(now)
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// The user owning an unexpired session with this digest
    pub fn user_for_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<User>> {
        let conn = self.conn()?;

        conn.query_row(
            r#"
            SELECT u.id, u.email, u.username, u.hashed_password, u.is_active, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ?1 AND s.expires_at > ?2
            "#,
            params![token_hash, format_timestamp(now)],
            User::from_row,
        )
        .optional()
        .map_err(|e| DatabaseError::Query(e).into())
    }
}
