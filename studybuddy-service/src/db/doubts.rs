//! Doubt history storage.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{Doubt, NewDoubt, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    pub fn insert_doubt(&self, doubt: &NewDoubt) -> ServiceResult<i64> {
        let conn = self.conn()?;

        let history_json = serde_json::to_string(&doubt.conversation_history)
            .map_err(DatabaseError::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO doubts (user_id, question, answer, subjects, conversation_history, context_filename, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                doubt.user_id,
                doubt.question,
                doubt.answer,
                doubt.subjects,
                history_json,
                doubt.context_filename,
                format_timestamp(Utc::now()),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get_doubt(&self, user_id: i64, doubt_id: i64) -> ServiceResult<Option<Doubt>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM doubts WHERE id = ?1 AND user_id = ?2",
                Doubt::COLUMNS
            ),
            params![doubt_id, user_id],
            Doubt::from_row,
        )
        .optional()
        .map_err(|e| DatabaseError::Query(e).into())
    }

    /// A page of doubts, newest first, optionally filtered by a subject substring.
    /// Returns the page and the total number of matching doubts.
    pub fn list_doubts(
        &self,
        user_id: i64,
        subject: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> ServiceResult<(Vec<Doubt>, usize)> {
        let conn = self.conn()?;
        let pattern = subject.map(|s| format!("%{}%", escape_like(s)));

        let total: i64 = conn
            .query_row(
                r"SELECT COUNT(*) FROM doubts WHERE user_id = ?1 AND (?2 IS NULL OR subjects LIKE ?2 ESCAPE '\')",
                params![user_id, pattern],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;

        let mut stmt = conn
            .prepare(&format!(
                r"SELECT {} FROM doubts WHERE user_id = ?1 AND (?2 IS NULL OR subjects LIKE ?2 ESCAPE '\') ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
                Doubt::COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let doubts = stmt
            .query_map(
                params![user_id, pattern, limit as i64, skip as i64],
                Doubt::from_row,
            )
            .map_err(DatabaseError::Query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)?;

        Ok((doubts, total as usize))
    }

    pub fn count_doubts(&self, user_id: i64) -> ServiceResult<usize> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM doubts WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;

        Ok(count as usize)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
