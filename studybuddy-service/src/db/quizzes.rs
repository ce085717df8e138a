//! Quiz CRUD operations. Every lookup is scoped to the owning user.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{NewQuiz, Quiz, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Insert a quiz and return its id
    pub fn insert_quiz(&self, quiz: &NewQuiz) -> ServiceResult<i64> {
        let conn = self.conn()?;

        let content_json =
            serde_json::to_string(&quiz.content).map_err(DatabaseError::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO quizzes (user_id, title, content, filename, file_path, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                quiz.user_id,
                quiz.title,
                content_json,
                quiz.filename,
                quiz.file_path,
                format_timestamp(Utc::now()),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get_quiz(&self, user_id: i64, quiz_id: i64) -> ServiceResult<Option<Quiz>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM quizzes WHERE id = ?1 AND user_id = ?2",
                Quiz::COLUMNS
            ),
            params![quiz_id, user_id],
            Quiz::from_row,
        )
        .optional()
        .map_err(|e| DatabaseError::Query(e).into())
    }

    /// Newest first
    pub fn list_quizzes(&self, user_id: i64, skip: usize, limit: usize) -> ServiceResult<Vec<Quiz>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM quizzes WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                Quiz::COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![user_id, limit as i64, skip as i64], Quiz::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    pub fn count_quizzes(&self, user_id: i64) -> ServiceResult<usize> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM quizzes WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;

        Ok(count as usize)
    }
}
