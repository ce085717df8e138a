//! Quiz attempt storage.

use chrono::Utc;
use rusqlite::params;

use super::Database;
use super::models::{NewQuizAttempt, QuizAttempt, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    pub fn insert_quiz_attempt(&self, attempt: &NewQuizAttempt) -> ServiceResult<i64> {
        let conn = self.conn()?;

        let answers_json =
            serde_json::to_string(&attempt.answers).map_err(DatabaseError::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO quiz_attempts (user_id, quiz_id, answers, score, total_questions, time_taken, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                attempt.user_id,
                attempt.quiz_id,
                answers_json,
                attempt.score,
                attempt.total_questions,
                attempt.time_taken,
                format_timestamp(Utc::now()),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(conn.last_insert_rowid())
    }

    /// All of a user's attempts at one quiz, newest first
    pub fn attempts_for_quiz(&self, user_id: i64, quiz_id: i64) -> ServiceResult<Vec<QuizAttempt>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM quiz_attempts WHERE user_id = ?1 AND quiz_id = ?2 ORDER BY completed_at DESC, id DESC",
                QuizAttempt::COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![user_id, quiz_id], QuizAttempt::from_row)
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// A page of a user's attempts across all quizzes, newest first
    pub fn list_quiz_attempts(
        &self,
        user_id: i64,
        skip: usize,
        limit: usize,
    ) -> ServiceResult<Vec<QuizAttempt>> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM quiz_attempts WHERE user_id = ?1 ORDER BY completed_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                QuizAttempt::COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(
                params![user_id, limit as i64, skip as i64],
                QuizAttempt::from_row,
            )
            .map_err(DatabaseError::Query)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    pub fn count_quiz_attempts(&self, user_id: i64) -> ServiceResult<usize> {
        let conn = self.conn()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM quiz_attempts WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewQuiz;

    #[test]
    fn test_attempts_listed_per_quiz_and_user() {
        let db = Database::open_in_memory().unwrap();
        let ada = db.create_user("ada@example.com", "ada", "h").unwrap();
        let quiz_id = db
            .insert_quiz(&NewQuiz {
                user_id: ada.id,
                title: "t".to_string(),
                content: Vec::new(),
                filename: None,
                file_path: None,
            })
            .unwrap();

        for score in [2.0, 5.0] {
            db.insert_quiz_attempt(&NewQuizAttempt {
                user_id: ada.id,
                quiz_id,
                answers: serde_json::json!({"question1": "opt2"}),
                score,
                total_questions: 5,
                time_taken: Some(42.5),
            })
            .unwrap();
        }

        let attempts = db.attempts_for_quiz(ada.id, quiz_id).unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].score, 5.0);
        assert_eq!(attempts[0].answers["question1"], "opt2");

        assert_eq!(db.list_quiz_attempts(ada.id, 1, 20).unwrap().len(), 1);
        assert_eq!(db.count_quiz_attempts(ada.id).unwrap(), 2);
    }

    #[test]
    fn test_attempt_requires_existing_quiz() {
        let db = Database::open_in_memory().unwrap();
        let ada = db.create_user("ada@example.com", "ada", "h").unwrap();
        let result = db.insert_quiz_attempt(&NewQuizAttempt {
            user_id: ada.id,
            quiz_id: 999,
            answers: serde_json::Value::Null,
            score: 0.0,
            total_questions: 0,
            time_taken: None,
        });
        assert!(result.is_err());
    }
}
