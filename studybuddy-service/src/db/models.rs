//! Database model structs.
//!
//! This module contains the data structures for database records.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::quiz::GeneratedQuestionSet;

/// Fixed-width RFC 3339 so stored timestamps sort as text
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Account record
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub(crate) const COLUMNS: &'static str =
        "id, email, username, hashed_password, is_active, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at_str: String = row.get(5)?;

        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            username: row.get(2)?,
            hashed_password: row.get(3)?,
            is_active: row.get(4)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Stored quiz
#[derive(Debug, Clone, Serialize)]
pub struct Quiz {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    /// One question set per processed section
    pub content: Vec<GeneratedQuestionSet>,
    pub filename: Option<String>,
    #[serde(skip_serializing)]
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Quiz {
    pub(crate) const COLUMNS: &'static str =
        "id, user_id, title, content, filename, file_path, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let content_str: String = row.get(3)?;
        let created_at_str: String = row.get(6)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            content: serde_json::from_str(&content_str).unwrap_or_default(),
            filename: row.get(4)?,
            file_path: row.get(5)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    pub fn total_questions(&self) -> usize {
        self.content.iter().map(GeneratedQuestionSet::len).sum()
    }
}

/// Quiz to be inserted
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub user_id: i64,
    pub title: String,
    pub content: Vec<GeneratedQuestionSet>,
    pub filename: Option<String>,
    pub file_path: Option<String>,
}

/// A submitted quiz attempt
#[derive(Debug, Clone, Serialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,
    /// Answers as submitted by the client
    pub answers: serde_json::Value,
    pub score: f64,
    pub total_questions: i64,
    pub time_taken: Option<f64>,
    pub completed_at: DateTime<Utc>,
}

impl QuizAttempt {
    pub(crate) const COLUMNS: &'static str =
        "id, user_id, quiz_id, answers, score, total_questions, time_taken, completed_at";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let answers_str: String = row.get(3)?;
        let completed_at_str: String = row.get(7)?;

        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            quiz_id: row.get(2)?,
            answers: serde_json::from_str(&answers_str).unwrap_or(serde_json::Value::Null),
            score: row.get(4)?,
            total_questions: row.get(5)?,
            time_taken: row.get(6)?,
            completed_at: parse_timestamp(&completed_at_str),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewQuizAttempt {
    pub user_id: i64,
    pub quiz_id: i64,
    pub answers: serde_json::Value,
    pub score: f64,
    pub total_questions: i64,
    pub time_taken: Option<f64>,
}

/// One message of a doubt conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A solved doubt
#[derive(Debug, Clone, Serialize)]
pub struct Doubt {
    pub id: i64,
    pub question: String,
    pub answer: String,
    /// Comma-separated subject list as submitted
    pub subjects: String,
    pub conversation_history: Vec<ConversationTurn>,
    pub context_filename: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Doubt {
    pub(crate) const COLUMNS: &'static str =
        "id, question, answer, subjects, conversation_history, context_filename, created_at";

    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let history_str: String = row.get(4)?;
        let created_at_str: String = row.get(6)?;

        Ok(Self {
            id: row.get(0)?,
            question: row.get(1)?,
            answer: row.get(2)?,
            subjects: row.get(3)?,
            conversation_history: serde_json::from_str(&history_str).unwrap_or_default(),
            context_filename: row.get(5)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewDoubt {
    pub user_id: i64,
    pub question: String,
    pub answer: String,
    pub subjects: String,
    pub conversation_history: Vec<ConversationTurn>,
    pub context_filename: Option<String>,
}
