//! Database module for SQLite operations.
//!
//! This module provides the `Database` struct and all database operations
//! organized into submodules by domain.

mod attempts;
mod doubts;
mod migrations;
pub mod models;
mod quizzes;
mod sessions;
mod users;

pub use models::{ConversationTurn, Doubt, NewDoubt, NewQuiz, NewQuizAttempt, Quiz, QuizAttempt, User};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{DatabaseError, ServiceError, ServiceResult};

/// Database manager for SQLite operations
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open(path: &Path) -> ServiceResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ServiceError::Database(DatabaseError::Connection(
                    rusqlite::Error::ToSqlConversionFailure(Box::new(e)),
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(DatabaseError::Connection)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;

        Self::with_connection(conn)
    }

    /// Fresh private database
    #[cfg(test)]
    pub fn open_in_memory() -> ServiceResult<Self> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::Connection)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;

        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> ServiceResult<Self> {
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> ServiceResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| ServiceError::Internal {
            message: "database connection lock poisoned".to_string(),
        })
    }
}
