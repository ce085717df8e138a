//! Account CRUD operations.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{User, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Database {
    /// Insert a new active user and return it
    pub fn create_user(
        &self,
        email: &str,
        username: &str,
        hashed_password: &str,
    ) -> ServiceResult<User> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO users (email, username, hashed_password, is_active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
            params![email, username, hashed_password, format_timestamp(now)],
        )
        .map_err(DatabaseError::Query)?;

        Ok(User {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            username: username.to_string(),
            hashed_password: hashed_password.to_string(),
            is_active: true,
            created_at: now,
        })
    }

    #[cfg(test)]
    pub fn get_user(&self, id: i64) -> ServiceResult<Option<User>> {
        self.find_user("id = ?1", params![id])
    }

    pub fn get_user_by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        self.find_user("username = ?1", params![username])
    }

    pub fn get_user_by_email(&self, email: &str) -> ServiceResult<Option<User>> {
        self.find_user("email = ?1", params![email])
    }

    /// Activate or deactivate an account
    #[cfg(test)]
    pub fn set_user_active(&self, id: i64, active: bool) -> ServiceResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )
        .map_err(DatabaseError::Query)?;
        Ok(())
    }

    fn find_user(
        &self,
        filter: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> ServiceResult<Option<User>> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("SELECT {} FROM users WHERE {}", User::COLUMNS, filter),
            params,
            User::from_row,
        )
        .optional()
        .map_err(|e| DatabaseError::Query(e).into())
    }
}
