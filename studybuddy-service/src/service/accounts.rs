//! Registration, login and bearer token checks.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::StudyBuddyService;
use crate::auth::{generate_token, hash_password, token_digest, verify_password};
use crate::db::User;
use crate::error::{AuthError, ServiceError, ServiceResult};
use crate::ollama::CompletionClient;

/// Registration request body
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Issued after a successful login
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
}

impl<C: CompletionClient> StudyBuddyService<C> {
    pub async fn register(&self, account: NewAccount) -> ServiceResult<User> {
        let email = account.email.trim().to_string();
        let username = account.username.trim().to_string();
        if !looks_like_email(&email) || username.is_empty() || account.password.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: self.message("error-invalid-account"),
            });
        }

        if self.db.get_user_by_email(&email)?.is_some() {
            return Err(AuthError::EmailTaken.into());
        }
        if self.db.get_user_by_username(&username)?.is_some() {
            return Err(AuthError::UsernameTaken.into());
        }

        let password = account.password;
        let hashed = blocking(move || hash_password(&password)).await??;
        let user = self.db.create_user(&email, &username, &hashed)?;

        info!(user_id = user.id, username = %user.username, "Registered user");
        Ok(user)
    }

    /// Check credentials and open a session
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<AccessToken> {
        let user = self
            .db
            .get_user_by_username(username.trim())?
            .ok_or(AuthError::InvalidCredentials)?;

        let password = password.to_string();
        let hashed = user.hashed_password.clone();
        if !blocking(move || verify_password(&password, &hashed)).await? {
            debug!(username = %user.username, "Rejected login");
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = generate_token();
        let expires_at = Utc::now() + Duration::minutes(self.config.auth.token_ttl_minutes);
        self.db
            .insert_session(&token_digest(&token), user.id, expires_at)?;

        info!(user_id = user.id, "User logged in");
        Ok(AccessToken {
            access_token: token,
            token_type: "bearer",
        })
    }

    /// Resolve a bearer token to an active user
    pub fn authenticate(&self, token: &str) -> ServiceResult<User> {
        let user = self
            .db
            .user_for_session(&token_digest(token), Utc::now())?
            .ok_or(AuthError::InvalidToken)?;

        if !user.is_active {
            return Err(AuthError::InactiveUser.into());
        }
        Ok(user)
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

/// Run password work on the blocking pool
async fn blocking<T, F>(f: F) -> ServiceResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Password task failed: {}", e),
        })
}
