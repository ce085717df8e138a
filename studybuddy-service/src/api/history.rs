//! History and profile endpoints.

use axum::{
    Json,
    extract::{Query, State},
};
use std::sync::Arc;

use super::{AppState, AuthUser};
use crate::error::I18nError;
use crate::ollama::CompletionClient;
use crate::service::{Page, Profile, QuizAttemptPage, QuizHistory};

/// Quizzes newest first, each with the caller's attempts
pub async fn quiz_history_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    Query(page): Query<Page>,
) -> Result<Json<QuizHistory>, I18nError> {
    let history = state
        .service
        .quiz_history(&user, page)
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(history))
}

pub async fn quiz_attempts_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    Query(page): Query<Page>,
) -> Result<Json<QuizAttemptPage>, I18nError> {
    let attempts = state
        .service
        .quiz_attempts(&user, page)
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(attempts))
}

/// Account details with activity counts
pub async fn profile_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
) -> Result<Json<Profile>, I18nError> {
    let profile = state
        .service
        .profile(&user)
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(profile))
}
