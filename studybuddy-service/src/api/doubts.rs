//! Doubt endpoints: solving and history.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{AppState, AuthUser, FormParts};
use crate::db::Doubt;
use crate::error::I18nError;
use crate::ollama::CompletionClient;
use crate::service::{DoubtAnswer, DoubtPage, DoubtRequest, Page};

/// `GET /api/doubt-history` query parameters
#[derive(Debug, Deserialize)]
pub struct DoubtHistoryParams {
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
    pub subject: Option<String>,
}

impl DoubtHistoryParams {
    fn page(&self) -> Page {
        Page {
            skip: self.skip,
            limit: self.limit.unwrap_or(Page::default().limit),
        }
    }
}

/// Answer an academic question, optionally with a document or image
pub async fn solve_doubt_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    multipart: Multipart,
) -> Result<Json<DoubtAnswer>, I18nError> {
    let mut form = FormParts::read(multipart)
        .await
        .map_err(|e| state.i18n_error(e))?;

    let request = DoubtRequest {
        question: form.text("question").unwrap_or_default(),
        subjects: form.text("subjects"),
        conversation: form.text("conversation"),
        context_document: form.file("context_pdf"),
        context_image: form.file("context_image"),
    };

    let answer = state
        .service
        .solve_doubt(&user, request)
        .await
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(answer))
}

pub async fn doubt_history_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    Query(params): Query<DoubtHistoryParams>,
) -> Result<Json<DoubtPage>, I18nError> {
    let page = state
        .service
        .doubt_history(&user, params.page(), params.subject.as_deref())
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(page))
}

pub async fn doubt_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    Path(doubt_id): Path<i64>,
) -> Result<Json<Doubt>, I18nError> {
    let doubt = state
        .service
        .doubt(&user, doubt_id)
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(doubt))
}
