//! Quiz endpoints: generation, attempts, retrieval and download.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::{AppState, AuthUser, FormParts, invalid_request};
use crate::error::{I18nError, ServiceError};
use crate::ollama::CompletionClient;
use crate::service::{AttemptReceipt, AttemptSubmission, QuizDetail, QuizGenerationResult};

/// `POST /api/generate-quiz` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct GenerateQuizParams {
    pub questions_per_section: Option<String>,
}

/// Upload a document and generate a quiz from it
pub async fn generate_quiz_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    Query(params): Query<GenerateQuizParams>,
    multipart: Multipart,
) -> Result<Json<QuizGenerationResult>, I18nError> {
    let mut form = FormParts::read(multipart)
        .await
        .map_err(|e| state.i18n_error(e))?;

    let upload = form.file("file").ok_or_else(|| {
        state.i18n_error(ServiceError::InvalidRequest {
            message: "No file provided".to_string(),
        })
    })?;

    // The form field wins over the query string
    let questions_per_section = form
        .text("questions_per_section")
        .filter(|value| !value.trim().is_empty())
        .or(params.questions_per_section)
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.trim().parse::<usize>())
        .transpose()
        .map_err(|e| state.i18n_error(invalid_request(e)))?;

    let result = state
        .service
        .generate_quiz(&user, upload, questions_per_section)
        .await
        .map_err(|e| state.i18n_error(e))?;

    Ok(Json(result))
}

pub async fn submit_attempt_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    Json(submission): Json<AttemptSubmission>,
) -> Result<Json<AttemptReceipt>, I18nError> {
    let receipt = state
        .service
        .submit_attempt(&user, submission)
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(receipt))
}

pub async fn quiz_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    Path(quiz_id): Path<i64>,
) -> Result<Json<QuizDetail>, I18nError> {
    let quiz = state
        .service
        .quiz(&user, quiz_id)
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(quiz))
}

/// Send back the document a quiz was generated from
pub async fn download_file_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    AuthUser(user): AuthUser,
    Path(quiz_id): Path<i64>,
) -> Result<Response, I18nError> {
    let (filename, bytes) = state
        .service
        .quiz_file(&user, quiz_id)
        .await
        .map_err(|e| state.i18n_error(e))?;

    let disposition = format!("attachment; filename=\"{}\"", header_safe(&filename));
    Ok((
        [
            (header::CONTENT_TYPE, mime::APPLICATION_OCTET_STREAM.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Filename reduced to characters that are safe inside a quoted header value
fn header_safe(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
