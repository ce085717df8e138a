//! Account endpoints: registration, token login, current user.

use axum::{
    Form, Json,
    extract::{FromRequest, Multipart, Request, State},
    http::header,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{AppState, AuthUser, FormParts, invalid_request};
use crate::db::User;
use crate::error::{I18nError, ServiceError};
use crate::ollama::CompletionClient;
use crate::service::{AccessToken, NewAccount};

/// OAuth2 password-flow credentials, sent urlencoded or as multipart
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl<S: Send + Sync> FromRequest<S> for LoginForm {
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .is_some_and(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA);

        if !is_multipart {
            let Form(form) = Form::<LoginForm>::from_request(req, state)
                .await
                .map_err(invalid_request)?;
            return Ok(form);
        }

        let multipart = Multipart::from_request(req, state)
            .await
            .map_err(invalid_request)?;
        let mut parts = FormParts::read(multipart).await?;
        match (parts.text("username"), parts.text("password")) {
            (Some(username), Some(password)) => Ok(LoginForm { username, password }),
            _ => Err(invalid_request("username and password are required")),
        }
    }
}

pub async fn register_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    Json(account): Json<NewAccount>,
) -> Result<Json<User>, I18nError> {
    let user = state
        .service
        .register(account)
        .await
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(user))
}

/// Exchange credentials for a bearer token
pub async fn login_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
    form: Result<LoginForm, ServiceError>,
) -> Result<Json<AccessToken>, I18nError> {
    let form = form.map_err(|e| state.i18n_error(e))?;
    let token = state
        .service
        .login(&form.username, &form.password)
        .await
        .map_err(|e| state.i18n_error(e))?;
    Ok(Json(token))
}

pub async fn current_user_handler(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
