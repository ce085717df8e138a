//! HTTP API for the StudyBuddy service.
//!
//! This module provides the REST endpoints for:
//! - Accounts and bearer-token login
//! - Quiz generation, attempts and downloads
//! - Doubt solving and history
//! - Health and metrics monitoring

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, State},
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::User;
use crate::error::{AuthError, I18nError, ServiceError};
use crate::ollama::CompletionClient;
use crate::service::{StudyBuddyService, Upload};

pub mod auth;
pub mod doubts;
pub mod history;
pub mod quizzes;
use auth::{current_user_handler, login_handler, register_handler};
use doubts::{doubt_handler, doubt_history_handler, solve_doubt_handler};
use history::{profile_handler, quiz_attempts_handler, quiz_history_handler};
use quizzes::{
    download_file_handler, generate_quiz_handler, quiz_handler, submit_attempt_handler,
};

/// Room for multipart framing and text fields on top of the file itself
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Application state
pub struct AppState<C> {
    pub service: Arc<StudyBuddyService<C>>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

impl<C> AppState<C> {
    /// Create an i18n-aware error from a service error
    pub fn i18n_error(&self, error: ServiceError) -> I18nError {
        I18nError::new(error, self.service.i18n.clone(), "en")
    }
}

/// Build the API router
pub fn router<C: CompletionClient + 'static>(
    service: Arc<StudyBuddyService<C>>,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let max_body_size = service.config.limits.max_upload_bytes as usize + MULTIPART_OVERHEAD;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Uploads get the configured body limit plus framing
        .route(
            "/generate-quiz",
            post(generate_quiz_handler::<C>).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/solve-doubt",
            post(solve_doubt_handler::<C>).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/submit-quiz-attempt", post(submit_attempt_handler::<C>))
        .route("/download-file/{quiz_id}", get(download_file_handler::<C>))
        .route("/quiz/{quiz_id}", get(quiz_handler::<C>))
        .route("/quiz-history", get(quiz_history_handler::<C>))
        .route("/quiz-attempts", get(quiz_attempts_handler::<C>))
        .route("/doubt-history", get(doubt_history_handler::<C>))
        .route("/doubt/{doubt_id}", get(doubt_handler::<C>))
        .route("/profile", get(profile_handler::<C>));

    Router::new()
        .route("/", get(root_handler::<C>))
        .route("/health", get(health_handler::<C>))
        .route("/metrics", get(metrics_handler::<C>))
        .route("/users/", post(register_handler::<C>))
        .route("/users/me/", get(current_user_handler))
        .route("/login", post(login_handler::<C>))
        .route("/token", post(login_handler::<C>))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The caller, resolved from an `Authorization: Bearer` header
pub struct AuthUser(pub User);

impl<C: CompletionClient + 'static> FromRequestParts<Arc<AppState<C>>> for AuthUser {
    type Rejection = I18nError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<C>>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| state.i18n_error(AuthError::InvalidToken.into()))?;

        let user = state
            .service
            .authenticate(bearer.token())
            .map_err(|e| state.i18n_error(e))?;
        Ok(AuthUser(user))
    }
}

/// Text fields and files of a multipart body
#[derive(Debug, Default)]
pub(crate) struct FormParts {
    texts: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl FormParts {
    pub(crate) async fn read(mut multipart: Multipart) -> Result<Self, ServiceError> {
        let mut parts = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(invalid_request)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let bytes = field.bytes().await.map_err(invalid_request)?;
                    // Browsers send an empty part for an untouched file input
                    if filename.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    parts.files.insert(
                        name,
                        Upload {
                            filename,
                            bytes: bytes.to_vec(),
                        },
                    );
                }
                None => {
                    let text = field.text().await.map_err(invalid_request)?;
                    parts.texts.insert(name, text);
                }
            }
        }

        Ok(parts)
    }

    pub(crate) fn text(&mut self, name: &str) -> Option<String> {
        self.texts.remove(name)
    }

    pub(crate) fn file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}

pub(crate) fn invalid_request(error: impl std::fmt::Display) -> ServiceError {
    ServiceError::InvalidRequest {
        message: error.to_string(),
    }
}

// === Root, Health & Metrics ===

#[derive(Serialize)]
struct RootResponse {
    message: String,
}

async fn root_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<RootResponse> {
    Json(RootResponse {
        message: state.service.message("root-greeting"),
    })
}

async fn health_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<HealthResponse> {
    let ollama_available = state.service.llm.is_available().await;

    Json(HealthResponse {
        status: if ollama_available { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        ollama_available,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    ollama_available: bool,
}

async fn metrics_handler<C: CompletionClient>(
    State(state): State<Arc<AppState<C>>>,
) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::ollama::testing::ScriptedClient;
    use crate::service::testing::service_with;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(client: ScriptedClient) -> (Router, tempfile::TempDir) {
        let (service, dir) = service_with(AppConfig::default(), client);
        (router(Arc::new(service), None), dir)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
        app.clone().oneshot(request).await.unwrap()
    }

    /// Register `ada` and return a bearer token for that account
    async fn login(app: &Router) -> String {
        let register = Request::post("/users/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"email":"ada@example.com","username":"ada","password":"pw-1234"}"#,
            ))
            .unwrap();
        assert_eq!(send(app, register).await.status(), StatusCode::OK);

        let login = Request::post("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=ada&password=pw-1234"))
            .unwrap();
        let response = send(app, login).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["token_type"], "bearer");
        body["access_token"].as_str().unwrap().to_string()
    }

    fn authed(method: &str, uri: &str, token: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (app, _dir) = app(ScriptedClient::new(Vec::new()));

        let response = send(&app, Request::get("/").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], "Hello World");

        let response = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["ollama_available"], true);
    }

    #[tokio::test]
    async fn test_login_and_current_user() {
        let (app, _dir) = app(ScriptedClient::new(Vec::new()));
        let token = login(&app).await;

        let response = send(&app, authed("GET", "/users/me/", &token).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["username"], "ada");
        assert!(body.get("hashed_password").is_none());
    }

    #[tokio::test]
    async fn test_login_with_multipart_form() {
        let (app, _dir) = app(ScriptedClient::new(Vec::new()));
        login(&app).await;

        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"username\"\r\n\r\nada\r\n\
                    --XYZ\r\nContent-Disposition: form-data; name=\"password\"\r\n\r\npw-1234\r\n\
                    --XYZ--\r\n";
        let request = Request::post("/login")
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::OK);

        let wrong = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("username=ada&password=nope"))
            .unwrap();
        let response = send(&app, wrong).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["message"], "Incorrect username or password");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (app, _dir) = app(ScriptedClient::new(Vec::new()));

        let response = send(&app, Request::get("/api/profile").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );

        let response = send(
            &app,
            authed("GET", "/api/profile", "bogus").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], "invalid_token");
    }

    #[tokio::test]
    async fn test_generate_quiz_then_browse_history() {
        let reply = serde_json::json!({
            "question": "What is the powerhouse of the cell?",
            "opt1": "Nucleus",
            "opt2": "Mitochondria",
            "opt3": "Ribosome",
            "opt4": "Vacuole",
            "answer": "opt2",
            "explanation": "Mitochondria produce ATP."
        })
        .to_string();
        let (app, _dir) = app(ScriptedClient::new(vec![Ok(reply)]));
        let token = login(&app).await;

        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cells.txt\"\r\n\
                    Content-Type: text/plain\r\n\r\nCells contain mitochondria.\r\n\
                    --XYZ\r\nContent-Disposition: form-data; name=\"questions_per_section\"\r\n\r\n1\r\n\
                    --XYZ--\r\n";
        let request = authed("POST", "/api/generate-quiz", &token)
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["complete"], true);
        assert_eq!(body["data"][0]["question1"]["answer"], "opt2");
        let quiz_id = body["quiz_id"].as_i64().unwrap();

        let quiz = json_body(
            send(
                &app,
                authed("GET", &format!("/api/quiz/{quiz_id}"), &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await,
        )
        .await;
        assert_eq!(quiz["title"], "cells");
        assert_eq!(quiz["total_questions"], 1);

        let attempt = authed("POST", "/api/submit-quiz-attempt", &token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(
                r#"{{"quiz_id":{quiz_id},"answers":{{"question1":"opt2"}},"score":1,"total_questions":1,"time_taken":12.5}}"#
            )))
            .unwrap();
        let receipt = json_body(send(&app, attempt).await).await;
        assert_eq!(receipt["status"], "success");

        let history = json_body(
            send(
                &app,
                authed("GET", "/api/quiz-history", &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await,
        )
        .await;
        assert_eq!(history["total"], 1);
        assert_eq!(history["quizzes"][0]["best_score"], 1.0);

        let download = send(
            &app,
            authed("GET", &format!("/api/download-file/{quiz_id}"), &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"cells.txt\""
        );
        let bytes = to_bytes(download.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Cells contain mitochondria.");
    }

    #[tokio::test]
    async fn test_questions_per_section_from_query() {
        let reply = |text: &str| {
            Ok(serde_json::json!({
                "question": text,
                "opt1": "Evaporation",
                "opt2": "Condensation",
                "opt3": "Precipitation",
                "opt4": "Collection",
                "answer": "opt1",
                "explanation": "Heat turns liquid water into vapour."
            })
            .to_string())
        };
        let (app, _dir) = app(ScriptedClient::new(vec![
            reply("What turns water into vapour?"),
            reply("Which stage follows heating of a lake?"),
        ]));
        let token = login(&app).await;

        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"water.txt\"\r\n\r\n\
                    Water evaporates from lakes.\r\n--XYZ--\r\n";
        let request = authed("POST", "/api/generate-quiz?questions_per_section=2", &token)
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["complete"], true);
        assert_eq!(body["data"][0].as_object().unwrap().len(), 2);
        assert_eq!(
            body["data"][0]["question2"]["question"],
            "Which stage follows heating of a lake?"
        );
    }

    #[tokio::test]
    async fn test_unsupported_upload_and_bad_limit() {
        let (app, _dir) = app(ScriptedClient::new(Vec::new()));
        let token = login(&app).await;

        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"deck.pptx\"\r\n\r\nxx\r\n--XYZ--\r\n";
        let request = authed("POST", "/api/generate-quiz", &token)
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = send(
            &app,
            authed("GET", "/api/doubt-history?limit=0", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app,
            authed("GET", "/api/doubt/42", &token).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["message"], "Doubt not found");
    }

    #[tokio::test]
    async fn test_solve_doubt_and_history() {
        let (app, _dir) = app(ScriptedClient::repeating("Force equals mass times acceleration."));
        let token = login(&app).await;

        let body = "--XYZ\r\nContent-Disposition: form-data; name=\"question\"\r\n\r\nWhat is Newton's second law?\r\n\
                    --XYZ\r\nContent-Disposition: form-data; name=\"subjects\"\r\n\r\nPhysics\r\n\
                    --XYZ--\r\n";
        let request = authed("POST", "/api/solve-doubt", &token)
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();
        let response = send(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["answer"], "Force equals mass times acceleration.");
        assert_eq!(body["debug"]["has_image"], false);

        let history = json_body(
            send(
                &app,
                authed("GET", "/api/doubt-history?subject=phys", &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await,
        )
        .await;
        assert_eq!(history["total"], 1);
        assert_eq!(history["doubts"][0]["subjects"], "Physics");

        let profile = json_body(
            send(
                &app,
                authed("GET", "/api/profile", &token).body(Body::empty()).unwrap(),
            )
            .await,
        )
        .await;
        assert_eq!(profile["total_doubts"], 1);
        assert_eq!(profile["total_quizzes"], 0);
    }
}
