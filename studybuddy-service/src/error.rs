use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::i18n::I18n;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Quiz not found: {quiz_id}")]
    QuizNotFound { quiz_id: i64 },

    #[error("Doubt not found: {doubt_id}")]
    DoubtNotFound { doubt_id: i64 },

    #[error("File not found for quiz {quiz_id}")]
    FileNotFound { quiz_id: i64 },

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Ollama(#[from] OllamaError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Processing(#[from] ProcessingError),

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Authentication and account errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Could not validate credentials")]
    InvalidToken,

    #[error("Inactive user")]
    InactiveUser,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Username already registered")]
    UsernameTaken,

    #[error("Password hashing failed: {message}")]
    Hashing { message: String },
}

/// Ollama client errors
#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("Connection failed to Ollama at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid response from Ollama")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed")]
    Serialization(#[source] serde_json::Error),
}

/// Document processing errors
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to extract text from page {page}")]
    TextExtraction {
        page: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to read DOCX: {message}")]
    DocxRead { message: String },

    #[error("Unsupported file type: {format}")]
    UnsupportedFormat { format: String },

    #[error("max_section_length must be at least {min} characters (got {got})")]
    InvalidSectionLength { got: usize, min: usize },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Document contains too many sections: {count} (max {max})")]
    TooManySections { count: usize, max: usize },

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// API error response (matches Axum's built-in JsonRejection format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::QuizNotFound { .. }
            | ServiceError::DoubtNotFound { .. }
            | ServiceError::FileNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::Auth(
                AuthError::InvalidCredentials | AuthError::InvalidToken | AuthError::InactiveUser,
            ) => StatusCode::UNAUTHORIZED,
            ServiceError::Auth(AuthError::EmailTaken | AuthError::UsernameTaken) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ServiceError::Ollama(OllamaError::ModelNotFound { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Processing(
                ProcessingError::FileTooLarge { .. } | ProcessingError::TooManySections { .. },
            ) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn error_code(&self) -> &'static str {
        match self {
            ServiceError::QuizNotFound { .. } => "quiz_not_found",
            ServiceError::DoubtNotFound { .. } => "doubt_not_found",
            ServiceError::FileNotFound { .. } => "file_not_found",
            ServiceError::Auth(AuthError::InvalidCredentials) => "invalid_credentials",
            ServiceError::Auth(AuthError::InvalidToken) => "invalid_token",
            ServiceError::Auth(AuthError::InactiveUser) => "inactive_user",
            ServiceError::Auth(AuthError::EmailTaken) => "email_taken",
            ServiceError::Auth(AuthError::UsernameTaken) => "username_taken",
            ServiceError::Auth(AuthError::Hashing { .. }) => "password_hashing",
            ServiceError::Ollama(OllamaError::Connection { .. }) => "ollama_connection",
            ServiceError::Ollama(OllamaError::ModelNotFound { .. }) => "ollama_model_not_found",
            ServiceError::Ollama(OllamaError::Generation { .. }) => "ollama_generation",
            ServiceError::Ollama(OllamaError::InvalidResponse { .. }) => "ollama_invalid_response",
            ServiceError::Database(_) => "database_error",
            ServiceError::Processing(ProcessingError::TextExtraction { .. }) => {
                "text_extraction_error"
            }
            ServiceError::Processing(ProcessingError::DocxRead { .. }) => "docx_read_error",
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                "unsupported_format"
            }
            ServiceError::Processing(ProcessingError::InvalidSectionLength { .. }) => {
                "invalid_section_length"
            }
            ServiceError::Processing(ProcessingError::FileTooLarge { .. }) => "file_too_large",
            ServiceError::Processing(ProcessingError::TooManySections { .. }) => {
                "too_many_sections"
            }
            ServiceError::Processing(ProcessingError::Io(_)) => "io_error",
            ServiceError::Timeout { .. } => "timeout",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    /// Get a user-friendly translated message
    pub fn user_message(&self, i18n: &I18n, locale: &str) -> String {
        match self {
            ServiceError::QuizNotFound { .. } => i18n.get(locale, "error-quiz-not-found", None),
            ServiceError::DoubtNotFound { .. } => i18n.get(locale, "error-doubt-not-found", None),
            ServiceError::FileNotFound { .. } => i18n.get(locale, "error-file-not-found", None),
            ServiceError::Auth(AuthError::InvalidCredentials) => {
                i18n.get(locale, "error-invalid-credentials", None)
            }
            ServiceError::Auth(AuthError::InvalidToken) => {
                i18n.get(locale, "error-invalid-token", None)
            }
            ServiceError::Auth(AuthError::EmailTaken) => {
                i18n.get(locale, "error-email-taken", None)
            }
            ServiceError::Auth(AuthError::UsernameTaken) => {
                i18n.get(locale, "error-username-taken", None)
            }
            ServiceError::Processing(ProcessingError::FileTooLarge { max, .. }) => {
                let megabytes = format!("{}", max / 1024 / 1024);
                i18n.format(locale, "error-file-too-large", &[("max_mb", &megabytes)])
            }
            ServiceError::Processing(ProcessingError::TooManySections { max, .. }) => {
                let max = max.to_string();
                i18n.format(locale, "error-too-many-sections", &[("max", &max)])
            }
            ServiceError::Internal { .. } => i18n.get(locale, "error-internal", None),
            ServiceError::Timeout { message } | ServiceError::InvalidRequest { message } => {
                message.clone()
            }
            // For other errors, fall back to the technical message
            _ => self.to_string(),
        }
    }

    /// Convert to an error response with i18n support
    pub fn into_response_with_i18n(self, i18n: &I18n, locale: &str) -> Response {
        let message = self.user_message(i18n, locale);
        self.build_response(message)
    }

    fn build_response(&self, message: String) -> Response {
        let status = self.status_code();

        let body = ErrorResponse {
            message,
            code: Some(self.error_code().to_string()),
            details: None,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        self.build_response(message)
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error followed by its `source()` chain, for log lines.
pub fn format_error_chain_ref(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

/// Error wrapper with i18n support for API responses
pub struct I18nError {
    pub error: ServiceError,
    pub i18n: std::sync::Arc<I18n>,
    pub locale: String,
}

impl I18nError {
    pub fn new(error: ServiceError, i18n: std::sync::Arc<I18n>, locale: impl Into<String>) -> Self {
        Self {
            error,
            i18n,
            locale: locale.into(),
        }
    }
}

impl IntoResponse for I18nError {
    fn into_response(self) -> Response {
        self.error.into_response_with_i18n(&self.i18n, &self.locale)
    }
}

impl<E: Into<ServiceError>> From<E> for I18nError {
    fn from(error: E) -> Self {
        // This fallback doesn't have i18n, so uses default
        // Real usage should use I18nError::new()
        Self {
            error: error.into(),
            i18n: std::sync::Arc::new(I18n::new()),
            locale: "en".to_string(),
        }
    }
}
