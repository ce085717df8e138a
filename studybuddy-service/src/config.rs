//! Service configuration, layered from an optional `config` file and
//! `STUDYBUDDY__*` environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Smallest section length the chunker accepts.
pub const MIN_SECTION_LENGTH: usize = 100;

/// Complete configuration, read once at startup
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_ollama")]
    pub ollama: OllamaConfig,

    #[serde(default = "default_quiz")]
    pub quiz: QuizConfig,

    #[serde(default = "default_doubt")]
    pub doubt: DoubtConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_auth")]
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("studybuddy.db")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

/// Ollama LLM configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub default_model: String,

    /// Model used when a doubt carries an image
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Quiz generation settings
#[derive(Debug, Clone, Deserialize)]
pub struct QuizConfig {
    /// Model for question generation; empty means `ollama.default_model`
    #[serde(default)]
    pub model: String,

    #[serde(default = "default_quiz_temperature")]
    pub temperature: f32,

    /// LLM calls allowed per requested question
    #[serde(default = "default_attempts_per_question")]
    pub attempts_per_question: usize,

    #[serde(default = "default_max_section_length")]
    pub max_section_length: usize,

    #[serde(default = "default_max_sections")]
    pub max_sections: usize,

    #[serde(default = "default_questions_per_section")]
    pub default_questions_per_section: usize,

    #[serde(default = "default_max_questions_per_section")]
    pub max_questions_per_section: usize,

    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Requests with less than this much budget left are rejected with 408
    #[serde(default = "default_min_remaining")]
    pub min_remaining_secs: u64,

    /// Fraction of the budget after which no further sections are started
    #[serde(default = "default_stop_fraction")]
    pub stop_fraction: f64,
}

impl QuizConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn min_remaining(&self) -> Duration {
        Duration::from_secs(self.min_remaining_secs)
    }
}

/// Doubt solving settings
#[derive(Debug, Clone, Deserialize)]
pub struct DoubtConfig {
    /// Number of trailing conversation messages included in the prompt
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,

    /// Number of leading PDF sections used as context
    #[serde(default = "default_pdf_context_sections")]
    pub pdf_context_sections: usize,
}

/// Request size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

/// Authentication settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: i64,
}

impl AppConfig {
    /// Load configuration from file and env vars
    pub fn load() -> ServiceResult<Self> {
        let config: AppConfig = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("STUDYBUDDY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ServiceResult<()> {
        if self.quiz.max_section_length < MIN_SECTION_LENGTH {
            return Err(ServiceError::Config {
                message: format!(
                    "quiz.max_section_length must be at least {} (got {})",
                    MIN_SECTION_LENGTH, self.quiz.max_section_length
                ),
            });
        }
        if self.quiz.attempts_per_question == 0 {
            return Err(ServiceError::Config {
                message: "quiz.attempts_per_question must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.quiz.stop_fraction) {
            return Err(ServiceError::Config {
                message: format!(
                    "quiz.stop_fraction must be between 0 and 1 (got {})",
                    self.quiz.stop_fraction
                ),
            });
        }
        Ok(())
    }

    /// Model used for quiz generation
    pub fn quiz_model(&self) -> &str {
        if self.quiz.model.is_empty() {
            &self.ollama.default_model
        } else {
            &self.quiz.model
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            ollama: default_ollama(),
            quiz: default_quiz(),
            doubt: default_doubt(),
            limits: default_limits(),
            auth: default_auth(),
        }
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_ollama() -> OllamaConfig {
    OllamaConfig {
        base_url: default_ollama_url(),
        default_model: default_model(),
        vision_model: default_vision_model(),
        temperature: default_temperature(),
        request_timeout_secs: default_request_timeout(),
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_vision_model() -> String {
    "llava".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_request_timeout() -> u64 {
    120
}

fn default_quiz() -> QuizConfig {
    QuizConfig {
        model: String::new(),
        temperature: default_quiz_temperature(),
        attempts_per_question: default_attempts_per_question(),
        max_section_length: default_max_section_length(),
        max_sections: default_max_sections(),
        default_questions_per_section: default_questions_per_section(),
        max_questions_per_section: default_max_questions_per_section(),
        generation_timeout_secs: default_generation_timeout(),
        min_remaining_secs: default_min_remaining(),
        stop_fraction: default_stop_fraction(),
    }
}

fn default_quiz_temperature() -> f32 {
    0.2
}

fn default_attempts_per_question() -> usize {
    5
}

fn default_max_section_length() -> usize {
    1000
}

fn default_max_sections() -> usize {
    10
}

fn default_questions_per_section() -> usize {
    3
}

fn default_max_questions_per_section() -> usize {
    5
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_min_remaining() -> u64 {
    10
}

fn default_stop_fraction() -> f64 {
    0.9
}

fn default_doubt() -> DoubtConfig {
    DoubtConfig {
        history_messages: default_history_messages(),
        pdf_context_sections: default_pdf_context_sections(),
    }
}

fn default_history_messages() -> usize {
    5
}

fn default_pdf_context_sections() -> usize {
    5
}

fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_upload_bytes: default_max_upload_bytes(),
    }
}

fn default_max_upload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_auth() -> AuthConfig {
    AuthConfig {
        token_ttl_minutes: default_token_ttl(),
    }
}

fn default_token_ttl() -> i64 {
    30
}
