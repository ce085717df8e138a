use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::error::{OllamaError, ServiceError, ServiceResult};

/// Shape of the text the model should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// A single JSON object
    Json,
}

/// One non-streaming chat completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub format: ResponseFormat,
    pub messages: Vec<ChatMessage>,
}

/// Anything that can turn a chat into a reply.
///
/// The quiz generator and doubt solver only depend on this, so tests can
/// substitute a scripted client.
pub trait CompletionClient: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = ServiceResult<String>> + Send;

    /// Whether the backend is reachable right now
    fn is_available(&self) -> impl Future<Output = bool> + Send {
        async { true }
    }
}

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: OllamaConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::Ollama(OllamaError::Connection {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> ServiceResult<bool> {
        let url = format!("{}/api/tags", self.config.base_url);

        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                Ok(false)
            }
        }
    }
}

impl CompletionClient for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> ServiceResult<String> {
        let url = format!("{}/api/chat", self.config.base_url);
        let model = request.model.clone();

        let body = OllamaChatRequest::from(request);
        debug!(model = %body.model, messages = body.messages.len(), "Sending chat request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OllamaError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();

            if message.contains("model") && message.contains("not found") {
                return Err(ServiceError::Ollama(OllamaError::ModelNotFound { model }));
            }

            return Err(ServiceError::Ollama(OllamaError::Generation {
                status,
                message,
            }));
        }

        let chat_response: OllamaChatResponse =
            response
                .json()
                .await
                .map_err(|e| OllamaError::InvalidResponse {
                    source: serde_json::Error::io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                })?;

        Ok(chat_response.message.content)
    }

    async fn is_available(&self) -> bool {
        self.health_check().await.unwrap_or(false)
    }
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images for vision models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            images: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: None,
        }
    }

    /// Create a user message with an image for vision models
    pub fn user_with_image(content: impl Into<String>, image_base64: String) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            images: Some(vec![image_base64]),
        }
    }
}

// Internal Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

impl From<CompletionRequest> for OllamaChatRequest {
    fn from(request: CompletionRequest) -> Self {
        Self {
            model: request.model,
            messages: request.messages,
            stream: false,
            format: match request.format {
                ResponseFormat::Text => None,
                ResponseFormat::Json => Some("json"),
            },
            options: Some(OllamaOptions {
                temperature: Some(request.temperature),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_request_body() {
        let request = CompletionRequest {
            model: "llama3.2".to_string(),
            temperature: 0.25,
            format: ResponseFormat::Json,
            messages: vec![
                ChatMessage::system("You are a quiz generator."),
                ChatMessage::user("Write one question."),
            ],
        };

        let body = serde_json::to_value(OllamaChatRequest::from(request)).unwrap();
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert_eq!(body["options"]["temperature"], 0.25);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][1].get("images").is_none());
    }

    #[test]
    fn test_text_request_with_image() {
        let request = CompletionRequest {
            model: "llava".to_string(),
            temperature: 0.5,
            format: ResponseFormat::Text,
            messages: vec![ChatMessage::user_with_image("What is this?", "aGk=".to_string())],
        };

        let body = serde_json::to_value(OllamaChatRequest::from(request)).unwrap();
        assert!(body.get("format").is_none());
        assert_eq!(body["messages"][0]["images"][0], "aGk=");
    }

    #[test]
    fn test_parse_chat_response() {
        let raw = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":true}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, "Hi");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = OllamaConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            default_model: "llama3.2".to_string(),
            vision_model: "llava".to_string(),
            temperature: 0.7,
            request_timeout_secs: 2,
        };
        let client = OllamaClient::new(config).unwrap();

        assert!(!client.health_check().await.unwrap());

        let result = client
            .complete(CompletionRequest {
                model: "llama3.2".to_string(),
                temperature: 0.7,
                format: ResponseFormat::Text,
                messages: vec![ChatMessage::user("hello")],
            })
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Ollama(OllamaError::Connection { .. }))
        ));
    }
}
