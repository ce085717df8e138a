//! Doubt solving: tutor prompt, optional document or image context, storage.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::{info, warn};

use super::{StudyBuddyService, Upload, remove_upload};
use crate::db::{ConversationTurn, NewDoubt, User};
use crate::doubt::{
    DoubtPrompt, document_context, parse_conversation, parse_subjects, question_with_context,
};
use crate::error::{ServiceError, ServiceResult, format_error_chain_ref};
use crate::ingestion::parser_for_path;
use crate::ollama::{ChatMessage, CompletionClient, CompletionRequest, ResponseFormat};

/// Fields of a doubt-solving request
#[derive(Debug, Clone, Default)]
pub struct DoubtRequest {
    pub question: String,
    /// Comma-separated subjects
    pub subjects: Option<String>,
    /// JSON list of `{role, content}` turns
    pub conversation: Option<String>,
    pub context_document: Option<Upload>,
    pub context_image: Option<Upload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoubtAnswer {
    pub answer: String,
    pub status: &'static str,
    pub debug: DoubtDebug,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoubtDebug {
    pub answer_length: usize,
    pub has_image: bool,
}

impl<C: CompletionClient> StudyBuddyService<C> {
    pub async fn solve_doubt(&self, user: &User, request: DoubtRequest) -> ServiceResult<DoubtAnswer> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: self.message("error-question-required"),
            });
        }

        let subjects = parse_subjects(request.subjects.as_deref());
        let history = parse_conversation(request.conversation.as_deref());

        let context = match &request.context_document {
            Some(document) => self.document_context(document).await,
            None => None,
        };
        let full_question = question_with_context(question, context.as_deref());

        let prompt = DoubtPrompt {
            question: &full_question,
            subjects: &subjects,
            history: &history,
            has_document: request.context_document.is_some(),
            has_image: request.context_image.is_some(),
            history_window: self.config.doubt.history_messages,
        }
        .render();

        let ollama = &self.config.ollama;
        let completion = match &request.context_image {
            Some(image) => CompletionRequest {
                model: ollama.vision_model.clone(),
                temperature: ollama.temperature,
                format: ResponseFormat::Text,
                messages: vec![ChatMessage::user_with_image(
                    prompt,
                    STANDARD.encode(&image.bytes),
                )],
            },
            None => CompletionRequest {
                model: ollama.default_model.clone(),
                temperature: ollama.temperature,
                format: ResponseFormat::Text,
                messages: vec![ChatMessage::user(prompt)],
            },
        };

        info!(
            user_id = user.id,
            model = %completion.model,
            subjects = subjects.len(),
            history = history.len(),
            has_document = request.context_document.is_some(),
            has_image = request.context_image.is_some(),
            "Solving doubt"
        );

        let reply = self.llm.complete(completion).await?;
        let answer = match reply.trim() {
            "" => {
                warn!(user_id = user.id, "Model returned an empty answer");
                self.message("doubt-empty-answer")
            }
            text => text.to_string(),
        };

        let mut conversation_history = history;
        conversation_history.push(ConversationTurn::user(question));
        conversation_history.push(ConversationTurn::assistant(answer.clone()));

        let context_filename = request
            .context_document
            .as_ref()
            .or(request.context_image.as_ref())
            .map(|upload| upload.filename.clone());

        let stored = self.db.insert_doubt(&NewDoubt {
            user_id: user.id,
            question: full_question,
            answer: answer.clone(),
            subjects: subjects.join(", "),
            conversation_history,
            context_filename,
        });
        match stored {
            Ok(doubt_id) => info!(user_id = user.id, doubt_id, "Stored doubt"),
            Err(e) => warn!(
                user_id = user.id,
                error = %format_error_chain_ref(&e),
                "Failed to store doubt"
            ),
        }

        metrics::counter!("studybuddy_doubts_solved_total").increment(1);

        Ok(DoubtAnswer {
            debug: DoubtDebug {
                answer_length: answer.chars().count(),
                has_image: request.context_image.is_some(),
            },
            answer,
            status: "success",
        })
    }

    /// Leading sections of an attached document, or `None` if it can't be read
    async fn document_context(&self, document: &Upload) -> Option<String> {
        let parser = match parser_for_path(
            Path::new(&document.filename),
            self.config.quiz.max_section_length,
        ) {
            Ok(parser) => parser,
            Err(e) => {
                warn!(filename = %document.filename, error = %e, "Ignoring context document");
                return None;
            }
        };

        let path = match self.store_upload(document).await {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %format_error_chain_ref(&e), "Could not stage context document");
                return None;
            }
        };
        let parsed = Self::parse_file(parser, &path).await;
        remove_upload(&path).await;

        match parsed {
            Ok(sections) => document_context(&sections, self.config.doubt.pdf_context_sections),
            Err(e) => {
                warn!(
                    filename = %document.filename,
                    error = %format_error_chain_ref(&e),
                    "Failed to parse context document"
                );
                None
            }
        }
    }
}
