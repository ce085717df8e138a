//! Bounded retry loop that asks the model for one question at a time.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::prompts::question_messages;
use super::question::{GeneratedQuestionSet, ParseFailure, parse_question};
use crate::error::format_error_chain_ref;
use crate::ollama::{CompletionClient, CompletionRequest, ResponseFormat};

/// Model settings for generation
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub model: String,
    pub temperature: f32,
    /// Attempt budget is this times the requested count
    pub attempts_per_question: usize,
}

/// How a generation run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Reached the requested count
    Complete,
    /// Ran out of attempts first
    Partial,
    /// Hit the deadline first
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub questions: GeneratedQuestionSet,
    /// Model calls made in this run
    pub attempts: usize,
    pub status: GenerationStatus,
}

impl GenerationOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == GenerationStatus::Complete
    }
}

/// What one attempt produced
enum AttemptResult {
    Accepted,
    Rejected(String),
    TimedOut,
}

pub struct QuizGenerator<C> {
    client: Arc<C>,
    settings: GeneratorSettings,
}

impl<C: CompletionClient> QuizGenerator<C> {
    pub fn new(client: Arc<C>, settings: GeneratorSettings) -> Self {
        Self { client, settings }
    }

    /// Grow `accepted` toward `target` questions drawn from `context`.
    ///
    /// Never fails: model errors, unparseable replies, invalid answers and
    /// duplicates each spend one attempt. At most
    /// `attempts_per_question * target` calls are made.
    pub async fn generate(
        &self,
        context: &str,
        target: usize,
        accepted: GeneratedQuestionSet,
    ) -> GenerationOutcome {
        self.run(context, target, accepted, None).await
    }

    /// Like [`generate`](Self::generate), but stops at `deadline` and keeps
    /// whatever was accepted before it.
    pub async fn generate_until(
        &self,
        context: &str,
        target: usize,
        accepted: GeneratedQuestionSet,
        deadline: Instant,
    ) -> GenerationOutcome {
        self.run(context, target, accepted, Some(deadline)).await
    }

    async fn run(
        &self,
        context: &str,
        target: usize,
        mut questions: GeneratedQuestionSet,
        deadline: Option<Instant>,
    ) -> GenerationOutcome {
        questions.truncate(target);
        let budget = self.settings.attempts_per_question.saturating_mul(target);
        let mut attempts = 0;
        let mut feedback: Option<String> = None;
        let mut timed_out = false;

        while questions.len() < target && attempts < budget {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                timed_out = true;
                break;
            }

            attempts += 1;
            match self
                .attempt(context, &mut questions, feedback.as_deref(), deadline)
                .await
            {
                AttemptResult::Accepted => feedback = None,
                AttemptResult::Rejected(reason) => feedback = Some(reason),
                AttemptResult::TimedOut => {
                    timed_out = true;
                    break;
                }
            }
        }

        let status = if questions.len() >= target {
            GenerationStatus::Complete
        } else if timed_out {
            GenerationStatus::TimedOut
        } else {
            GenerationStatus::Partial
        };

        info!(
            accepted = questions.len(),
            target,
            attempts,
            budget,
            status = ?status,
            "Question generation finished"
        );

        GenerationOutcome {
            questions,
            attempts,
            status,
        }
    }

    async fn attempt(
        &self,
        context: &str,
        questions: &mut GeneratedQuestionSet,
        feedback: Option<&str>,
        deadline: Option<Instant>,
    ) -> AttemptResult {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            format: ResponseFormat::Json,
            messages: question_messages(context, &questions.question_texts(), feedback),
        };

        let reply = match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, self.client.complete(request)).await {
                    Ok(reply) => reply,
                    Err(_) => {
                        record_attempt("timed_out");
                        warn!("Question generation attempt cut off by deadline");
                        return AttemptResult::TimedOut;
                    }
                }
            }
            None => self.client.complete(request).await,
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                record_attempt("failed");
                warn!(error = %format_error_chain_ref(&e), "Question generation attempt failed");
                return AttemptResult::Rejected("the request failed".to_string());
            }
        };

        let question = match parse_question(&reply) {
            Ok(question) => question,
            Err(ParseFailure::Rejected(rejection)) => {
                record_attempt("invalid_shape");
                debug!(reason = %rejection, "Rejected generated question");
                return AttemptResult::Rejected(rejection.to_string());
            }
            Err(e) => {
                record_attempt("failed");
                warn!(
                    error = %format_error_chain_ref(&e),
                    reply_preview = %reply.chars().take(200).collect::<String>(),
                    "Could not parse generated question"
                );
                return AttemptResult::Rejected("the reply was not a valid JSON object".to_string());
            }
        };

        if questions.contains_question(&question.question) {
            record_attempt("duplicate");
            debug!(question = %question.question, "Discarded duplicate question");
            return AttemptResult::Rejected(format!(
                "\"{}\" was already generated",
                question.question
            ));
        }

        record_attempt("accepted");
        let key = questions.push(question);
        debug!(key = %key, "Accepted generated question");
        AttemptResult::Accepted
    }
}

fn record_attempt(outcome: &'static str) {
    metrics::counter!("studybuddy_quiz_generation_attempts_total", "outcome" => outcome)
        .increment(1);
}
