//! Quiz generation from an uploaded document under a wall-clock budget.

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::{StudyBuddyService, Upload, remove_upload};
use crate::db::{NewQuiz, User};
use crate::error::{ProcessingError, ServiceError, ServiceResult, format_error_chain_ref};
use crate::ingestion::{DocumentSection, file_stem, parser_for_path};
use crate::ollama::CompletionClient;
use crate::quiz::{GeneratedQuestionSet, GenerationStatus, GeneratorSettings, QuizGenerator};

/// Response body of a quiz generation request
#[derive(Debug, Clone, Serialize)]
pub struct QuizGenerationResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_id: Option<i64>,
    /// One question set per section that produced questions
    pub data: Vec<GeneratedQuestionSet>,
    /// Seconds, rounded to two decimals
    pub processing_time: f64,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// What the per-section loop produced
struct SectionRun {
    data: Vec<GeneratedQuestionSet>,
    processed: usize,
    total: usize,
    /// Some section stopped at its deadline
    timed_out: bool,
    /// Some section ran out of attempts
    short: bool,
}

impl SectionRun {
    fn skipped_sections(&self) -> bool {
        self.processed < self.total
    }
}

impl<C: CompletionClient> StudyBuddyService<C> {
    /// Parse an uploaded document and generate multiple-choice questions
    /// for each of its sections, keeping the upload and the quiz on success.
    pub async fn generate_quiz(
        &self,
        user: &User,
        upload: Upload,
        questions_per_section: Option<usize>,
    ) -> ServiceResult<QuizGenerationResult> {
        let started = Instant::now();
        let quiz_config = &self.config.quiz;

        let size = upload.bytes.len() as u64;
        let max = self.config.limits.max_upload_bytes;
        if size > max {
            return Err(ProcessingError::FileTooLarge { size, max }.into());
        }

        let per_section = questions_per_section
            .unwrap_or(quiz_config.default_questions_per_section)
            .clamp(1, quiz_config.max_questions_per_section.max(1));

        // Unknown extensions are refused before anything touches the disk
        let parser = parser_for_path(Path::new(&upload.filename), quiz_config.max_section_length)?;

        let path = self.store_upload(&upload).await?;
        info!(
            user_id = user.id,
            filename = %upload.filename,
            bytes = size,
            questions_per_section = per_section,
            "Generating quiz from upload"
        );

        let run = match Self::parse_file(parser, &path).await {
            Ok(sections) => self.run_sections(&sections, per_section, started).await,
            Err(e) => Err(e),
        };
        let run = match run {
            Ok(run) => run,
            Err(e) => {
                remove_upload(&path).await;
                return Err(e);
            }
        };

        let complete = !run.skipped_sections() && !run.timed_out && !run.short;
        let mut warning = if run.skipped_sections() {
            Some(self.i18n.format(
                "en",
                "quiz-partial-timeout",
                &[
                    ("processed", &run.processed.to_string()),
                    ("total", &run.total.to_string()),
                ],
            ))
        } else if !complete {
            Some(self.message("quiz-partial-budget"))
        } else {
            None
        };

        let quiz_id = match self.save_quiz(user, &upload.filename, &path, &run.data) {
            Ok(id) => Some(id),
            Err(e) => {
                error!(
                    user_id = user.id,
                    error = %format_error_chain_ref(&e),
                    "Failed to save generated quiz"
                );
                remove_upload(&path).await;
                warning = Some(self.message("quiz-save-failed"));
                None
            }
        };

        let elapsed = started.elapsed();
        metrics::histogram!("studybuddy_quiz_generation_seconds").record(elapsed.as_secs_f64());
        metrics::counter!("studybuddy_quizzes_generated_total").increment(1);

        let total_questions: usize = run.data.iter().map(GeneratedQuestionSet::len).sum();
        info!(
            user_id = user.id,
            quiz_id = ?quiz_id,
            sections = run.processed,
            total_sections = run.total,
            questions = total_questions,
            elapsed_secs = elapsed.as_secs_f64(),
            complete,
            "Quiz generation finished"
        );

        Ok(QuizGenerationResult {
            quiz_id,
            data: run.data,
            processing_time: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
            complete,
            warning,
        })
    }

    async fn run_sections(
        &self,
        sections: &[DocumentSection],
        per_section: usize,
        started: Instant,
    ) -> ServiceResult<SectionRun> {
        let quiz_config = &self.config.quiz;
        let total = sections.len();

        if total == 0 {
            return Err(ServiceError::InvalidRequest {
                message: self.message("error-empty-document"),
            });
        }
        if total > quiz_config.max_sections {
            return Err(ProcessingError::TooManySections {
                count: total,
                max: quiz_config.max_sections,
            }
            .into());
        }

        let budget = quiz_config.generation_timeout();
        let deadline = started + budget;
        let remaining = budget.saturating_sub(started.elapsed());
        if remaining < quiz_config.min_remaining() {
            warn!(
                remaining_secs = remaining.as_secs_f64(),
                "Not enough time left after parsing"
            );
            return Err(ServiceError::Timeout {
                message: self.message("error-not-enough-time"),
            });
        }

        let generator = QuizGenerator::new(
            self.llm.clone(),
            GeneratorSettings {
                model: self.config.quiz_model().to_string(),
                temperature: quiz_config.temperature,
                attempts_per_question: quiz_config.attempts_per_question,
            },
        );
        let stop_after = budget.mul_f64(quiz_config.stop_fraction);

        let mut run = SectionRun {
            data: Vec::new(),
            processed: 0,
            total,
            timed_out: false,
            short: false,
        };

        for (index, section) in sections.iter().enumerate() {
            let elapsed = started.elapsed();
            if elapsed >= stop_after {
                warn!(
                    section = index + 1,
                    total_sections = total,
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Time budget nearly used, skipping remaining sections"
                );
                break;
            }

            let slice = section_slice(budget.saturating_sub(elapsed), total - index);
            let section_deadline = (Instant::now() + slice).min(deadline);

            let outcome = generator
                .generate_until(
                    section.content(),
                    per_section,
                    GeneratedQuestionSet::new(),
                    section_deadline,
                )
                .await;

            run.processed += 1;
            if !outcome.is_complete() {
                warn!(
                    section = index + 1,
                    accepted = outcome.questions.len(),
                    target = per_section,
                    attempts = outcome.attempts,
                    status = ?outcome.status,
                    "Section produced fewer questions than requested"
                );
                match outcome.status {
                    GenerationStatus::TimedOut => run.timed_out = true,
                    _ => run.short = true,
                }
            }
            if !outcome.questions.is_empty() {
                run.data.push(outcome.questions);
            }
        }

        if run.data.is_empty() && (run.timed_out || run.skipped_sections()) {
            return Err(ServiceError::Timeout {
                message: self.message("error-no-questions-in-time"),
            });
        }

        Ok(run)
    }

    fn save_quiz(
        &self,
        user: &User,
        filename: &str,
        path: &Path,
        data: &[GeneratedQuestionSet],
    ) -> ServiceResult<i64> {
        self.db.insert_quiz(&NewQuiz {
            user_id: user.id,
            title: file_stem(filename),
            content: data.to_vec(),
            filename: Some(filename.to_string()),
            file_path: Some(path.to_string_lossy().into_owned()),
        })
    }
}

/// Equal share of the remaining budget for each section still to run
fn section_slice(remaining: Duration, sections_left: usize) -> Duration {
    remaining / sections_left.max(1) as u32
}
