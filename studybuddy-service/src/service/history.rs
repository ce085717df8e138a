//! Quiz attempts, history listings, profile and downloads.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::StudyBuddyService;
use crate::db::{Doubt, NewQuizAttempt, Quiz, QuizAttempt, User};
use crate::error::{ServiceError, ServiceResult};
use crate::ollama::CompletionClient;
use crate::quiz::GeneratedQuestionSet;

/// `skip`/`limit` query parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
        }
    }
}

/// Attempt submitted by the client after finishing a quiz
#[derive(Debug, Clone, Deserialize)]
pub struct AttemptSubmission {
    pub quiz_id: i64,
    #[serde(default)]
    pub answers: serde_json::Value,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub total_questions: i64,
    #[serde(default)]
    pub time_taken: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptReceipt {
    pub status: &'static str,
    pub attempt_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizHistory {
    pub total: usize,
    pub quizzes: Vec<QuizHistoryEntry>,
}

/// A quiz with the caller's attempts at it
#[derive(Debug, Clone, Serialize)]
pub struct QuizHistoryEntry {
    pub id: i64,
    pub title: String,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub total_questions: usize,
    pub total_attempts: usize,
    pub best_score: f64,
    pub attempts: Vec<QuizAttempt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizAttemptPage {
    pub total: usize,
    pub quiz_attempts: Vec<QuizAttempt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoubtPage {
    pub total: usize,
    pub doubts: Vec<Doubt>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizDetail {
    pub id: i64,
    pub title: String,
    pub content: Vec<GeneratedQuestionSet>,
    pub filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub total_questions: usize,
}

impl From<Quiz> for QuizDetail {
    fn from(quiz: Quiz) -> Self {
        Self {
            total_questions: quiz.total_questions(),
            id: quiz.id,
            title: quiz.title,
            content: quiz.content,
            filename: quiz.filename,
            created_at: quiz.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub total_doubts: usize,
    pub total_quizzes: usize,
    pub total_quiz_attempts: usize,
}

impl<C: CompletionClient> StudyBuddyService<C> {
    fn check_page(&self, page: Page) -> ServiceResult<()> {
        if page.limit == 0 {
            return Err(ServiceError::InvalidRequest {
                message: self.message("error-invalid-limit"),
            });
        }
        Ok(())
    }

    fn owned_quiz(&self, user: &User, quiz_id: i64) -> ServiceResult<Quiz> {
        self.db
            .get_quiz(user.id, quiz_id)?
            .ok_or(ServiceError::QuizNotFound { quiz_id })
    }

    pub fn submit_attempt(
        &self,
        user: &User,
        submission: AttemptSubmission,
    ) -> ServiceResult<AttemptReceipt> {
        self.owned_quiz(user, submission.quiz_id)?;

        let attempt_id = self.db.insert_quiz_attempt(&NewQuizAttempt {
            user_id: user.id,
            quiz_id: submission.quiz_id,
            answers: submission.answers,
            score: submission.score,
            total_questions: submission.total_questions,
            time_taken: submission.time_taken,
        })?;

        info!(
            user_id = user.id,
            quiz_id = submission.quiz_id,
            attempt_id,
            score = submission.score,
            "Recorded quiz attempt"
        );
        Ok(AttemptReceipt {
            status: "success",
            attempt_id,
            message: self.message("quiz-attempt-recorded"),
        })
    }

    pub fn quiz_history(&self, user: &User, page: Page) -> ServiceResult<QuizHistory> {
        self.check_page(page)?;

        let total = self.db.count_quizzes(user.id)?;
        let quizzes = self
            .db
            .list_quizzes(user.id, page.skip, page.limit)?
            .into_iter()
            .map(|quiz| {
                let attempts = self.db.attempts_for_quiz(user.id, quiz.id)?;
                let best_score = attempts.iter().map(|a| a.score).fold(0.0, f64::max);
                Ok(QuizHistoryEntry {
                    total_questions: quiz.total_questions(),
                    total_attempts: attempts.len(),
                    best_score,
                    attempts,
                    id: quiz.id,
                    title: quiz.title,
                    filename: quiz.filename,
                    created_at: quiz.created_at,
                })
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        Ok(QuizHistory { total, quizzes })
    }

    pub fn quiz_attempts(&self, user: &User, page: Page) -> ServiceResult<QuizAttemptPage> {
        self.check_page(page)?;

        Ok(QuizAttemptPage {
            total: self.db.count_quiz_attempts(user.id)?,
            quiz_attempts: self.db.list_quiz_attempts(user.id, page.skip, page.limit)?,
        })
    }

    pub fn doubt_history(
        &self,
        user: &User,
        page: Page,
        subject: Option<&str>,
    ) -> ServiceResult<DoubtPage> {
        self.check_page(page)?;

        let subject = subject.map(str::trim).filter(|s| !s.is_empty());
        let (doubts, total) = self
            .db
            .list_doubts(user.id, subject, page.skip, page.limit)?;
        Ok(DoubtPage { total, doubts })
    }

    pub fn doubt(&self, user: &User, doubt_id: i64) -> ServiceResult<Doubt> {
        self.db
            .get_doubt(user.id, doubt_id)?
            .ok_or(ServiceError::DoubtNotFound { doubt_id })
    }

    pub fn quiz(&self, user: &User, quiz_id: i64) -> ServiceResult<QuizDetail> {
        self.owned_quiz(user, quiz_id).map(QuizDetail::from)
    }

    pub fn profile(&self, user: &User) -> ServiceResult<Profile> {
        Ok(Profile {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            total_doubts: self.db.count_doubts(user.id)?,
            total_quizzes: self.db.count_quizzes(user.id)?,
            total_quiz_attempts: self.db.count_quiz_attempts(user.id)?,
        })
    }

    /// The original upload behind a quiz, as `(filename, bytes)`
    pub async fn quiz_file(&self, user: &User, quiz_id: i64) -> ServiceResult<(String, Vec<u8>)> {
        let quiz = self.owned_quiz(user, quiz_id)?;
        let Some(file_path) = quiz.file_path else {
            return Err(ServiceError::FileNotFound { quiz_id });
        };

        match tokio::fs::read(Path::new(&file_path)).await {
            Ok(bytes) => {
                let filename = quiz.filename.unwrap_or_else(|| "download".to_string());
                Ok((filename, bytes))
            }
            Err(e) => {
                warn!(quiz_id, path = %file_path, error = %e, "Quiz upload is unreadable");
                Err(ServiceError::FileNotFound { quiz_id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::{NewDoubt, NewQuiz};
    use crate::ollama::testing::ScriptedClient;
    use crate::quiz::question::parse_question;
    use crate::service::testing::service_with;
    use crate::service::{StudyBuddyService, Upload};

    fn service() -> (StudyBuddyService<ScriptedClient>, tempfile::TempDir) {
        service_with(AppConfig::default(), ScriptedClient::new(Vec::new()))
    }

    fn question_set(count: usize) -> GeneratedQuestionSet {
        let mut set = GeneratedQuestionSet::new();
        for i in 0..count {
            let reply = serde_json::json!({
                "question": format!("Question {i}?"),
                "opt1": "A", "opt2": "B", "opt3": "C", "opt4": "D",
                "answer": "opt3",
                "explanation": "Because."
            })
            .to_string();
            set.push(parse_question(&reply).unwrap());
        }
        set
    }

    fn add_quiz(
        service: &StudyBuddyService<ScriptedClient>,
        user: &User,
        title: &str,
        file_path: Option<String>,
    ) -> i64 {
        service
            .db
            .insert_quiz(&NewQuiz {
                user_id: user.id,
                title: title.to_string(),
                content: vec![question_set(2), question_set(3)],
                filename: Some(format!("{title}.txt")),
                file_path,
            })
            .unwrap()
    }

    fn submission(quiz_id: i64, score: f64) -> AttemptSubmission {
        AttemptSubmission {
            quiz_id,
            answers: serde_json::json!({"question1": "opt3"}),
            score,
            total_questions: 5,
            time_taken: Some(42.5),
        }
    }

    #[test]
    fn test_attempts_and_quiz_history() {
        let (service, _dir) = service();
        let user = service.db.create_user("ada@example.com", "ada", "h").unwrap();
        let quiz_id = add_quiz(&service, &user, "cells", None);

        let receipt = service.submit_attempt(&user, submission(quiz_id, 3.0)).unwrap();
        assert_eq!(receipt.status, "success");
        assert_eq!(receipt.message, "Quiz attempt saved successfully");
        service.submit_attempt(&user, submission(quiz_id, 4.0)).unwrap();

        let history = service.quiz_history(&user, Page::default()).unwrap();
        assert_eq!(history.total, 1);
        let entry = &history.quizzes[0];
        assert_eq!(entry.total_questions, 5);
        assert_eq!(entry.total_attempts, 2);
        assert_eq!(entry.best_score, 4.0);
        assert_eq!(entry.attempts[0].score, 4.0);

        let attempts = service.quiz_attempts(&user, Page::default()).unwrap();
        assert_eq!(attempts.total, 2);
        assert_eq!(attempts.quiz_attempts[0].time_taken, Some(42.5));
    }

    #[test]
    fn test_attempt_on_foreign_quiz_is_not_found() {
        let (service, _dir) = service();
        let ada = service.db.create_user("ada@example.com", "ada", "h").unwrap();
        let grace = service.db.create_user("grace@example.com", "grace", "h").unwrap();
        let quiz_id = add_quiz(&service, &ada, "cells", None);

        let result = service.submit_attempt(&grace, submission(quiz_id, 1.0));
        assert!(matches!(result, Err(ServiceError::QuizNotFound { .. })));
        assert!(matches!(
            service.quiz(&grace, quiz_id),
            Err(ServiceError::QuizNotFound { .. })
        ));
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let (service, _dir) = service();
        let user = service.db.create_user("ada@example.com", "ada", "h").unwrap();
        let page = Page { skip: 0, limit: 0 };

        assert!(matches!(
            service.doubt_history(&user, page, None),
            Err(ServiceError::InvalidRequest { .. })
        ));
        assert!(service.quiz_history(&user, page).is_err());
        assert!(service.quiz_attempts(&user, page).is_err());
    }

    #[test]
    fn test_doubt_history_and_profile() {
        let (service, _dir) = service();
        let user = service.db.create_user("ada@example.com", "ada", "h").unwrap();
        for (question, subjects) in [("Q1", "Physics"), ("Q2", "Biology, Physics"), ("Q3", "Art")] {
            service
                .db
                .insert_doubt(&NewDoubt {
                    user_id: user.id,
                    question: question.to_string(),
                    answer: "A".to_string(),
                    subjects: subjects.to_string(),
                    conversation_history: Vec::new(),
                    context_filename: None,
                })
                .unwrap();
        }

        let physics = service
            .doubt_history(&user, Page::default(), Some("Physics"))
            .unwrap();
        assert_eq!(physics.total, 2);
        assert_eq!(physics.doubts[0].question, "Q2");

        let all = service.doubt_history(&user, Page::default(), Some("  ")).unwrap();
        assert_eq!(all.total, 3);

        let first = service.doubt(&user, physics.doubts[1].id).unwrap();
        assert_eq!(first.question, "Q1");
        assert!(matches!(
            service.doubt(&user, 999),
            Err(ServiceError::DoubtNotFound { doubt_id: 999 })
        ));

        add_quiz(&service, &user, "cells", None);
        let profile = service.profile(&user).unwrap();
        assert_eq!(profile.total_doubts, 3);
        assert_eq!(profile.total_quizzes, 1);
        assert_eq!(profile.total_quiz_attempts, 0);
    }

    #[tokio::test]
    async fn test_quiz_file_download() {
        let (service, _dir) = service();
        let user = service.db.create_user("ada@example.com", "ada", "h").unwrap();

        let path = service
            .store_upload(&Upload {
                filename: "cells.txt".to_string(),
                bytes: b"Cells divide.".to_vec(),
            })
            .await
            .unwrap();
        let stored = add_quiz(&service, &user, "cells", Some(path.to_string_lossy().into_owned()));
        let (filename, bytes) = service.quiz_file(&user, stored).await.unwrap();
        assert_eq!(filename, "cells.txt");
        assert_eq!(bytes, b"Cells divide.");

        let missing = add_quiz(&service, &user, "gone", Some("/nonexistent/gone.txt".to_string()));
        assert!(matches!(
            service.quiz_file(&user, missing).await,
            Err(ServiceError::FileNotFound { .. })
        ));

        let no_path = add_quiz(&service, &user, "nothing", None);
        assert!(matches!(
            service.quiz_file(&user, no_path).await,
            Err(ServiceError::FileNotFound { .. })
        ));
    }
}
