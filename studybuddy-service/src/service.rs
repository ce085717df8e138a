//! Service coordinator that the HTTP layer calls into.

mod accounts;
mod doubts;
mod history;
mod quiz_generation;

pub use accounts::{AccessToken, NewAccount};
pub use doubts::{DoubtAnswer, DoubtRequest};
pub use history::{
    AttemptReceipt, AttemptSubmission, DoubtPage, Page, Profile, QuizAttemptPage, QuizDetail,
    QuizHistory,
};
pub use quiz_generation::QuizGenerationResult;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Database;
use crate::error::{ProcessingError, ServiceError, ServiceResult};
use crate::i18n::I18n;
use crate::ingestion::{DocumentParser, DocumentSection, sanitize_filename};
use crate::ollama::CompletionClient;

/// A file received from the client
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Main service coordinator
pub struct StudyBuddyService<C> {
    pub config: Arc<AppConfig>,
    pub db: Arc<Database>,
    pub llm: Arc<C>,
    pub i18n: Arc<I18n>,
}

impl<C: CompletionClient> StudyBuddyService<C> {
    pub fn new(config: Arc<AppConfig>, db: Arc<Database>, llm: Arc<C>) -> Self {
        info!(
            data_dir = %config.storage.data_dir.display(),
            quiz_model = %config.quiz_model(),
            "Initializing StudyBuddy service"
        );

        Self {
            config,
            db,
            llm,
            i18n: Arc::new(I18n::new()),
        }
    }

    /// Translated message in the default locale
    pub(crate) fn message(&self, key: &str) -> String {
        self.i18n.get("en", key, None)
    }

    /// Write an upload under the uploads directory with a unique prefix
    async fn store_upload(&self, upload: &Upload) -> ServiceResult<PathBuf> {
        let dir = self.config.storage.uploads_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(ProcessingError::Io)?;

        let path = dir.join(format!(
            "{}_{}",
            Uuid::new_v4(),
            sanitize_filename(&upload.filename)
        ));
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(ProcessingError::Io)?;

        debug!(path = %path.display(), bytes = upload.bytes.len(), "Stored upload");
        Ok(path)
    }

    /// Run a parser on a blocking thread
    async fn parse_file(
        parser: Box<dyn DocumentParser>,
        path: &Path,
    ) -> ServiceResult<Vec<DocumentSection>> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || parser.parse(&path))
            .await
            .map_err(|e| ServiceError::Internal {
                message: format!("Document parsing task failed: {}", e),
            })?
    }
}

async fn remove_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove uploaded file");
    }
}
