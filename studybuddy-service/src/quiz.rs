//! Multiple-choice quiz generation from document sections.

pub mod generator;
pub mod prompts;
pub mod question;

pub use generator::{GenerationStatus, GeneratorSettings, QuizGenerator};
pub use question::GeneratedQuestionSet;
