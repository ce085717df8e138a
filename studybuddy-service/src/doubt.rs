//! Prompt composition for doubt solving.

use tracing::warn;

use crate::db::ConversationTurn;
use crate::ingestion::DocumentSection;

const TUTOR_PREAMBLE: &str = include_str!("../prompts/doubt_tutor.txt");

/// Everything that goes into one tutoring prompt
#[derive(Debug, Default)]
pub struct DoubtPrompt<'a> {
    /// Question text, already extended with any document context
    pub question: &'a str,
    pub subjects: &'a [String],
    pub history: &'a [ConversationTurn],
    pub has_document: bool,
    pub has_image: bool,
    /// Number of trailing history messages to include
    pub history_window: usize,
}

impl DoubtPrompt<'_> {
    pub fn render(&self) -> String {
        let mut prompt = TUTOR_PREAMBLE.trim_end().to_string();

        if !self.subjects.is_empty() {
            prompt.push_str(&format!(" Subject(s): {}.", self.subjects.join(", ")));
        }
        if self.has_document {
            prompt.push_str(" (A context document was provided.)");
        }
        if self.has_image {
            prompt.push_str(" (A context image was provided.)");
        }

        let start = self.history.len().saturating_sub(self.history_window);
        let lines: Vec<String> = self.history[start..]
            .iter()
            .filter_map(|turn| {
                speaker(&turn.role).map(|who| format!("{}: {}", who, turn.content))
            })
            .collect();
        if !lines.is_empty() {
            prompt.push_str("\n\nConversation History:");
            for line in lines {
                prompt.push('\n');
                prompt.push_str(&line);
            }
        }

        prompt.push_str(&format!("\n\nCurrent Question: {}\n\nAI:", self.question));
        prompt
    }
}

fn speaker(role: &str) -> Option<&'static str> {
    match role {
        "user" => Some("User"),
        "assistant" | "ai" => Some("AI"),
        _ => None,
    }
}

/// Split a comma-separated subject list, dropping blanks
pub fn parse_subjects(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Decode the client's conversation JSON; malformed input yields an empty history
pub fn parse_conversation(raw: Option<&str>) -> Vec<ConversationTurn> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(turns) => turns,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed conversation history");
            Vec::new()
        }
    }
}

/// Render the leading sections of a document as `Page n: ...` lines
pub fn document_context(sections: &[DocumentSection], limit: usize) -> Option<String> {
    let text: String = sections
        .iter()
        .take(limit)
        .map(|section| match (section.page_number(), section.section_number()) {
            (Some(page), _) => format!("Page {}: {}\n\n", page, section.content()),
            (None, Some(n)) => format!("Section {}: {}\n\n", n, section.content()),
            (None, None) => format!("{}\n\n", section.content()),
        })
        .collect();

    if text.is_empty() { None } else { Some(text) }
}

/// Attach document context to the student's question
pub fn question_with_context(question: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("{}\n\nContext from PDF: {}", question, context),
        None => question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subjects() {
        assert_eq!(
            parse_subjects(Some(" Physics, ,Maths ,")),
            vec!["Physics".to_string(), "Maths".to_string()]
        );
        assert!(parse_subjects(None).is_empty());
    }

    #[test]
    fn test_parse_conversation() {
        let turns = parse_conversation(Some(
            r#"[{"role":"user","content":"Hi"},{"role":"ai","content":"Hello"}]"#,
        ));
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, "ai");
        assert!(parse_conversation(Some("{not json")).is_empty());
        assert!(parse_conversation(Some("")).is_empty());
    }

    #[test]
    fn test_render_prompt_with_history_window() {
        let history: Vec<ConversationTurn> = (0..7)
            .map(|i| ConversationTurn {
                role: if i % 2 == 0 { "user" } else { "ai" }.to_string(),
                content: format!("message {i}"),
            })
            .chain(std::iter::once(ConversationTurn {
                role: "system".to_string(),
                content: "hidden".to_string(),
            }))
            .collect();
        let subjects = vec!["Biology".to_string(), "Chemistry".to_string()];

        let prompt = DoubtPrompt {
            question: "What is ATP?",
            subjects: &subjects,
            history: &history,
            has_document: false,
            has_image: true,
            history_window: 5,
        }
        .render();

        assert!(prompt.starts_with("You are an AI tutor."));
        assert!(prompt.contains(" Subject(s): Biology, Chemistry."));
        assert!(prompt.contains("(A context image was provided.)"));
        assert!(!prompt.contains("context document"));
        assert!(!prompt.contains("message 2"));
        assert!(prompt.contains("\nUser: message 4\nAI: message 5\nUser: message 6"));
        assert!(!prompt.contains("hidden"));
        assert!(prompt.ends_with("\n\nCurrent Question: What is ATP?\n\nAI:"));
    }

    #[test]
    fn test_render_without_history() {
        let prompt = DoubtPrompt {
            question: "Define velocity",
            history_window: 5,
            ..Default::default()
        }
        .render();
        assert!(!prompt.contains("Conversation History"));
        assert!(!prompt.contains("Subject(s)"));
    }

    #[test]
    fn test_document_context() {
        let sections = vec![
            DocumentSection::new("Intro to cells", Some(1), Some(1)).unwrap(),
            DocumentSection::new("Cell membranes", Some(2), Some(1)).unwrap(),
            DocumentSection::new("Organelles", Some(3), Some(1)).unwrap(),
        ];
        let context = document_context(&sections, 2).unwrap();
        assert_eq!(context, "Page 1: Intro to cells\n\nPage 2: Cell membranes\n\n");
        assert!(document_context(&[], 5).is_none());

        let question = question_with_context("Explain membranes", Some(&context));
        assert!(question.starts_with("Explain membranes\n\nContext from PDF: Page 1"));
    }
}
