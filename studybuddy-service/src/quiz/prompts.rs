//! Prompt construction for single-question generation.

use crate::ollama::ChatMessage;

const QUESTION_PROMPT_TEMPLATE: &str = include_str!("../../prompts/quiz_question.txt");

const SYSTEM_PROMPT: &str = "You write multiple-choice quiz questions for students. \
You are called by a program, so always reply with exactly one JSON object.";

/// Build the chat for one generation attempt.
///
/// `feedback` describes what was wrong with the previous attempt, if anything.
pub fn question_messages(
    context: &str,
    previous_questions: &[&str],
    feedback: Option<&str>,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(question_prompt(context, previous_questions, feedback)),
    ]
}

fn question_prompt(context: &str, previous_questions: &[&str], feedback: Option<&str>) -> String {
    let previous = if previous_questions.is_empty() {
        "(none yet)".to_string()
    } else {
        previous_questions
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let feedback = feedback
        .map(|f| format!("\nYour previous reply was not usable: {}. Write a different question.", f))
        .unwrap_or_default();

    fill_template(
        QUESTION_PROMPT_TEMPLATE,
        &[
            ("context", context.trim()),
            ("previous_questions", &previous),
            ("feedback", &feedback),
        ],
    )
}

/// Substitute `{name}` placeholders in one pass; substituted text is never rescanned
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let placeholder = values.iter().find(|(name, _)| {
            tail.strip_prefix(*name)
                .is_some_and(|after| after.starts_with('}'))
        });
        match placeholder {
            Some((name, value)) => {
                out.push_str(value);
                rest = &tail[name.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    out
}
