//! Quiz question model, LLM response parsing and validation.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

/// The four option slots an answer may reference
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AnswerOption {
    Opt1,
    Opt2,
    Opt3,
    Opt4,
}

/// A validated four-option multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub opt1: String,
    pub opt2: String,
    pub opt3: String,
    pub opt4: String,
    pub answer: AnswerOption,
    #[serde(default)]
    pub explanation: String,
}

impl QuizQuestion {
    pub fn option(&self, slot: AnswerOption) -> &str {
        match slot {
            AnswerOption::Opt1 => &self.opt1,
            AnswerOption::Opt2 => &self.opt2,
            AnswerOption::Opt3 => &self.opt3,
            AnswerOption::Opt4 => &self.opt4,
        }
    }

    pub fn correct_option(&self) -> &str {
        self.option(self.answer)
    }
}

/// Question object as the model returned it, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuizQuestion {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub opt1: String,
    #[serde(default)]
    pub opt2: String,
    #[serde(default)]
    pub opt3: String,
    #[serde(default)]
    pub opt4: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

/// Why a parsed question was not accepted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("answer {0:?} is not one of opt1, opt2, opt3, opt4")]
    InvalidAnswer(String),

    #[error("question text is empty")]
    BlankQuestion,

    #[error("option {0} is empty")]
    BlankOption(AnswerOption),

    #[error("options are not distinct")]
    DuplicateOptions,
}

impl RawQuizQuestion {
    pub fn validate(self) -> Result<QuizQuestion, Rejection> {
        let answer: AnswerOption = self
            .answer
            .trim()
            .parse()
            .map_err(|_| Rejection::InvalidAnswer(self.answer.clone()))?;

        let question = self.question.trim().to_string();
        if question.is_empty() {
            return Err(Rejection::BlankQuestion);
        }

        let candidate = QuizQuestion {
            question,
            opt1: self.opt1.trim().to_string(),
            opt2: self.opt2.trim().to_string(),
            opt3: self.opt3.trim().to_string(),
            opt4: self.opt4.trim().to_string(),
            answer,
            explanation: self.explanation.trim().to_string(),
        };

        let mut seen: Vec<&str> = Vec::with_capacity(4);
        for slot in AnswerOption::iter() {
            let text = candidate.option(slot);
            if text.is_empty() {
                return Err(Rejection::BlankOption(slot));
            }
            if seen.contains(&text) {
                return Err(Rejection::DuplicateOptions);
            }
            seen.push(text);
        }

        Ok(candidate)
    }
}

/// Failure to turn a model reply into a question
#[derive(Error, Debug)]
pub enum ParseFailure {
    #[error("reply contains no JSON object")]
    NoJsonObject,

    #[error("reply is not a valid question object")]
    Json(#[source] serde_json::Error),

    #[error("question rejected: {0}")]
    Rejected(#[from] Rejection),
}

/// Parse and validate one question from a model reply.
///
/// Replies wrapped in code fences or surrounded by prose are accepted; the
/// outermost `{ ... }` span is decoded.
pub fn parse_question(reply: &str) -> Result<QuizQuestion, ParseFailure> {
    let start = reply.find('{').ok_or(ParseFailure::NoJsonObject)?;
    let end = reply.rfind('}').ok_or(ParseFailure::NoJsonObject)?;
    if end < start {
        return Err(ParseFailure::NoJsonObject);
    }

    let raw: RawQuizQuestion =
        serde_json::from_str(&reply[start..=end]).map_err(ParseFailure::Json)?;
    Ok(raw.validate()?)
}

/// Insertion-ordered `question{n}` -> question mapping.
///
/// Serializes as a JSON object whose keys keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedQuestionSet {
    entries: Vec<(String, QuizQuestion)>,
}

impl GeneratedQuestionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact, case-sensitive match against accepted question texts
    pub fn contains_question(&self, text: &str) -> bool {
        self.entries.iter().any(|(_, q)| q.question == text)
    }

    /// Append under the next free `question{n}` key and return that key
    pub fn push(&mut self, question: QuizQuestion) -> String {
        let mut n = self.entries.len() + 1;
        let mut key = format!("question{}", n);
        while self.entries.iter().any(|(k, _)| *k == key) {
            n += 1;
            key = format!("question{}", n);
        }
        self.entries.push((key.clone(), question));
        key
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QuizQuestion)> {
        self.entries.iter().map(|(k, q)| (k.as_str(), q))
    }

    pub fn question_texts(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, q)| q.question.as_str()).collect()
    }
}

impl Serialize for GeneratedQuestionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, question) in &self.entries {
            map.serialize_entry(key, question)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for GeneratedQuestionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SetVisitor;

        impl<'de> Visitor<'de> for SetVisitor {
            type Value = GeneratedQuestionSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of question keys to questions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, question)) = access.next_entry::<String, QuizQuestion>()? {
                    entries.push((key, question));
                }
                Ok(GeneratedQuestionSet { entries })
            }
        }

        deserializer.deserialize_map(SetVisitor)
    }
}
