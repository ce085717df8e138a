//! Greedy paragraph/sentence packing into bounded sections.

use std::borrow::Cow;

use crate::config::MIN_SECTION_LENGTH;
use crate::error::ProcessingError;

/// Splits raw text into ordered chunks of at most `max_len` characters.
///
/// Text is split on blank lines into paragraphs; a paragraph longer than the
/// limit is split further after each `". "`, keeping the period. Pieces are
/// packed greedily and joined with a single space. A single piece longer than
/// the limit is emitted on its own, unsplit.
#[derive(Debug, Clone, Copy)]
pub struct SectionSplitter {
    max_len: usize,
}

impl SectionSplitter {
    pub fn new(max_len: usize) -> Result<Self, ProcessingError> {
        if max_len < MIN_SECTION_LENGTH {
            return Err(ProcessingError::InvalidSectionLength {
                got: max_len,
                min: MIN_SECTION_LENGTH,
            });
        }
        Ok(Self { max_len })
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let text = normalize_line_endings(text);
        let mut packer = Packer::new(self.max_len, " ");

        for paragraph in paragraphs(&text) {
            if char_len(paragraph) > self.max_len {
                for sentence in paragraph
                    .split_inclusive(". ")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                {
                    packer.push(sentence);
                }
            } else {
                packer.push(paragraph);
            }
        }

        packer.finish()
    }
}

/// Accumulates pieces into chunks, closing a chunk when the next piece
/// would push it past `max_len`.
pub(crate) struct Packer<'a> {
    max_len: usize,
    separator: &'a str,
    chunks: Vec<String>,
    current: Vec<&'a str>,
    current_len: usize,
}

impl<'a> Packer<'a> {
    pub(crate) fn new(max_len: usize, separator: &'a str) -> Self {
        Self {
            max_len,
            separator,
            chunks: Vec::new(),
            current: Vec::new(),
            current_len: 0,
        }
    }

    pub(crate) fn push(&mut self, piece: &'a str) {
        let piece_len = char_len(piece);
        let joined_len = if self.current.is_empty() {
            piece_len
        } else {
            self.current_len + char_len(self.separator) + piece_len
        };

        if joined_len > self.max_len && !self.current.is_empty() {
            self.close();
            self.current_len = piece_len;
        } else {
            self.current_len = joined_len;
        }
        self.current.push(piece);
    }

    fn close(&mut self) {
        self.chunks.push(self.current.join(self.separator));
        self.current.clear();
        self.current_len = 0;
    }

    pub(crate) fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() {
            self.close();
        }
        self.chunks
    }
}

/// CRLF and lone CR become LF so blank-line paragraph breaks are found
fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").map(str::trim).filter(|p| !p.is_empty())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(word: &str, len: usize) -> String {
        let mut s = String::new();
        while s.len() + word.len() + 1 < len {
            s.push_str(word);
            s.push(' ');
        }
        s.push_str(word);
        s
    }

    #[test]
    fn test_rejects_threshold_below_minimum() {
        assert!(SectionSplitter::new(99).is_err());
        assert!(SectionSplitter::new(100).is_ok());
    }

    #[test]
    fn test_empty_input_yields_nothing() {
        let splitter = SectionSplitter::new(100).unwrap();
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("   \n\n \t \n\n").is_empty());
    }

    #[test]
    fn test_short_paragraphs_pack_together() {
        let splitter = SectionSplitter::new(100).unwrap();
        let chunks = splitter.split("Cells divide.\n\nMitosis has phases.");
        assert_eq!(chunks, vec!["Cells divide. Mitosis has phases."]);
    }

    #[test]
    fn test_2500_chars_with_two_breaks() {
        let mut para = String::new();
        let mut i = 0;
        while para.chars().count() < 840 {
            if !para.is_empty() {
                para.push_str(". ");
            }
            para.push_str(&format!("Sentence {i} covers the water cycle and evaporation"));
            i += 1;
        }
        let text = format!("{para}\n\n{para}\n\n{para}");
        assert!(text.chars().count() >= 2500);

        let splitter = SectionSplitter::new(1000).unwrap();
        let chunks = splitter.split(&text);

        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
        }
    }

    #[test]
    fn test_long_document_chunks_respect_limit() {
        let long_para = (0..40)
            .map(|i| format!("Fact {} states that mitochondria produce energy", i))
            .collect::<Vec<_>>()
            .join(". ");
        let text = format!("{long_para}\n\nShort closing paragraph.\n\n{long_para}");
        assert!(text.chars().count() > 2500);

        let splitter = SectionSplitter::new(1000).unwrap();
        let chunks = splitter.split(&text);

        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn test_crlf_paragraph_breaks() {
        let first = sentence("photosynthesis", 83);
        let second = sentence("respiration", 83);
        let splitter = SectionSplitter::new(100).unwrap();

        let unix = splitter.split(&format!("{first}\n\n{second}"));
        let windows = splitter.split(&format!("{first}\r\n\r\n{second}\r\n"));

        assert_eq!(windows, unix);
        assert_eq!(windows, vec![first, second]);
    }

    #[test]
    fn test_oversized_sentence_emitted_whole() {
        let giant = sentence("osmosis", 300);
        let text = format!("Intro line.\n\n{giant}\n\nOutro line.");
        let splitter = SectionSplitter::new(100).unwrap();
        let chunks = splitter.split(&text);

        assert_eq!(chunks, vec!["Intro line.".to_string(), giant, "Outro line.".to_string()]);
    }

    #[test]
    fn test_preserves_order_without_loss() {
        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        let long_para = (0..25)
            .map(|i| format!("Step {i} of the Krebs cycle releases carbon dioxide"))
            .collect::<Vec<_>>()
            .join(". ");
        let items: Vec<String> = (0..30).map(|i| format!("Item {i} is listed here")).collect();
        let text = format!("{}\n\n{long_para}.\n\n{}", items.join("\n\n"), items.join("\n"));

        let splitter = SectionSplitter::new(120).unwrap();
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        assert_eq!(strip(&chunks.concat()), strip(&text));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // 91 characters (182 bytes) fit in a 100 character section
        let text = format!("{}\n\n{}", "é".repeat(45), "ü".repeat(45));
        let splitter = SectionSplitter::new(100).unwrap();
        assert_eq!(splitter.split(&text).len(), 1);
    }
}
