//! DOCX text extraction via docx-rs.

use std::path::Path;

use tracing::info;

use super::sections::Packer;
use super::{DocumentParser, DocumentSection, SectionSplitter};
use crate::error::{ProcessingError, ServiceResult};

/// Packs non-empty paragraphs greedily, joined by newlines, and numbers the
/// resulting sections from 1. Paragraphs are never split.
pub struct DocxParser {
    splitter: SectionSplitter,
}

impl DocxParser {
    pub fn new(max_section_length: usize) -> Result<Self, ProcessingError> {
        Ok(Self {
            splitter: SectionSplitter::new(max_section_length)?,
        })
    }

    fn sections_from_paragraphs(&self, paragraphs: &[String]) -> Vec<DocumentSection> {
        let mut packer = Packer::new(self.splitter.max_len(), "\n");
        for paragraph in paragraphs.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            packer.push(paragraph);
        }

        packer
            .finish()
            .into_iter()
            .enumerate()
            .filter_map(|(index, chunk)| DocumentSection::new(chunk, None, Some(index as u32 + 1)))
            .collect()
    }
}

/// Extract the text of each top-level paragraph
fn read_paragraphs(data: &[u8]) -> Result<Vec<String>, ProcessingError> {
    let doc = docx_rs::read_docx(data).map_err(|e| ProcessingError::DocxRead {
        message: e.to_string(),
    })?;

    let mut paragraphs = Vec::new();
    for child in doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(p) = child {
            let mut text = String::new();
            for child in p.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            paragraphs.push(text);
        }
    }

    Ok(paragraphs)
}

impl DocumentParser for DocxParser {
    fn parse(&self, path: &Path) -> ServiceResult<Vec<DocumentSection>> {
        let data = std::fs::read(path).map_err(ProcessingError::Io)?;
        let paragraphs = read_paragraphs(&data)?;
        let sections = self.sections_from_paragraphs(&paragraphs);
        info!(
            paragraphs = paragraphs.len(),
            sections = sections.len(),
            path = %path.display(),
            "Extracted DOCX sections"
        );
        Ok(sections)
    }
}
