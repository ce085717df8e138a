//! Document parsing: uploaded files become ordered, length-bounded sections.

pub mod docx;
pub mod pdf;
pub mod sections;
pub mod text;

use std::path::{Path, PathBuf};

use crate::error::{ProcessingError, ServiceResult};

pub use docx::DocxParser;
pub use pdf::PdfParser;
pub use sections::SectionSplitter;
pub use text::TxtParser;

/// A bounded-length excerpt of a parsed document.
///
/// Content is never blank; [`DocumentSection::new`] refuses whitespace-only text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSection {
    content: String,
    page_number: Option<u32>,
    section_number: Option<u32>,
}

impl DocumentSection {
    pub fn new(
        content: impl Into<String>,
        page_number: Option<u32>,
        section_number: Option<u32>,
    ) -> Option<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return None;
        }
        Some(Self {
            content,
            page_number,
            section_number,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn page_number(&self) -> Option<u32> {
        self.page_number
    }

    pub fn section_number(&self) -> Option<u32> {
        self.section_number
    }
}

/// A parser for one document format
pub trait DocumentParser: Send + Sync {
    fn parse(&self, path: &Path) -> ServiceResult<Vec<DocumentSection>>;
}

/// Pick a parser from the file extension (case-insensitive).
pub fn parser_for_path(
    path: &Path,
    max_section_length: usize,
) -> ServiceResult<Box<dyn DocumentParser>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let parser: Box<dyn DocumentParser> = match extension.as_str() {
        "pdf" => Box::new(PdfParser::new(max_section_length)?),
        "docx" => Box::new(DocxParser::new(max_section_length)?),
        "txt" => Box::new(TxtParser::new(max_section_length)?),
        _ => {
            return Err(ProcessingError::UnsupportedFormat {
                format: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    format!(".{}", extension)
                },
            }
            .into());
        }
    };

    Ok(parser)
}

/// Sanitize a filename for storage
pub fn sanitize_filename(name: &str) -> String {
    let name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Stem of a filename, used as a quiz title
pub fn file_stem(name: &str) -> String {
    PathBuf::from(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    #[test]
    fn test_section_rejects_blank_content() {
        assert!(DocumentSection::new("   \n\t", None, Some(1)).is_none());
        let section = DocumentSection::new("Photosynthesis", Some(2), Some(1)).unwrap();
        assert_eq!(section.content(), "Photosynthesis");
        assert_eq!(section.page_number(), Some(2));
    }

    #[test]
    fn test_parser_for_unsupported_extension() {
        let result = parser_for_path(Path::new("notes.xlsx"), 1000);
        match result {
            Err(ServiceError::Processing(ProcessingError::UnsupportedFormat { format })) => {
                assert_eq!(format, ".xlsx");
            }
            _ => panic!("expected unsupported format"),
        }
    }

    #[test]
    fn test_parser_for_is_case_insensitive() {
        assert!(parser_for_path(Path::new("Lecture.TXT"), 1000).is_ok());
        assert!(parser_for_path(Path::new("Lecture.Docx"), 1000).is_ok());
        assert!(parser_for_path(Path::new("Lecture.pdf"), 1000).is_ok());
    }

    #[test]
    fn test_parser_for_rejects_short_threshold() {
        let result = parser_for_path(Path::new("notes.txt"), 99);
        assert!(matches!(
            result,
            Err(ServiceError::Processing(
                ProcessingError::InvalidSectionLength { got: 99, .. }
            ))
        ));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my notes (1).pdf"), "my_notes__1_.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("biology chapter 3.pdf"), "biology chapter 3");
        assert_eq!(file_stem("README"), "README");
    }
}
