//! PDF text extraction, chunked independently per page.

use std::path::Path;

use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use super::{DocumentParser, DocumentSection, SectionSplitter};
use crate::error::{ProcessingError, ServiceResult};

/// Create a new Pdfium instance (dynamically linked).
///
/// Searches for libpdfium in:
/// 1. Current directory (./libpdfium.so)
/// 2. vendor/pdfium/lib/
/// 3. System library paths
pub fn create_pdfium() -> Result<Pdfium, ProcessingError> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "./vendor/pdfium/lib/",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ProcessingError::TextExtraction {
            page: 0,
            source: Box::new(std::io::Error::other(format!(
                "Failed to load PDFium library. Install libpdfium or place it in vendor/pdfium/lib/: {:?}",
                e
            ))),
        })?;

    Ok(Pdfium::new(bindings))
}

/// Each page is split on its own; sections carry the 1-based page number and
/// a section number that restarts on every page.
pub struct PdfParser {
    splitter: SectionSplitter,
}

impl PdfParser {
    pub fn new(max_section_length: usize) -> Result<Self, ProcessingError> {
        Ok(Self {
            splitter: SectionSplitter::new(max_section_length)?,
        })
    }

    /// Turn already-extracted page texts into sections
    fn sections_from_pages<'a>(
        &self,
        pages: impl IntoIterator<Item = (u32, &'a str)>,
    ) -> Vec<DocumentSection> {
        let mut sections = Vec::new();
        for (page_number, text) in pages {
            if text.trim().is_empty() {
                debug!(page = page_number, "Skipping page without text");
                continue;
            }
            for (index, chunk) in self.splitter.split(text).into_iter().enumerate() {
                sections.extend(DocumentSection::new(
                    chunk,
                    Some(page_number),
                    Some(index as u32 + 1),
                ));
            }
        }
        sections
    }
}

impl DocumentParser for PdfParser {
    fn parse(&self, path: &Path) -> ServiceResult<Vec<DocumentSection>> {
        let pdfium = create_pdfium()?;

        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| ProcessingError::TextExtraction {
                    page: 0,
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Failed to load PDF: {:?}", e),
                    )),
                })?;

        let page_count = document.pages().len();
        info!(pages = page_count, path = %path.display(), "Processing PDF pages");

        let mut pages: Vec<(u32, String)> = Vec::new();
        for (page_index, page) in document.pages().iter().enumerate() {
            let page_num = page_index as u32 + 1;

            let text = page.text().map_err(|e| {
                warn!(page = page_num, error = ?e, "Failed to get text object for page");
                ProcessingError::TextExtraction {
                    page: page_num,
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Failed to extract text from page {}: {:?}", page_num, e),
                    )),
                }
            })?;

            pages.push((page_num, text.all()));
        }

        let sections =
            self.sections_from_pages(pages.iter().map(|(n, text)| (*n, text.as_str())));
        info!(sections = sections.len(), "Extracted PDF sections");
        Ok(sections)
    }
}
