//! Plain UTF-8 text files.

use std::path::Path;

use super::{DocumentParser, DocumentSection, SectionSplitter};
use crate::error::{ProcessingError, ServiceResult};

pub struct TxtParser {
    splitter: SectionSplitter,
}

impl TxtParser {
    pub fn new(max_section_length: usize) -> Result<Self, ProcessingError> {
        Ok(Self {
            splitter: SectionSplitter::new(max_section_length)?,
        })
    }
}

impl DocumentParser for TxtParser {
    fn parse(&self, path: &Path) -> ServiceResult<Vec<DocumentSection>> {
        let text = std::fs::read_to_string(path).map_err(ProcessingError::Io)?;

        Ok(self
            .splitter
            .split(&text)
            .into_iter()
            .enumerate()
            .filter_map(|(index, chunk)| DocumentSection::new(chunk, None, Some(index as u32 + 1)))
            .collect())
    }
}
