use crate::extractor::{PageText, PdfExtractor};
use crate::models::{SkippedFile, UploadedFile};
use crate::IngestError;

pub struct ExtractedDocument {
    pub file_name: String,
    pub pages: Vec<PageText>,
}

pub struct IngestionReport {
    pub documents: Vec<ExtractedDocument>,
    pub skipped_files: Vec<SkippedFile>,
}

impl IngestionReport {
    pub fn page_count(&self) -> usize {
        self.documents
            .iter()
            .map(|document| document.pages.len())
            .sum()
    }
}

/// Rejects the whole batch when any file is not declared as a PDF.
pub fn validate_pdf_batch(files: &[UploadedFile]) -> Result<(), IngestError> {
    if files.is_empty() {
        return Err(IngestError::NoFiles);
    }
    match files.iter().find(|file| !file.is_pdf()) {
        Some(file) => Err(IngestError::NotPdf(file.file_name.clone())),
        None => Ok(()),
    }
}

/// Extracts every file independently; a file that fails is reported as
/// skipped and does not stop its siblings.
pub fn extract_pdf_batch_best_effort(
    extractor: &dyn PdfExtractor,
    files: &[UploadedFile],
) -> Result<IngestionReport, IngestError> {
    validate_pdf_batch(files)?;

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for file in files {
        match extractor.extract_pages(&file.bytes) {
            Ok(pages) => documents.push(ExtractedDocument {
                file_name: file.file_name.clone(),
                pages,
            }),
            Err(error) => skipped_files.push(SkippedFile {
                file_name: file.file_name.clone(),
                reason: error.to_string(),
            }),
        }
    }

    Ok(IngestionReport {
        documents,
        skipped_files,
    })
}
