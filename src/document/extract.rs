//! Turn stored files into the context representation handed to the provider.
//!
//! Remote-handle formats never touch the file here: the handle captured at upload is reused.
//! Inline formats are read and decoded on every call, so the preview endpoint and the chat
//! pipeline always see the same text for the same file.

use super::docx::extract_docx_text;
use super::{ContentRef, Document, DocumentFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;

const UTF8_BOM: char = '\u{feff}';

/// Errors raised while extracting text from a stored document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The stored file could not be read.
    #[error("failed to read stored file {path}: {source}")]
    Io {
        /// Location of the stored file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Plain-text content was not valid UTF-8.
    #[error("document text is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    /// The DOCX container could not be opened or read.
    #[error("invalid DOCX archive: {0}")]
    Archive(String),
    /// The DOCX container lacks its main document part.
    #[error("DOCX archive has no word/document.xml")]
    MissingDocumentXml,
    /// The format is submitted to the provider as binary content instead.
    #[error("{0} documents are not extracted locally")]
    NotInline(DocumentFormat),
    /// The blocking extraction task was cancelled or panicked.
    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Document content in the shape the prompt builder consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextRepresentation {
    /// Reference to a file already held by the provider.
    Remote {
        /// Provider handle returned at upload.
        handle: String,
        /// MIME type announced alongside the handle.
        mime_type: &'static str,
    },
    /// Locally extracted document text.
    Inline {
        /// Full extracted text.
        text: String,
    },
}

/// Extract plain text from a stored inline-format file.
pub async fn extract_text(path: &Path, format: DocumentFormat) -> Result<String, ExtractionError> {
    let text = match format {
        DocumentFormat::Pdf => return Err(ExtractionError::NotInline(format)),
        DocumentFormat::Text => decode_plain_text(read_stored(path).await?)?,
        DocumentFormat::Docx => {
            let bytes = read_stored(path).await?;
            tokio::task::spawn_blocking(move || extract_docx_text(&bytes))
                .await
                .map_err(|error| ExtractionError::Task(error.to_string()))??
        }
    };

    tracing::debug!(
        path = %path.display(),
        %format,
        chars = text.chars().count(),
        "Extracted document text"
    );
    Ok(text)
}

/// Produce the context representation for a document whose file lives at `path`.
pub async fn prepare_context(
    document: &Document,
    path: &Path,
) -> Result<ContextRepresentation, ExtractionError> {
    match &document.content {
        ContentRef::Remote { uri } => Ok(ContextRepresentation::Remote {
            handle: uri.clone(),
            mime_type: document.format.mime_type(),
        }),
        ContentRef::ExtractLocally => {
            let text = extract_text(path, document.format).await?;
            Ok(ContextRepresentation::Inline { text })
        }
    }
}

async fn read_stored(path: &Path) -> Result<Vec<u8>, ExtractionError> {
    tokio::fs::read(path)
        .await
        .map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn decode_plain_text(bytes: Vec<u8>) -> Result<String, ExtractionError> {
    let text = String::from_utf8(bytes)?;
    Ok(match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::OwnerId;
    use crate::document::docx::tests::build_docx;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn document(format: DocumentFormat, content: ContentRef) -> Document {
        Document {
            id: Uuid::new_v4(),
            owner_id: OwnerId::new("owner").expect("owner"),
            stored_name: "stored".into(),
            original_name: "original".into(),
            format,
            content,
            size_bytes: 0,
            sha256: String::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn plain_text_extraction_is_deterministic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, "\u{feff}Line one\nLine two\n")
            .await
            .expect("write");

        let first = extract_text(&path, DocumentFormat::Text).await.expect("first");
        let second = extract_text(&path, DocumentFormat::Text).await.expect("second");

        assert_eq!(first, "Line one\nLine two\n");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn invalid_utf8_fails_extraction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("latin1.txt");
        tokio::fs::write(&path, [0x66, 0x6f, 0xff, 0xfe]).await.expect("write");

        let error = extract_text(&path, DocumentFormat::Text)
            .await
            .expect_err("encoding");
        assert!(matches!(error, ExtractionError::Encoding(_)));
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gone.txt");
        let error = extract_text(&path, DocumentFormat::Text)
            .await
            .expect_err("missing");
        assert!(matches!(error, ExtractionError::Io { path: reported, .. } if reported == path));
    }

    #[tokio::test]
    async fn docx_files_are_extracted_inline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.docx");
        tokio::fs::write(&path, build_docx(&["Revenue grew 12%."]))
            .await
            .expect("write");

        let context = prepare_context(
            &document(DocumentFormat::Docx, ContentRef::ExtractLocally),
            &path,
        )
        .await
        .expect("context");
        assert_eq!(
            context,
            ContextRepresentation::Inline {
                text: "Revenue grew 12%.".into()
            }
        );
    }

    #[tokio::test]
    async fn remote_documents_reuse_their_handle_without_reading() {
        let path = Path::new("/nonexistent/never-read.pdf");
        let context = prepare_context(
            &document(
                DocumentFormat::Pdf,
                ContentRef::Remote {
                    uri: "https://files.example/v1beta/files/abc".into(),
                },
            ),
            path,
        )
        .await
        .expect("context");

        assert_eq!(
            context,
            ContextRepresentation::Remote {
                handle: "https://files.example/v1beta/files/abc".into(),
                mime_type: "application/pdf",
            }
        );
    }

    #[tokio::test]
    async fn pdf_text_is_never_extracted_locally() {
        let error = extract_text(Path::new("whatever.pdf"), DocumentFormat::Pdf)
            .await
            .expect_err("not inline");
        assert!(matches!(error, ExtractionError::NotInline(DocumentFormat::Pdf)));
    }
}
