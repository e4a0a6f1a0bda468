//! Requests, results, and errors exchanged with the document pipeline.

use crate::document::ExtractionError;
use crate::files::FileStorageError;
use crate::provider::{InvokeError, ProviderError};
use crate::store::StoreError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// File received from an uploader.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Name supplied by the uploader.
    pub file_name: String,
    /// Declared MIME type of the upload.
    pub mime_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Grounded reply to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatAnswer {
    /// Answer text as stored in the conversation, excerpt included.
    pub answer: String,
    /// Supporting passage quoted from the document, when one was returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Text preview of a stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// Locally extracted text.
    Inline(String),
    /// The format is only readable by the provider.
    NotAvailable,
}

/// Stored bytes of a document with their metadata.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// File contents.
    pub bytes: Vec<u8>,
    /// MIME type recorded at upload.
    pub mime_type: &'static str,
    /// Name supplied by the uploader.
    pub file_name: String,
}

/// Progress of a single chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    /// Question accepted and document ownership checked.
    Validated,
    /// Document content prepared for the prompt.
    ContextReady,
    /// Grounded prompt assembled.
    PromptBuilt,
    /// Provider reply received.
    AnswerObtained,
    /// Turn written to the conversation store.
    Persisted,
    /// Answer handed back to the caller.
    Responded,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validated => "validated",
            Self::ContextReady => "context_ready",
            Self::PromptBuilt => "prompt_built",
            Self::AnswerObtained => "answer_obtained",
            Self::Persisted => "persisted",
            Self::Responded => "responded",
        };
        f.write_str(label)
    }
}

/// Errors emitted by the document pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Declared MIME type is not on the allow-list.
    #[error("unsupported document type: {mime_type}")]
    UnsupportedFormat {
        /// MIME type supplied by the uploader.
        mime_type: String,
    },
    /// Local text extraction failed.
    #[error("failed to extract document text: {0}")]
    ExtractionFailed(#[from] ExtractionError),
    /// No document with this identifier exists for the caller.
    #[error("document {0} not found")]
    DocumentNotFound(Uuid),
    /// The document belongs to another owner.
    #[error("document {0} belongs to another owner")]
    PermissionDenied(Uuid),
    /// The provider stayed overloaded through every retry.
    #[error("provider overloaded after {attempts} attempts")]
    ProviderOverloaded {
        /// Attempts made, including the first.
        attempts: u32,
    },
    /// The provider failed with a non-retryable error.
    #[error("provider rejected the request: {source}")]
    ProviderRejected {
        /// Classified provider failure.
        #[source]
        source: ProviderError,
    },
    /// Reading or writing records failed.
    #[error("failed to persist records: {0}")]
    PersistenceFailed(#[from] StoreError),
    /// Caller input was rejected before any work was done.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Stored file could not be written or read.
    #[error("file storage failed: {0}")]
    Storage(#[from] FileStorageError),
}

impl PipelineError {
    /// Whether the provider reported that the document's remote handle is gone.
    pub fn is_expired_handle(&self) -> bool {
        matches!(self, Self::ProviderRejected { source } if source.is_handle_unavailable())
    }

    /// Message suitable for showing to the person who made the request.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnsupportedFormat { mime_type } => format!(
                "Files of type {mime_type} are not supported. Upload a PDF, plain text, or DOCX file."
            ),
            Self::ExtractionFailed(_) => {
                "The document text could not be read. Check that the file is not corrupted.".into()
            }
            Self::DocumentNotFound(_) => "Document not found.".into(),
            Self::PermissionDenied(_) => "You do not have access to this document.".into(),
            Self::ProviderOverloaded { .. } => {
                "The AI service is busy right now. Please try again shortly.".into()
            }
            error if error.is_expired_handle() => {
                "The stored copy of this document has expired. Please re-upload the document.".into()
            }
            Self::ProviderRejected { .. } => "The AI service could not process the request.".into(),
            Self::PersistenceFailed(_) | Self::Storage(_) => {
                "The request could not be saved. Please try again.".into()
            }
            Self::InvalidInput(message) => message.clone(),
        }
    }
}

impl From<InvokeError> for PipelineError {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::Overloaded { attempts, .. } => Self::ProviderOverloaded { attempts },
            InvokeError::Provider(source) => Self::ProviderRejected { source },
        }
    }
}
