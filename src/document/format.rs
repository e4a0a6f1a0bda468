//! Format classification and content references for uploaded documents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// MIME type accepted for PDF uploads.
pub const PDF_MIME: &str = "application/pdf";
/// MIME type accepted for plain-text uploads.
pub const TEXT_MIME: &str = "text/plain";
/// MIME type accepted for Word (DOCX) uploads.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Formats on the upload allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format; submitted to the provider as binary content.
    Pdf,
    /// UTF-8 plain text.
    Text,
    /// Office Open XML word-processing document.
    Docx,
}

/// How a format's content reaches the reasoning provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    /// Upload once to the provider's file store and reference the returned handle.
    RemoteHandle,
    /// Extract text locally and embed it in each prompt.
    InlineText,
}

impl DocumentFormat {
    /// Classify a declared MIME type, ignoring case and parameters such as `charset`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match essence.as_str() {
            PDF_MIME => Some(Self::Pdf),
            TEXT_MIME => Some(Self::Text),
            DOCX_MIME => Some(Self::Docx),
            _ => None,
        }
    }

    /// Canonical MIME type for the format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => PDF_MIME,
            Self::Text => TEXT_MIME,
            Self::Docx => DOCX_MIME,
        }
    }

    /// Context strategy used when answering questions about this format.
    pub fn strategy(self) -> ContextStrategy {
        match self {
            Self::Pdf => ContextStrategy::RemoteHandle,
            Self::Text | Self::Docx => ContextStrategy::InlineText,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
            Self::Docx => "docx",
        };
        f.write_str(label)
    }
}

/// Where the content used for answering lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentRef {
    /// Handle returned by the provider's file store.
    Remote {
        /// Provider URI identifying the uploaded file.
        uri: String,
    },
    /// Text is extracted from the stored file whenever it is needed.
    ExtractLocally,
}

impl ContentRef {
    /// Build a remote reference, rejecting blank handles.
    pub fn remote(uri: impl Into<String>) -> Option<Self> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            None
        } else {
            Some(Self::Remote { uri })
        }
    }

    /// Remote handle, if this reference points at the provider.
    pub fn remote_uri(&self) -> Option<&str> {
        match self {
            Self::Remote { uri } => Some(uri),
            Self::ExtractLocally => None,
        }
    }
}
