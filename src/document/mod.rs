//! Document records, format classification, and local text extraction.

mod docx;
pub mod extract;
pub mod format;

pub use extract::{ContextRepresentation, ExtractionError, extract_text, prepare_context};
pub use format::{ContentRef, ContextStrategy, DocumentFormat};

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Identity of the caller that owns documents and conversations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap a non-blank identity, trimming surrounding whitespace.
    pub fn new(value: impl AsRef<str>) -> Option<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Borrow the raw identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An uploaded document owned by a single identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique document identifier.
    pub id: Uuid,
    /// Owner of the document.
    pub owner_id: OwnerId,
    /// File name inside the upload directory.
    pub stored_name: String,
    /// Name supplied by the uploader, used for display.
    pub original_name: String,
    /// Format derived from the declared MIME type at upload.
    pub format: DocumentFormat,
    /// Remote handle or local-extraction marker.
    pub content: ContentRef,
    /// Size of the uploaded file in bytes.
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 digest of the uploaded bytes.
    pub sha256: String,
    /// Upload time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
