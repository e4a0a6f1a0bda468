//! Reasoning provider abstraction.
//!
//! The pipeline talks to the provider through [`ReasoningProvider`]: a file side channel for
//! formats submitted as binary content, and a text generation call taking a grounded
//! [`Prompt`]. Failures are classified into [`ProviderError`] kinds so the
//! [`ResilientInvoker`] can retry overload and surface everything else unchanged.

pub mod gemini;
pub mod retry;

pub use gemini::GeminiClient;
pub use retry::{InvokeError, ResilientInvoker, RetryPolicy};

use crate::prompt::Prompt;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by reasoning providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider is temporarily saturated; the call may succeed later.
    #[error("provider is temporarily overloaded ({status}): {message}")]
    Overloaded {
        /// HTTP status reported by the provider.
        status: u16,
        /// Provider diagnostic.
        message: String,
    },
    /// Credentials were missing or rejected.
    #[error("provider rejected credentials ({status}): {message}")]
    Unauthorized {
        /// HTTP status reported by the provider.
        status: u16,
        /// Provider diagnostic.
        message: String,
    },
    /// The request itself was malformed or refused.
    #[error("provider rejected the request ({status}): {message}")]
    InvalidRequest {
        /// HTTP status reported by the provider.
        status: u16,
        /// Provider diagnostic.
        message: String,
    },
    /// The remote file handle expired or no longer exists.
    #[error("remote file handle is expired or missing: {message}")]
    HandleUnavailable {
        /// Provider diagnostic.
        message: String,
    },
    /// Provider failed with a server error other than overload.
    #[error("provider failed ({status}): {message}")]
    Upstream {
        /// HTTP status reported by the provider.
        status: u16,
        /// Provider diagnostic.
        message: String,
    },
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider response could not be interpreted.
    #[error("malformed provider response: {0}")]
    InvalidResponse(String),
    /// The local file to upload could not be read.
    #[error("failed to read {path} for upload: {source}")]
    LocalFile {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

impl ProviderError {
    /// Whether the failure is transient overload and worth retrying.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Overloaded { .. })
    }

    /// Whether the failure means the document must be uploaded again.
    pub fn is_handle_unavailable(&self) -> bool {
        matches!(self, Self::HandleUnavailable { .. })
    }
}

/// File accepted by the provider's storage side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// URI used to reference the file in prompts.
    pub uri: String,
}

/// Interface implemented by reasoning backends.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Upload a local file once and return its reusable handle.
    async fn upload_file(
        &self,
        path: &Path,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, ProviderError>;

    /// Generate a reply for the prompt.
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError>;

    /// Delete a previously uploaded file by URI.
    async fn delete_file(&self, uri: &str) -> Result<(), ProviderError>;
}
