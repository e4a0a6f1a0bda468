//! Document service coordinating file storage, extraction, the provider, and persistence.

use crate::{
    document::{
        ContentRef, ContextStrategy, Document, DocumentFormat, OwnerId, extract_text,
        prepare_context,
    },
    files::FileStorage,
    metrics::{MetricsSnapshot, ServiceMetrics},
    pipeline::types::{
        ChatAnswer, DownloadedFile, PipelineError, Preview, TurnStage, UploadRequest,
    },
    prompt::{GroundedAnswer, build_prompt},
    provider::{ProviderError, ReasoningProvider, ResilientInvoker, RetryPolicy},
    store::{ConversationStore, DocumentRepository, Message},
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

const FALLBACK_DISPLAY_NAME: &str = "document";

/// Operations exposed to the HTTP surface.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Store an upload and register it for `owner`.
    async fn ingest(&self, owner: &OwnerId, upload: UploadRequest)
    -> Result<Document, PipelineError>;

    /// Documents of `owner`, newest first.
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Document>, PipelineError>;

    /// Answer `question` from the document and record the turn.
    async fn ask(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
        question: &str,
    ) -> Result<ChatAnswer, PipelineError>;

    /// Conversation messages for the document, oldest first.
    async fn history(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<Vec<Message>, PipelineError>;

    /// Locally extracted text, when the format allows it.
    async fn preview(&self, owner: &OwnerId, document_id: Uuid)
    -> Result<Preview, PipelineError>;

    /// Stored bytes of the document.
    async fn download(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<DownloadedFile, PipelineError>;

    /// Remove the document with its conversation and stored file.
    async fn delete(&self, owner: &OwnerId, document_id: Uuid) -> Result<(), PipelineError>;

    /// Current counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs uploads and grounded question turns against shared stores and a provider.
///
/// Build one instance at startup and share it through an `Arc`; every dependency is itself
/// shareable, so concurrent requests only contend on the stores' internal locks.
pub struct DocumentService {
    documents: Arc<dyn DocumentRepository>,
    conversations: Arc<dyn ConversationStore>,
    files: FileStorage,
    provider: Arc<dyn ReasoningProvider>,
    invoker: ResilientInvoker,
    metrics: Arc<ServiceMetrics>,
    history_turns: usize,
}

impl DocumentService {
    /// Assemble the service from its collaborators.
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        conversations: Arc<dyn ConversationStore>,
        files: FileStorage,
        provider: Arc<dyn ReasoningProvider>,
        policy: RetryPolicy,
    ) -> Self {
        let metrics = Arc::new(ServiceMetrics::new());
        Self {
            documents,
            conversations,
            files,
            provider,
            invoker: ResilientInvoker::new(policy).with_metrics(metrics.clone()),
            metrics,
            history_turns: 0,
        }
    }

    /// Replay up to `turns` earlier question/answer pairs into each prompt.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    async fn owned_document(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<Document, PipelineError> {
        let document = self
            .documents
            .find(document_id)
            .await?
            .ok_or(PipelineError::DocumentNotFound(document_id))?;
        if &document.owner_id != owner {
            tracing::warn!(%document_id, %owner, "Rejected access to foreign document");
            return Err(PipelineError::PermissionDenied(document_id));
        }
        Ok(document)
    }

    async fn register(
        &self,
        owner: &OwnerId,
        format: DocumentFormat,
        original_name: String,
        stored_name: String,
        bytes: &[u8],
    ) -> Result<Document, PipelineError> {
        let content = match format.strategy() {
            ContextStrategy::InlineText => ContentRef::ExtractLocally,
            ContextStrategy::RemoteHandle => {
                let path = self.files.path_for(&stored_name);
                let provider = &self.provider;
                let (path, name) = (&path, original_name.as_str());
                let remote = self
                    .invoker
                    .run("upload", move || {
                        provider.upload_file(path, format.mime_type(), name)
                    })
                    .await?;
                ContentRef::remote(remote.uri).ok_or_else(|| PipelineError::ProviderRejected {
                    source: ProviderError::InvalidResponse("provider returned an empty file handle".into()),
                })?
            }
        };

        let document = Document {
            id: Uuid::new_v4(),
            owner_id: owner.clone(),
            stored_name,
            original_name,
            format,
            content,
            size_bytes: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
            created_at: OffsetDateTime::now_utc(),
        };

        if let Err(error) = self.documents.insert(document.clone()).await {
            self.discard_remote(&document.content).await;
            return Err(error.into());
        }
        Ok(document)
    }

    async fn discard_file(&self, stored_name: &str) {
        if let Err(error) = self.files.remove(stored_name).await {
            tracing::warn!(stored_name, error = %error, "Failed to remove stored file");
        }
    }

    async fn discard_remote(&self, content: &ContentRef) {
        let Some(uri) = content.remote_uri() else {
            return;
        };
        if let Err(error) = self.provider.delete_file(uri).await {
            tracing::warn!(uri, error = %error, "Failed to delete remote file");
        }
    }

    async fn recent_history(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<Vec<Message>, PipelineError> {
        if self.history_turns == 0 {
            return Ok(Vec::new());
        }
        let mut messages = self.conversations.history(owner, document_id).await?;
        let keep = self.history_turns.saturating_mul(2);
        if messages.len() > keep {
            messages.drain(..messages.len() - keep);
        }
        Ok(messages)
    }
}

fn advance(document_id: Uuid, stage: TurnStage) {
    tracing::debug!(%document_id, %stage, "Chat turn advanced");
}

fn display_name(file_name: &str) -> String {
    let trimmed = file_name.trim();
    if trimmed.is_empty() {
        FALLBACK_DISPLAY_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn ingest(
        &self,
        owner: &OwnerId,
        upload: UploadRequest,
    ) -> Result<Document, PipelineError> {
        let Some(format) = DocumentFormat::from_mime(&upload.mime_type) else {
            tracing::warn!(%owner, mime_type = %upload.mime_type, "Rejected unsupported upload");
            return Err(PipelineError::UnsupportedFormat {
                mime_type: upload.mime_type,
            });
        };
        if upload.bytes.is_empty() {
            return Err(PipelineError::InvalidInput("The uploaded file is empty.".into()));
        }

        let original_name = display_name(&upload.file_name);
        let stored_name = self.files.save(&original_name, &upload.bytes).await?;
        match self
            .register(owner, format, original_name, stored_name.clone(), &upload.bytes)
            .await
        {
            Ok(document) => {
                self.metrics.record_ingest();
                tracing::info!(
                    document_id = %document.id,
                    %owner,
                    %format,
                    bytes = document.size_bytes,
                    "Document ingested"
                );
                Ok(document)
            }
            Err(error) => {
                tracing::warn!(%owner, %format, error = %error, "Ingestion failed; discarding upload");
                self.discard_file(&stored_name).await;
                Err(error)
            }
        }
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<Document>, PipelineError> {
        Ok(self.documents.list(owner).await?)
    }

    async fn ask(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
        question: &str,
    ) -> Result<ChatAnswer, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidInput("The question must not be empty.".into()));
        }
        let document = self.owned_document(owner, document_id).await?;
        advance(document_id, TurnStage::Validated);

        let path = self.files.path_for(&document.stored_name);
        let context = prepare_context(&document, &path).await?;
        advance(document_id, TurnStage::ContextReady);

        let history = self.recent_history(owner, document_id).await?;
        let prompt = build_prompt(&context, question, &history);
        advance(document_id, TurnStage::PromptBuilt);

        let provider = &self.provider;
        let prompt = &prompt;
        let raw = self
            .invoker
            .run("generate", move || provider.generate(prompt))
            .await
            .map_err(|error| {
                let error = PipelineError::from(error);
                if error.is_expired_handle() {
                    tracing::warn!(%document_id, "Remote handle expired; document must be re-uploaded");
                }
                error
            })?;
        let answer = GroundedAnswer::parse(&raw);
        advance(document_id, TurnStage::AnswerObtained);

        // The document may have been deleted while the provider was answering.
        if self.documents.find(document_id).await?.is_none() {
            tracing::warn!(%document_id, %owner, "Document deleted during the turn; discarding answer");
            return Err(PipelineError::DocumentNotFound(document_id));
        }

        let rendered = answer.render();
        self.conversations
            .append(owner, document_id, question, &rendered)
            .await?;
        advance(document_id, TurnStage::Persisted);

        self.metrics.record_answer();
        tracing::info!(
            %document_id,
            %owner,
            not_found = answer.is_not_found(),
            stage = %TurnStage::Responded,
            "Answered question"
        );
        Ok(ChatAnswer {
            answer: rendered,
            excerpt: answer.excerpt,
        })
    }

    async fn history(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<Vec<Message>, PipelineError> {
        Ok(self.conversations.history(owner, document_id).await?)
    }

    async fn preview(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<Preview, PipelineError> {
        let document = self.owned_document(owner, document_id).await?;
        match document.format.strategy() {
            ContextStrategy::RemoteHandle => Ok(Preview::NotAvailable),
            ContextStrategy::InlineText => {
                let path = self.files.path_for(&document.stored_name);
                Ok(Preview::Inline(extract_text(&path, document.format).await?))
            }
        }
    }

    async fn download(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<DownloadedFile, PipelineError> {
        let document = self.owned_document(owner, document_id).await?;
        let bytes = self.files.read(&document.stored_name).await?;
        Ok(DownloadedFile {
            bytes,
            mime_type: document.format.mime_type(),
            file_name: document.original_name,
        })
    }

    async fn delete(&self, owner: &OwnerId, document_id: Uuid) -> Result<(), PipelineError> {
        let document = self
            .documents
            .find(document_id)
            .await?
            .filter(|document| &document.owner_id == owner)
            .ok_or(PipelineError::DocumentNotFound(document_id))?;

        self.conversations
            .delete_for_document(owner, document_id)
            .await?;
        if !self.documents.delete(owner, document_id).await? {
            return Err(PipelineError::DocumentNotFound(document_id));
        }

        self.discard_file(&document.stored_name).await;
        self.discard_remote(&document.content).await;
        self.metrics.record_delete();
        tracing::info!(%document_id, %owner, "Document deleted");
        Ok(())
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_upload_names_fall_back() {
        assert_eq!(display_name("  report.pdf "), "report.pdf");
        assert_eq!(display_name("   "), "document");
    }
}
