//! Document and conversation persistence.
//!
//! The pipeline only needs keyed find/insert/delete semantics, expressed by the
//! [`DocumentRepository`] and [`ConversationStore`] traits. Two backends implement both:
//! [`MemoryStore`] for tests and ephemeral runs, and [`JsonFileStore`] which snapshots every
//! mutation to JSON files under a data directory.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::document::{Document, OwnerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors raised by persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing a backing file failed.
    #[error("failed to access store file {path}: {source}")]
    Io {
        /// File that could not be accessed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Records could not be encoded or decoded.
    #[error("failed to encode store records: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The grounded assistant.
    Assistant,
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Time the message was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Ordered message log for one (owner, document) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Owner of the conversation.
    pub owner_id: OwnerId,
    /// Document the conversation is about.
    pub document_id: Uuid,
    /// Messages, oldest first.
    pub messages: Vec<Message>,
    /// Time of the most recent append.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

/// Keyed storage for [`Document`] records.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new document record.
    async fn insert(&self, document: Document) -> Result<(), StoreError>;

    /// Look up a document by identifier regardless of owner.
    async fn find(&self, document_id: Uuid) -> Result<Option<Document>, StoreError>;

    /// List every document belonging to `owner`.
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Document>, StoreError>;

    /// Delete the document if `owner` holds it; returns whether a record was removed.
    async fn delete(&self, owner: &OwnerId, document_id: Uuid) -> Result<bool, StoreError>;
}

/// Append-only message logs keyed by owner and document.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a user message and the assistant reply from the same turn.
    ///
    /// Every call appends a new pair; identical consecutive questions are not deduplicated.
    async fn append(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), StoreError>;

    /// Return the ordered messages, or an empty list when no conversation exists.
    async fn history(&self, owner: &OwnerId, document_id: Uuid)
    -> Result<Vec<Message>, StoreError>;

    /// Remove the conversation; a missing conversation is not an error.
    async fn delete_for_document(&self, owner: &OwnerId, document_id: Uuid)
    -> Result<(), StoreError>;
}

pub(crate) type ConversationKey = (OwnerId, Uuid);

/// Append a turn to the in-memory map, creating the conversation on first use.
pub(crate) fn append_turn(
    conversations: &mut HashMap<ConversationKey, Conversation>,
    owner: &OwnerId,
    document_id: Uuid,
    user_text: &str,
    assistant_text: &str,
) {
    let now = OffsetDateTime::now_utc();
    let conversation = conversations
        .entry((owner.clone(), document_id))
        .or_insert_with(|| Conversation {
            owner_id: owner.clone(),
            document_id,
            messages: Vec::new(),
            last_updated: now,
        });

    // Clamp to the last timestamp so the log never runs backwards.
    let timestamp = conversation
        .messages
        .last()
        .map(|last| last.timestamp.max(now))
        .unwrap_or(now);

    conversation.messages.push(Message {
        role: Role::User,
        content: user_text.to_string(),
        timestamp,
    });
    conversation.messages.push(Message {
        role: Role::Assistant,
        content: assistant_text.to_string(),
        timestamp,
    });
    conversation.last_updated = timestamp;
}

/// Owner's documents, newest first.
pub(crate) fn documents_for_owner<'a>(
    documents: impl Iterator<Item = &'a Document>,
    owner: &OwnerId,
) -> Vec<Document> {
    let mut owned: Vec<Document> = documents
        .filter(|document| &document.owner_id == owner)
        .cloned()
        .collect();
    owned.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    owned
}
