//! Durable store that snapshots records to JSON files.
//!
//! Records live in memory and every mutation rewrites the affected file
//! (`documents.json` or `conversations.json`) through a temporary file and a rename. The
//! in-memory state is only replaced once the write succeeded, so a failed write leaves both
//! views unchanged.

use super::{
    Conversation, ConversationKey, ConversationStore, DocumentRepository, Message, StoreError,
    append_turn, documents_for_owner,
};
use crate::document::{Document, OwnerId};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use uuid::Uuid;

const DOCUMENTS_FILE: &str = "documents.json";
const CONVERSATIONS_FILE: &str = "conversations.json";

/// JSON-file backed documents and conversations.
pub struct JsonFileStore {
    dir: PathBuf,
    documents: Mutex<HashMap<Uuid, Document>>,
    conversations: Mutex<HashMap<ConversationKey, Conversation>>,
}

impl JsonFileStore {
    /// Open (or initialize) a store rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let documents: Vec<Document> = load_records(&dir.join(DOCUMENTS_FILE)).await?;
        let conversations: Vec<Conversation> =
            load_records(&dir.join(CONVERSATIONS_FILE)).await?;
        tracing::info!(
            dir = %dir.display(),
            documents = documents.len(),
            conversations = conversations.len(),
            "Opened JSON record store"
        );

        Ok(Self {
            documents: Mutex::new(
                documents
                    .into_iter()
                    .map(|document| (document.id, document))
                    .collect(),
            ),
            conversations: Mutex::new(
                conversations
                    .into_iter()
                    .map(|conversation| {
                        (
                            (conversation.owner_id.clone(), conversation.document_id),
                            conversation,
                        )
                    })
                    .collect(),
            ),
            dir,
        })
    }

    async fn write_documents(&self, documents: &HashMap<Uuid, Document>) -> Result<(), StoreError> {
        let mut records: Vec<&Document> = documents.values().collect();
        records.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        write_records(&self.dir.join(DOCUMENTS_FILE), &records).await
    }

    async fn write_conversations(
        &self,
        conversations: &HashMap<ConversationKey, Conversation>,
    ) -> Result<(), StoreError> {
        let mut records: Vec<&Conversation> = conversations.values().collect();
        records.sort_by(|left, right| {
            (&left.owner_id, left.document_id).cmp(&(&right.owner_id, right.document_id))
        });
        write_records(&self.dir.join(CONVERSATIONS_FILE), &records).await
    }
}

#[async_trait]
impl DocumentRepository for JsonFileStore {
    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().await;
        let mut next = documents.clone();
        next.insert(document.id, document);
        self.write_documents(&next).await?;
        *documents = next;
        Ok(())
    }

    async fn find(&self, document_id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.lock().await.get(&document_id).cloned())
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<Document>, StoreError> {
        Ok(documents_for_owner(self.documents.lock().await.values(), owner))
    }

    async fn delete(&self, owner: &OwnerId, document_id: Uuid) -> Result<bool, StoreError> {
        let mut documents = self.documents.lock().await;
        let owned = documents
            .get(&document_id)
            .is_some_and(|document| &document.owner_id == owner);
        if !owned {
            return Ok(false);
        }
        let mut next = documents.clone();
        next.remove(&document_id);
        self.write_documents(&next).await?;
        *documents = next;
        Ok(true)
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn append(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().await;
        let mut next = conversations.clone();
        append_turn(&mut next, owner, document_id, user_text, assistant_text);
        self.write_conversations(&next).await?;
        *conversations = next;
        Ok(())
    }

    async fn history(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<Vec<Message>, StoreError> {
        let conversations = self.conversations.lock().await;
        Ok(conversations
            .get(&(owner.clone(), document_id))
            .map(|conversation| conversation.messages.clone())
            .unwrap_or_default())
    }

    async fn delete_for_document(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().await;
        let key = (owner.clone(), document_id);
        if !conversations.contains_key(&key) {
            return Ok(());
        }
        let mut next = conversations.clone();
        next.remove(&key);
        self.write_conversations(&next).await?;
        *conversations = next;
        Ok(())
    }
}

async fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(records)?;
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, &bytes)
        .await
        .map_err(|source| StoreError::Io {
            path: temp.clone(),
            source,
        })?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), records = records.len(), "Store snapshot written");
    Ok(())
}
