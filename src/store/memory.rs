//! Process-local store backed by hash maps.

use super::{
    Conversation, ConversationKey, ConversationStore, DocumentRepository, Message, StoreError,
    append_turn, documents_for_owner,
};
use crate::document::{Document, OwnerId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// In-memory documents and conversations; contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, Document>>,
    conversations: Mutex<HashMap<ConversationKey, Conversation>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn insert(&self, document: Document) -> Result<(), StoreError> {
        self.documents.write().await.insert(document.id, document);
        Ok(())
    }

    async fn find(&self, document_id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.read().await.get(&document_id).cloned())
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<Document>, StoreError> {
        Ok(documents_for_owner(self.documents.read().await.values(), owner))
    }

    async fn delete(&self, owner: &OwnerId, document_id: Uuid) -> Result<bool, StoreError> {
        let mut documents = self.documents.write().await;
        let owned = documents
            .get(&document_id)
            .is_some_and(|document| &document.owner_id == owner);
        if owned {
            documents.remove(&document_id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append(
        &self,
        owner: &OwnerId,
        document_id: Uuid,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().await;
        append_turn(&mut conversations, owner, document_id, user_text, assistant_text);
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
        self.conversations
            .lock()
            .await
            .remove(&(owner.clone(), document_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ContentRef, DocumentFormat};
    use crate::store::Role;
    use time::{Duration, OffsetDateTime};

    fn owner(name: &str) -> OwnerId {
        OwnerId::new(name).expect("owner")
    }

    fn document(owner_id: &OwnerId, created_at: OffsetDateTime) -> Document {
        Document {
            id: Uuid::new_v4(),
            owner_id: owner_id.clone(),
            stored_name: "stored.txt".into(),
            original_name: "notes.txt".into(),
            format: DocumentFormat::Text,
            content: ContentRef::ExtractLocally,
            size_bytes: 4,
            sha256: "abcd".into(),
            created_at,
        }
    }

    #[tokio::test]
    async fn history_is_empty_before_first_question() {
        let store = MemoryStore::new();
        let history = store
            .history(&owner("alice"), Uuid::new_v4())
            .await
            .expect("history");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn appends_pairs_in_order_without_deduplication() {
        let store = MemoryStore::new();
        let alice = owner("alice");
        let doc = Uuid::new_v4();

        store.append(&alice, doc, "Q1", "A1").await.expect("append");
        store.append(&alice, doc, "Q1", "A1").await.expect("append again");

        let history = store.history(&alice, doc).await.expect("history");
        let roles: Vec<Role> = history.iter().map(|message| message.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(history[0].content, "Q1");
        assert_eq!(history[1].content, "A1");
        assert!(
            history
                .windows(2)
                .all(|pair| pair[0].timestamp <= pair[1].timestamp)
        );
    }

    #[tokio::test]
    async fn conversations_are_scoped_by_owner() {
        let store = MemoryStore::new();
        let doc = Uuid::new_v4();
        store
            .append(&owner("alice"), doc, "Q", "A")
            .await
            .expect("append");

        let other = store.history(&owner("bob"), doc).await.expect("history");
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn deleting_missing_conversation_is_not_an_error() {
        let store = MemoryStore::new();
        let alice = owner("alice");
        let doc = Uuid::new_v4();
        store.delete_for_document(&alice, doc).await.expect("delete");

        store.append(&alice, doc, "Q", "A").await.expect("append");
        store.delete_for_document(&alice, doc).await.expect("delete");
        assert!(store.history(&alice, doc).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn documents_list_newest_first_and_delete_checks_owner() {
        let store = MemoryStore::new();
        let alice = owner("alice");
        let now = OffsetDateTime::now_utc();
        let older = document(&alice, now - Duration::minutes(5));
        let newer = document(&alice, now);
        store.insert(older.clone()).await.expect("insert");
        store.insert(newer.clone()).await.expect("insert");
        store
            .insert(document(&owner("bob"), now))
            .await
            .expect("insert");

        let listed = store.list(&alice).await.expect("list");
        assert_eq!(
            listed.iter().map(|doc| doc.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );

        assert!(!store.delete(&owner("bob"), older.id).await.expect("delete"));
        assert!(store.find(older.id).await.expect("find").is_some());
        assert!(store.delete(&alice, older.id).await.expect("delete"));
        assert!(store.find(older.id).await.expect("find").is_none());
    }
}
