//! In-process document store.
//!
//! Behaves like an empty emulator instance for the operations in
//! [`DocumentStore`]. Nothing is persisted; data is lost when the store is
//! dropped.

use super::reference::{split_path, validate_collection_path, validate_document_path};
use super::{DocumentData, DocumentStore, FirestoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredDocument {
    data: DocumentData,
    create_time: DateTime<Utc>,
    update_time: DateTime<Utc>,
}

/// Documents keyed by their full relative path.
#[derive(Debug, Default)]
pub struct MemoryFirestore {
    documents: RwLock<BTreeMap<String, StoredDocument>>,
}

impl MemoryFirestore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Create and last-update times of a stored document.
    pub async fn timestamps(&self, path: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let documents = self.documents.read().await;
        documents
            .get(&normalize(path))
            .map(|doc| (doc.create_time, doc.update_time))
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

#[async_trait]
impl DocumentStore for MemoryFirestore {
    async fn get_document(&self, path: &str) -> Result<Option<DocumentData>, FirestoreError> {
        validate_document_path(path)?;
        let documents = self.documents.read().await;
        Ok(documents.get(&normalize(path)).map(|doc| doc.data.clone()))
    }

    async fn set_document(&self, path: &str, data: &DocumentData) -> Result<(), FirestoreError> {
        validate_document_path(path)?;
        let now = Utc::now();
        let mut documents = self.documents.write().await;
        documents
            .entry(normalize(path))
            .and_modify(|doc| {
                doc.data = data.clone();
                doc.update_time = now;
            })
            .or_insert_with(|| StoredDocument {
                data: data.clone(),
                create_time: now,
                update_time: now,
            });
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Result<(), FirestoreError> {
        validate_document_path(path)?;
        self.documents.write().await.remove(&normalize(path));
        Ok(())
    }

    async fn list_document_ids(
        &self,
        collection_path: &str,
    ) -> Result<Vec<String>, FirestoreError> {
        validate_collection_path(collection_path)?;
        let depth = split_path(collection_path)?.len() + 1;
        let prefix = format!("{}/", normalize(collection_path));

        let documents = self.documents.read().await;
        Ok(documents
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| path.split('/').count() == depth)
            .filter_map(|(path, _)| path.rsplit('/').next().map(str::to_string))
            .collect())
    }
}
