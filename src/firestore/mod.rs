//! Cloud Firestore client.
//!
//! A small client over the Firestore v1 REST API, enough to create, read,
//! overwrite, delete and list documents. It mirrors the Node.js SDK's shape
//! with [`CollectionReference`] and [`DocumentReference`].
//!
//! The [`DocumentStore`] trait is the seam the scenario runner drives. It is
//! implemented by [`Firestore`] (remote or emulated backend) and by
//! [`MemoryFirestore`] (in-process, no network).

pub mod memory;
pub mod models;
pub mod reference;

#[cfg(test)]
mod tests;

pub use self::memory::MemoryFirestore;

use self::reference::{
    validate_collection_path, validate_document_path, CollectionReference, DocumentReference,
};
use crate::core::middleware::CredentialMiddleware;
use crate::FirebaseApp;
use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde_json::{Map, Value as SerdeValue};
use thiserror::Error;

const FIRESTORE_V1_PATH: &str = "/v1/projects/{project_id}/databases/(default)/documents";

/// Document contents as a JSON object.
pub type DocumentData = Map<String, SerdeValue>;

/// Errors that can occur during Firestore operations.
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Firestore API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    /// A path that does not name a document or collection.
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),
}

/// The document operations the scenario runner needs.
///
/// Paths are relative to the database root, e.g. `"users/alice"`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document. A missing document is `Ok(None)`.
    async fn get_document(&self, path: &str) -> Result<Option<DocumentData>, FirestoreError>;

    /// Overwrites a document, creating it if needed.
    async fn set_document(&self, path: &str, data: &DocumentData) -> Result<(), FirestoreError>;

    async fn delete_document(&self, path: &str) -> Result<(), FirestoreError>;

    /// IDs of the documents directly inside a collection.
    async fn list_document_ids(&self, collection_path: &str)
        -> Result<Vec<String>, FirestoreError>;
}

/// Client for a remote or emulated Cloud Firestore database.
pub struct Firestore {
    client: ClientWithMiddleware,
    base_url: String,
}

impl Firestore {
    /// Creates a new `Firestore` instance.
    ///
    /// This is typically called via `FirebaseApp::firestore()`.
    pub fn new(app: &FirebaseApp) -> Self {
        let options = app.options();
        let base_url = format!(
            "{}{}",
            options.backend.base_url(),
            FIRESTORE_V1_PATH.replace("{project_id}", &options.project_id)
        );
        Self::new_with_url(CredentialMiddleware::for_config(options), base_url)
    }

    /// Creates a new `Firestore` instance with a custom base URL (useful for testing).
    pub fn new_with_url(middleware: CredentialMiddleware, base_url: String) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .with(middleware)
            .build();

        Self { client, base_url }
    }

    #[cfg(test)]
    pub(crate) fn new_with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// The `.../documents` URL every path is resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Gets a `CollectionReference` for the collection at `collection_path`.
    pub fn collection(&self, collection_path: &str) -> CollectionReference<'_> {
        CollectionReference {
            client: &self.client,
            path: format!("{}/{}", self.base_url, collection_path.trim_matches('/')),
        }
    }

    /// Gets a `DocumentReference` for the slash-separated `document_path` (e.g. "users/user1").
    pub fn doc(&self, document_path: &str) -> DocumentReference<'_> {
        DocumentReference {
            client: &self.client,
            path: format!("{}/{}", self.base_url, document_path.trim_matches('/')),
        }
    }
}

#[async_trait]
impl DocumentStore for Firestore {
    async fn get_document(&self, path: &str) -> Result<Option<DocumentData>, FirestoreError> {
        validate_document_path(path)?;
        self.doc(path).get().await
    }

    async fn set_document(&self, path: &str, data: &DocumentData) -> Result<(), FirestoreError> {
        validate_document_path(path)?;
        self.doc(path).set(data).await
    }

    async fn delete_document(&self, path: &str) -> Result<(), FirestoreError> {
        validate_document_path(path)?;
        self.doc(path).delete().await
    }

    async fn list_document_ids(
        &self,
        collection_path: &str,
    ) -> Result<Vec<String>, FirestoreError> {
        validate_collection_path(collection_path)?;
        let documents = self.collection(collection_path).list_documents().await?;
        Ok(documents.iter().map(|doc| doc.id().to_string()).collect())
    }
}
