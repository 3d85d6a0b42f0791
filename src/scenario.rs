//! The reproduction scenario.
//!
//! One fixed, linear script, edited by hand for each investigation:
//!
//! 1. pick a fresh collection and confirm it is empty,
//! 2. create `{foo: "123"}` in it,
//! 3. read it back,
//! 4. overwrite it with `{foo: "123-NEW"}`,
//! 5. read it again.
//!
//! The cancellation token is checked before every remote call. Nothing is
//! retried; the first failure ends the run.

use crate::cancellation::{Cancelled, CancellationToken};
use crate::firestore::{DocumentData, DocumentStore, FirestoreError};
use serde_json::{json, Value as SerdeValue};
use thiserror::Error;

const DOCUMENT_ID: &str = "doc1";
const INITIAL_FOO: &str = "123";
const UPDATED_FOO: &str = "123-NEW";

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Firestore(#[from] FirestoreError),
    /// The freshly generated collection already had documents in it.
    #[error("collection {collection} is not empty ({count} documents)")]
    CollectionNotEmpty { collection: String, count: usize },
    /// A document the scenario just wrote could not be read back.
    #[error("document {0} does not exist")]
    MissingDocument(String),
}

impl ScenarioError {
    /// Cancellation is a normal way for a run to end, not a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ScenarioError::Cancelled(_))
    }
}

/// What the scenario wrote and read.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReport {
    pub collection_id: String,
    pub document_path: String,
    pub before: SerdeValue,
    pub after: SerdeValue,
}

/// A collection id nobody else is using: `repro-` followed by a v4 UUID.
pub fn fresh_collection_id() -> String {
    format!("repro-{}", uuid::Uuid::new_v4().simple())
}

fn foo_payload(foo: &str) -> DocumentData {
    let mut data = DocumentData::new();
    data.insert("foo".to_string(), json!(foo));
    data
}

pub struct Scenario<'a> {
    store: &'a dyn DocumentStore,
    token: CancellationToken,
    collection_id: Option<String>,
}

impl<'a> Scenario<'a> {
    pub fn new(store: &'a dyn DocumentStore, token: CancellationToken) -> Self {
        Self {
            store,
            token,
            collection_id: None,
        }
    }

    /// Runs against `collection_id` instead of a generated one.
    pub fn with_collection_id(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub async fn run(&self) -> Result<ScenarioReport, ScenarioError> {
        let collection_id = self
            .collection_id
            .clone()
            .unwrap_or_else(fresh_collection_id);
        let document_path = format!("{}/{}", collection_id, DOCUMENT_ID);

        self.token.throw_if_cancelled()?;
        let existing = self.store.list_document_ids(&collection_id).await?;
        if !existing.is_empty() {
            return Err(ScenarioError::CollectionNotEmpty {
                collection: collection_id,
                count: existing.len(),
            });
        }
        tracing::info!("Using empty collection {}", collection_id);

        self.token.throw_if_cancelled()?;
        let initial = foo_payload(INITIAL_FOO);
        tracing::info!(
            "Creating document {}: {}",
            document_path,
            SerdeValue::Object(initial.clone())
        );
        self.store.set_document(&document_path, &initial).await?;

        self.token.throw_if_cancelled()?;
        let before = self.read(&document_path).await?;
        tracing::info!("Read document {}: {}", document_path, before);

        self.token.throw_if_cancelled()?;
        let updated = foo_payload(UPDATED_FOO);
        tracing::info!(
            "Writing document {}: {}",
            document_path,
            SerdeValue::Object(updated.clone())
        );
        self.store.set_document(&document_path, &updated).await?;

        self.token.throw_if_cancelled()?;
        let after = self.read(&document_path).await?;
        tracing::info!("Read document {}: {}", document_path, after);

        Ok(ScenarioReport {
            collection_id,
            document_path,
            before,
            after,
        })
    }

    async fn read(&self, path: &str) -> Result<SerdeValue, ScenarioError> {
        self.store
            .get_document(path)
            .await?
            .map(SerdeValue::Object)
            .ok_or_else(|| ScenarioError::MissingDocument(path.to_string()))
    }
}
