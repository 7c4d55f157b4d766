//! Document store for free-form entity metadata and its indexes. The
//! hosted deployment backs this with a document database; the embedded
//! implementation keeps the same contract on a sled tree.

use std::path::Path;

use async_trait::async_trait;
use log::debug;
use uuid::Uuid;

use tally_common::ledger::{validate_metadata, Metadata};

use crate::core::error::LedgerError;

// Index names the core may drop; everything else is owned by the
// platform and deletion is refused before reaching the backend
const DELETABLE_INDEX_PREFIX: &str = "metadata.";

pub fn ensure_deletable_index(index_name: &str) -> Result<(), LedgerError> {
    if !index_name.starts_with(DELETABLE_INDEX_PREFIX) {
        return Err(LedgerError::MetadataIndexDeletionForbidden);
    }
    Ok(())
}

#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn create_metadata(
        &self,
        entity_name: &str,
        entity_id: Uuid,
        metadata: &Metadata,
    ) -> Result<(), LedgerError>;

    async fn update_metadata(
        &self,
        entity_name: &str,
        entity_id: Uuid,
        metadata: &Metadata,
    ) -> Result<(), LedgerError>;

    async fn find_metadata_by_entity(
        &self,
        entity_name: &str,
        entity_id: Uuid,
    ) -> Result<Option<Metadata>, LedgerError>;

    async fn delete_metadata(&self, entity_name: &str, entity_id: Uuid) -> Result<(), LedgerError>;

    async fn delete_index(&self, entity_name: &str, index_name: &str) -> Result<(), LedgerError>;
}

pub struct SledMetadataStore {
    documents: sled::Tree,
    indexes: sled::Tree,
}

impl SledMetadataStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = sled::open(path)?;
        Ok(Self {
            documents: db.open_tree("metadata_documents")?,
            indexes: db.open_tree("metadata_indexes")?,
        })
    }

    fn document_key(entity_name: &str, entity_id: Uuid) -> Vec<u8> {
        format!("{}:{}", entity_name, entity_id).into_bytes()
    }

    fn write(&self, entity_name: &str, entity_id: Uuid, metadata: &Metadata) -> Result<(), LedgerError> {
        validate_metadata(metadata)?;
        self.documents
            .insert(Self::document_key(entity_name, entity_id), serde_json::to_vec(metadata)?)?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SledMetadataStore {
    async fn create_metadata(
        &self,
        entity_name: &str,
        entity_id: Uuid,
        metadata: &Metadata,
    ) -> Result<(), LedgerError> {
        self.write(entity_name, entity_id, metadata)
    }

    async fn update_metadata(
        &self,
        entity_name: &str,
        entity_id: Uuid,
        metadata: &Metadata,
    ) -> Result<(), LedgerError> {
        self.write(entity_name, entity_id, metadata)
    }

    async fn find_metadata_by_entity(
        &self,
        entity_name: &str,
        entity_id: Uuid,
    ) -> Result<Option<Metadata>, LedgerError> {
        match self.documents.get(Self::document_key(entity_name, entity_id))? {
            Some(row) => Ok(Some(serde_json::from_slice(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete_metadata(&self, entity_name: &str, entity_id: Uuid) -> Result<(), LedgerError> {
        self.documents.remove(Self::document_key(entity_name, entity_id))?;
        Ok(())
    }

    async fn delete_index(&self, entity_name: &str, index_name: &str) -> Result<(), LedgerError> {
        ensure_deletable_index(index_name)?;
        self.indexes.remove(format!("{}:{}", entity_name, index_name).into_bytes())?;
        debug!("dropped index {} on {}", index_name, entity_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn store() -> (SledMetadataStore, TempDir) {
        let dir = TempDir::new("metadata-store").unwrap();
        (SledMetadataStore::open(dir.path()).unwrap(), dir)
    }

    #[tokio::test]
    async fn metadata_round_trips() {
        let (store, _dir) = store();
        let id = Uuid::now_v7();
        let mut metadata = Metadata::new();
        metadata.insert("invoice".to_string(), serde_json::json!("INV-1"));
        store.create_metadata("Transaction", id, &metadata).await.unwrap();
        let found = store.find_metadata_by_entity("Transaction", id).await.unwrap();
        assert_eq!(found, Some(metadata));
    }

    #[tokio::test]
    async fn oversized_metadata_is_refused() {
        let (store, _dir) = store();
        let mut metadata = Metadata::new();
        metadata.insert("k".repeat(200), serde_json::json!(1));
        let err = store
            .create_metadata("Transaction", Uuid::now_v7(), &metadata)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Metadata(_)));
    }

    #[tokio::test]
    async fn foreign_index_names_are_refused_before_the_backend() {
        let (store, _dir) = store();
        let err = store.delete_index("Transaction", "primary").await.unwrap_err();
        assert!(matches!(err, LedgerError::MetadataIndexDeletionForbidden));
        assert!(store.delete_index("Transaction", "metadata.invoice").await.is_ok());
    }
}
