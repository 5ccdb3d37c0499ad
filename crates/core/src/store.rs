//! Remote annotation persistence boundary

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("annotation record '{0}' not found")]
    NotFound(String),

    #[error("annotation store failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One serialized export kept by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnnotation {
    pub id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Output of an engine export in the format named by `metadata["format"]`
    pub data: String,
}

/// Generic save/load store keyed by tissue (slide) reference
pub trait AnnotationStore {
    fn load(&self, tissue: &str) -> StoreResult<Vec<StoredAnnotation>>;

    /// Returns the id of the new record
    fn create(&mut self, tissue: &str, data: &str, metadata: BTreeMap<String, String>) -> StoreResult<String>;

    fn update(&mut self, id: &str, data: &str) -> StoreResult<()>;

    fn remove(&mut self, id: &str) -> StoreResult<()>;
}

/// Store kept in memory; records are lost with the value
#[derive(Debug, Clone, Default)]
pub struct MemoryAnnotationStore {
    records: Vec<(String, StoredAnnotation)>,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnnotationStore for MemoryAnnotationStore {
    fn load(&self, tissue: &str) -> StoreResult<Vec<StoredAnnotation>> {
        Ok(self
            .records
            .iter()
            .filter(|(owner, _)| owner == tissue)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn create(&mut self, tissue: &str, data: &str, metadata: BTreeMap<String, String>) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.records.push((
            tissue.to_string(),
            StoredAnnotation { id: id.clone(), metadata, data: data.to_string() },
        ));
        Ok(id)
    }

    fn update(&mut self, id: &str, data: &str) -> StoreResult<()> {
        let (_, record) = self
            .records
            .iter_mut()
            .find(|(_, record)| record.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.data = data.to_string();
        Ok(())
    }

    fn remove(&mut self, id: &str) -> StoreResult<()> {
        let before = self.records.len();
        self.records.retain(|(_, record)| record.id != id);
        if self.records.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_lifecycle() {
        let mut store = MemoryAnnotationStore::new();
        let id = store.create("slide-1", "{}", BTreeMap::new()).expect("created");
        store.create("slide-2", "[]", BTreeMap::new()).expect("created");

        assert_eq!(store.load("slide-1").expect("loaded").len(), 1);
        store.update(&id, "{\"objects\":[]}").expect("updated");
        assert_eq!(store.load("slide-1").expect("loaded")[0].data, "{\"objects\":[]}");

        store.remove(&id).expect("removed");
        assert!(store.load("slide-1").expect("loaded").is_empty());
        assert!(matches!(store.remove(&id), Err(StoreError::NotFound(_))));
    }
}
