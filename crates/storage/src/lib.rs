//! File-backed persistence for the annotation engine
//!
//! [`Storage`] resolves a data root (the platform data directory by default)
//! and hands out a [`FileCache`] for engine settings and unsaved work, plus a
//! [`LocalAnnotationStore`] keeping exported annotation sets per slide.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use wsi_annotations_core::{AnnotationStore, KeyValueCache, StoreError, StoredAnnotation};

const CACHE_SCHEMA_VERSION: u32 = 1;
const RECORD_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("annotation record '{0}' not found")]
    NotFound(String),
    #[error("'{0}' is not a record id")]
    InvalidId(String),
    #[error("unsupported schema version {0}")]
    SchemaVersion(u32),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for StoreError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(id) | StorageError::InvalidId(id) => StoreError::NotFound(id),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn from_default_project() -> StorageResult<Self> {
        let dirs = ProjectDirs::from("org", "WsiAnnotations", "wsi-annotations")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache persisted as `cache.json` under the root
    pub fn file_cache(&self) -> StorageResult<FileCache> {
        FileCache::open(self.root.join("cache.json"))
    }

    /// Store keeping records under `annotations/`
    pub fn annotation_store(&self) -> LocalAnnotationStore {
        LocalAnnotationStore::new(self.root.join("annotations"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEnvelope {
    version: u32,
    values: BTreeMap<String, String>,
}

/// [`KeyValueCache`] writing every change through to a JSON file
///
/// Write failures are logged and the value stays available in memory for
/// the rest of the session.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileCache {
    /// Load the cache at `path`; a missing file is an empty cache
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self { path, values: BTreeMap::new() });
        }

        let bytes = fs::read(&path)?;
        let envelope: CacheEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != CACHE_SCHEMA_VERSION {
            return Err(StorageError::SchemaVersion(envelope.version));
        }
        tracing::debug!(path = %path.display(), keys = envelope.values.len(), "cache loaded");
        Ok(Self { path, values: envelope.values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    fn persist(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let envelope = CacheEnvelope { version: CACHE_SCHEMA_VERSION, values: self.values.clone() };
        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl KeyValueCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Option<String>) {
        let changed = match value {
            Some(value) => self.values.insert(key.to_string(), value.clone()) != Some(value),
            None => self.values.remove(key).is_some(),
        };
        if !changed {
            return;
        }
        if let Err(error) = self.persist() {
            tracing::warn!(%error, key, path = %self.path.display(), "cache write failed");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordEnvelope {
    version: u32,
    tissue: String,
    sequence: u64,
    record: StoredAnnotation,
}

/// [`AnnotationStore`] with one JSON file per record
///
/// Records of a slide load in the order they were created.
#[derive(Debug, Clone)]
pub struct LocalAnnotationStore {
    root: PathBuf,
}

impl LocalAnnotationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Slides with at least one record, sorted
    pub fn tissues(&self) -> StorageResult<Vec<String>> {
        let mut tissues: Vec<String> = self.envelopes()?.into_iter().map(|envelope| envelope.tissue).collect();
        tissues.sort();
        tissues.dedup();
        Ok(tissues)
    }

    pub fn records(&self, tissue: &str) -> StorageResult<Vec<StoredAnnotation>> {
        let mut envelopes: Vec<RecordEnvelope> =
            self.envelopes()?.into_iter().filter(|envelope| envelope.tissue == tissue).collect();
        envelopes.sort_by_key(|envelope| envelope.sequence);
        Ok(envelopes.into_iter().map(|envelope| envelope.record).collect())
    }

    /// File of the record `id`; only ids minted by [`AnnotationStore::create`] map to one
    fn record_path(&self, id: &str) -> StorageResult<PathBuf> {
        let uuid = uuid::Uuid::try_parse(id).map_err(|_| StorageError::InvalidId(id.to_string()))?;
        Ok(self.root.join(format!("{}.json", uuid.hyphenated())))
    }

    fn envelopes(&self) -> StorageResult<Vec<RecordEnvelope>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut envelopes = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match Self::read_envelope(&path) {
                Ok(envelope) => envelopes.push(envelope),
                Err(error) => tracing::warn!(%error, path = %path.display(), "skipping unreadable record"),
            }
        }
        Ok(envelopes)
    }

    fn read_envelope(path: &Path) -> StorageResult<RecordEnvelope> {
        let bytes = fs::read(path)?;
        let envelope: RecordEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version != RECORD_SCHEMA_VERSION {
            return Err(StorageError::SchemaVersion(envelope.version));
        }
        Ok(envelope)
    }

    fn write_envelope(&self, envelope: &RecordEnvelope) -> StorageResult<()> {
        fs::create_dir_all(&self.root)?;
        let bytes = serde_json::to_vec_pretty(envelope)?;
        fs::write(self.record_path(&envelope.record.id)?, bytes)?;
        Ok(())
    }

    fn find(&self, id: &str) -> StorageResult<RecordEnvelope> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Self::read_envelope(&path)
    }
}

impl AnnotationStore for LocalAnnotationStore {
    fn load(&self, tissue: &str) -> Result<Vec<StoredAnnotation>, StoreError> {
        Ok(self.records(tissue)?)
    }

    fn create(&mut self, tissue: &str, data: &str, metadata: BTreeMap<String, String>) -> Result<String, StoreError> {
        let sequence = self.envelopes()?.iter().map(|envelope| envelope.sequence + 1).max().unwrap_or(0);
        let id = uuid::Uuid::new_v4().to_string();
        let envelope = RecordEnvelope {
            version: RECORD_SCHEMA_VERSION,
            tissue: tissue.to_string(),
            sequence,
            record: StoredAnnotation { id: id.clone(), metadata, data: data.to_string() },
        };
        self.write_envelope(&envelope)?;
        tracing::info!(%id, tissue, bytes = data.len(), "annotation record created");
        Ok(id)
    }

    fn update(&mut self, id: &str, data: &str) -> Result<(), StoreError> {
        let mut envelope = self.find(id)?;
        envelope.record.data = data.to_string();
        self.write_envelope(&envelope)?;
        tracing::info!(id, bytes = data.len(), "annotation record updated");
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        fs::remove_file(path).map_err(StorageError::from)?;
        tracing::info!(id, "annotation record removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsi_annotations_core::{AnnotationEngine, CreateParams, ExportOptions};

    #[test]
    fn cache_survives_reopen() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let storage = Storage::with_root(temp.path());

        let mut cache = storage.file_cache().expect("empty cache");
        cache.set("drawOutline", Some("false".to_string()));
        cache.set("presets", Some("[]".to_string()));
        cache.set("presets", None);

        let reopened = storage.file_cache().expect("cache should load");
        assert_eq!(reopened.get("drawOutline").as_deref(), Some("false"));
        assert!(reopened.get("presets").is_none());
        assert!(!reopened.get_bool("drawOutline", true));
    }

    #[test]
    fn cache_rejects_unknown_schema() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("cache.json");
        fs::write(&path, r#"{"version": 99, "values": {}}"#).expect("fixture written");

        let err = FileCache::open(&path).expect_err("future schema");
        assert!(matches!(err, StorageError::SchemaVersion(99)));
    }

    #[test]
    fn store_keeps_creation_order_per_tissue() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut store = Storage::with_root(temp.path()).annotation_store();

        let first = store.create("slide-a", "one", BTreeMap::new()).expect("created");
        store.create("slide-b", "other", BTreeMap::new()).expect("created");
        let second = store.create("slide-a", "two", BTreeMap::new()).expect("created");

        let records = store.load("slide-a").expect("loaded");
        let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str()]);
        assert_eq!(store.tissues().expect("listed"), vec!["slide-a", "slide-b"]);
    }

    #[test]
    fn store_update_and_remove() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut store = LocalAnnotationStore::new(temp.path().join("records"));

        let id = store.create("slide", "draft", BTreeMap::new()).expect("created");
        store.update(&id, "final").expect("updated");
        assert_eq!(store.load("slide").expect("loaded")[0].data, "final");

        store.remove(&id).expect("removed");
        assert!(store.load("slide").expect("loaded").is_empty());
        assert!(matches!(store.update(&id, "again"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.remove(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn store_rejects_ids_outside_its_root() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let outside = temp.path().join("victim.json");
        fs::write(&outside, "keep me").expect("fixture written");
        let mut store = LocalAnnotationStore::new(temp.path().join("records"));
        store.create("slide", "data", BTreeMap::new()).expect("created");

        for id in ["../victim", "..", "nested/../../victim", ""] {
            assert!(matches!(store.remove(id), Err(StoreError::NotFound(_))), "{id}");
            assert!(matches!(store.update(id, "overwritten"), Err(StoreError::NotFound(_))), "{id}");
            assert!(matches!(store.find(id), Err(StorageError::InvalidId(_))), "{id}");
        }
        assert_eq!(fs::read_to_string(&outside).expect("still there"), "keep me");
        assert_eq!(store.load("slide").expect("loaded").len(), 1);
    }

    #[test]
    fn engine_round_trip_through_local_store() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let storage = Storage::with_root(temp.path());
        let mut store = storage.annotation_store();

        let mut engine = AnnotationEngine::builder()
            .with_cache(storage.file_cache().expect("cache"))
            .build()
            .expect("engine");
        engine.init_io(|_| false);
        engine
            .create_annotation("rect", CreateParams::Coords(vec![0.0, 0.0, 25.0, 25.0]))
            .expect("rect");
        engine.upload_to_store(&mut store, "slide-1", &ExportOptions::default()).expect("uploaded");

        let mut restored = AnnotationEngine::builder().build().expect("engine");
        restored.init_io(|_| false);
        let loaded = restored.load_from_store(&store, "slide-1", true).expect("loaded");
        assert_eq!(loaded, 1);
        assert_eq!(restored.objects().count(), 1);
    }
}
