//! Import, export and persistence of engine content

use super::{AnnotationEngine, UnsavedSnapshot};
use crate::annotation::{now_millis, AnnotationObject};
use crate::cache::{PRESETS_KEY, UNSAVED_KEY};
use crate::convert::{ConvertError, ConvertResult, DecodedAnnotations, ExportSource, PartialExport, NATIVE_FORMAT};
use crate::event::{EngineEvent, Warning, WarningCode};
use crate::preset::{PresetError, PresetManager, PresetResult};
use crate::store::{AnnotationStore, StoreError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOptions {
    /// Format tried first, the configured default when unset
    pub format: Option<String>,
    /// Stamp imported objects with this engine's session
    pub inherit_session: bool,
}

impl ImportOptions {
    pub fn with_format(format: impl Into<String>) -> Self {
        Self { format: Some(format.into()), ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportOptions {
    pub format: Option<String>,
    /// Object properties kept in addition to what the factories export
    pub extra_properties: Vec<String>,
}

impl ExportOptions {
    pub fn with_format(format: impl Into<String>) -> Self {
        Self { format: Some(format.into()), ..Self::default() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Preset(#[from] PresetError),
}

pub type PersistResult<T> = Result<T, PersistError>;

impl AnnotationEngine {
    fn format_or_default(&self, format: Option<&str>) -> String {
        format.unwrap_or(&self.ctx.config.default_format).to_string()
    }

    /// Load serialized annotations, trying every known format
    ///
    /// Returns false, leaving the engine untouched, when no format accepts
    /// the data. With `clear` the canvas, history and presets are replaced.
    pub fn import(&mut self, data: &str, options: &ImportOptions, clear: bool) -> bool {
        let preferred = self.format_or_default(options.format.as_deref());
        let Some((format, decoded)) = self.convertors.decode_any(&preferred, data) else {
            self.ctx.events.emit(EngineEvent::Import { imported: false, format: None });
            return false;
        };
        self.apply_import(decoded, &format, options.inherit_session, clear);
        true
    }

    fn apply_import(&mut self, decoded: DecodedAnnotations, format: &str, inherit_session: bool, clear: bool) {
        let imported = !decoded.is_empty();
        if !decoded.presets.is_empty() {
            let ctx = &mut self.ctx;
            ctx.presets.import(decoded.presets, clear, &ctx.factories, ctx.cache.as_ref(), &mut ctx.events);
        }
        let loaded = self.load_objects(decoded.objects, clear, inherit_session);
        tracing::info!(format, objects = loaded, "annotations imported");
        self.ctx.events.emit(EngineEvent::Import { imported, format: Some(format.to_string()) });
    }

    /// Put decoded objects on the canvas without history entries or create events
    fn load_objects(&mut self, objects: Vec<AnnotationObject>, clear: bool, inherit_session: bool) -> usize {
        if clear {
            self.ctx.free_form.finish(false);
            self.ctx.editing = None;
            self.ctx.canvas.clear();
            self.ctx.history.clear();
            self.ctx.emit_history_change();
        }
        let mut loaded = 0;
        for mut object in objects {
            if inherit_session {
                object.session_id = Some(self.ctx.session_id.clone());
            }
            object.layer_id = Some(self.ctx.ensure_layer(object.layer_id.take()));
            if !self.ctx.check_preset(&mut object) {
                tracing::warn!(factory = %object.factory_id, kind = object.type_name(), "no factory for imported object, skipping");
                continue;
            }
            self.ctx.history.commit(&mut object);
            self.ctx.canvas.add(object);
            loaded += 1;
        }
        loaded
    }

    fn export_source(&self, options: &ExportOptions, with_annotations: bool, with_presets: bool) -> ExportSource<'_> {
        ExportSource::new(self.ctx.canvas.annotations(), &self.ctx.presets, &self.ctx.factories)
            .with_content(with_annotations, with_presets)
            .with_extra_properties(options.extra_properties.clone())
            .with_microns_per_pixel(self.ctx.viewport.microns_per_pixel())
    }

    /// Serialize committed annotations and/or presets
    ///
    /// A successful export discards the cached unsaved work.
    pub fn export(&mut self, options: &ExportOptions, with_annotations: bool, with_presets: bool) -> ConvertResult<String> {
        let format = self.format_or_default(options.format.as_deref());
        let data = {
            let source = self.export_source(options, with_annotations, with_presets);
            self.convertors.encode(&format, &source)?
        };
        self.ctx.clear_unsaved();
        tracing::info!(%format, bytes = data.len(), "annotations exported");
        self.ctx.events.emit(EngineEvent::Export { format });
        Ok(data)
    }

    /// First half of an export that can be merged with other partial exports
    pub fn export_partial(
        &mut self,
        options: &ExportOptions,
        with_annotations: bool,
        with_presets: bool,
    ) -> ConvertResult<PartialExport> {
        let format = self.format_or_default(options.format.as_deref());
        let partial = {
            let source = self.export_source(options, with_annotations, with_presets);
            self.convertors.encode_partial(&format, &source)?
        };
        self.ctx.events.emit(EngineEvent::ExportPartial { format });
        Ok(partial)
    }

    pub fn export_finalize(&mut self, partial: PartialExport) -> ConvertResult<String> {
        let format = partial.format.clone();
        let data = self.convertors.encode_finalize(&format, partial)?;
        self.ctx.clear_unsaved();
        self.ctx.events.emit(EngineEvent::Export { format });
        Ok(data)
    }

    /// Cache unsaved work now; false when there is nothing to keep
    pub fn flush_unsaved_work(&mut self) -> bool {
        if self.ctx.unsaved_edits == 0 || !self.ctx.history.can_undo() {
            return false;
        }
        self.ctx.write_unsaved_snapshot();
        true
    }

    /// Restore the state cached by a previous session
    ///
    /// Unsaved work of the same session name is recovered when `confirm`
    /// agrees, otherwise it is dropped and only the cached presets are
    /// restored. At least one preset exists afterwards. Returns true when
    /// unsaved work was recovered.
    pub fn init_io<F>(&mut self, confirm: F) -> bool
    where
        F: FnOnce(&UnsavedSnapshot) -> bool,
    {
        let mut recovered = false;
        if let Some(raw) = self.ctx.cache.get(UNSAVED_KEY) {
            match serde_json::from_str::<UnsavedSnapshot>(&raw) {
                Ok(snapshot) if snapshot.session == self.ctx.config.session_name => {
                    if confirm(&snapshot) {
                        let decoded = DecodedAnnotations { objects: snapshot.objects, presets: snapshot.presets };
                        self.apply_import(decoded, NATIVE_FORMAT, false, true);
                        recovered = true;
                    } else {
                        self.ctx.clear_unsaved();
                    }
                }
                Ok(snapshot) => {
                    tracing::debug!(session = ?snapshot.session, "cached unsaved work belongs to another session");
                }
                Err(error) => {
                    tracing::error!(%error, "cached unsaved work is corrupted, dropping it");
                    self.ctx.clear_unsaved();
                }
            }
        }
        if !recovered {
            self.load_presets_snapshot(true);
        }
        if self.ctx.presets.is_empty() {
            let ctx = &mut self.ctx;
            let preset = ctx.presets.add_preset(None, "", &mut ctx.events);
            ctx.presets.select(Some(&preset.id), true, Some(ctx.cache.as_mut()), &mut ctx.events);
        }
        recovered
    }

    /// Keep the current presets in the cache
    pub fn create_presets_snapshot(&mut self) -> PresetResult<()> {
        let data = self.ctx.presets.to_json()?;
        self.ctx.cache.set(PRESETS_KEY, Some(data));
        Ok(())
    }

    /// Merge presets kept by [`create_presets_snapshot`](Self::create_presets_snapshot)
    ///
    /// With `ask` the snapshot is skipped when presets already came with
    /// imported data.
    pub fn load_presets_snapshot(&mut self, ask: bool) -> bool {
        let Some(data) = self.ctx.cache.get(PRESETS_KEY) else {
            return false;
        };
        if ask && self.ctx.presets.presets_imported() {
            self.ctx.events.warn(Warning::new(
                WarningCode::CacheIoOmitted,
                "Presets were loaded with the annotation data, cached presets were not applied.",
            ));
            return false;
        }
        match PresetManager::parse(&data) {
            Ok(records) => {
                let ctx = &mut self.ctx;
                ctx.presets.import(records, false, &ctx.factories, ctx.cache.as_ref(), &mut ctx.events);
                true
            }
            Err(error) => {
                tracing::error!(%error, "cached presets could not be parsed");
                self.ctx.events.warn(Warning::new(
                    WarningCode::CookiesDisabled,
                    "Cached presets could not be loaded. Is the local storage available?",
                ));
                false
            }
        }
    }

    fn store_metadata(&self, format: &str) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("format".to_string(), format.to_string());
        metadata.insert("session".to_string(), self.ctx.session_id.clone());
        metadata.insert("created".to_string(), now_millis().to_string());
        if let Some(author) = &self.ctx.author {
            metadata.insert("author".to_string(), author.clone());
        }
        metadata
    }

    fn store_failure(&mut self, error: &StoreError) {
        tracing::error!(%error, "annotation store request failed");
        self.ctx.events.warn(Warning::new(WarningCode::StoreFailure, format!("Annotations could not be saved: {error}")));
    }

    /// Export everything and save it as a new record for `tissue`
    pub fn upload_to_store(
        &mut self,
        store: &mut dyn AnnotationStore,
        tissue: &str,
        options: &ExportOptions,
    ) -> PersistResult<String> {
        let format = self.format_or_default(options.format.as_deref());
        let options = ExportOptions { format: Some(format.clone()), ..options.clone() };
        let data = self.export(&options, true, true)?;
        match store.create(tissue, &data, self.store_metadata(&format)) {
            Ok(id) => {
                tracing::info!(%id, tissue, "annotations uploaded");
                Ok(id)
            }
            Err(error) => {
                self.store_failure(&error);
                Err(error.into())
            }
        }
    }

    /// Overwrite an existing record with the current content
    pub fn update_in_store(&mut self, store: &mut dyn AnnotationStore, id: &str, options: &ExportOptions) -> PersistResult<()> {
        let data = self.export(options, true, true)?;
        store.update(id, &data).map_err(|error| {
            self.store_failure(&error);
            PersistError::from(error)
        })
    }

    /// Import every record kept for `tissue`; `clear` replaces current content
    ///
    /// Returns the number of records that could be imported.
    pub fn load_from_store(&mut self, store: &dyn AnnotationStore, tissue: &str, clear: bool) -> PersistResult<usize> {
        let records = match store.load(tissue) {
            Ok(records) => records,
            Err(error) => {
                self.store_failure(&error);
                return Err(error.into());
            }
        };
        let mut imported = 0;
        for record in &records {
            let options = ImportOptions { format: record.metadata.get("format").cloned(), inherit_session: false };
            if self.import(&record.data, &options, clear && imported == 0) {
                imported += 1;
            } else {
                tracing::warn!(record = %record.id, "stored annotations could not be imported");
            }
        }
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyValueCache, MemoryCache};
    use crate::config::EngineConfig;
    use crate::engine::PresetSelection;
    use crate::factory::CreateParams;
    use crate::store::MemoryAnnotationStore;

    fn ready_engine() -> AnnotationEngine {
        let mut engine = AnnotationEngine::builder().build().expect("engine");
        engine.init_io(|_| false);
        engine
    }

    fn add_rect(engine: &mut AnnotationEngine, x: f64) {
        engine.create_annotation("rect", CreateParams::Coords(vec![x, 0.0, x + 10.0, 10.0])).expect("rect");
    }

    #[test]
    fn test_init_io_guarantees_a_preset() {
        let engine = ready_engine();
        assert_eq!(engine.presets().len(), 1);
        assert!(engine.preset(true).is_some());
    }

    #[test]
    fn test_failed_import_leaves_state() {
        let mut engine = ready_engine();
        add_rect(&mut engine, 0.0);
        let events = engine.events_mut().channel();

        assert!(!engine.import("definitely not annotations", &ImportOptions::default(), true));
        assert_eq!(engine.objects().count(), 1);
        assert!(events
            .try_iter()
            .any(|event| matches!(event, EngineEvent::Import { imported: false, format: None })));
    }

    #[test]
    fn test_export_clears_unsaved_work() {
        let config = EngineConfig::default().with_unsaved_snapshot_threshold(1);
        let mut engine = AnnotationEngine::builder().with_config(config).build().expect("engine");
        engine.init_io(|_| false);
        add_rect(&mut engine, 0.0);
        assert!(engine.context().cache.get(UNSAVED_KEY).is_some());

        engine.export(&ExportOptions::default(), true, true).expect("native export");
        assert!(engine.context().cache.get(UNSAVED_KEY).is_none());
        assert!(!engine.flush_unsaved_work());
    }

    #[test]
    fn test_unsaved_work_is_recovered_for_same_session() {
        let config = EngineConfig::default().with_session_name("slide-7");
        let mut first = AnnotationEngine::builder().with_config(config.clone()).build().expect("engine");
        first.init_io(|_| false);
        add_rect(&mut first, 0.0);
        add_rect(&mut first, 20.0);
        assert!(first.flush_unsaved_work());
        let raw = first.context().cache.get(UNSAVED_KEY).expect("snapshot");

        let mut cache = MemoryCache::new();
        cache.set(UNSAVED_KEY, Some(raw.clone()));
        let mut second = AnnotationEngine::builder().with_config(config).with_cache(cache).build().expect("engine");
        let mut offered = 0;
        assert!(second.init_io(|snapshot| {
            offered = snapshot.objects.len();
            true
        }));
        assert_eq!(offered, 2);
        assert_eq!(second.objects().count(), 2);

        let mut cache = MemoryCache::new();
        cache.set(UNSAVED_KEY, Some(raw));
        let other = EngineConfig::default().with_session_name("slide-8");
        let mut third = AnnotationEngine::builder().with_config(other).with_cache(cache).build().expect("engine");
        assert!(!third.init_io(|_| true));
        assert_eq!(third.objects().count(), 0);
    }

    #[test]
    fn test_presets_snapshot_round_trip() {
        let mut engine = ready_engine();
        engine.add_preset(Some("stroma"), "Stroma");
        engine.create_presets_snapshot().expect("serializable");
        let cached = engine.context().cache.get(PRESETS_KEY).expect("snapshot");

        let mut cache = MemoryCache::new();
        cache.set(PRESETS_KEY, Some(cached));
        let mut restored = AnnotationEngine::builder().with_cache(cache).build().expect("engine");
        restored.init_io(|_| false);
        assert!(restored.presets().exists("stroma"));
    }

    #[test]
    fn test_corrupted_presets_snapshot_warns() {
        let mut cache = MemoryCache::new();
        cache.set(PRESETS_KEY, Some("{broken".to_string()));
        let mut engine = AnnotationEngine::builder().with_cache(cache).build().expect("engine");
        let events = engine.events_mut().channel();
        engine.init_io(|_| false);
        assert!(events
            .try_iter()
            .any(|event| matches!(event, EngineEvent::Warning(w) if w.code == WarningCode::CookiesDisabled)));
        assert_eq!(engine.presets().len(), 1);
    }

    #[test]
    fn test_partial_exports_merge() {
        let mut engine = ready_engine();
        add_rect(&mut engine, 0.0);
        let mut partial = engine.export_partial(&ExportOptions::default(), true, false).expect("objects");
        let presets = engine.export_partial(&ExportOptions::default(), false, true).expect("presets");
        partial.merge(presets).expect("same format");
        let data = engine.export_finalize(partial).expect("finalized");

        let mut copy = ready_engine();
        assert!(copy.import(&data, &ImportOptions::default(), true));
        assert_eq!(copy.objects().count(), 1);
    }

    #[test]
    fn test_store_round_trip() {
        let mut store = MemoryAnnotationStore::new();
        let mut engine = ready_engine();
        add_rect(&mut engine, 0.0);
        let id = engine.upload_to_store(&mut store, "tissue-1", &ExportOptions::default()).expect("uploaded");

        add_rect(&mut engine, 20.0);
        engine.update_in_store(&mut store, &id, &ExportOptions::default()).expect("updated");

        let mut loaded = ready_engine();
        assert_eq!(loaded.load_from_store(&store, "tissue-1", true).expect("loaded"), 1);
        assert_eq!(loaded.objects().count(), 2);
        assert!(loaded.set_preset(PresetSelection::Any, true).is_some());

        let err = engine.update_in_store(&mut store, "missing", &ExportOptions::default()).expect_err("unknown record");
        assert!(matches!(err, PersistError::Store(StoreError::NotFound(_))));
    }
}
