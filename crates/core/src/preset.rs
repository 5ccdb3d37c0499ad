//! Presets: style and metadata templates bound to an object factory
//!
//! The manager keeps presets in creation order, tracks which preset each
//! pointer button draws with, and persists that choice plus the outline mode
//! in the [`KeyValueCache`].

use crate::annotation::{lenient, now_millis, Color};
use crate::cache::{KeyValueCache, DRAW_OUTLINE_KEY, LEFT_PRESET_KEY, RIGHT_PRESET_KEY, UNSET_PRESET};
use crate::event::{EngineEvent, EventBus};
use crate::factory::{FactoryRegistry, ObjectOptions, POLYGON_FACTORY_ID};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Id of the preset synthesized for objects referencing a missing preset
pub const DEFAULT_PRESET_ID: &str = "__default__";

/// Mandatory metadata key
pub const CATEGORY_KEY: &str = "category";

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("preset '{0}' does not exist")]
    NotFound(String),

    #[error("preset '{0}' belongs to existing annotations and cannot be removed")]
    InUse(String),

    #[error("metadata '{0}' is mandatory and cannot be removed")]
    MandatoryMeta(String),

    #[error("invalid preset data: {0}")]
    InvalidData(#[from] serde_json::Error),
}

pub type PresetResult<T> = Result<T, PresetError>;

/// One metadata field of a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub name: String,
    #[serde(default, deserialize_with = "lenient::id")]
    pub value: String,
}

impl MetaEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(rename = "presetID", deserialize_with = "lenient::id")]
    pub id: String,

    #[serde(default)]
    pub color: String,

    #[serde(rename = "factoryID", default = "default_factory")]
    pub factory_id: String,

    #[serde(default)]
    pub meta: BTreeMap<String, MetaEntry>,

    /// Distinguishes deliberate presets from throwaway defaults
    #[serde(skip)]
    pub used: bool,
}

fn default_factory() -> String {
    POLYGON_FACTORY_ID.to_string()
}

impl Preset {
    pub fn new(id: impl Into<String>, factory_id: impl Into<String>, category: &str, color: impl Into<String>) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert(CATEGORY_KEY.to_string(), MetaEntry::new("Name", category));
        Self { id: id.into(), color: color.into(), factory_id: factory_id.into(), meta, used: false }
    }

    pub fn meta_name(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(|entry| entry.name.as_str())
    }

    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(|entry| entry.value.as_str())
    }

    pub fn category(&self) -> &str {
        self.meta_value(CATEGORY_KEY).unwrap_or_default()
    }
}

/// Changes applied by [`PresetManager::update_preset`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetUpdate {
    pub color: Option<String>,
    pub factory_id: Option<String>,
    /// New values of existing metadata fields
    pub meta: BTreeMap<String, String>,
}

/// Outcome of [`PresetManager::import`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetImport {
    pub created: Vec<String>,
    pub removed: Vec<String>,
    pub first: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PresetManager {
    presets: Vec<Preset>,
    left: Option<String>,
    right: Option<String>,
    color_steps: usize,
    color_step: usize,
    presets_imported: bool,
    outline: bool,
    meta_counter: u64,
}

impl Default for PresetManager {
    fn default() -> Self {
        Self::new(8, true)
    }
}

impl PresetManager {
    pub fn new(color_steps: usize, outline: bool) -> Self {
        Self {
            presets: Vec::new(),
            left: None,
            right: None,
            color_steps: color_steps.max(1),
            color_step: 0,
            presets_imported: false,
            outline,
            meta_counter: 0,
        }
    }

    /// Manager restoring the outline mode from `cache`
    pub fn from_cache(color_steps: usize, cache: &dyn KeyValueCache) -> Self {
        Self::new(color_steps, cache.get_bool(DRAW_OUTLINE_KEY, true))
    }

    /// Next hue of the color wheel, `#ff0000` first
    fn next_color(&mut self) -> String {
        let hue = (self.color_step % self.color_steps) as f64 / self.color_steps as f64;
        self.color_step += 1;
        Color::from_hsv(hue, 1.0, 1.0).to_hex()
    }

    fn unique_id(&self) -> String {
        let base = now_millis().to_string();
        let mut id = base.clone();
        let mut suffix = 1;
        while self.exists(&id) {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }
        id
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.presets.iter().position(|preset| preset.id == id)
    }

    /// Add a polygon preset with the next wheel color
    pub fn add_preset(&mut self, id: Option<&str>, category: &str, events: &mut EventBus) -> Preset {
        let id = match id {
            Some(id) if !self.exists(id) => id.to_string(),
            _ => self.unique_id(),
        };
        let color = self.next_color();
        let preset = Preset::new(id, POLYGON_FACTORY_ID, category, color);
        self.presets.push(preset.clone());
        tracing::debug!(preset = %preset.id, color = %preset.color, "preset created");
        events.emit(EngineEvent::PresetCreate { preset: preset.clone() });
        preset
    }

    pub fn get_or_create(&mut self, id: &str, category: &str, events: &mut EventBus) -> Preset {
        match self.get(id) {
            Some(preset) => preset.clone(),
            None => self.add_preset(Some(id), category, events),
        }
    }

    /// Re-insert a preset removed after a history snapshot was taken
    pub fn restore(&mut self, preset: Preset, events: &mut EventBus) -> bool {
        if self.exists(&preset.id) {
            return false;
        }
        tracing::debug!(preset = %preset.id, "preset restored from history");
        self.presets.push(preset.clone());
        events.emit(EngineEvent::PresetCreate { preset });
        true
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn first(&self) -> Option<&Preset> {
        self.presets.first()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.presets.iter().map(|preset| preset.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn active(&self, is_left: bool) -> Option<&Preset> {
        let id = if is_left { self.left.as_deref() } else { self.right.as_deref() };
        id.and_then(|id| self.get(id))
    }

    pub fn presets_imported(&self) -> bool {
        self.presets_imported
    }

    /// Never used, bound to polygons, and carrying only an empty category
    pub fn is_unused(&self, preset: &Preset) -> bool {
        !preset.used
            && preset.factory_id == POLYGON_FACTORY_ID
            && preset.category().is_empty()
            && preset.meta.len() == 1
    }

    pub fn mark_used(&mut self, id: &str) {
        if let Some(index) = self.position(id) {
            self.presets[index].used = true;
        }
    }

    /// Activate a preset for one button, `None` clears the selection
    ///
    /// Returns false when `id` names a missing preset.
    pub fn select(
        &mut self,
        id: Option<&str>,
        is_left: bool,
        cache: Option<&mut dyn KeyValueCache>,
        events: &mut EventBus,
    ) -> bool {
        let preset = match id {
            Some(id) => match self.get(id) {
                Some(preset) => Some(preset.clone()),
                None => return false,
            },
            None => None,
        };
        let selected = preset.as_ref().map(|preset| preset.id.clone());
        if let Some(cache) = cache {
            let key = if is_left { LEFT_PRESET_KEY } else { RIGHT_PRESET_KEY };
            cache.set(key, Some(selected.clone().unwrap_or_else(|| UNSET_PRESET.to_string())));
        }
        if is_left {
            self.left = selected;
        } else {
            self.right = selected;
        }
        events.emit(EngineEvent::PresetSelect { preset, is_left });
        true
    }

    /// Remove a preset no live object references
    pub fn remove_preset(&mut self, id: &str, in_use: bool, events: &mut EventBus) -> PresetResult<Preset> {
        let index = self.position(id).ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        if in_use {
            return Err(PresetError::InUse(id.to_string()));
        }
        let preset = self.presets.remove(index);
        if self.left.as_deref() == Some(id) {
            self.left = None;
        }
        if self.right.as_deref() == Some(id) {
            self.right = None;
        }
        events.emit(EngineEvent::PresetDelete { preset: preset.clone() });
        Ok(preset)
    }

    /// Apply `update`; returns the preset only when something changed
    pub fn update_preset(&mut self, id: &str, update: PresetUpdate, events: &mut EventBus) -> Option<Preset> {
        let index = self.position(id)?;
        let preset = &mut self.presets[index];
        let mut changed = false;

        if let Some(color) = update.color.filter(|color| *color != preset.color) {
            preset.color = color;
            changed = true;
        }
        if let Some(factory_id) = update.factory_id.filter(|factory| *factory != preset.factory_id) {
            preset.factory_id = factory_id;
            changed = true;
        }
        for (key, value) in update.meta {
            if let Some(entry) = preset.meta.get_mut(&key).filter(|entry| entry.value != value) {
                entry.value = value;
                changed = true;
            }
        }
        if !changed {
            return None;
        }
        let preset = preset.clone();
        events.emit(EngineEvent::PresetUpdate { preset: preset.clone() });
        Some(preset)
    }

    /// Add a metadata field, returning its generated key
    pub fn add_custom_meta(&mut self, id: &str, name: &str, value: &str, events: &mut EventBus) -> PresetResult<String> {
        let index = self.position(id).ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        let key = loop {
            self.meta_counter += 1;
            let key = format!("k{}", self.meta_counter);
            if !self.presets[index].meta.contains_key(&key) {
                break key;
            }
        };
        self.presets[index].meta.insert(key.clone(), MetaEntry::new(name, value));
        events.emit(EngineEvent::PresetMetaAdd { preset_id: id.to_string(), key: key.clone() });
        Ok(key)
    }

    /// Remove a metadata field; false when the field did not exist
    pub fn delete_custom_meta(&mut self, id: &str, key: &str, events: &mut EventBus) -> PresetResult<bool> {
        if key == CATEGORY_KEY {
            return Err(PresetError::MandatoryMeta(key.to_string()));
        }
        let index = self.position(id).ok_or_else(|| PresetError::NotFound(id.to_string()))?;
        if self.presets[index].meta.remove(key).is_none() {
            return Ok(false);
        }
        events.emit(EngineEvent::PresetMetaRemove { preset_id: id.to_string(), key: key.to_string() });
        Ok(true)
    }

    pub fn outline(&self) -> bool {
        self.outline
    }

    /// Switch between outlined and filled drawing; true when the mode changed
    pub fn set_outline(&mut self, outline: bool, cache: &mut dyn KeyValueCache) -> bool {
        if self.outline == outline {
            return false;
        }
        cache.set(DRAW_OUTLINE_KEY, Some(outline.to_string()));
        self.outline = outline;
        true
    }

    /// Style options of objects drawn with `preset`
    pub fn options_for(&self, preset: &Preset, is_left: bool) -> ObjectOptions {
        ObjectOptions {
            preset_id: Some(preset.id.clone()),
            color: preset.color.clone(),
            fill: (!self.outline).then(|| preset.color.clone()),
            is_left_click: is_left,
            ..ObjectOptions::default()
        }
    }

    /// Serializable presets, optionally restricted by `keep`
    pub fn records<F>(&self, keep: F) -> Vec<Preset>
    where
        F: Fn(&Preset) -> bool,
    {
        self.presets.iter().filter(|preset| keep(preset)).cloned().collect()
    }

    pub fn to_json(&self) -> PresetResult<String> {
        Ok(serde_json::to_string(&self.presets)?)
    }

    /// Parse a serialized preset list
    pub fn parse(data: &str) -> PresetResult<Vec<Preset>> {
        Ok(serde_json::from_str(data)?)
    }

    /// Merge imported presets by id, or replace everything when `clear` is set
    ///
    /// Without `clear`, throwaway presets are pruned first and existing ids
    /// win over imported ones. Button selections are then restored from the
    /// cache, falling back to the first imported preset for the left button.
    pub fn import(
        &mut self,
        records: Vec<Preset>,
        clear: bool,
        factories: &FactoryRegistry,
        cache: &dyn KeyValueCache,
        events: &mut EventBus,
    ) -> PresetImport {
        let mut outcome = PresetImport::default();
        if clear {
            for preset in self.presets.drain(..) {
                outcome.removed.push(preset.id.clone());
                events.emit(EngineEvent::PresetDelete { preset });
            }
            self.left = None;
            self.right = None;
            self.presets_imported = false;
        } else {
            let (unused, kept): (Vec<Preset>, Vec<Preset>) =
                std::mem::take(&mut self.presets).into_iter().partition(|preset| self.is_unused(preset));
            self.presets = kept;
            for preset in unused {
                outcome.removed.push(preset.id.clone());
                events.emit(EngineEvent::PresetDelete { preset });
            }
        }

        let imported = !records.is_empty();
        for mut preset in records {
            if factories.get(&preset.factory_id).is_none() {
                tracing::error!(
                    preset = %preset.id,
                    factory = %preset.factory_id,
                    "no factory for imported preset, using polygon"
                );
                preset.factory_id = POLYGON_FACTORY_ID.to_string();
            }
            if !preset.meta.contains_key(CATEGORY_KEY) {
                preset.meta.insert(CATEGORY_KEY.to_string(), MetaEntry::new("Name", ""));
            }
            preset.used = true;
            if self.exists(&preset.id) {
                continue;
            }
            self.color_step += 1;
            outcome.created.push(preset.id.clone());
            if outcome.first.is_none() {
                outcome.first = Some(preset.id.clone());
            }
            self.presets.push(preset.clone());
            events.emit(EngineEvent::PresetCreate { preset });
        }
        self.presets_imported = imported;

        for (key, is_left) in [(LEFT_PRESET_KEY, true), (RIGHT_PRESET_KEY, false)] {
            let Some(cached) = cache.get(key) else { continue };
            let restored = (cached != UNSET_PRESET && self.exists(&cached)).then_some(cached);
            if is_left {
                self.left = restored;
            } else {
                self.right = restored;
            }
        }
        if self.active(true).is_none() {
            if let Some(first) = outcome.first.clone() {
                self.select(Some(&first), true, None, events);
            }
        }
        outcome
    }
}
