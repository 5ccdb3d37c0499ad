//! Presets, layers and object operations of the engine

use super::AnnotationEngine;
use crate::annotation::{AnnotationObject, ObjectId};
use crate::canvas::{Canvas, CanvasHandle};
use crate::error::EngineResult;
use crate::event::{EngineEvent, Warning, WarningCode};
use crate::factory::{AnnotationObjectFactory, CreateParams, FactoryResult, ObjectOptions};
use crate::geometry::Aabb;
use crate::layer::{Layer, LayerRegistry};
use crate::preset::{Preset, PresetError, PresetManager, PresetResult, PresetUpdate, CATEGORY_KEY};
use std::rc::Rc;

/// Preset to activate for a button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetSelection {
    /// The first existing preset, created when there is none
    Any,
    Id(String),
    /// Clear the button's preset
    None,
}

impl AnnotationEngine {
    // Presets

    pub fn presets(&self) -> &PresetManager {
        &self.ctx.presets
    }

    /// Preset active for the left or right button
    pub fn preset(&self, is_left: bool) -> Option<&Preset> {
        self.ctx.presets.active(is_left)
    }

    pub fn add_preset(&mut self, id: Option<&str>, category: &str) -> Preset {
        self.ctx.presets.add_preset(id, category, &mut self.ctx.events)
    }

    /// Activate a preset for one button, returning it
    pub fn set_preset(&mut self, selection: PresetSelection, is_left: bool) -> Option<Preset> {
        let id = match selection {
            PresetSelection::Any => match self.ctx.presets.first() {
                Some(preset) => preset.id.clone(),
                None => self.ctx.presets.add_preset(None, "", &mut self.ctx.events).id,
            },
            PresetSelection::Id(id) => id,
            PresetSelection::None => {
                self.ctx.presets.select(None, is_left, Some(self.ctx.cache.as_mut()), &mut self.ctx.events);
                return None;
            }
        };
        if !self.ctx.presets.select(Some(&id), is_left, Some(self.ctx.cache.as_mut()), &mut self.ctx.events) {
            tracing::warn!(preset = %id, "cannot select a missing preset");
            return None;
        }
        self.ctx.presets.get(&id).cloned()
    }

    /// Remove a preset unless an object on the canvas still uses it
    pub fn remove_preset(&mut self, id: &str) -> PresetResult<Preset> {
        let in_use = self.ctx.canvas.objects().any(|object| object.preset_id.as_deref() == Some(id));
        let result = self.ctx.presets.remove_preset(id, in_use, &mut self.ctx.events);
        if let Err(PresetError::InUse(_)) = &result {
            self.ctx.events.warn(Warning::new(
                WarningCode::PresetInUse,
                "This preset is used by existing annotations and cannot be removed.",
            ));
        }
        result
    }

    /// Change a preset and restyle the objects using it
    pub fn update_preset(&mut self, id: &str, update: PresetUpdate) -> Option<Preset> {
        let preset = self.ctx.presets.update_preset(id, update, &mut self.ctx.events)?;
        let outline = self.ctx.presets.outline();
        let factories = &self.ctx.factories;
        for object in self.ctx.canvas.objects_mut() {
            if object.preset_id.as_deref() != Some(id) {
                continue;
            }
            if let Some(factory) = factories.resolve(object) {
                factory.update_rendering(object, outline, &preset.color);
            }
        }
        Some(preset)
    }

    /// Add a free metadata field to a preset, returning its key
    pub fn add_preset_meta(&mut self, id: &str, name: &str, value: &str) -> PresetResult<String> {
        self.ctx.presets.add_custom_meta(id, name, value, &mut self.ctx.events)
    }

    pub fn remove_preset_meta(&mut self, id: &str, key: &str) -> PresetResult<bool> {
        self.ctx.presets.delete_custom_meta(id, key, &mut self.ctx.events)
    }

    /// Switch between outlined and filled rendering of every object
    pub fn set_draw_outline(&mut self, outline: bool) {
        if !self.ctx.presets.set_outline(outline, self.ctx.cache.as_mut()) {
            return;
        }
        let (presets, factories) = (&self.ctx.presets, &self.ctx.factories);
        for object in self.ctx.canvas.objects_mut() {
            let color = object
                .preset_id
                .as_deref()
                .and_then(|id| presets.get(id))
                .map(|preset| preset.color.clone())
                .unwrap_or_else(|| object.style.color.clone());
            if let Some(factory) = factories.resolve(object) {
                factory.update_rendering(object, outline, &color);
            }
        }
    }

    /// Bind the object at `handle` to a live preset and its factory
    pub fn check_preset(&mut self, handle: CanvasHandle) -> bool {
        let Some(mut object) = self.ctx.canvas.get(handle).cloned() else {
            return false;
        };
        let known = self.ctx.check_preset(&mut object);
        self.ctx.canvas.replace(handle, object);
        known
    }

    // Layers

    pub fn layers(&self) -> &LayerRegistry {
        &self.ctx.layers
    }

    pub fn create_layer(&mut self, id: Option<&str>) -> Layer {
        self.ctx.create_layer(id)
    }

    pub fn set_active_layer(&mut self, id: &str) -> bool {
        self.ctx.layers.set_active(id)
    }

    /// Make sure the layer of the object at `handle` exists
    pub fn check_layer(&mut self, handle: CanvasHandle) -> bool {
        let Some(layer_id) = self.ctx.canvas.get(handle).map(|object| object.layer_id.clone()) else {
            return false;
        };
        let layer_id = self.ctx.ensure_layer(layer_id);
        if let Some(object) = self.ctx.canvas.get_mut(handle) {
            object.layer_id = Some(layer_id);
        }
        true
    }

    /// Delete a layer together with its objects
    ///
    /// Objects go through history but raise no delete events of their own;
    /// a single `LayerRemoved` covers them. Missing layers are ignored.
    pub fn delete_layer(&mut self, id: &str) -> bool {
        let Some(layer) = self.ctx.layers.get(id).cloned() else {
            return false;
        };
        let handles: Vec<CanvasHandle> = self
            .ctx
            .canvas
            .items()
            .filter(|item| item.object.layer_id.as_deref() == Some(id))
            .map(|item| item.handle)
            .collect();
        for handle in &handles {
            self.ctx.delete_annotation_with(*handle, false);
        }
        self.ctx.layers.remove(id);
        tracing::debug!(layer = %id, objects = handles.len(), "layer deleted");
        self.ctx.events.emit(EngineEvent::LayerRemoved { layer });
        true
    }

    pub fn for_each_layer_sorted<F>(&self, mut visit: F)
    where
        F: FnMut(&Layer),
    {
        for layer in self.ctx.layers.sorted() {
            visit(layer);
        }
    }

    /// Order objects by layer position; objects keep their order within a layer
    pub fn sort_objects(&mut self) {
        let layers = &self.ctx.layers;
        self.ctx
            .canvas
            .sort_by_key(|object| object.layer_id.as_deref().and_then(|id| layers.position_of(id)).unwrap_or(0));
    }

    // Objects

    pub fn canvas(&self) -> &Canvas {
        &self.ctx.canvas
    }

    /// Committed annotations in rendering order
    pub fn objects(&self) -> impl Iterator<Item = &AnnotationObject> {
        self.ctx.canvas.annotations()
    }

    pub fn active_object(&self) -> Option<CanvasHandle> {
        self.ctx.canvas.active()
    }

    pub fn find(&self, id: ObjectId) -> Option<CanvasHandle> {
        self.ctx.canvas.find(id)
    }

    /// Create and commit an object with the left button's preset
    pub fn create_annotation(&mut self, factory_id: &str, params: CreateParams) -> FactoryResult<CanvasHandle> {
        let factory = self
            .ctx
            .factories
            .get(factory_id)
            .ok_or_else(|| crate::factory::FactoryError::UnknownFactory(factory_id.to_string()))?;
        let options = match self.ctx.annotation_options(true) {
            Some(options) => options,
            None => ObjectOptions { layer_id: Some(self.ctx.active_layer_id()), ..ObjectOptions::default() },
        };
        let object = factory.create(params, &options)?;
        Ok(self.add_annotation(object))
    }

    /// Commit an object built outside the engine
    pub fn add_annotation(&mut self, mut object: AnnotationObject) -> CanvasHandle {
        self.ctx.check_preset(&mut object);
        self.ctx.add_annotation(object)
    }

    /// Delete a committed annotation by identity
    pub fn delete_annotation(&mut self, id: ObjectId) -> Option<AnnotationObject> {
        let handle = self.ctx.canvas.find(id)?;
        self.ctx.delete_annotation(handle)
    }

    /// Delete whatever sits at `handle`, helper or annotation
    pub fn delete_object(&mut self, handle: CanvasHandle) -> Option<AnnotationObject> {
        self.ctx.delete_annotation(handle)
    }

    pub fn add_helper(&mut self, object: AnnotationObject) -> CanvasHandle {
        self.ctx.add_helper(object)
    }

    pub fn delete_helper(&mut self, handle: CanvasHandle) -> Option<AnnotationObject> {
        self.ctx.delete_helper(handle)
    }

    pub fn promote_helper(&mut self, handle: CanvasHandle) -> Option<ObjectId> {
        self.ctx.promote_helper(handle)
    }

    pub fn replace_annotation(
        &mut self,
        handle: CanvasHandle,
        next: AnnotationObject,
        update_history: bool,
    ) -> Option<AnnotationObject> {
        self.ctx.replace_annotation(handle, next, update_history)
    }

    pub fn find_intersecting_objects_by_bbox<T, F>(&self, bbox: &Aabb, transformer: F) -> Vec<T>
    where
        F: FnMut(CanvasHandle, &AnnotationObject) -> Option<T>,
    {
        self.ctx.find_intersecting_objects_by_bbox(bbox, transformer)
    }

    /// Delete the selected object, or tell the user to select one
    pub fn remove_active_object(&mut self) -> bool {
        match self.ctx.canvas.active() {
            Some(handle) => self.ctx.delete_annotation(handle).is_some(),
            None => {
                self.ctx.events.notice("Please select the annotation you would like to delete");
                false
            }
        }
    }

    /// Delete every committed annotation, returning how many were removed
    pub fn delete_all_annotations(&mut self) -> usize {
        let handles: Vec<CanvasHandle> = self
            .ctx
            .canvas
            .items()
            .filter(|item| item.object.is_committed())
            .map(|item| item.handle)
            .collect();
        handles.into_iter().filter_map(|handle| self.ctx.delete_annotation(handle)).count()
    }

    /// Move an object to another preset, as an undoable change
    pub fn change_annotation_preset(&mut self, handle: CanvasHandle, preset_id: &str) -> bool {
        let Some(preset) = self.ctx.presets.get(preset_id).cloned() else {
            return false;
        };
        let Some(previous) = self.ctx.canvas.get(handle).cloned() else {
            return false;
        };
        let Some(factory) = self.ctx.factories.resolve(&previous) else {
            return false;
        };
        let mut options = self.ctx.presets.options_for(&preset, true);
        options.layer_id = previous.layer_id.clone();
        options.zoom_at_creation = previous.zoom_at_creation;
        options.stroke_width = previous.style.stroke_width;
        options.original_stroke_width = previous.style.original_stroke_width;
        options.opacity = previous.style.opacity;

        let mut next = previous.clone();
        factory.configure(&mut next, &options);
        next.preset_id = Some(preset.id.clone());
        self.ctx.replace_annotation(handle, next.clone(), true);
        self.ctx.presets.mark_used(&preset.id);
        self.ctx.events.emit(EngineEvent::AnnotationPreset { object: next, previous_preset: previous.preset_id });
        true
    }

    /// Value of a preset metadata field for an object
    ///
    /// The object's own metadata overrides the preset's value. Without a
    /// value, `default_if_unknown` falls back to the factory description.
    pub fn annotation_description(&self, object: &AnnotationObject, key: &str, default_if_unknown: bool) -> String {
        let fallback = || if default_if_unknown { self.default_annotation_name(object, true) } else { String::new() };
        let preset = object.preset_id.as_deref().and_then(|id| self.ctx.presets.get(id));
        let Some(entry) = preset.and_then(|preset| preset.meta.get(key)) else {
            return fallback();
        };
        match object.meta.get(key).filter(|value| !value.is_empty()) {
            Some(value) => value.clone(),
            None if !entry.value.is_empty() => entry.value.clone(),
            None => fallback(),
        }
    }

    /// Category shown for an object in lists
    pub fn annotation_category(&self, object: &AnnotationObject) -> String {
        self.annotation_description(object, CATEGORY_KEY, true)
    }

    pub fn annotation_color(&self, object: &AnnotationObject) -> String {
        object
            .preset_id
            .as_deref()
            .and_then(|id| self.ctx.presets.get(id))
            .map(|preset| preset.color.clone())
            .unwrap_or_else(|| "black".to_string())
    }

    pub fn default_annotation_name(&self, object: &AnnotationObject, with_coordinates: bool) -> String {
        match self.ctx.factories.resolve(object) {
            Some(factory) if with_coordinates => factory.description(object),
            Some(factory) => factory.title().to_string(),
            None => "Unknown annotation.".to_string(),
        }
    }

    /// Open direct manipulation of a committed object
    ///
    /// An edit in progress on another object is finished first.
    pub fn edit_object(&mut self, handle: CanvasHandle) -> bool {
        self.finish_edit();
        let Some(before) = self.ctx.canvas.get(handle).filter(|object| object.is_committed()).cloned() else {
            return false;
        };
        let Some(factory) = self.ctx.factories.resolve(&before) else {
            return false;
        };
        if let Some(object) = self.ctx.canvas.get_mut(handle) {
            factory.edit(object);
        }
        self.ctx.history.set_ongoing_edit(before.id());
        self.ctx.editing = Some((handle, before));
        true
    }

    /// Object under direct manipulation
    pub fn edited_object_mut(&mut self) -> Option<&mut AnnotationObject> {
        let handle = self.ctx.editing.as_ref()?.0;
        self.ctx.canvas.get_mut(handle)
    }

    /// Close direct manipulation, recording a change when there was one
    pub fn finish_edit(&mut self) -> bool {
        let Some((handle, before)) = self.ctx.editing.take() else {
            return false;
        };
        self.ctx.history.set_ongoing_edit(None);
        let Some(current) = self.ctx.canvas.get(handle).cloned() else {
            return false;
        };
        let mut after = self
            .ctx
            .factories
            .resolve(&current)
            .and_then(|factory| factory.recalculate(&current))
            .unwrap_or(current);
        after.locked = before.locked;
        after.set_lifecycle(before.lifecycle());
        self.ctx.canvas.replace(handle, after.clone());
        if after == before {
            return false;
        }
        let preset = after.preset_id.as_deref().and_then(|id| self.ctx.presets.get(id)).cloned();
        self.ctx.history.push(Some(after.clone()), Some(before), preset);
        self.ctx.emit_history_change();
        self.ctx.events.emit(EngineEvent::AnnotationEdit { object: after });
        self.ctx.touch_unsaved();
        true
    }

    /// Re-apply zoom dependent rendering after the viewer zoomed
    pub fn on_zoom_changed(&mut self) {
        let zoom = self.ctx.viewport.graphic_zoom();
        let factories = &self.ctx.factories;
        for object in self.ctx.canvas.objects_mut() {
            if let Some(factory) = factories.resolve(object) {
                factory.on_zoom(object, zoom);
            }
        }
        self.ctx.recompute_brush_radius();
    }

    pub fn register_annotation_factory(&mut self, factory: Rc<dyn AnnotationObjectFactory>) -> EngineResult<()> {
        let factory_id = factory.factory_id().to_string();
        self.ctx.factories.register(factory)?;
        tracing::info!(factory = %factory_id, "annotation factory registered");
        self.ctx.events.emit(EngineEvent::FactoryRegistered { factory_id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationGeometry, ImagePoint};
    use crate::factory::POLYGON_FACTORY_ID;

    fn engine_with_preset() -> (AnnotationEngine, Preset) {
        let mut engine = AnnotationEngine::builder().build().expect("engine");
        let preset = engine.add_preset(Some("tumor"), "Tumor");
        engine.set_preset(PresetSelection::Id(preset.id.clone()), true).expect("selected");
        (engine, preset)
    }

    fn rect(engine: &mut AnnotationEngine, x: f64) -> CanvasHandle {
        engine.create_annotation("rect", CreateParams::Coords(vec![x, 0.0, x + 10.0, 10.0])).expect("rect")
    }

    #[test]
    fn test_set_preset_any_creates_one() {
        let mut engine = AnnotationEngine::builder().build().expect("engine");
        let preset = engine.set_preset(PresetSelection::Any, false).expect("created");
        assert_eq!(engine.preset(false).map(|p| p.id.as_str()), Some(preset.id.as_str()));
        assert!(engine.set_preset(PresetSelection::None, false).is_none());
        assert!(engine.preset(false).is_none());
    }

    #[test]
    fn test_preset_in_use_cannot_be_removed() {
        let (mut engine, preset) = engine_with_preset();
        let handle = rect(&mut engine, 0.0);
        let err = engine.remove_preset(&preset.id).expect_err("in use");
        assert!(matches!(err, PresetError::InUse(_)));

        engine.delete_object(handle).expect("deleted");
        engine.remove_preset(&preset.id).expect("unused now");
        assert!(!engine.presets().exists(&preset.id));
    }

    #[test]
    fn test_description_prefers_object_meta() {
        let (mut engine, preset) = engine_with_preset();
        let handle = rect(&mut engine, 0.0);
        let mut object = engine.canvas().get(handle).cloned().expect("object");
        assert_eq!(engine.annotation_category(&object), "Tumor");

        object.meta.insert(CATEGORY_KEY.to_string(), "Necrosis".to_string());
        assert_eq!(engine.annotation_description(&object, CATEGORY_KEY, false), "Necrosis");
        assert_eq!(engine.annotation_description(&object, "missing", false), "");
        assert_eq!(engine.annotation_color(&object), preset.color);

        object.preset_id = None;
        assert_eq!(engine.annotation_color(&object), "black");
    }

    #[test]
    fn test_delete_layer_removes_its_objects() {
        let (mut engine, _) = engine_with_preset();
        let first_layer = engine.layers().active().cloned().expect("default layer");
        rect(&mut engine, 0.0);
        rect(&mut engine, 20.0);
        let second = engine.create_layer(Some("second"));
        engine.set_active_layer(&second.id);
        let kept = rect(&mut engine, 40.0);

        assert!(engine.delete_layer(&first_layer.id));
        assert_eq!(engine.canvas().handles(), vec![kept]);
        assert!(!engine.delete_layer(&first_layer.id));
    }

    #[test]
    fn test_sort_objects_by_layer_position() {
        let (mut engine, _) = engine_with_preset();
        engine.create_layer(Some("base"));
        let top = engine.create_layer(Some("top"));
        engine.set_active_layer(&top.id);
        let upper = rect(&mut engine, 0.0);
        engine.set_active_layer("base");
        let lower = rect(&mut engine, 20.0);

        engine.sort_objects();
        assert_eq!(engine.canvas().handles(), vec![lower, upper]);
        let mut order = Vec::new();
        engine.for_each_layer_sorted(|layer| order.push(layer.id.clone()));
        assert_eq!(order.last().map(String::as_str), Some("top"));
    }

    #[test]
    fn test_edit_records_history_once_changed() {
        let (mut engine, _) = engine_with_preset();
        let handle = rect(&mut engine, 0.0);
        let id = engine.canvas().get(handle).and_then(AnnotationObject::id);

        assert!(engine.edit_object(handle));
        assert!(!engine.finish_edit());

        assert!(engine.edit_object(handle));
        if let Some(object) = engine.edited_object_mut() {
            object.geometry = AnnotationGeometry::Rect { left: 5.0, top: 5.0, width: 10.0, height: 10.0 };
        }
        assert!(engine.finish_edit());
        assert_eq!(engine.canvas().get(handle).and_then(AnnotationObject::id), id);

        assert!(engine.undo());
        let restored = engine.canvas().get(handle).expect("restored");
        assert_eq!(restored.bounding_box().x, 0.0);
    }

    #[test]
    fn test_change_preset_emits_previous() {
        let (mut engine, preset) = engine_with_preset();
        let handle = rect(&mut engine, 0.0);
        let other = engine.add_preset(Some("stroma"), "Stroma");
        let events = engine.events_mut().channel();

        assert!(engine.change_annotation_preset(handle, &other.id));
        let previous = events.try_iter().find_map(|event| match event {
            EngineEvent::AnnotationPreset { previous_preset, .. } => Some(previous_preset),
            _ => None,
        });
        assert_eq!(previous, Some(Some(preset.id.clone())));
        assert_eq!(engine.canvas().get(handle).and_then(|o| o.preset_id.clone()), Some(other.id));
    }

    #[test]
    fn test_remove_active_without_selection_notifies() {
        let (mut engine, _) = engine_with_preset();
        let events = engine.events_mut().channel();
        assert!(!engine.remove_active_object());
        assert!(events.try_iter().any(|event| matches!(event, EngineEvent::Notice { .. })));
    }

    #[test]
    fn test_missing_preset_falls_back_to_left() {
        let (mut engine, preset) = engine_with_preset();
        let mut object = AnnotationObject::new(
            POLYGON_FACTORY_ID,
            AnnotationGeometry::Polygon {
                points: vec![ImagePoint::new(0.0, 0.0), ImagePoint::new(5.0, 0.0), ImagePoint::new(0.0, 5.0)],
            },
        );
        object.preset_id = Some("gone".to_string());
        let handle = engine.add_annotation(object);
        let stored = engine.canvas().get(handle).expect("added");
        assert_eq!(stored.preset_id.as_deref(), Some(preset.id.as_str()));
        assert!(stored.is_committed());
    }
}
