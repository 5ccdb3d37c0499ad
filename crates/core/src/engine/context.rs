//! Shared engine state the interaction modes operate on

use crate::annotation::{now_millis, AnnotationGeometry, AnnotationObject, ImagePoint, ObjectId};
use crate::cache::{KeyValueCache, UNSAVED_KEY};
use crate::canvas::{Canvas, CanvasHandle};
use crate::clip::Contour;
use crate::config::EngineConfig;
use crate::event::{EngineEvent, EventBus, Warning, WarningCode};
use crate::factory::{AnnotationObjectFactory, CreateParams, FactoryRegistry, ObjectOptions};
use crate::free_form::{BrushOutcome, BrushUpdate, FreeFormTool};
use crate::geometry::{self, Aabb};
use crate::history::{History, HistoryStep};
use crate::layer::LayerRegistry;
use crate::preset::{Preset, PresetManager, DEFAULT_PRESET_ID};
use crate::state::BrushTarget;
use crate::viewport::Viewport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Press state of the pointer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Press {
    #[default]
    Idle,
    /// Pressed at the given time
    At(u64),
    /// Press refused by the mode; the release is still reported
    Aborted(u64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    is_down: bool,
    press: Press,
}

impl Cursor {
    pub fn is_down(&self) -> bool {
        self.is_down
    }

    pub fn press(&self) -> Press {
        self.press
    }

    /// Time between the press and `now`, `None` when no press is tracked
    pub fn press_duration(&self, now: u64) -> Option<u64> {
        match self.press {
            Press::At(at) => Some(now.saturating_sub(at)),
            _ => None,
        }
    }

    pub fn pressed_at(&self) -> Option<u64> {
        match self.press {
            Press::At(at) | Press::Aborted(at) => Some(at),
            Press::Idle => None,
        }
    }

    pub(crate) fn down(&mut self, at: u64) {
        self.is_down = true;
        self.press = Press::At(at);
    }

    pub(crate) fn abort(&mut self) {
        self.press = Press::Aborted(self.pressed_at().unwrap_or_default());
        self.is_down = false;
    }

    pub(crate) fn release(&mut self) {
        self.is_down = false;
    }

    pub(crate) fn reset(&mut self) {
        self.is_down = false;
        self.press = Press::Idle;
    }
}

/// Unsaved work kept in the cache between sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnsavedSnapshot {
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub objects: Vec<AnnotationObject>,
    #[serde(default)]
    pub presets: Vec<Preset>,
}

/// Everything a mode may read or change
///
/// Owned by [`AnnotationEngine`](super::AnnotationEngine) next to the mode
/// table and lent to the active mode for each input event.
pub struct EngineContext {
    pub(crate) config: EngineConfig,
    pub(crate) canvas: Canvas,
    pub(crate) history: History,
    pub(crate) presets: PresetManager,
    pub(crate) layers: LayerRegistry,
    pub(crate) factories: FactoryRegistry,
    pub(crate) free_form: FreeFormTool,
    pub(crate) events: EventBus,
    pub(crate) viewport: Box<dyn Viewport>,
    pub(crate) cache: Box<dyn KeyValueCache>,
    pub(crate) cursor: Cursor,
    /// Edits since the last unsaved-work snapshot
    pub(crate) unsaved_edits: u32,
    pub(crate) session_id: String,
    pub(crate) author: Option<String>,
    pub(crate) fired_by_key: bool,
    pub(crate) disabled: bool,
    /// Object under direct manipulation and its state before it started
    pub(crate) editing: Option<(CanvasHandle, AnnotationObject)>,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("objects", &self.canvas.len())
            .field("history", &self.history.len())
            .field("presets", &self.presets.len())
            .field("layers", &self.layers.len())
            .field("session_id", &self.session_id)
            .field("disabled", &self.disabled)
            .finish()
    }
}

impl EngineContext {
    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    pub fn free_form(&self) -> &FreeFormTool {
        &self.free_form
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn presets(&self) -> &PresetManager {
        &self.presets
    }

    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn viewport(&self) -> &dyn Viewport {
        self.viewport.as_ref()
    }

    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn fired_by_key(&self) -> bool {
        self.fired_by_key
    }

    /// Topmost selectable object under `point`, preferring anything but `skip`
    pub fn object_at(&self, point: &ImagePoint, skip: Option<CanvasHandle>) -> Option<CanvasHandle> {
        let hits = self.canvas.hit(point, self.config.hit_tolerance);
        hits.iter().find(|handle| Some(**handle) != skip).or(hits.first()).copied()
    }

    /// Make `handle` the active object and highlight its history entries
    pub fn select(&mut self, handle: Option<CanvasHandle>) {
        if !self.canvas.set_active(handle) {
            return;
        }
        let id = handle.and_then(|handle| self.canvas.get(handle)).and_then(AnnotationObject::id);
        self.history.highlight(id);
    }

    pub fn send_to_back(&mut self, handle: CanvasHandle) -> bool {
        self.canvas.send_to_back(handle)
    }

    /// Objects whose bounding box meets `bbox`, topmost first, mapped by `transformer`
    pub fn find_intersecting_objects_by_bbox<T, F>(&self, bbox: &Aabb, mut transformer: F) -> Vec<T>
    where
        F: FnMut(CanvasHandle, &AnnotationObject) -> Option<T>,
    {
        self.canvas
            .items()
            .rev()
            .filter(|item| geometry::intersect_aabb(bbox, &item.object.bounding_box()))
            .filter_map(|item| transformer(item.handle, &item.object))
            .collect()
    }

    /// Show a draft object that is not part of the annotation data
    pub fn add_helper(&mut self, object: AnnotationObject) -> CanvasHandle {
        self.canvas.add(object)
    }

    /// Draft object at `handle`; committed objects are not handed out
    pub fn helper_mut(&mut self, handle: CanvasHandle) -> Option<&mut AnnotationObject> {
        self.canvas.get_mut(handle).filter(|object| !object.is_committed())
    }

    pub fn delete_helper(&mut self, handle: CanvasHandle) -> Option<AnnotationObject> {
        if self.canvas.get(handle)?.is_committed() {
            tracing::warn!(?handle, "refusing to delete a committed object as helper");
            return None;
        }
        self.canvas.remove(handle)
    }

    /// Put a finished object on the canvas and commit it
    pub fn add_annotation(&mut self, object: AnnotationObject) -> CanvasHandle {
        let handle = self.canvas.add(object);
        self.promote_helper(handle);
        handle
    }

    /// Commit the draft at `handle`: identity, session, history entry, create event
    pub(crate) fn promote_helper(&mut self, handle: CanvasHandle) -> Option<ObjectId> {
        let layer_id = self.canvas.get(handle)?.layer_id.clone();
        let layer_id = self.ensure_layer(layer_id);
        let object = self.canvas.get_mut(handle)?;
        if object.is_committed() {
            return object.id();
        }
        object.session_id = Some(self.session_id.clone());
        object.author = self.author.clone();
        object.created = Some(now_millis());
        object.layer_id = Some(layer_id);
        let id = self.history.commit(object);
        let snapshot = object.clone();

        let preset = self.preset_of(&snapshot);
        self.history.push(Some(snapshot.clone()), None, preset);
        self.emit_history_change();
        if let Some(preset_id) = &snapshot.preset_id {
            self.presets.mark_used(preset_id);
        }
        tracing::debug!(id, factory = %snapshot.factory_id, "annotation created");
        self.events.emit(EngineEvent::AnnotationCreate { object: snapshot });
        self.touch_unsaved();
        Some(id)
    }

    /// Swap the object at `handle`
    ///
    /// A draft `next` inherits the identity of the replaced object. With
    /// `update_history` the change is undoable and announced as a replace,
    /// otherwise it is a helper swap.
    pub fn replace_annotation(
        &mut self,
        handle: CanvasHandle,
        mut next: AnnotationObject,
        update_history: bool,
    ) -> Option<AnnotationObject> {
        let previous = self.canvas.get(handle)?.clone();
        if !next.is_committed() {
            next.set_lifecycle(previous.lifecycle());
        }
        self.canvas.replace(handle, next.clone());
        if !update_history {
            self.events.emit(EngineEvent::AnnotationReplaceHelper { previous: previous.clone(), next });
            return Some(previous);
        }
        if previous.is_committed() {
            let preset = self.preset_of(&next);
            self.history.push(Some(next.clone()), Some(previous.clone()), preset);
            self.emit_history_change();
            self.touch_unsaved();
        }
        self.events.emit(EngineEvent::AnnotationReplace { previous: previous.clone(), next });
        Some(previous)
    }

    pub fn delete_annotation(&mut self, handle: CanvasHandle) -> Option<AnnotationObject> {
        self.delete_annotation_with(handle, true)
    }

    /// Remove an object; committed ones leave an undoable entry
    pub(crate) fn delete_annotation_with(&mut self, handle: CanvasHandle, raise: bool) -> Option<AnnotationObject> {
        let object = self.canvas.remove(handle)?;
        if !object.is_committed() {
            return Some(object);
        }
        if self.editing.as_ref().is_some_and(|(editing, _)| *editing == handle) {
            self.editing = None;
            self.history.set_ongoing_edit(None);
        }
        if object.id().is_some() && self.history.highlighted() == object.id() {
            self.history.highlight(None);
        }
        let preset = self.preset_of(&object);
        self.history.push(None, Some(object.clone()), preset);
        self.emit_history_change();
        if raise {
            self.events.emit(EngineEvent::AnnotationDelete { object: object.clone() });
        }
        self.touch_unsaved();
        Some(object)
    }

    /// Apply an undo or redo step to the canvas
    pub(crate) fn apply_history_step(&mut self, step: HistoryStep) {
        if let Some(preset) = step.preset {
            if !self.presets.exists(&preset.id) {
                self.presets.restore(preset, &mut self.events);
            }
        }
        let removed = step.remove.and_then(|id| self.canvas.find(id));
        match (removed, step.add) {
            (Some(handle), Some(next)) => {
                if let Some(previous) = self.canvas.replace(handle, next.clone()) {
                    self.events.emit(EngineEvent::AnnotationReplace { previous, next });
                }
            }
            (Some(handle), None) => {
                if let Some(object) = self.canvas.remove(handle) {
                    self.events.emit(EngineEvent::AnnotationDelete { object });
                }
            }
            (None, Some(next)) => {
                self.ensure_layer(next.layer_id.clone());
                self.canvas.add(next.clone());
                self.events.emit(EngineEvent::AnnotationCreate { object: next });
            }
            (None, None) => {}
        }
        self.emit_history_change();
        self.touch_unsaved();
    }

    fn preset_of(&self, object: &AnnotationObject) -> Option<Preset> {
        object.preset_id.as_deref().and_then(|id| self.presets.get(id)).cloned()
    }

    pub(crate) fn emit_history_change(&mut self) {
        let (can_undo, can_redo) = (self.history.can_undo(), self.history.can_redo());
        self.events.emit(EngineEvent::HistoryChange { can_undo, can_redo });
    }

    /// Id of the active layer, creating one when there is none
    pub(crate) fn active_layer_id(&mut self) -> String {
        if let Some(layer) = self.layers.active() {
            return layer.id.clone();
        }
        self.create_layer(None).id
    }

    pub(crate) fn create_layer(&mut self, id: Option<&str>) -> crate::layer::Layer {
        let (layer, created) = self.layers.create(id);
        if created {
            self.events.emit(EngineEvent::LayerAdded { layer: layer.clone() });
        }
        layer
    }

    /// Make sure the referenced layer exists; no reference means the active layer
    pub(crate) fn ensure_layer(&mut self, layer_id: Option<String>) -> String {
        match layer_id {
            Some(id) => {
                self.create_layer(Some(&id));
                id
            }
            None => self.active_layer_id(),
        }
    }

    /// Bind an object to a live preset and its factory's rendering
    ///
    /// Objects referencing a missing preset fall back to the left preset, or
    /// to a default preset created on demand. Returns false when no factory
    /// knows the object.
    pub(crate) fn check_preset(&mut self, object: &mut AnnotationObject) -> bool {
        let known = object.preset_id.as_deref().is_some_and(|id| self.presets.exists(id));
        if !known {
            let fallback = match self.presets.active(true).cloned() {
                Some(preset) => preset,
                None => self.presets.get_or_create(DEFAULT_PRESET_ID, "", &mut self.events),
            };
            tracing::debug!(
                missing = ?object.preset_id,
                fallback = %fallback.id,
                "object references a missing preset"
            );
            object.preset_id = Some(fallback.id);
        }
        let Some(factory) = self
            .factories
            .get(&object.factory_id)
            .or_else(|| self.factories.by_geometry_type(object.type_name()))
        else {
            return false;
        };
        let Some(preset) = object.preset_id.as_deref().and_then(|id| self.presets.get(id)) else {
            return false;
        };
        let mut options = self.presets.options_for(preset, true);
        options.layer_id = object.layer_id.clone();
        options.zoom_at_creation = object.zoom_at_creation;
        options.stroke_width = object.style.stroke_width;
        options.original_stroke_width = object.style.original_stroke_width;
        options.opacity = object.style.opacity;
        options.selectable = object.selectable;
        factory.configure(object, &options);
        factory.on_zoom(object, self.viewport.graphic_zoom());
        true
    }

    /// Factory of the preset active for one button
    pub fn button_factory(&self, is_left: bool) -> Option<Rc<dyn AnnotationObjectFactory>> {
        let preset = self.presets.active(is_left)?;
        self.factories.get(&preset.factory_id)
    }

    /// Creation options for the preset of one button, `None` without a preset
    pub fn annotation_options(&mut self, is_left: bool) -> Option<ObjectOptions> {
        let preset = self.presets.active(is_left)?.clone();
        let mut options = self.presets.options_for(&preset, is_left);
        options.layer_id = Some(self.active_layer_id());
        options.zoom_at_creation = Some(self.viewport.zoom());
        let zoom = self.viewport.graphic_zoom();
        options.original_stroke_width = self.config.stroke_width;
        options.stroke_width = if zoom > 0.0 { self.config.stroke_width / zoom } else { self.config.stroke_width };
        Some(options)
    }

    /// New polygon in the shape of the brush, styled by the button's preset
    pub fn create_brush_polygon(&mut self, brush: Contour, is_left: bool) -> Option<AnnotationObject> {
        let options = self.annotation_options(is_left)?;
        let factory = self.factories.polygon()?;
        match factory.create(CreateParams::Points(brush), &options) {
            Ok(object) => Some(object),
            Err(error) => {
                tracing::error!(%error, "brush polygon could not be created");
                None
            }
        }
    }

    pub fn set_navigation(&mut self, enabled: bool) {
        self.viewport.set_navigation_enabled(enabled);
    }

    /// Refuse the current press; its release is still reported
    ///
    /// Right button warnings are only raised when the mode was entered by
    /// hotkey, other ways of entering a mode imply a left click workflow.
    pub fn abort_click(&mut self, is_left: bool, no_preset_error: bool) {
        self.cursor.abort();
        if no_preset_error && (is_left || self.fired_by_key) {
            let side = if is_left { "left" } else { "right" };
            let mut warning =
                Warning::new(WarningCode::NoPreset, format!("Select a preset for the {side} mouse button first."));
            warning.is_left_click = Some(is_left);
            warning.fired_by_key = self.fired_by_key;
            self.events.warn(warning);
        }
    }

    pub fn recompute_brush_radius(&mut self) {
        self.free_form.recompute_radius(self.viewport.as_ref());
    }

    /// Grow or shrink the brush with the wheel
    pub fn scroll_brush(&mut self, delta: f64) {
        let requested = self.free_form.screen_radius() - delta / 100.0;
        let radius = self.free_form.set_safe_radius(requested, self.viewport.as_ref());
        self.events.emit(EngineEvent::FreeFormToolRadius { radius });
    }

    pub fn set_brush_mode_add(&mut self, add: bool) {
        self.free_form.set_mode_add(add);
        self.events.emit(EngineEvent::FreeFormToolModeAdd { is_add: add });
    }

    /// Open a brush session and stamp the first point
    ///
    /// An existing object is swapped for a working polygon copy until the
    /// session finishes. Returns false when the target cannot be brushed.
    pub fn free_form_start(&mut self, target: BrushTarget, point: ImagePoint) -> bool {
        if self.free_form.is_active() {
            self.free_form_finish(false);
        }
        let Some(polygon_factory) = self.factories.polygon() else {
            return false;
        };
        self.select(None);
        let (handle, contour, original) = match target {
            BrushTarget::New(object) => {
                let contour = object.geometry.points().map(<[ImagePoint]>::to_vec).unwrap_or_default();
                (self.add_helper(object), contour, None)
            }
            BrushTarget::Existing(handle) => {
                let Some(original) = self.canvas.get(handle).cloned() else {
                    return false;
                };
                let contour = self.factories.resolve(&original).and_then(|factory| {
                    if factory.is_implicit() {
                        factory.to_point_array(&original, 1.0)
                    } else {
                        original.geometry.points().map(<[ImagePoint]>::to_vec)
                    }
                });
                let Some(contour) = contour.filter(|contour| contour.len() >= 3) else {
                    self.events.warn(Warning::new(
                        WarningCode::FreeFormUnsupported,
                        "This object cannot be modified with the brush.",
                    ));
                    return false;
                };
                let working = match polygon_factory.copy(&original, Some(CreateParams::Points(contour.clone()))) {
                    Ok(working) => working,
                    Err(error) => {
                        tracing::error!(%error, "working polygon could not be created");
                        return false;
                    }
                };
                self.canvas.replace(handle, working.clone());
                self.events.emit(EngineEvent::AnnotationReplaceHelper { previous: original.clone(), next: working });
                (handle, contour, Some(original))
            }
        };
        self.free_form.begin(handle, contour, original);
        self.free_form_update(point);
        true
    }

    /// Stamp the brush; an erased region closes the session at once
    pub fn free_form_update(&mut self, point: ImagePoint) {
        match self.free_form.update(point) {
            BrushUpdate::Changed => {
                let (Some(handle), Some(contour)) = (self.free_form.handle(), self.free_form.contour()) else {
                    return;
                };
                let points = contour.to_vec();
                if let Some(object) = self.canvas.get_mut(handle) {
                    object.geometry = AnnotationGeometry::Polygon { points };
                }
            }
            BrushUpdate::Erased => {
                self.free_form_finish(true);
            }
            BrushUpdate::Unchanged => {}
        }
    }

    /// Close the brush session, returning the object left on the canvas
    pub fn free_form_finish(&mut self, with_deletion: bool) -> Option<CanvasHandle> {
        match self.free_form.finish(with_deletion)? {
            BrushOutcome::Created { handle } => {
                self.promote_helper(handle)?;
                Some(handle)
            }
            BrushOutcome::Edited { handle, original, changed } => {
                let working = self.canvas.replace(handle, original.clone())?;
                if changed {
                    self.replace_annotation(handle, working, true);
                } else {
                    self.events.emit(EngineEvent::AnnotationReplaceHelper { previous: working, next: original });
                }
                Some(handle)
            }
            BrushOutcome::Erased { handle, original } => {
                self.canvas.replace(handle, original);
                self.delete_annotation(handle);
                None
            }
            BrushOutcome::Discarded { handle } => {
                self.delete_helper(handle);
                None
            }
        }
    }

    /// Count an edit and snapshot unsaved work once enough accumulated
    pub(crate) fn touch_unsaved(&mut self) {
        self.unsaved_edits += 1;
        if self.unsaved_edits >= self.config.unsaved_snapshot_threshold.max(1) {
            self.write_unsaved_snapshot();
        }
    }

    pub(crate) fn write_unsaved_snapshot(&mut self) {
        let snapshot = UnsavedSnapshot {
            session: self.config.session_name.clone(),
            objects: self.canvas.annotations().cloned().collect(),
            presets: self.presets.records(|_| true),
        };
        match serde_json::to_string(&snapshot) {
            Ok(data) => {
                self.cache.set(UNSAVED_KEY, Some(data));
                tracing::debug!(objects = snapshot.objects.len(), "unsaved work cached");
            }
            Err(error) => tracing::error!(%error, "unsaved work could not be serialized"),
        }
        self.unsaved_edits = 0;
    }

    pub(crate) fn clear_unsaved(&mut self) {
        self.cache.set(UNSAVED_KEY, None);
        self.unsaved_edits = 0;
    }
}
