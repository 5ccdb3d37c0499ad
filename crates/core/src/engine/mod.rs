//! Annotation engine façade
//!
//! [`AnnotationEngine`] owns the [`EngineContext`] and the [`ModeTable`].
//! Host input is translated into image coordinates and routed to the active
//! mode; everything else (presets, layers, import/export) is exposed as
//! plain methods that keep the canvas, history and event stream in sync.

mod content;
mod context;
mod io;

pub use content::PresetSelection;
pub use context::{Cursor, EngineContext, Press, UnsavedSnapshot};
pub use io::{ExportOptions, ImportOptions, PersistError, PersistResult};

use crate::annotation::ImagePoint;
use crate::cache::{KeyValueCache, MemoryCache};
use crate::canvas::{Canvas, CanvasHandle};
use crate::clip::{GeoClipper, PolygonClipper};
use crate::config::EngineConfig;
use crate::convert::ConvertorRegistry;
use crate::error::{EngineError, EngineResult};
use crate::event::{EngineEvent, EventBus, SubscriptionId};
use crate::factory::{BuiltinFactorySettings, FactoryRegistry};
use crate::free_form::FreeFormTool;
use crate::history::History;
use crate::input::{KeyCode, KeyEvent, PointerEvent, WheelEvent};
use crate::layer::LayerRegistry;
use crate::preset::PresetManager;
use crate::state::{AnnotationState, Mode, ModeTable, PointerInput};
use crate::viewport::{StaticViewport, Viewport};
use std::fmt;

/// Builder wiring the engine's collaborators
///
/// Everything is optional: a static viewport, an in-memory cache, the geo
/// clipper, the built-in factories and formats, and all built-in modes are
/// used for whatever is not supplied.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    viewport: Option<Box<dyn Viewport>>,
    cache: Option<Box<dyn KeyValueCache>>,
    clipper: Option<Box<dyn PolygonClipper>>,
    factories: Option<FactoryRegistry>,
    convertors: Option<ConvertorRegistry>,
    modes: Option<ModeTable>,
    author: Option<String>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_viewport(mut self, viewport: impl Viewport + 'static) -> Self {
        self.viewport = Some(Box::new(viewport));
        self
    }

    pub fn with_cache(mut self, cache: impl KeyValueCache + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    pub fn with_clipper(mut self, clipper: impl PolygonClipper + 'static) -> Self {
        self.clipper = Some(Box::new(clipper));
        self
    }

    /// Replace the built-in factories; the registry must contain a polygon factory
    pub fn with_factories(mut self, factories: FactoryRegistry) -> Self {
        self.factories = Some(factories);
        self
    }

    pub fn with_convertors(mut self, convertors: ConvertorRegistry) -> Self {
        self.convertors = Some(convertors);
        self
    }

    /// Restrict or extend the available modes
    pub fn with_modes(mut self, modes: ModeTable) -> Self {
        self.modes = Some(modes);
        self
    }

    /// Author recorded on every annotation created in this engine
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn build(self) -> EngineResult<AnnotationEngine> {
        let config = self.config;
        config.validate()?;

        let viewport = self.viewport.unwrap_or_else(|| Box::new(StaticViewport::default()));
        let factories = match self.factories {
            Some(factories) => factories,
            None => FactoryRegistry::with_builtin(&BuiltinFactorySettings {
                microns_per_pixel: viewport.microns_per_pixel(),
                simplify_tolerance: config.simplify_tolerance,
            }),
        };
        if factories.polygon().is_none() {
            return Err(EngineError::MissingPolygonFactory);
        }

        let cache = self.cache.unwrap_or_else(|| Box::new(MemoryCache::new()));
        let presets = PresetManager::from_cache(config.color_steps, cache.as_ref());
        let clipper = self.clipper.unwrap_or_else(|| Box::new(GeoClipper));
        let mut free_form = FreeFormTool::new(clipper, &config);
        free_form.recompute_radius(viewport.as_ref());
        let mut layers = LayerRegistry::new();
        layers.create(None);
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session = %session_id, factories = factories.len(), "annotation engine created");

        let ctx = EngineContext {
            canvas: Canvas::new(),
            history: History::new(config.history_size),
            presets,
            layers,
            factories,
            free_form,
            events: EventBus::new(),
            viewport,
            cache,
            cursor: Cursor::default(),
            unsaved_edits: 0,
            session_id,
            author: self.author,
            fired_by_key: false,
            disabled: false,
            editing: None,
            config,
        };
        Ok(AnnotationEngine {
            ctx,
            modes: self.modes.unwrap_or_else(ModeTable::with_builtin),
            convertors: self.convertors.unwrap_or_else(ConvertorRegistry::with_builtin),
            opacity: 1.0,
            cached_selection: None,
        })
    }
}

/// Annotation editing engine over one slide
pub struct AnnotationEngine {
    ctx: EngineContext,
    modes: ModeTable,
    convertors: ConvertorRegistry,
    opacity: f64,
    /// Selection remembered while annotations are disabled
    cached_selection: Option<CanvasHandle>,
}

impl fmt::Debug for AnnotationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationEngine")
            .field("ctx", &self.ctx)
            .field("modes", &self.modes)
            .field("convertors", &self.convertors)
            .finish()
    }
}

impl AnnotationEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.ctx
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    /// Id of this engine's session, stamped on created annotations
    pub fn session_id(&self) -> &str {
        &self.ctx.session_id
    }

    pub fn convertors(&self) -> &ConvertorRegistry {
        &self.convertors
    }

    pub fn convertors_mut(&mut self) -> &mut ConvertorRegistry {
        &mut self.convertors
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.ctx.events
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&EngineEvent) + 'static,
    {
        self.ctx.events.subscribe(handler)
    }

    pub fn viewport(&self) -> &dyn Viewport {
        self.ctx.viewport.as_ref()
    }

    pub fn viewport_mut(&mut self) -> &mut dyn Viewport {
        self.ctx.viewport.as_mut()
    }

    // Modes

    pub fn modes(&self) -> &ModeTable {
        &self.modes
    }

    pub fn mode(&self) -> &str {
        self.modes.active_id()
    }

    /// Load a built-in mode; already loaded modes are ignored
    pub fn set_mode_used(&mut self, mode: Mode) -> bool {
        self.modes.use_mode(mode)
    }

    pub fn set_custom_mode_used(&mut self, state: Box<dyn AnnotationState>) -> EngineResult<()> {
        self.modes.use_custom(state)
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if let Some(index) = self.modes.index_of(mode.id()) {
            self.switch_mode(index, false);
        } else {
            tracing::warn!(mode = %mode, "mode is not loaded");
        }
    }

    /// Switch to a loaded mode by id; `force` runs the exit/entry pair even
    /// when targeting AUTO from another mode
    pub fn set_mode_by_id(&mut self, id: &str, force: bool) -> EngineResult<()> {
        let index = self.modes.index_of(id).ok_or_else(|| EngineError::UnknownMode(id.to_string()))?;
        self.switch_mode(index, force);
        Ok(())
    }

    fn switch_mode(&mut self, target: usize, force: bool) {
        if self.ctx.disabled || target == self.modes.active_index() {
            return;
        }
        let auto = self.modes.auto_index();
        if self.modes.active_index() == auto {
            self.mode_from_auto(target);
        } else if target != auto || force {
            self.mode_to_auto(true);
            self.mode_from_auto(target);
        } else {
            self.mode_to_auto(false);
        }
    }

    fn mode_from_auto(&mut self, target: usize) {
        let Some(state) = self.modes.get_mut(target) else {
            return;
        };
        if state.set_from_auto(&mut self.ctx) {
            let mode = state.id().to_string();
            self.modes.set_active_index(target);
            tracing::debug!(%mode, "annotation mode changed");
            self.ctx.events.emit(EngineEvent::ModeChanged { mode });
        }
    }

    fn mode_to_auto(&mut self, temporary: bool) {
        self.ctx.fired_by_key = false;
        if self.modes.active_mut().set_to_auto(&mut self.ctx, temporary) {
            let auto = self.modes.auto_index();
            self.modes.set_active_index(auto);
            let mode = self.modes.active_id().to_string();
            tracing::debug!(%mode, "annotation mode changed");
            self.ctx.events.emit(EngineEvent::ModeChanged { mode });
        }
    }

    // Input

    fn pointer_input(&self, event: &PointerEvent) -> PointerInput {
        let is_left = event.is_left();
        PointerInput {
            point: self.ctx.viewport.window_to_image(event.position),
            screen: event.position,
            is_left,
            factory: self.ctx.button_factory(is_left),
            timestamp_ms: event.timestamp_ms,
        }
    }

    pub fn pointer_down(&mut self, event: PointerEvent) {
        if self.ctx.cursor.is_down() || self.ctx.disabled {
            return;
        }
        self.ctx.cursor.down(event.timestamp_ms);
        if event.is_left() && self.ctx.presets.active(true).is_none() {
            let first = self.ctx.presets.first().map(|preset| preset.id.clone());
            if let Some(first) = first {
                self.ctx.presets.select(Some(&first), true, Some(self.ctx.cache.as_mut()), &mut self.ctx.events);
            }
        }
        let input = self.pointer_input(&event);
        self.modes.active_mut().handle_click_down(&mut self.ctx, &input);
    }

    pub fn pointer_move(&mut self, event: PointerEvent) {
        if self.ctx.disabled {
            return;
        }
        let point = self.ctx.viewport.window_to_image(event.position);
        if self.ctx.cursor.is_down() {
            self.modes.active_mut().handle_mouse_move(&mut self.ctx, point);
        } else {
            self.modes.active_mut().handle_mouse_hover(&mut self.ctx, point);
        }
    }

    pub fn pointer_up(&mut self, event: PointerEvent) {
        if self.ctx.disabled {
            return;
        }
        let input = self.pointer_input(&event);
        if !self.ctx.cursor.is_down() {
            if let context::Press::Aborted(at) = self.ctx.cursor.press() {
                self.emit_release(input.is_left, input.point, Some(at));
            }
            self.ctx.cursor.reset();
            return;
        }
        if !self.modes.active_mut().handle_click_up(&mut self.ctx, &input) {
            let pressed_at = self.ctx.cursor.pressed_at();
            self.emit_release(input.is_left, input.point, pressed_at);
        }
        self.ctx.cursor.release();
    }

    fn emit_release(&mut self, is_left: bool, point: ImagePoint, pressed_at: Option<u64>) {
        let event = if is_left {
            EngineEvent::CanvasRelease { point, pressed_at }
        } else {
            EngineEvent::NonprimaryReleaseNotHandled { point, pressed_at }
        };
        self.ctx.events.emit(event);
    }

    /// Wheel goes to the mode's scroll while the viewer is not zooming
    pub fn wheel(&mut self, event: WheelEvent) {
        if self.ctx.disabled {
            return;
        }
        if self.modes.is_auto() || self.ctx.fired_by_key || event.shift {
            self.modes.active_mut().scroll(&mut self.ctx, event.delta_y);
        } else {
            self.modes.active_mut().scroll_zooming(&mut self.ctx, event.delta_y);
        }
    }

    pub fn key_down(&mut self, key: &KeyEvent) {
        if self.ctx.cursor.is_down() || self.ctx.disabled || !key.focus_canvas {
            return;
        }
        if let Some(target) = self.modes.accepting(key) {
            if target != self.modes.active_index() {
                self.ctx.fired_by_key = true;
                self.switch_mode(target, false);
            }
        }
    }

    pub fn key_up(&mut self, key: &KeyEvent) {
        if self.ctx.disabled || !key.focus_canvas {
            return;
        }
        if !key.ctrl && !key.alt {
            match key.code {
                KeyCode::Delete => {
                    self.remove_active_object();
                    return;
                }
                KeyCode::Escape => {
                    self.finish_edit();
                    self.set_mode(Mode::Auto);
                    return;
                }
                _ => {}
            }
        }
        if key.ctrl && !key.alt && key.is_letter('Z') {
            if key.shift {
                self.redo();
            } else {
                self.undo();
            }
            return;
        }
        if self.modes.active().rejects(key) {
            self.set_mode(Mode::Auto);
        }
    }

    /// Host window regained focus; a key-held mode lost its key release
    pub fn on_window_focus(&mut self) {
        if self.ctx.fired_by_key {
            self.set_mode(Mode::Auto);
        }
    }

    // Selection

    /// Select an object unless the active mode refuses
    pub fn select_object(&mut self, handle: CanvasHandle) -> bool {
        if !self.ctx.canvas.contains(handle) {
            return false;
        }
        if !self.modes.active_mut().object_selected(&mut self.ctx, handle) {
            self.ctx.select(None);
            return false;
        }
        self.ctx.select(Some(handle));
        true
    }

    pub fn deselect_object(&mut self) -> bool {
        let Some(active) = self.ctx.canvas.active() else {
            return false;
        };
        if !self.modes.active_mut().object_deselected(&mut self.ctx, active) {
            return false;
        }
        self.ctx.select(None);
        true
    }

    // History

    pub fn can_undo(&self) -> bool {
        self.ctx.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.ctx.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        match self.ctx.history.back() {
            Some(step) => {
                self.ctx.apply_history_step(step);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.ctx.history.redo() {
            Some(step) => {
                self.ctx.apply_history_step(step);
                true
            }
            None => false,
        }
    }

    // Interaction toggles

    pub fn is_interaction_enabled(&self) -> bool {
        !self.ctx.disabled
    }

    /// Disabling first returns to AUTO so navigation is never left off
    pub fn enable_interaction(&mut self, enabled: bool) {
        if !enabled {
            self.set_mode(Mode::Auto);
        }
        self.ctx.disabled = !enabled;
        self.ctx.events.emit(EngineEvent::Enabled { enabled });
    }

    /// Show and unlock, or hide and lock, every object
    pub fn enable_annotations(&mut self, enabled: bool) {
        if !enabled {
            self.cached_selection = self.ctx.canvas.active();
            self.ctx.history.highlight(None);
            self.ctx.select(None);
        }
        self.enable_interaction(enabled);
        for object in self.ctx.canvas.objects_mut() {
            object.visible = enabled;
            object.locked = !enabled;
        }
        if enabled {
            if let Some(handle) = self.cached_selection.take() {
                self.ctx.select(Some(handle));
            }
        }
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        let opacity = opacity.clamp(0.0, 1.0);
        self.opacity = opacity;
        for object in self.ctx.canvas.objects_mut() {
            object.style.opacity = opacity;
        }
        self.ctx.events.emit(EngineEvent::OpacityChanged { opacity });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::WarningCode;
    use crate::factory::FactoryRegistry;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn engine() -> AnnotationEngine {
        AnnotationEngine::builder().build().expect("default engine")
    }

    fn recorded(engine: &mut AnnotationEngine) -> Rc<RefCell<Vec<EngineEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        engine.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    #[test]
    fn test_build_requires_polygon_factory() {
        let err = AnnotationEngine::builder().with_factories(FactoryRegistry::new()).build().expect_err("no polygon");
        assert!(matches!(err, EngineError::MissingPolygonFactory));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = AnnotationEngine::builder()
            .with_config(EngineConfig::default().with_history_size(0))
            .build()
            .expect_err("invalid config");
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_build_creates_active_layer() {
        let engine = engine();
        assert_eq!(engine.layers().len(), 1);
        assert!(engine.layers().active().is_some());
    }

    #[test]
    fn test_set_mode_routes_through_auto() {
        let mut engine = engine();
        let events = recorded(&mut engine);

        engine.set_mode(Mode::FreeFormAdd);
        assert_eq!(engine.mode(), "fft-add");
        assert!(!engine.viewport().navigation_enabled());

        // brush modes decline the temporary exit, so no AUTO in between
        engine.set_mode(Mode::Custom);
        assert_eq!(engine.mode(), "custom");

        engine.set_mode(Mode::Auto);
        assert_eq!(engine.mode(), "auto");
        assert!(engine.viewport().navigation_enabled());

        let modes: Vec<String> = events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                EngineEvent::ModeChanged { mode } => Some(mode.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(modes, vec!["fft-add", "custom", "auto"]);
    }

    #[test]
    fn test_set_mode_same_mode_is_noop() {
        let mut engine = engine();
        let events = recorded(&mut engine);
        engine.set_mode(Mode::Auto);
        assert!(events.borrow().is_empty());
        assert!(engine.set_mode_by_id("missing", false).is_err());
    }

    #[test]
    fn test_hotkey_holds_mode_until_release() {
        let mut engine = engine();
        engine.key_down(&KeyEvent::letter('E'));
        assert_eq!(engine.mode(), "fft-add");
        assert!(engine.context().fired_by_key());

        engine.key_up(&KeyEvent::letter('E'));
        assert_eq!(engine.mode(), "auto");
        assert!(!engine.context().fired_by_key());

        engine.key_down(&KeyEvent::letter('R').unfocused());
        assert_eq!(engine.mode(), "auto");
    }

    #[test]
    fn test_disabled_engine_ignores_modes() {
        let mut engine = engine();
        engine.enable_interaction(false);
        engine.set_mode(Mode::Custom);
        assert_eq!(engine.mode(), "auto");
        engine.enable_interaction(true);
        engine.set_mode(Mode::Custom);
        assert_eq!(engine.mode(), "custom");
    }

    #[test]
    fn test_right_click_warning_only_when_fired_by_key() {
        let mut engine = engine();
        let events = recorded(&mut engine);
        engine.set_mode(Mode::FreeFormAdd);

        engine.pointer_down(PointerEvent::secondary(10.0, 10.0, 0));
        engine.pointer_up(PointerEvent::secondary(10.0, 10.0, 50));
        let warnings = |events: &[EngineEvent]| {
            events.iter().filter(|event| matches!(event, EngineEvent::Warning(w) if w.code == WarningCode::NoPreset)).count()
        };
        assert_eq!(warnings(&events.borrow()), 0);
        assert!(events
            .borrow()
            .iter()
            .any(|event| matches!(event, EngineEvent::NonprimaryReleaseNotHandled { pressed_at: Some(0), .. })));

        engine.set_mode(Mode::Auto);
        engine.key_down(&KeyEvent::letter('E'));
        engine.pointer_down(PointerEvent::secondary(10.0, 10.0, 100));
        engine.pointer_up(PointerEvent::secondary(10.0, 10.0, 150));
        assert_eq!(warnings(&events.borrow()), 1);
    }

    #[test]
    fn test_opacity_is_clamped() {
        let mut engine = engine();
        let events = recorded(&mut engine);
        engine.set_opacity(1.5);
        assert_eq!(engine.opacity(), 1.0);
        assert!(matches!(events.borrow().last(), Some(EngineEvent::OpacityChanged { opacity }) if *opacity == 1.0));
    }
}
