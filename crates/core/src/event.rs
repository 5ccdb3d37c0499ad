//! Typed notifications emitted by the engine
//!
//! Presentation code subscribes to an [`EventBus`] either with a callback or
//! through an `mpsc` channel. Handlers only ever see `&EngineEvent`; they hold
//! no engine reference and so cannot mutate the object collection while the
//! engine is emitting.

use crate::annotation::{AnnotationObject, ImagePoint};
use crate::layer::Layer;
use crate::preset::Preset;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

/// User-facing warning kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningCode {
    NoPreset,
    FreeFormUnsupported,
    CacheIoOmitted,
    CookiesDisabled,
    PresetInUse,
    StoreFailure,
}

impl WarningCode {
    /// Stable code the presentation layer maps to a message
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::NoPreset => "W_NO_PRESET",
            WarningCode::FreeFormUnsupported => "W_FREE_FORM_UNSUPPORTED",
            WarningCode::CacheIoOmitted => "W_CACHE_IO_OMMITED",
            WarningCode::CookiesDisabled => "W_COOKIES_DISABLED",
            WarningCode::PresetInUse => "W_PRESET_IN_USE",
            WarningCode::StoreFailure => "W_STORE_FAILURE",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured warning with the context needed to render an actionable message
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    pub is_left_click: Option<bool>,
    pub fired_by_key: bool,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), is_left_click: None, fired_by_key: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    AnnotationCreate { object: AnnotationObject },
    AnnotationDelete { object: AnnotationObject },
    AnnotationReplace { previous: AnnotationObject, next: AnnotationObject },
    AnnotationReplaceHelper { previous: AnnotationObject, next: AnnotationObject },
    AnnotationEdit { object: AnnotationObject },
    AnnotationPreset { object: AnnotationObject, previous_preset: Option<String> },
    ModeChanged { mode: String },
    Enabled { enabled: bool },
    OpacityChanged { opacity: f64 },
    PresetCreate { preset: Preset },
    PresetDelete { preset: Preset },
    PresetUpdate { preset: Preset },
    PresetSelect { preset: Option<Preset>, is_left: bool },
    PresetMetaAdd { preset_id: String, key: String },
    PresetMetaRemove { preset_id: String, key: String },
    LayerAdded { layer: Layer },
    LayerRemoved { layer: Layer },
    FreeFormToolModeAdd { is_add: bool },
    FreeFormToolRadius { radius: f64 },
    Import { imported: bool, format: Option<String> },
    Export { format: String },
    ExportPartial { format: String },
    CanvasRelease { point: ImagePoint, pressed_at: Option<u64> },
    NonprimaryReleaseNotHandled { point: ImagePoint, pressed_at: Option<u64> },
    FactoryRegistered { factory_id: String },
    HistoryChange { can_undo: bool, can_redo: bool },
    Warning(Warning),
    Notice { message: String },
}

impl EngineEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::AnnotationCreate { .. } => "annotation-create",
            EngineEvent::AnnotationDelete { .. } => "annotation-delete",
            EngineEvent::AnnotationReplace { .. } => "annotation-replace",
            EngineEvent::AnnotationReplaceHelper { .. } => "annotation-replace-helper",
            EngineEvent::AnnotationEdit { .. } => "annotation-edit",
            EngineEvent::AnnotationPreset { .. } => "annotation-preset",
            EngineEvent::ModeChanged { .. } => "mode-changed",
            EngineEvent::Enabled { .. } => "enabled",
            EngineEvent::OpacityChanged { .. } => "opacity-changed",
            EngineEvent::PresetCreate { .. } => "preset-create",
            EngineEvent::PresetDelete { .. } => "preset-delete",
            EngineEvent::PresetUpdate { .. } => "preset-update",
            EngineEvent::PresetSelect { .. } => "preset-select",
            EngineEvent::PresetMetaAdd { .. } => "preset-meta-add",
            EngineEvent::PresetMetaRemove { .. } => "preset-meta-remove",
            EngineEvent::LayerAdded { .. } => "layer-added",
            EngineEvent::LayerRemoved { .. } => "layer-removed",
            EngineEvent::FreeFormToolModeAdd { .. } => "free-form-tool-mode-add",
            EngineEvent::FreeFormToolRadius { .. } => "free-form-tool-radius",
            EngineEvent::Import { .. } => "import",
            EngineEvent::Export { .. } => "export",
            EngineEvent::ExportPartial { .. } => "export-partial",
            EngineEvent::CanvasRelease { .. } => "canvas-release",
            EngineEvent::NonprimaryReleaseNotHandled { .. } => "nonprimary-release-not-handled",
            EngineEvent::FactoryRegistered { .. } => "factory-registered",
            EngineEvent::HistoryChange { .. } => "history-change",
            EngineEvent::Warning(_) => "warn-user",
            EngineEvent::Notice { .. } => "notice",
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&EngineEvent)>;

/// Single-threaded publish/subscribe hub
#[derive(Default)]
pub struct EventBus {
    handlers: Vec<(SubscriptionId, Handler)>,
    channels: Vec<Sender<EngineEvent>>,
    next_id: u64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&EngineEvent) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Returns false when the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    /// Receive every subsequent event over a channel
    pub fn channel(&mut self) -> Receiver<EngineEvent> {
        let (sender, receiver) = mpsc::channel();
        self.channels.push(sender);
        receiver
    }

    pub fn emit(&mut self, event: EngineEvent) {
        tracing::trace!(event = event.name(), "emitting engine event");
        for (_, handler) in &mut self.handlers {
            handler(&event);
        }
        // Dropped receivers are pruned on the next send
        self.channels.retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(code = %warning.code, message = %warning.message, "user warning");
        self.emit(EngineEvent::Warning(warning));
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        self.emit(EngineEvent::Notice { message: message.into() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_subscribers_receive_events_in_order() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(move |event| sink.borrow_mut().push(event.name()));

        bus.emit(EngineEvent::Enabled { enabled: false });
        bus.emit(EngineEvent::OpacityChanged { opacity: 0.5 });
        assert_eq!(*seen.borrow(), vec!["enabled", "opacity-changed"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let id = bus.subscribe(move |_| *sink.borrow_mut() += 1);

        bus.notice("first");
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.notice("second");
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_channel_delivery_and_pruning() {
        let mut bus = EventBus::new();
        let receiver = bus.channel();
        bus.warn(Warning::new(WarningCode::NoPreset, "select a preset"));

        match receiver.try_recv().expect("event delivered") {
            EngineEvent::Warning(warning) => assert_eq!(warning.code.as_str(), "W_NO_PRESET"),
            other => panic!("unexpected event {other:?}"),
        }
        drop(receiver);
        bus.notice("nobody listens");
        assert_eq!(bus.channels.len(), 0);
    }
}
