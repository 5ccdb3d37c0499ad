//! Whole-slide image annotation core
//!
//! Editing engine for annotations drawn over deep-zoom slides: object
//! factories, presets, layers, undo history, a free-form brush and
//! import/export formats. Rendering and the viewer itself stay with the host,
//! which talks to the engine through [`Viewport`], [`KeyValueCache`] and
//! [`AnnotationStore`].

pub mod annotation;
pub mod cache;
pub mod canvas;
pub mod clip;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod event;
pub mod factory;
pub mod free_form;
pub mod geometry;
pub mod history;
pub mod input;
pub mod layer;
pub mod preset;
pub mod state;
pub mod store;
pub mod viewport;

pub use annotation::{
    AnnotationGeometry, AnnotationObject, Color, ImagePoint, Lifecycle, ObjectId, ObjectStyle, ScreenPoint,
};
pub use cache::{KeyValueCache, MemoryCache};
pub use canvas::{Canvas, CanvasHandle};
pub use clip::{ClipError, Contour, GeoClipper, PolygonClipper};
pub use config::{ConfigError, EngineConfig};
pub use convert::{
    ConvertError, Convertor, ConvertorRegistry, DecodedAnnotations, ExportSource, PartialExport, NATIVE_FORMAT,
};
pub use engine::{
    AnnotationEngine, EngineBuilder, EngineContext, ExportOptions, ImportOptions, PersistError, PresetSelection,
    UnsavedSnapshot,
};
pub use error::{EngineError, EngineResult};
pub use event::{EngineEvent, EventBus, SubscriptionId, Warning, WarningCode};
pub use factory::{
    AnnotationObjectFactory, BuiltinFactorySettings, CreateParams, FactoryError, FactoryRegistry, ObjectOptions,
    POLYGON_FACTORY_ID,
};
pub use free_form::FreeFormTool;
pub use geometry::Aabb;
pub use history::History;
pub use input::{KeyCode, KeyEvent, PointerButton, PointerEvent, WheelEvent};
pub use layer::{Layer, LayerRegistry};
pub use preset::{MetaEntry, Preset, PresetError, PresetManager, PresetUpdate, DEFAULT_PRESET_ID};
pub use state::{AnnotationState, Mode, ModeTable};
pub use store::{AnnotationStore, MemoryAnnotationStore, StoreError, StoredAnnotation};
pub use viewport::{StaticViewport, Viewport};
