//! Annotation object factories
//!
//! Every annotation kind is produced and edited by an implementation of
//! [`AnnotationObjectFactory`]. Factories are stateless strategies: the engine
//! owns all canvas state and applies the objects factories return, so a
//! factory never needs a handle back into the engine.
//!
//! The [`FactoryRegistry`] maps factory ids to implementations. A `polygon`
//! factory is mandatory because the free-form tool produces polygons.

mod group;
mod image;
mod line;
mod polygon;
mod rect;
mod ruler;
mod text;

pub use group::GroupFactory;
pub use image::ImageFactory;
pub use line::{LineFactory, PointFactory};
pub use polygon::{PolygonFactory, PolylineFactory};
pub use rect::{EllipseFactory, RectFactory};
pub use ruler::{format_length, RulerFactory};
pub use text::TextFactory;

use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint, Lifecycle};
use crate::error::{EngineError, EngineResult};
use crate::geometry::Aabb;
use serde_json::{Map, Value};
use std::fmt;
use std::rc::Rc;

/// Id of the factory the engine requires
pub const POLYGON_FACTORY_ID: &str = "polygon";

/// Properties every exported object keeps regardless of its factory
pub const NECESSARY_PROPERTIES: [&str; 9] = [
    "factoryID",
    "type",
    "presetID",
    "layerID",
    "sessionID",
    "author",
    "created",
    "meta",
    "zoomAtCreation",
];

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("factory '{factory}' rejected parameters: {reason}")]
    InvalidParameters { factory: String, reason: String },

    #[error("factory '{factory}' cannot handle '{found}' geometry")]
    UnsupportedGeometry { factory: String, found: String },

    #[error("no object factory registered for '{0}'")]
    UnknownFactory(String),
}

pub type FactoryResult<T> = Result<T, FactoryError>;

/// Shape parameters accepted by [`AnnotationObjectFactory::create`]
#[derive(Debug, Clone, PartialEq)]
pub enum CreateParams {
    Points(Vec<ImagePoint>),
    /// Flat numeric parameters, e.g. `[x1, y1, x2, y2]` for a rectangle
    Coords(Vec<f64>),
    Text { position: ImagePoint, text: String },
    Image { bounds: Aabb, src: Option<String> },
    Children(Vec<AnnotationObject>),
}

/// Visual and ownership options resolved from a preset
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectOptions {
    pub preset_id: Option<String>,
    pub layer_id: Option<String>,
    pub color: String,
    /// `None` draws the outline only
    pub fill: Option<String>,
    pub opacity: f64,
    pub stroke_width: f64,
    pub original_stroke_width: f64,
    pub zoom_at_creation: Option<f64>,
    pub selectable: bool,
    pub is_left_click: bool,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        Self {
            preset_id: None,
            layer_id: None,
            color: "#000000".to_string(),
            fill: None,
            opacity: 1.0,
            stroke_width: 3.0,
            original_stroke_width: 3.0,
            zoom_at_creation: None,
            selectable: true,
            is_left_click: true,
        }
    }
}

impl ObjectOptions {
    /// Write the options onto an object, keeping references the options leave unset
    pub fn apply_to(&self, object: &mut AnnotationObject) {
        if self.preset_id.is_some() {
            object.preset_id = self.preset_id.clone();
        }
        if self.layer_id.is_some() {
            object.layer_id = self.layer_id.clone();
        }
        if self.zoom_at_creation.is_some() {
            object.zoom_at_creation = self.zoom_at_creation;
        }
        object.style.color = self.color.clone();
        object.style.stroke = self.color.clone();
        object.style.fill = self.fill.clone();
        object.style.opacity = self.opacity;
        object.style.stroke_width = self.stroke_width;
        object.style.original_stroke_width = self.original_stroke_width;
        object.selectable = self.selectable;
    }
}

/// Strategy creating and editing one kind of annotation
pub trait AnnotationObjectFactory {
    /// Registry key, also stored as `factoryID` on every object
    fn factory_id(&self) -> &'static str;

    /// Geometry `type` tag this factory produces
    fn geometry_type(&self) -> &'static str;

    fn title(&self) -> &'static str;

    fn icon(&self) -> &'static str {
        ""
    }

    /// Human readable summary of an object
    fn description(&self, object: &AnnotationObject) -> String {
        let _ = object;
        self.title().to_string()
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject>;

    /// Copy without identity, optionally replacing the shape parameters
    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject>;

    /// Apply preset-derived options to an existing object
    fn configure(&self, object: &mut AnnotationObject, options: &ObjectOptions) {
        options.apply_to(object);
        object.factory_id = self.factory_id().to_string();
    }

    /// Prepare an object for direct manipulation
    fn edit(&self, object: &mut AnnotationObject) {
        object.locked = false;
    }

    /// Normalize an object after direct manipulation; `None` means unchanged
    fn recalculate(&self, object: &AnnotationObject) -> Option<AnnotationObject> {
        let _ = object;
        None
    }

    /// Start drag-to-create; the returned helper is shown as a draft
    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject;

    fn update_create(&self, helper: &mut AnnotationObject, origin: ImagePoint, point: ImagePoint);

    /// Turn the helper into the final object, `None` when the gesture produced nothing usable
    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject>;

    /// Drags shorter than this discard the helper
    fn creation_required_drag_ms(&self) -> u64 {
        100
    }

    /// Polygonal approximation, `None` when the kind has no area
    fn to_point_array(&self, object: &AnnotationObject, quality: f64) -> Option<Vec<ImagePoint>>;

    /// Whether the free-form tool may modify objects of this kind
    fn is_editable(&self) -> bool {
        true
    }

    /// Whether the geometry is parametric rather than an explicit vertex list
    fn is_implicit(&self) -> bool {
        true
    }

    /// Extra properties kept on export
    fn exports(&self) -> &'static [&'static str] {
        &[]
    }

    /// Serialized geometry properties
    fn geometry_fields(&self) -> &'static [&'static str];

    /// Keep strokes at a constant on-screen width
    fn on_zoom(&self, object: &mut AnnotationObject, zoom: f64) {
        if zoom > 0.0 {
            object.style.stroke_width = object.style.original_stroke_width / zoom;
        }
    }

    fn update_rendering(&self, object: &mut AnnotationObject, outline: bool, color: &str) {
        object.style.color = color.to_string();
        object.style.stroke = color.to_string();
        object.style.fill = (!outline).then(|| color.to_string());
    }

    /// Strip transient properties from a serialized object
    fn copy_necessary_properties(&self, exported: &Map<String, Value>, keeps: &[&str]) -> Map<String, Value> {
        exported
            .iter()
            .filter(|(key, _)| {
                let key = key.as_str();
                NECESSARY_PROPERTIES.contains(&key)
                    || self.geometry_fields().contains(&key)
                    || self.exports().contains(&key)
                    || keeps.contains(&key)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Settings the built-in factories are created with
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinFactorySettings {
    pub microns_per_pixel: Option<f64>,
    pub simplify_tolerance: f64,
}

impl Default for BuiltinFactorySettings {
    fn default() -> Self {
        Self { microns_per_pixel: None, simplify_tolerance: 1.0 }
    }
}

/// Factories keyed by id, in registration order
#[derive(Default, Clone)]
pub struct FactoryRegistry {
    factories: Vec<Rc<dyn AnnotationObjectFactory>>,
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry").field("factories", &self.ids()).finish()
    }
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in annotation kind
    pub fn with_builtin(settings: &BuiltinFactorySettings) -> Self {
        let factories: Vec<Rc<dyn AnnotationObjectFactory>> = vec![
            Rc::new(PolygonFactory::new().with_simplify_tolerance(settings.simplify_tolerance)),
            Rc::new(PolylineFactory::new()),
            Rc::new(RectFactory),
            Rc::new(EllipseFactory),
            Rc::new(LineFactory),
            Rc::new(PointFactory::default()),
            Rc::new(TextFactory::default()),
            Rc::new(RulerFactory::new(settings.microns_per_pixel)),
            Rc::new(GroupFactory),
            Rc::new(ImageFactory),
        ];
        Self { factories }
    }

    /// Add a factory; ids must be unique and non-empty
    pub fn register(&mut self, factory: Rc<dyn AnnotationObjectFactory>) -> EngineResult<()> {
        let id = factory.factory_id();
        if id.trim().is_empty() {
            return Err(EngineError::InvalidFactory { id: id.to_string(), reason: "empty factory id".into() });
        }
        if factory.geometry_type().trim().is_empty() {
            return Err(EngineError::InvalidFactory {
                id: id.to_string(),
                reason: "empty geometry type".into(),
            });
        }
        if self.get(id).is_some() {
            return Err(EngineError::DuplicateFactory(id.to_string()));
        }
        tracing::debug!(factory = id, "registered annotation object factory");
        self.factories.push(factory);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Rc<dyn AnnotationObjectFactory>> {
        self.factories.iter().find(|factory| factory.factory_id() == id).cloned()
    }

    /// First factory producing the given geometry type
    pub fn by_geometry_type(&self, geometry_type: &str) -> Option<Rc<dyn AnnotationObjectFactory>> {
        self.factories.iter().find(|factory| factory.geometry_type() == geometry_type).cloned()
    }

    /// Factory of an object, falling back on its geometry type
    pub fn resolve(&self, object: &AnnotationObject) -> Option<Rc<dyn AnnotationObjectFactory>> {
        self.get(&object.factory_id).or_else(|| self.by_geometry_type(object.type_name()))
    }

    pub fn polygon(&self) -> Option<Rc<dyn AnnotationObjectFactory>> {
        self.get(POLYGON_FACTORY_ID)
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.factories.iter().map(|factory| factory.factory_id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn AnnotationObjectFactory>> {
        self.factories.iter()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Union of the necessary properties and every factory's exports
    pub fn exported_properties(&self) -> Vec<&'static str> {
        let mut properties: Vec<&'static str> = NECESSARY_PROPERTIES.to_vec();
        for factory in &self.factories {
            properties.extend_from_slice(factory.exports());
        }
        properties.sort_unstable();
        properties.dedup();
        properties
    }

    /// Trim a serialized object (and group children) for export
    pub fn trim_export(&self, value: Value, keeps: &[&str]) -> Value {
        let Value::Object(map) = value else {
            return value;
        };
        let factory = map
            .get("factoryID")
            .and_then(Value::as_str)
            .and_then(|id| self.get(id))
            .or_else(|| map.get("type").and_then(Value::as_str).and_then(|t| self.by_geometry_type(t)));

        let mut trimmed = match factory {
            Some(factory) => factory.copy_necessary_properties(&map, keeps),
            None => map,
        };
        if let Some(Value::Array(children)) = trimmed.remove("objects") {
            let children = children.into_iter().map(|child| self.trim_export(child, keeps)).collect();
            trimmed.insert("objects".to_string(), Value::Array(children));
        }
        Value::Object(trimmed)
    }
}

/// New draft object styled by `options`
pub(crate) fn styled(factory_id: &str, geometry: AnnotationGeometry, options: &ObjectOptions) -> AnnotationObject {
    let mut object = AnnotationObject::new(factory_id, geometry);
    options.apply_to(&mut object);
    object
}

/// Identity-free copy of `object` with new geometry
pub(crate) fn copy_with(object: &AnnotationObject, factory_id: &str, geometry: AnnotationGeometry) -> AnnotationObject {
    let mut copy = object.with_geometry(geometry);
    copy.factory_id = factory_id.to_string();
    copy.set_lifecycle(Lifecycle::Draft);
    copy
}

/// Numeric parameters of a fixed arity, accepted as coordinates or points
pub(crate) fn expect_coords(factory: &str, params: &CreateParams, count: usize) -> FactoryResult<Vec<f64>> {
    let values: Vec<f64> = match params {
        CreateParams::Coords(values) => values.clone(),
        CreateParams::Points(points) => points.iter().flat_map(|p| [p.x, p.y]).collect(),
        other => {
            return Err(FactoryError::InvalidParameters {
                factory: factory.to_string(),
                reason: format!("expected {count} coordinates, got {other:?}"),
            })
        }
    };
    if values.len() != count || values.iter().any(|value| !value.is_finite()) {
        return Err(FactoryError::InvalidParameters {
            factory: factory.to_string(),
            reason: format!("expected {count} finite coordinates, got {}", values.len()),
        });
    }
    Ok(values)
}

pub(crate) fn unsupported(factory: &str, object: &AnnotationObject) -> FactoryError {
    FactoryError::UnsupportedGeometry { factory: factory.to_string(), found: object.type_name().to_string() }
}
