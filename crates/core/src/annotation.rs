//! Annotation object data model
//!
//! Objects live in image pixel space (level-0 coordinates of the slide).
//! Geometry is tagged by `type` in serialized form, next to the identity
//! fields (`factoryID`, `presetID`, `layerID`, `sessionID`, ...) that every
//! object carries regardless of its kind.

use crate::geometry::{self, Aabb};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identity of a committed annotation
///
/// Assigned by the history manager, monotonically increasing and never
/// reused within one engine instance.
pub type ObjectId = u64;

/// Point in image (level-0 pixel) space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    /// Create a new image point
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &ImagePoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Point in window (screen pixel) space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Opaque RGB color, serialized as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0 };
    pub const GREEN: Color = Color { r: 0, g: 255, b: 0 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from HSV components, each in `0.0..=1.0`
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let sector = (h * 6.0).floor();
        let f = h * 6.0 - sector;
        let p = v * (1.0 - s);
        let q = v * (1.0 - f * s);
        let t = v * (1.0 - (1.0 - f) * s);
        let (r, g, b) = match (sector as i64).rem_euclid(6) {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        let channel = |value: f64| (value.clamp(0.0, 1.0) * 255.0).floor() as u8;
        Self::rgb(channel(r), channel(g), channel(b))
    }

    /// Parse `#rrggbb` or `#rgb`
    pub fn from_hex(value: &str) -> Option<Self> {
        let hex = value.trim().strip_prefix('#')?;
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let parse = |range: std::ops::Range<usize>| u8::from_str_radix(&expanded[range], 16).ok();
        Some(Self::rgb(parse(0..2)?, parse(2..4)?, parse(4..6)?))
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Lifecycle tag of a canvas object
///
/// Drafts are transient helpers shown while a shape is being drawn; they have
/// no identity and never reach exports or history. Committed objects carry
/// the identity assigned when they were promoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Draft,
    Committed(ObjectId),
}

/// Endpoints of a straight segment
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Segment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Segment {
    pub fn new(start: ImagePoint, end: ImagePoint) -> Self {
        Self { x1: start.x, y1: start.y, x2: end.x, y2: end.y }
    }

    pub fn start(&self) -> ImagePoint {
        ImagePoint::new(self.x1, self.y1)
    }

    pub fn end(&self) -> ImagePoint {
        ImagePoint::new(self.x2, self.y2)
    }

    pub fn length(&self) -> f64 {
        self.start().distance_to(&self.end())
    }
}

/// Text label attached to a ruler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulerLabel {
    pub left: f64,
    pub top: f64,
    pub text: String,
    #[serde(rename = "scaleX", default = "unit_scale")]
    pub scale: f64,
}

/// Kind-specific geometry of an annotation
///
/// Serialized with an internal `type` tag, e.g.
/// `{"type": "rect", "left": 10, "top": 10, "width": 40, "height": 40}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationGeometry {
    /// Closed polygon
    Polygon { points: Vec<ImagePoint> },

    /// Open polyline
    Polyline { points: Vec<ImagePoint> },

    /// Axis-aligned rectangle
    Rect { left: f64, top: f64, width: f64, height: f64 },

    /// Ellipse; `left`/`top` is the corner of its bounding box
    Ellipse { left: f64, top: f64, rx: f64, ry: f64 },

    /// Straight line
    Line { x1: f64, y1: f64, x2: f64, y2: f64 },

    /// Marker centred on `x`/`y`
    Point { x: f64, y: f64, radius: f64 },

    /// Free text anchored at its top-left corner
    Text {
        left: f64,
        top: f64,
        text: String,
        #[serde(rename = "fontSize", default = "default_font_size")]
        font_size: f64,
    },

    /// Measuring line with a label showing its physical length
    Ruler {
        line: Segment,
        label: RulerLabel,
        #[serde(default)]
        measure: String,
    },

    /// Composite of child objects
    Group { objects: Vec<AnnotationObject> },

    /// Raster overlay
    Image {
        left: f64,
        top: f64,
        width: f64,
        height: f64,
        #[serde(rename = "scaleX", default = "unit_scale")]
        scale_x: f64,
        #[serde(rename = "scaleY", default = "unit_scale")]
        scale_y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src: Option<String>,
    },
}

impl AnnotationGeometry {
    /// Value of the serialized `type` tag
    pub fn type_name(&self) -> &'static str {
        match self {
            AnnotationGeometry::Polygon { .. } => "polygon",
            AnnotationGeometry::Polyline { .. } => "polyline",
            AnnotationGeometry::Rect { .. } => "rect",
            AnnotationGeometry::Ellipse { .. } => "ellipse",
            AnnotationGeometry::Line { .. } => "line",
            AnnotationGeometry::Point { .. } => "point",
            AnnotationGeometry::Text { .. } => "text",
            AnnotationGeometry::Ruler { .. } => "ruler",
            AnnotationGeometry::Group { .. } => "group",
            AnnotationGeometry::Image { .. } => "image",
        }
    }

    /// Vertex list of vertex-based geometry
    pub fn points(&self) -> Option<&[ImagePoint]> {
        match self {
            AnnotationGeometry::Polygon { points } | AnnotationGeometry::Polyline { points } => {
                Some(points)
            }
            _ => None,
        }
    }

    /// Axis-aligned bounding box in image space
    pub fn bounding_box(&self) -> Aabb {
        match self {
            AnnotationGeometry::Polygon { points } | AnnotationGeometry::Polyline { points } => {
                Aabb::from_points(points)
            }
            AnnotationGeometry::Rect { left, top, width, height } => {
                Aabb::new(*left, *top, *width, *height)
            }
            AnnotationGeometry::Ellipse { left, top, rx, ry } => {
                Aabb::new(*left, *top, rx * 2.0, ry * 2.0)
            }
            AnnotationGeometry::Line { x1, y1, x2, y2 } => {
                Aabb::from_points(&[ImagePoint::new(*x1, *y1), ImagePoint::new(*x2, *y2)])
            }
            AnnotationGeometry::Point { x, y, radius } => {
                Aabb::around(ImagePoint::new(*x, *y), *radius)
            }
            AnnotationGeometry::Text { left, top, text, font_size } => {
                let width = text.chars().count() as f64 * font_size * 0.6;
                Aabb::new(*left, *top, width, *font_size)
            }
            AnnotationGeometry::Ruler { line, label, .. } => {
                Aabb::from_points(&[line.start(), line.end(), ImagePoint::new(label.left, label.top)])
            }
            AnnotationGeometry::Group { objects } => objects
                .iter()
                .map(AnnotationObject::bounding_box)
                .reduce(|acc, next| acc.union(&next))
                .unwrap_or_default(),
            AnnotationGeometry::Image { left, top, width, height, scale_x, scale_y, .. } => {
                Aabb::new(*left, *top, width * scale_x, height * scale_y)
            }
        }
    }

    /// Check whether a point lies on the shape, within `tolerance` pixels
    pub fn contains_point(&self, point: &ImagePoint, tolerance: f64) -> bool {
        match self {
            AnnotationGeometry::Polygon { points } => {
                geometry::point_in_polygon(point, points)
                    || geometry::point_near_ring(point, points, tolerance, true)
            }
            AnnotationGeometry::Polyline { points } => {
                geometry::point_near_ring(point, points, tolerance, false)
            }
            AnnotationGeometry::Ellipse { left, top, rx, ry } => {
                let (rx, ry) = (rx + tolerance, ry + tolerance);
                if rx <= 0.0 || ry <= 0.0 {
                    return false;
                }
                let dx = (point.x - (left + rx - tolerance)) / rx;
                let dy = (point.y - (top + ry - tolerance)) / ry;
                dx * dx + dy * dy <= 1.0
            }
            AnnotationGeometry::Line { x1, y1, x2, y2 } => geometry::point_near_segment(
                point,
                &ImagePoint::new(*x1, *y1),
                &ImagePoint::new(*x2, *y2),
                tolerance,
            ),
            AnnotationGeometry::Point { x, y, radius } => {
                point.distance_to(&ImagePoint::new(*x, *y)) <= radius + tolerance
            }
            AnnotationGeometry::Ruler { line, .. } => {
                geometry::point_near_segment(point, &line.start(), &line.end(), tolerance)
            }
            AnnotationGeometry::Group { objects } => {
                objects.iter().any(|child| child.geometry.contains_point(point, tolerance))
            }
            AnnotationGeometry::Rect { .. }
            | AnnotationGeometry::Text { .. }
            | AnnotationGeometry::Image { .. } => self.bounding_box().contains(point, tolerance),
        }
    }
}

/// Visual style of an object, derived from its preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStyle {
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default)]
    pub stroke: String,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f64,
    #[serde(default = "default_stroke_width")]
    pub original_stroke_width: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

impl Default for ObjectStyle {
    fn default() -> Self {
        Self {
            color: String::new(),
            fill: None,
            stroke: String::new(),
            stroke_width: default_stroke_width(),
            original_stroke_width: default_stroke_width(),
            opacity: default_opacity(),
        }
    }
}

/// Annotation object as it lives on the canvas
///
/// The identity is not part of the serialized form; it is re-assigned by
/// history whenever objects are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationObject {
    #[serde(skip)]
    lifecycle: Lifecycle,

    #[serde(rename = "factoryID")]
    pub factory_id: String,

    #[serde(
        rename = "presetID",
        default,
        deserialize_with = "lenient::optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub preset_id: Option<String>,

    #[serde(
        rename = "layerID",
        default,
        deserialize_with = "lenient::optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub layer_id: Option<String>,

    #[serde(
        rename = "sessionID",
        default,
        deserialize_with = "lenient::optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub session_id: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient::optional_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub author: Option<String>,

    #[serde(
        default,
        deserialize_with = "lenient::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created: Option<i64>,

    /// Per-object metadata overriding the preset's values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,

    #[serde(rename = "zoomAtCreation", default, skip_serializing_if = "Option::is_none")]
    pub zoom_at_creation: Option<f64>,

    #[serde(default = "default_true")]
    pub visible: bool,

    #[serde(default)]
    pub locked: bool,

    #[serde(default = "default_true")]
    pub selectable: bool,

    #[serde(flatten)]
    pub style: ObjectStyle,

    #[serde(flatten)]
    pub geometry: AnnotationGeometry,
}

impl AnnotationObject {
    /// Create a draft object with default style
    pub fn new(factory_id: impl Into<String>, geometry: AnnotationGeometry) -> Self {
        Self {
            lifecycle: Lifecycle::Draft,
            factory_id: factory_id.into(),
            preset_id: None,
            layer_id: None,
            session_id: None,
            author: None,
            created: None,
            meta: BTreeMap::new(),
            zoom_at_creation: None,
            visible: true,
            locked: false,
            selectable: true,
            style: ObjectStyle::default(),
            geometry,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Identity of a committed object
    pub fn id(&self) -> Option<ObjectId> {
        match self.lifecycle {
            Lifecycle::Committed(id) => Some(id),
            Lifecycle::Draft => None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Committed(_))
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    /// Value of the geometry `type` tag
    pub fn type_name(&self) -> &'static str {
        self.geometry.type_name()
    }

    pub fn bounding_box(&self) -> Aabb {
        self.geometry.bounding_box()
    }

    /// Hit test honoring visibility
    pub fn hit_test(&self, point: &ImagePoint, tolerance: f64) -> bool {
        self.visible && self.geometry.contains_point(point, tolerance)
    }

    /// Copy of this object with new geometry, keeping identity and references
    pub fn with_geometry(&self, geometry: AnnotationGeometry) -> Self {
        Self { geometry, ..self.clone() }
    }
}

fn default_true() -> bool {
    true
}

fn default_stroke_width() -> f64 {
    3.0
}

fn default_opacity() -> f64 {
    1.0
}

fn default_font_size() -> f64 {
    16.0
}

fn unit_scale() -> f64 {
    1.0
}

/// Deserializers tolerating ids and timestamps written as numbers or strings
pub(crate) mod lenient {
    use serde::{de::Error, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(value) => Ok(value),
            Value::Number(value) => Ok(value.to_string()),
            other => Err(D::Error::custom(format!("expected string or number id, found {other}"))),
        }
    }

    pub fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(Value::Number(value)) => Ok(Some(value.to_string())),
            Some(other) => {
                Err(D::Error::custom(format!("expected string or number id, found {other}")))
            }
        }
    }

    pub fn optional_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(value)) => {
                Ok(value.as_i64().or_else(|| value.as_f64().map(|v| v as i64)))
            }
            Some(Value::String(value)) => value
                .parse::<i64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("invalid timestamp '{value}'"))),
            Some(other) => Err(D::Error::custom(format!("invalid timestamp {other}"))),
        }
    }
}
