//! ASAP annotation XML
//!
//! ```xml
//! <ASAP_Annotations>
//!   <Annotations>
//!     <Annotation Name="Annotation 0" Type="Polygon" PartOfGroup="Tumor" Color="#F4FA58">
//!       <Coordinates>
//!         <Coordinate Order="0" X="10.5" Y="20" />
//!       </Coordinates>
//!     </Annotation>
//!   </Annotations>
//!   <AnnotationGroups>
//!     <Group Name="Tumor" PartOfGroup="None" Color="#F4FA58"><Attributes /></Group>
//!   </AnnotationGroups>
//! </ASAP_Annotations>
//! ```
//!
//! Groups map to presets (group name = preset category). Only shapes with an
//! area or a single position survive the trip: rectangles, dots, polygons and
//! splines; anything else is exported through its polygon approximation.

use super::{ConvertError, ConvertResult, Convertor, DecodedAnnotations, ExportSource, PartialExport};
use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint};
use crate::factory::POLYGON_FACTORY_ID;
use crate::geometry::Aabb;
use crate::preset::Preset;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Cursor;

const FORMAT: &str = "asap-xml";
const NO_GROUP: &str = "None";
const DOT_RADIUS: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct AsapXmlConvertor;

fn parse_error(reason: impl Into<String>) -> ConvertError {
    ConvertError::Parse { format: FORMAT.into(), reason: reason.into() }
}

fn encode_error(reason: impl std::fmt::Display) -> ConvertError {
    ConvertError::Encode { format: FORMAT.into(), reason: reason.to_string() }
}

/// ASAP writers in some locales emit decimal commas
fn parse_number(value: &str) -> Option<f64> {
    value.trim().replace(',', ".").parse().ok().filter(|number: &f64| number.is_finite())
}

fn attributes(element: &BytesStart<'_>) -> ConvertResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|error| parse_error(error.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(|error| parse_error(error.to_string()))?;
        map.insert(key, value.into_owned());
    }
    Ok(map)
}

#[derive(Debug, Default)]
struct PendingAnnotation {
    name: String,
    kind: String,
    group: String,
    color: Option<String>,
    coordinates: Vec<(u64, ImagePoint)>,
}

impl PendingAnnotation {
    fn from_attributes(attrs: BTreeMap<String, String>) -> Self {
        Self {
            name: attrs.get("Name").cloned().unwrap_or_default(),
            kind: attrs.get("Type").cloned().unwrap_or_else(|| "Polygon".into()),
            group: attrs.get("PartOfGroup").cloned().unwrap_or_else(|| NO_GROUP.into()),
            color: attrs.get("Color").cloned(),
            coordinates: Vec::new(),
        }
    }

    fn into_object(mut self) -> Option<AnnotationObject> {
        self.coordinates.sort_by_key(|(order, _)| *order);
        let points: Vec<ImagePoint> = self.coordinates.into_iter().map(|(_, point)| point).collect();
        let (factory, geometry) = match self.kind.as_str() {
            "Dot" => {
                let point = points.first()?;
                ("point", AnnotationGeometry::Point { x: point.x, y: point.y, radius: DOT_RADIUS })
            }
            "Rectangle" if points.len() >= 2 => {
                let bounds = Aabb::from_points(&points);
                (
                    "rect",
                    AnnotationGeometry::Rect {
                        left: bounds.x,
                        top: bounds.y,
                        width: bounds.width,
                        height: bounds.height,
                    },
                )
            }
            _ if points.len() >= 3 => (POLYGON_FACTORY_ID, AnnotationGeometry::Polygon { points }),
            _ => {
                tracing::debug!(name = %self.name, kind = %self.kind, "skipping annotation without usable coordinates");
                return None;
            }
        };
        let mut object = AnnotationObject::new(factory, geometry);
        if self.group != NO_GROUP && !self.group.is_empty() {
            object.preset_id = Some(self.group);
        }
        if let Some(color) = self.color {
            object.style.color = color.to_ascii_lowercase();
            object.style.stroke = object.style.color.clone();
        }
        if !self.name.is_empty() {
            object.meta.insert("category".into(), self.name);
        }
        Some(object)
    }
}

impl AsapXmlConvertor {
    /// Coordinates and ASAP type of an annotation
    fn shape(object: &AnnotationObject, source: &ExportSource<'_>) -> Option<(&'static str, Vec<ImagePoint>)> {
        match &object.geometry {
            AnnotationGeometry::Point { x, y, .. } => Some(("Dot", vec![ImagePoint::new(*x, *y)])),
            AnnotationGeometry::Rect { left, top, width, height } => Some((
                "Rectangle",
                vec![
                    ImagePoint::new(*left, *top),
                    ImagePoint::new(left + width, *top),
                    ImagePoint::new(left + width, top + height),
                    ImagePoint::new(*left, top + height),
                ],
            )),
            AnnotationGeometry::Polygon { points } => Some(("Polygon", points.clone())),
            AnnotationGeometry::Polyline { points } => Some(("Spline", points.clone())),
            _ => {
                let factory = source.factories().resolve(object)?;
                factory.to_point_array(object, 1.0).map(|points| ("Polygon", points))
            }
        }
    }

    fn group_name(preset: &Preset) -> String {
        match preset.category() {
            "" => preset.id.clone(),
            category => category.to_string(),
        }
    }

    fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> ConvertResult<()> {
        writer.write_event(event).map_err(encode_error)
    }

    fn text(value: &Value, key: &str) -> String {
        value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
    }
}

impl Convertor for AsapXmlConvertor {
    fn title(&self) -> &'static str {
        "ASAP XML"
    }

    fn description(&self) -> &'static str {
        "Annotation XML of the ASAP whole-slide viewer"
    }

    fn suffix(&self) -> &'static str {
        ".xml"
    }

    fn encode_partial(&self, format: &str, source: &ExportSource<'_>) -> ConvertResult<PartialExport> {
        let mut partial = PartialExport::new(format);
        for preset in source.presets() {
            partial.presets.push(json!({
                "presetID": preset.id,
                "Name": Self::group_name(&preset),
                "Color": preset.color,
            }));
        }
        for (index, object) in source.annotations().iter().enumerate() {
            let Some((kind, points)) = Self::shape(object, source) else {
                tracing::debug!(kind = object.type_name(), "object has no ASAP representation");
                continue;
            };
            let preset = object.preset_id.as_deref().and_then(|id| source.preset(id));
            let group = preset.map_or_else(|| NO_GROUP.to_string(), Self::group_name);
            let color = preset.map_or_else(|| object.style.color.clone(), |preset| preset.color.clone());
            let name = object.meta.get("category").cloned().unwrap_or_else(|| format!("Annotation {index}"));
            partial.objects.push(json!({
                "Name": name,
                "Type": kind,
                "PartOfGroup": group,
                "Color": color,
                "Coordinates": points.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>(),
            }));
        }
        Ok(partial)
    }

    fn encode_finalize(&self, partial: PartialExport) -> ConvertResult<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        Self::write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Self::write(&mut writer, Event::Start(BytesStart::new("ASAP_Annotations")))?;

        Self::write(&mut writer, Event::Start(BytesStart::new("Annotations")))?;
        for object in &partial.objects {
            let (name, kind, group, color) = (
                Self::text(object, "Name"),
                Self::text(object, "Type"),
                Self::text(object, "PartOfGroup"),
                Self::text(object, "Color"),
            );
            let element = BytesStart::new("Annotation").with_attributes([
                ("Name", name.as_str()),
                ("Type", kind.as_str()),
                ("PartOfGroup", group.as_str()),
                ("Color", color.as_str()),
            ]);
            Self::write(&mut writer, Event::Start(element))?;
            Self::write(&mut writer, Event::Start(BytesStart::new("Coordinates")))?;
            let coordinates = object.get("Coordinates").and_then(Value::as_array).cloned().unwrap_or_default();
            for (order, pair) in coordinates.iter().enumerate() {
                let x = pair.get(0).and_then(Value::as_f64).unwrap_or_default().to_string();
                let y = pair.get(1).and_then(Value::as_f64).unwrap_or_default().to_string();
                let order = order.to_string();
                let element = BytesStart::new("Coordinate").with_attributes([
                    ("Order", order.as_str()),
                    ("X", x.as_str()),
                    ("Y", y.as_str()),
                ]);
                Self::write(&mut writer, Event::Empty(element))?;
            }
            Self::write(&mut writer, Event::End(BytesEnd::new("Coordinates")))?;
            Self::write(&mut writer, Event::End(BytesEnd::new("Annotation")))?;
        }
        Self::write(&mut writer, Event::End(BytesEnd::new("Annotations")))?;

        Self::write(&mut writer, Event::Start(BytesStart::new("AnnotationGroups")))?;
        for preset in &partial.presets {
            let (name, color) = (Self::text(preset, "Name"), Self::text(preset, "Color"));
            let element = BytesStart::new("Group").with_attributes([
                ("Name", name.as_str()),
                ("PartOfGroup", NO_GROUP),
                ("Color", color.as_str()),
            ]);
            Self::write(&mut writer, Event::Start(element))?;
            Self::write(&mut writer, Event::Empty(BytesStart::new("Attributes")))?;
            Self::write(&mut writer, Event::End(BytesEnd::new("Group")))?;
        }
        Self::write(&mut writer, Event::End(BytesEnd::new("AnnotationGroups")))?;

        Self::write(&mut writer, Event::End(BytesEnd::new("ASAP_Annotations")))?;
        String::from_utf8(writer.into_inner().into_inner()).map_err(encode_error)
    }

    fn decode(&self, data: &str) -> ConvertResult<DecodedAnnotations> {
        let mut reader = Reader::from_str(data);
        reader.config_mut().trim_text(true);

        let mut root_seen = false;
        let mut current: Option<PendingAnnotation> = None;
        let mut objects = Vec::new();
        let mut groups: Vec<Preset> = Vec::new();

        loop {
            let event = reader.read_event().map_err(|error| parse_error(error.to_string()))?;
            match event {
                Event::Start(element) | Event::Empty(element) => {
                    match element.name().as_ref() {
                        b"ASAP_Annotations" => root_seen = true,
                        b"Annotation" if root_seen => {
                            let pending = PendingAnnotation::from_attributes(attributes(&element)?);
                            if let Some(object) = current.replace(pending).and_then(PendingAnnotation::into_object) {
                                objects.push(object);
                            }
                        }
                        b"Coordinate" => {
                            let Some(annotation) = current.as_mut() else { continue };
                            let attrs = attributes(&element)?;
                            let x = attrs.get("X").and_then(|v| parse_number(v));
                            let y = attrs.get("Y").and_then(|v| parse_number(v));
                            let (Some(x), Some(y)) = (x, y) else {
                                return Err(parse_error("coordinate without numeric X/Y"));
                            };
                            let order = attrs
                                .get("Order")
                                .and_then(|v| v.trim().parse().ok())
                                .unwrap_or(annotation.coordinates.len() as u64);
                            annotation.coordinates.push((order, ImagePoint::new(x, y)));
                        }
                        b"Group" if root_seen => {
                            let attrs = attributes(&element)?;
                            let Some(name) = attrs.get("Name").filter(|name| !name.is_empty()) else {
                                continue;
                            };
                            let color = attrs.get("Color").map(|c| c.to_ascii_lowercase()).unwrap_or_default();
                            groups.push(Preset::new(name.clone(), POLYGON_FACTORY_ID, name, color));
                        }
                        _ => {}
                    }
                }
                Event::End(element) if element.name().as_ref() == b"Annotation" => {
                    if let Some(object) = current.take().and_then(PendingAnnotation::into_object) {
                        objects.push(object);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !root_seen {
            return Err(parse_error("missing ASAP_Annotations root element"));
        }
        if let Some(object) = current.take().and_then(PendingAnnotation::into_object) {
            objects.push(object);
        }

        let mut presets = groups;
        for object in &objects {
            let Some(group) = object.preset_id.as_deref() else { continue };
            if !presets.iter().any(|preset| preset.id == group) {
                presets.push(Preset::new(group, object.factory_id.clone(), group, object.style.color.clone()));
            }
        }
        Ok(DecodedAnnotations { objects, presets })
    }
}
