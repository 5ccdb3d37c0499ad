//! Import and export formats
//!
//! A [`Convertor`] turns the engine content into one serialization format and
//! back. Export runs in two phases so that several partial exports (for
//! example of different slides) can be merged before the final string is
//! produced. Formats are kept in registration order, which is also the order
//! import falls back through when the requested format fails to parse.

mod asap_xml;
mod csv_report;
mod native;

pub use asap_xml::AsapXmlConvertor;
pub use csv_report::{CsvReportConfig, CsvReportConvertor};
pub use native::NativeConvertor;

use crate::annotation::{AnnotationObject, ImagePoint};
use crate::factory::FactoryRegistry;
use crate::preset::{Preset, PresetManager};
use serde_json::Value;

/// Format used when import or export options leave it unspecified
pub const NATIVE_FORMAT: &str = "native";

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("unknown annotation format '{0}'")]
    UnknownFormat(String),

    #[error("data is not valid {format}: {reason}")]
    Parse { format: String, reason: String },

    #[error("unable to encode {format}: {reason}")]
    Encode { format: String, reason: String },

    #[error("format '{format}' does not support {operation}")]
    Unsupported { format: String, operation: &'static str },

    #[error("cannot merge partial export of '{found}' into '{expected}'")]
    FormatMismatch { expected: String, found: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type ConvertResult<T> = Result<T, ConvertError>;

/// Content decoded from serialized data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedAnnotations {
    pub objects: Vec<AnnotationObject>,
    pub presets: Vec<Preset>,
}

impl DecodedAnnotations {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.presets.is_empty()
    }
}

/// Format-specific records waiting for [`Convertor::encode_finalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct PartialExport {
    pub format: String,
    pub objects: Vec<Value>,
    pub presets: Vec<Value>,
}

impl PartialExport {
    pub fn new(format: impl Into<String>) -> Self {
        Self { format: format.into(), objects: Vec::new(), presets: Vec::new() }
    }

    /// Append another partial export of the same format
    ///
    /// Presets already present (by `presetID`) are not duplicated.
    pub fn merge(&mut self, other: PartialExport) -> ConvertResult<()> {
        if other.format != self.format {
            return Err(ConvertError::FormatMismatch { expected: self.format.clone(), found: other.format });
        }
        self.objects.extend(other.objects);
        for preset in other.presets {
            let id = preset.get("presetID");
            let known = id.is_some() && self.presets.iter().any(|existing| existing.get("presetID") == id);
            if !known {
                self.presets.push(preset);
            }
        }
        Ok(())
    }
}

/// Read access to everything an export may contain
///
/// Getters are evaluated on demand, so a format that only writes presets
/// never serializes objects.
pub struct ExportSource<'a> {
    annotations: Vec<&'a AnnotationObject>,
    presets: &'a PresetManager,
    factories: &'a FactoryRegistry,
    extra_properties: Vec<String>,
    microns_per_pixel: Option<f64>,
    with_annotations: bool,
    with_presets: bool,
}

impl<'a> ExportSource<'a> {
    /// Source over committed annotations in rendering order
    pub fn new(
        annotations: impl IntoIterator<Item = &'a AnnotationObject>,
        presets: &'a PresetManager,
        factories: &'a FactoryRegistry,
    ) -> Self {
        Self {
            annotations: annotations.into_iter().filter(|object| object.is_committed()).collect(),
            presets,
            factories,
            extra_properties: Vec::new(),
            microns_per_pixel: None,
            with_annotations: true,
            with_presets: true,
        }
    }

    pub fn with_content(mut self, with_annotations: bool, with_presets: bool) -> Self {
        self.with_annotations = with_annotations;
        self.with_presets = with_presets;
        self
    }

    /// Properties kept on every exported object in addition to the defaults
    pub fn with_extra_properties(mut self, properties: Vec<String>) -> Self {
        self.extra_properties = properties;
        self
    }

    pub fn with_microns_per_pixel(mut self, microns: Option<f64>) -> Self {
        self.microns_per_pixel = microns;
        self
    }

    pub fn microns_per_pixel(&self) -> Option<f64> {
        self.microns_per_pixel
    }

    pub fn factories(&self) -> &FactoryRegistry {
        self.factories
    }

    /// Committed annotations, empty when annotations are excluded
    pub fn annotations(&self) -> &[&'a AnnotationObject] {
        if self.with_annotations {
            &self.annotations
        } else {
            &[]
        }
    }

    /// Serialized annotations trimmed to their necessary properties
    pub fn objects(&self, keeps: &[&str]) -> ConvertResult<Vec<Value>> {
        let mut keep: Vec<&str> = keeps.to_vec();
        keep.extend(self.extra_properties.iter().map(String::as_str));
        self.annotations()
            .iter()
            .map(|object| -> ConvertResult<Value> {
                Ok(self.factories.trim_export(serde_json::to_value(object)?, &keep))
            })
            .collect()
    }

    /// Polygonal approximation of every annotation that has one
    pub fn point_arrays(&self, quality: f64) -> Vec<(&'a AnnotationObject, Vec<ImagePoint>)> {
        self.annotations()
            .iter()
            .filter_map(|object| {
                let factory = self.factories.resolve(object)?;
                let points = factory.to_point_array(object, quality)?;
                Some((*object, points))
            })
            .collect()
    }

    /// Preset records, empty when presets are excluded
    pub fn presets(&self) -> Vec<Preset> {
        if self.with_presets {
            self.presets.records(|_| true)
        } else {
            Vec::new()
        }
    }

    pub fn preset(&self, id: &str) -> Option<&Preset> {
        self.presets.get(id)
    }
}

/// One serialization format
pub trait Convertor {
    fn title(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// File name suffix including the dot
    fn suffix(&self) -> &'static str;

    fn encode_partial(&self, format: &str, source: &ExportSource<'_>) -> ConvertResult<PartialExport>;

    fn encode_finalize(&self, partial: PartialExport) -> ConvertResult<String>;

    fn decode(&self, data: &str) -> ConvertResult<DecodedAnnotations>;
}

/// Formats by id, in registration order
#[derive(Default)]
pub struct ConvertorRegistry {
    convertors: Vec<(String, Box<dyn Convertor>)>,
}

impl std::fmt::Debug for ConvertorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertorRegistry").field("formats", &self.formats()).finish()
    }
}

impl ConvertorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `native`, `asap-xml` and `csv`
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(NATIVE_FORMAT, Box::new(NativeConvertor));
        registry.register("asap-xml", Box::new(AsapXmlConvertor));
        registry.register("csv", Box::new(CsvReportConvertor::default()));
        registry
    }

    /// Register a format; an existing format id is overridden in place
    pub fn register(&mut self, format: &str, convertor: Box<dyn Convertor>) {
        if let Some(slot) = self.convertors.iter_mut().find(|(id, _)| id == format) {
            tracing::warn!(format, "registered annotations convertor overrides existing convertor");
            slot.1 = convertor;
            return;
        }
        self.convertors.push((format.to_string(), convertor));
    }

    pub fn get(&self, format: &str) -> ConvertResult<&dyn Convertor> {
        self.convertors
            .iter()
            .find(|(id, _)| id == format)
            .map(|(_, convertor)| convertor.as_ref())
            .ok_or_else(|| ConvertError::UnknownFormat(format.to_string()))
    }

    pub fn formats(&self) -> Vec<&str> {
        self.convertors.iter().map(|(id, _)| id.as_str()).collect()
    }

    pub fn contains(&self, format: &str) -> bool {
        self.get(format).is_ok()
    }

    pub fn suffix(&self, format: &str) -> ConvertResult<&'static str> {
        Ok(self.get(format)?.suffix())
    }

    pub fn encode_partial(&self, format: &str, source: &ExportSource<'_>) -> ConvertResult<PartialExport> {
        self.get(format)?.encode_partial(format, source)
    }

    pub fn encode_finalize(&self, format: &str, partial: PartialExport) -> ConvertResult<String> {
        if partial.format != format {
            return Err(ConvertError::FormatMismatch { expected: format.to_string(), found: partial.format });
        }
        self.get(format)?.encode_finalize(partial)
    }

    pub fn encode(&self, format: &str, source: &ExportSource<'_>) -> ConvertResult<String> {
        let partial = self.encode_partial(format, source)?;
        self.encode_finalize(format, partial)
    }

    pub fn decode(&self, format: &str, data: &str) -> ConvertResult<DecodedAnnotations> {
        self.get(format)?.decode(data)
    }

    /// Decode with `preferred`, then every other format in registration order
    ///
    /// Returns the first successful format and its content.
    pub fn decode_any(&self, preferred: &str, data: &str) -> Option<(String, DecodedAnnotations)> {
        let order = std::iter::once(preferred)
            .filter(|format| self.contains(format))
            .chain(self.formats().into_iter().filter(|format| *format != preferred));
        for format in order {
            match self.decode(format, data) {
                Ok(decoded) => {
                    if format != preferred {
                        tracing::info!(format, preferred, "annotations parsed with fallback format");
                    }
                    return Some((format.to_string(), decoded));
                }
                Err(error) => tracing::debug!(format, %error, "annotation data rejected by format"),
            }
        }
        tracing::error!(preferred, "no supported format was able to parse annotation data");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_formats_in_order() {
        let registry = ConvertorRegistry::with_builtin();
        assert_eq!(registry.formats(), vec!["native", "asap-xml", "csv"]);
        assert_eq!(registry.suffix("asap-xml").expect("known"), ".xml");
        assert!(matches!(registry.decode("geojson", "{}"), Err(ConvertError::UnknownFormat(_))));
    }

    #[test]
    fn test_register_overrides_in_place() {
        let mut registry = ConvertorRegistry::with_builtin();
        registry.register("native", Box::new(AsapXmlConvertor));
        assert_eq!(registry.formats(), vec!["native", "asap-xml", "csv"]);
        assert_eq!(registry.suffix("native").expect("known"), ".xml");
    }

    #[test]
    fn test_decode_any_falls_back() {
        let registry = ConvertorRegistry::with_builtin();
        let xml = r#"<ASAP_Annotations><Annotations /><AnnotationGroups /></ASAP_Annotations>"#;
        let (format, decoded) = registry.decode_any("native", xml).expect("xml parses");
        assert_eq!(format, "asap-xml");
        assert!(decoded.is_empty());

        assert!(registry.decode_any("native", "not annotations at all").is_none());
    }

    #[test]
    fn test_partial_merge() {
        let mut first = PartialExport::new("native");
        first.objects.push(json!({"type": "rect"}));
        first.presets.push(json!({"presetID": "a"}));
        let mut second = PartialExport::new("native");
        second.objects.push(json!({"type": "line"}));
        second.presets.push(json!({"presetID": "a"}));
        second.presets.push(json!({"presetID": "b"}));

        first.merge(second).expect("same format");
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.presets.len(), 2);

        let err = first.merge(PartialExport::new("csv")).expect_err("mismatch");
        assert!(matches!(err, ConvertError::FormatMismatch { .. }));
    }
}
