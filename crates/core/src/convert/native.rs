//! Native JSON format: `{"objects": [...], "presets": [...]}`

use super::{ConvertError, ConvertResult, Convertor, DecodedAnnotations, ExportSource, PartialExport};
use crate::annotation::AnnotationObject;
use crate::preset::Preset;
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConvertor;

impl NativeConvertor {
    fn parse_error(reason: impl Into<String>) -> ConvertError {
        ConvertError::Parse { format: "native".into(), reason: reason.into() }
    }

    fn decode_list<T: serde::de::DeserializeOwned>(values: Vec<Value>, kind: &str) -> Vec<T> {
        values
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(decoded) => Some(decoded),
                Err(error) => {
                    tracing::warn!(index, kind, %error, "skipping malformed record");
                    None
                }
            })
            .collect()
    }
}

impl Convertor for NativeConvertor {
    fn title(&self) -> &'static str {
        "Native JSON"
    }

    fn description(&self) -> &'static str {
        "Annotation objects and presets as used by the engine"
    }

    fn suffix(&self) -> &'static str {
        ".json"
    }

    fn encode_partial(&self, format: &str, source: &ExportSource<'_>) -> ConvertResult<PartialExport> {
        let mut partial = PartialExport::new(format);
        partial.objects = source.objects(&[])?;
        partial.presets = source
            .presets()
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?;
        Ok(partial)
    }

    fn encode_finalize(&self, partial: PartialExport) -> ConvertResult<String> {
        Ok(serde_json::to_string(&json!({
            "objects": partial.objects,
            "presets": partial.presets,
        }))?)
    }

    /// A bare array is read as a list of objects
    fn decode(&self, data: &str) -> ConvertResult<DecodedAnnotations> {
        let value: Value = serde_json::from_str(data)?;
        let (objects, presets) = match value {
            Value::Array(objects) => (objects, Vec::new()),
            Value::Object(mut map) => {
                if !map.contains_key("objects") && !map.contains_key("presets") {
                    return Err(Self::parse_error("expected 'objects' or 'presets'"));
                }
                let mut list = |key: &str| match map.remove(key) {
                    None | Some(Value::Null) => Ok(Vec::new()),
                    Some(Value::Array(items)) => Ok(items),
                    Some(_) => Err(Self::parse_error(format!("'{key}' must be an array"))),
                };
                (list("objects")?, list("presets")?)
            }
            _ => return Err(Self::parse_error("expected an object or an array")),
        };
        Ok(DecodedAnnotations {
            objects: Self::decode_list::<AnnotationObject>(objects, "object"),
            presets: Self::decode_list::<Preset>(presets, "preset"),
        })
    }
}
