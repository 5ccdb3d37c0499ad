//! CSV report of annotations for analysis and spreadsheets
//!
//! Export only: a report loses geometry detail, so decoding is unsupported.

use super::{ConvertError, ConvertResult, Convertor, DecodedAnnotations, ExportSource, PartialExport};
use crate::annotation::AnnotationObject;
use crate::geometry;
use serde_json::Value;

const HEADERS: [&str; 16] = [
    "ID",
    "Type",
    "Factory",
    "Preset",
    "Category",
    "Layer",
    "Author",
    "Created",
    "Color",
    "Description",
    "Area",
    "BBox Min X",
    "BBox Min Y",
    "BBox Max X",
    "BBox Max Y",
    "Visible",
];

/// Configuration for CSV reports
#[derive(Debug, Clone)]
pub struct CsvReportConfig {
    /// Include column headers in the output
    pub include_headers: bool,

    /// CSV delimiter character
    pub delimiter: u8,

    /// Include hidden annotations
    pub include_hidden: bool,
}

impl Default for CsvReportConfig {
    fn default() -> Self {
        Self { include_headers: true, delimiter: b',', include_hidden: false }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CsvReportConvertor {
    config: CsvReportConfig,
}

impl CsvReportConvertor {
    pub fn new(config: CsvReportConfig) -> Self {
        Self { config }
    }

    fn row(object: &AnnotationObject, source: &ExportSource<'_>) -> Vec<String> {
        let factory = source.factories().resolve(object);
        let preset = object.preset_id.as_deref().and_then(|id| source.preset(id));
        let category = object
            .meta
            .get("category")
            .cloned()
            .or_else(|| preset.map(|preset| preset.category().to_string()))
            .unwrap_or_default();
        let description = factory.as_ref().map(|factory| factory.description(object)).unwrap_or_default();
        let area = factory
            .as_ref()
            .and_then(|factory| factory.to_point_array(object, 1.0))
            .map(|points| format!("{:.2}", geometry::polygon_area(&points)))
            .unwrap_or_default();
        let bounds = object.bounding_box();

        vec![
            object.id().map(|id| id.to_string()).unwrap_or_default(),
            object.type_name().to_string(),
            object.factory_id.clone(),
            object.preset_id.clone().unwrap_or_default(),
            category,
            object.layer_id.clone().unwrap_or_default(),
            object.author.clone().unwrap_or_default(),
            object.created.map(|created| created.to_string()).unwrap_or_default(),
            preset.map_or_else(|| object.style.color.clone(), |preset| preset.color.clone()),
            description,
            area,
            format!("{:.2}", bounds.x),
            format!("{:.2}", bounds.y),
            format!("{:.2}", bounds.max_x()),
            format!("{:.2}", bounds.max_y()),
            object.visible.to_string(),
        ]
    }
}

impl Convertor for CsvReportConvertor {
    fn title(&self) -> &'static str {
        "CSV report"
    }

    fn description(&self) -> &'static str {
        "One row per annotation with its preset, size and position"
    }

    fn suffix(&self) -> &'static str {
        ".csv"
    }

    fn encode_partial(&self, format: &str, source: &ExportSource<'_>) -> ConvertResult<PartialExport> {
        let mut partial = PartialExport::new(format);
        partial.objects = source
            .annotations()
            .iter()
            .filter(|object| self.config.include_hidden || object.visible)
            .map(|object| Value::from(Self::row(object, source)))
            .collect();
        Ok(partial)
    }

    fn encode_finalize(&self, partial: PartialExport) -> ConvertResult<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(self.config.include_headers)
            .from_writer(Vec::new());

        if self.config.include_headers {
            writer.write_record(HEADERS)?;
        }
        for row in &partial.objects {
            let cells: Vec<&str> = row
                .as_array()
                .map(|cells| cells.iter().map(|cell| cell.as_str().unwrap_or_default()).collect())
                .unwrap_or_default();
            writer.write_record(&cells)?;
        }
        writer.flush().map_err(|error| ConvertError::Csv(error.into()))?;

        let bytes = writer.into_inner().map_err(|error| ConvertError::Encode {
            format: partial.format.clone(),
            reason: error.to_string(),
        })?;
        String::from_utf8(bytes)
            .map_err(|error| ConvertError::Encode { format: partial.format, reason: error.to_string() })
    }

    fn decode(&self, _data: &str) -> ConvertResult<DecodedAnnotations> {
        Err(ConvertError::Unsupported { format: "csv".into(), operation: "import" })
    }
}
