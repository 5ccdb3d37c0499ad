use super::{copy_with, styled, unsupported, AnnotationObjectFactory, CreateParams, FactoryError, FactoryResult, ObjectOptions};
use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint};

/// Free text label
#[derive(Debug, Clone)]
pub struct TextFactory {
    placeholder: String,
    font_size: f64,
}

impl Default for TextFactory {
    fn default() -> Self {
        Self { placeholder: "Text".to_string(), font_size: 16.0 }
    }
}

impl AnnotationObjectFactory for TextFactory {
    fn factory_id(&self) -> &'static str {
        "text"
    }

    fn geometry_type(&self) -> &'static str {
        "text"
    }

    fn title(&self) -> &'static str {
        "Text"
    }

    fn icon(&self) -> &'static str {
        "title"
    }

    fn description(&self, object: &AnnotationObject) -> String {
        match &object.geometry {
            AnnotationGeometry::Text { text, .. } => text.clone(),
            _ => self.title().to_string(),
        }
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let CreateParams::Text { position, text } = params else {
            return Err(FactoryError::InvalidParameters {
                factory: self.factory_id().to_string(),
                reason: "expected a position and text".into(),
            });
        };
        let geometry =
            AnnotationGeometry::Text { left: position.x, top: position.y, text, font_size: self.font_size };
        Ok(styled(self.factory_id(), geometry, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let AnnotationGeometry::Text { font_size, .. } = &object.geometry else {
            return Err(unsupported(self.factory_id(), object));
        };
        let geometry = match params {
            Some(CreateParams::Text { position, text }) => {
                AnnotationGeometry::Text { left: position.x, top: position.y, text, font_size: *font_size }
            }
            Some(_) => {
                return Err(FactoryError::InvalidParameters {
                    factory: self.factory_id().to_string(),
                    reason: "expected a position and text".into(),
                })
            }
            None => object.geometry.clone(),
        };
        Ok(copy_with(object, self.factory_id(), geometry))
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        let geometry = AnnotationGeometry::Text {
            left: origin.x,
            top: origin.y,
            text: self.placeholder.clone(),
            font_size: self.font_size,
        };
        styled(self.factory_id(), geometry, options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, _origin: ImagePoint, point: ImagePoint) {
        if let AnnotationGeometry::Text { left, top, .. } = &mut helper.geometry {
            *left = point.x;
            *top = point.y;
        }
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        match &helper.geometry {
            AnnotationGeometry::Text { text, .. } if !text.trim().is_empty() => Some(helper),
            _ => None,
        }
    }

    fn creation_required_drag_ms(&self) -> u64 {
        0
    }

    fn to_point_array(&self, _object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        None
    }

    fn update_rendering(&self, object: &mut AnnotationObject, _outline: bool, color: &str) {
        object.style.color = color.to_string();
        object.style.stroke = color.to_string();
        object.style.fill = Some(color.to_string());
    }

    fn exports(&self) -> &'static [&'static str] {
        &["color"]
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["left", "top", "text", "fontSize"]
    }
}
