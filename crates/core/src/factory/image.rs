use super::{copy_with, styled, unsupported, AnnotationObjectFactory, CreateParams, FactoryError, FactoryResult, ObjectOptions};
use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint};
use crate::geometry::Aabb;

fn image_in(bounds: Aabb, src: Option<String>) -> AnnotationGeometry {
    AnnotationGeometry::Image {
        left: bounds.x,
        top: bounds.y,
        width: bounds.width,
        height: bounds.height,
        scale_x: 1.0,
        scale_y: 1.0,
        src,
    }
}

/// Raster overlay placed over a region of the slide
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFactory;

impl AnnotationObjectFactory for ImageFactory {
    fn factory_id(&self) -> &'static str {
        "image"
    }

    fn geometry_type(&self) -> &'static str {
        "image"
    }

    fn title(&self) -> &'static str {
        "Image"
    }

    fn icon(&self) -> &'static str {
        "image"
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let CreateParams::Image { bounds, src } = params else {
            return Err(FactoryError::InvalidParameters {
                factory: self.factory_id().to_string(),
                reason: "expected image bounds".into(),
            });
        };
        if bounds.area() <= 0.0 {
            return Err(FactoryError::InvalidParameters {
                factory: self.factory_id().to_string(),
                reason: "image bounds must have an area".into(),
            });
        }
        Ok(styled(self.factory_id(), image_in(bounds, src), options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let geometry = match (params, &object.geometry) {
            (Some(CreateParams::Image { bounds, src }), _) => image_in(bounds, src),
            (None, AnnotationGeometry::Image { .. }) => object.geometry.clone(),
            (Some(other), _) => {
                return Err(FactoryError::InvalidParameters {
                    factory: self.factory_id().to_string(),
                    reason: format!("expected image bounds, got {other:?}"),
                })
            }
            (None, _) => return Err(unsupported(self.factory_id(), object)),
        };
        Ok(copy_with(object, self.factory_id(), geometry))
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        styled(self.factory_id(), image_in(Aabb::from_points(&[origin]), None), options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, origin: ImagePoint, point: ImagePoint) {
        let src = match &mut helper.geometry {
            AnnotationGeometry::Image { src, .. } => src.take(),
            _ => None,
        };
        helper.geometry = image_in(Aabb::from_points(&[origin, point]), src);
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        (helper.bounding_box().area() > 0.0).then_some(helper)
    }

    fn to_point_array(&self, _object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        None
    }

    fn is_editable(&self) -> bool {
        false
    }

    /// Images are never outlined
    fn update_rendering(&self, object: &mut AnnotationObject, _outline: bool, color: &str) {
        object.style.color = color.to_string();
        object.style.stroke = color.to_string();
    }

    fn exports(&self) -> &'static [&'static str] {
        &["opacity"]
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["left", "top", "width", "height", "scaleX", "scaleY", "src"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_drag_keeps_source_free() {
        let origin = ImagePoint::new(10.0, 10.0);
        let mut helper = ImageFactory.init_create(origin, &ObjectOptions::default());
        ImageFactory.update_create(&mut helper, origin, ImagePoint::new(0.0, 30.0));
        let image = ImageFactory.finish_direct(helper).expect("image");
        match image.geometry {
            AnnotationGeometry::Image { left, top, width, height, src, .. } => {
                assert_eq!((left, top, width, height), (0.0, 10.0, 10.0, 20.0));
                assert!(src.is_none());
            }
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn test_image_exports_opacity() {
        let object = ImageFactory
            .create(
                CreateParams::Image { bounds: Aabb::new(0.0, 0.0, 4.0, 4.0), src: Some("overlay.png".into()) },
                &ObjectOptions { opacity: 0.5, ..ObjectOptions::default() },
            )
            .expect("image");
        let value = serde_json::to_value(&object).expect("serializable");
        let trimmed = ImageFactory.copy_necessary_properties(value.as_object().expect("object"), &[]);
        assert_eq!(trimmed.get("opacity"), Some(&serde_json::json!(0.5)));
        assert_eq!(trimmed.get("src"), Some(&serde_json::json!("overlay.png")));
    }
}
