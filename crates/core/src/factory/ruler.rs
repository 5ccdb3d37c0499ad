use super::{copy_with, expect_coords, styled, unsupported, AnnotationObjectFactory, CreateParams, FactoryResult, ObjectOptions};
use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint, RulerLabel, Segment};

/// Format a pixel length as a physical length
///
/// With a known resolution the value is shown in the largest SI unit that
/// keeps it at or above one, rounded to two decimals; otherwise in pixels.
pub fn format_length(pixels: f64, microns_per_pixel: Option<f64>) -> String {
    let round = |value: f64| (value * 100.0).round() / 100.0;
    let Some(microns) = microns_per_pixel.filter(|m| *m > 0.0) else {
        return format!("{} px", round(pixels));
    };
    let meters = pixels * microns * 1e-6;
    let (value, unit) = if meters >= 1.0 {
        (meters, "m")
    } else if meters >= 1e-3 {
        (meters * 1e3, "mm")
    } else if meters >= 1e-6 {
        (meters * 1e6, "μm")
    } else {
        (meters * 1e9, "nm")
    };
    format!("{} {}", round(value), unit)
}

/// Measuring line: a segment plus a label showing its length
#[derive(Debug, Clone, Copy, Default)]
pub struct RulerFactory {
    microns_per_pixel: Option<f64>,
}

impl RulerFactory {
    pub fn new(microns_per_pixel: Option<f64>) -> Self {
        Self { microns_per_pixel }
    }

    fn ruler(&self, start: ImagePoint, end: ImagePoint, label_scale: f64) -> AnnotationGeometry {
        let line = Segment::new(start, end);
        let measure = format_length(line.length(), self.microns_per_pixel);
        let label = RulerLabel {
            left: (start.x + end.x) / 2.0,
            top: (start.y + end.y) / 2.0,
            text: measure.clone(),
            scale: label_scale,
        };
        AnnotationGeometry::Ruler { line, label, measure }
    }
}

impl AnnotationObjectFactory for RulerFactory {
    fn factory_id(&self) -> &'static str {
        "ruler"
    }

    fn geometry_type(&self) -> &'static str {
        "ruler"
    }

    fn title(&self) -> &'static str {
        "Ruler"
    }

    fn icon(&self) -> &'static str {
        "straighten"
    }

    fn description(&self, object: &AnnotationObject) -> String {
        match &object.geometry {
            AnnotationGeometry::Ruler { measure, .. } => format!("Length {measure}"),
            _ => self.title().to_string(),
        }
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let c = expect_coords(self.factory_id(), &params, 4)?;
        let geometry = self.ruler(ImagePoint::new(c[0], c[1]), ImagePoint::new(c[2], c[3]), 1.0);
        Ok(styled(self.factory_id(), geometry, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let AnnotationGeometry::Ruler { label, .. } = &object.geometry else {
            return Err(unsupported(self.factory_id(), object));
        };
        let geometry = match params {
            Some(params) => {
                let c = expect_coords(self.factory_id(), &params, 4)?;
                self.ruler(ImagePoint::new(c[0], c[1]), ImagePoint::new(c[2], c[3]), label.scale)
            }
            None => object.geometry.clone(),
        };
        Ok(copy_with(object, self.factory_id(), geometry))
    }

    /// Re-measure after the endpoints were moved
    fn recalculate(&self, object: &AnnotationObject) -> Option<AnnotationObject> {
        let AnnotationGeometry::Ruler { line, label, .. } = &object.geometry else {
            return None;
        };
        let remeasured = self.ruler(line.start(), line.end(), label.scale);
        (remeasured != object.geometry).then(|| object.with_geometry(remeasured))
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        styled(self.factory_id(), self.ruler(origin, origin, 1.0), options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, origin: ImagePoint, point: ImagePoint) {
        let scale = match &helper.geometry {
            AnnotationGeometry::Ruler { label, .. } => label.scale,
            _ => 1.0,
        };
        helper.geometry = self.ruler(origin, point, scale);
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        match &helper.geometry {
            AnnotationGeometry::Ruler { line, .. } if line.length() > 0.0 => Some(helper),
            _ => None,
        }
    }

    fn to_point_array(&self, _object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        None
    }

    fn is_editable(&self) -> bool {
        false
    }

    /// The label keeps a constant on-screen size
    fn on_zoom(&self, object: &mut AnnotationObject, zoom: f64) {
        if zoom <= 0.0 {
            return;
        }
        object.style.stroke_width = object.style.original_stroke_width / zoom;
        if let AnnotationGeometry::Ruler { label, .. } = &mut object.geometry {
            label.scale = 1.0 / zoom;
        }
    }

    fn exports(&self) -> &'static [&'static str] {
        &["measure"]
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["line", "label", "measure"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_length_units() {
        assert_eq!(format_length(100.0, Some(0.25)), "25 μm");
        assert_eq!(format_length(8000.0, Some(0.25)), "2 mm");
        assert_eq!(format_length(1.0, Some(0.25)), "250 nm");
        assert_eq!(format_length(12.345, None), "12.35 px");
    }

    #[test]
    fn test_ruler_measures_while_dragging() {
        let factory = RulerFactory::new(Some(0.5));
        let origin = ImagePoint::new(0.0, 0.0);
        let mut helper = factory.init_create(origin, &ObjectOptions::default());
        factory.update_create(&mut helper, origin, ImagePoint::new(30.0, 40.0));

        let ruler = factory.finish_direct(helper).expect("ruler");
        assert_eq!(factory.description(&ruler), "Length 25 μm");
        match &ruler.geometry {
            AnnotationGeometry::Ruler { label, .. } => {
                assert_eq!((label.left, label.top), (15.0, 20.0));
            }
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn test_ruler_label_scales_with_zoom() {
        let factory = RulerFactory::default();
        let mut ruler = factory
            .create(CreateParams::Coords(vec![0.0, 0.0, 10.0, 0.0]), &ObjectOptions::default())
            .expect("ruler");
        factory.on_zoom(&mut ruler, 4.0);
        match &ruler.geometry {
            AnnotationGeometry::Ruler { label, .. } => assert_eq!(label.scale, 0.25),
            other => panic!("unexpected geometry {other:?}"),
        }
        assert_eq!(ruler.style.stroke_width, 0.75);
    }
}
