use super::{
    copy_with, expect_coords, styled, unsupported, AnnotationObjectFactory, CreateParams, FactoryResult,
    ObjectOptions,
};
use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint};

fn line_between(a: ImagePoint, b: ImagePoint) -> AnnotationGeometry {
    AnnotationGeometry::Line { x1: a.x, y1: a.y, x2: b.x, y2: b.y }
}

/// Straight line between two points
#[derive(Debug, Clone, Copy, Default)]
pub struct LineFactory;

impl AnnotationObjectFactory for LineFactory {
    fn factory_id(&self) -> &'static str {
        "line"
    }

    fn geometry_type(&self) -> &'static str {
        "line"
    }

    fn title(&self) -> &'static str {
        "Line"
    }

    fn icon(&self) -> &'static str {
        "horizontal_rule"
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let c = expect_coords(self.factory_id(), &params, 4)?;
        let geometry = line_between(ImagePoint::new(c[0], c[1]), ImagePoint::new(c[2], c[3]));
        Ok(styled(self.factory_id(), geometry, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let geometry = match params {
            Some(params) => {
                let c = expect_coords(self.factory_id(), &params, 4)?;
                line_between(ImagePoint::new(c[0], c[1]), ImagePoint::new(c[2], c[3]))
            }
            None if matches!(object.geometry, AnnotationGeometry::Line { .. }) => object.geometry.clone(),
            None => return Err(unsupported(self.factory_id(), object)),
        };
        Ok(copy_with(object, self.factory_id(), geometry))
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        styled(self.factory_id(), line_between(origin, origin), options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, origin: ImagePoint, point: ImagePoint) {
        helper.geometry = line_between(origin, point);
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        match helper.geometry {
            AnnotationGeometry::Line { x1, y1, x2, y2 } if x1 != x2 || y1 != y2 => Some(helper),
            _ => None,
        }
    }

    fn to_point_array(&self, _object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        None
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["x1", "y1", "x2", "y2"]
    }
}

/// Single-location marker
#[derive(Debug, Clone, Copy)]
pub struct PointFactory {
    radius: f64,
}

impl Default for PointFactory {
    fn default() -> Self {
        Self { radius: 10.0 }
    }
}

impl PointFactory {
    pub fn with_radius(radius: f64) -> Self {
        Self { radius }
    }
}

impl AnnotationObjectFactory for PointFactory {
    fn factory_id(&self) -> &'static str {
        "point"
    }

    fn geometry_type(&self) -> &'static str {
        "point"
    }

    fn title(&self) -> &'static str {
        "Point"
    }

    fn icon(&self) -> &'static str {
        "radio_button_checked"
    }

    fn description(&self, object: &AnnotationObject) -> String {
        match object.geometry {
            AnnotationGeometry::Point { x, y, .. } => format!("Point [{}, {}]", x.round(), y.round()),
            _ => self.title().to_string(),
        }
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let c = expect_coords(self.factory_id(), &params, 2)?;
        let geometry = AnnotationGeometry::Point { x: c[0], y: c[1], radius: self.radius };
        Ok(styled(self.factory_id(), geometry, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let geometry = match (params, &object.geometry) {
            (Some(params), AnnotationGeometry::Point { radius, .. }) => {
                let c = expect_coords(self.factory_id(), &params, 2)?;
                AnnotationGeometry::Point { x: c[0], y: c[1], radius: *radius }
            }
            (None, AnnotationGeometry::Point { .. }) => object.geometry.clone(),
            _ => return Err(unsupported(self.factory_id(), object)),
        };
        Ok(copy_with(object, self.factory_id(), geometry))
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        let geometry = AnnotationGeometry::Point { x: origin.x, y: origin.y, radius: self.radius };
        styled(self.factory_id(), geometry, options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, _origin: ImagePoint, point: ImagePoint) {
        if let AnnotationGeometry::Point { x, y, .. } = &mut helper.geometry {
            *x = point.x;
            *y = point.y;
        }
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        Some(helper)
    }

    fn creation_required_drag_ms(&self) -> u64 {
        0
    }

    fn to_point_array(&self, _object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        None
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["x", "y", "radius"]
    }
}
