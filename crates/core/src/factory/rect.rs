use super::{
    copy_with, expect_coords, styled, unsupported, AnnotationObjectFactory, CreateParams, FactoryResult,
    ObjectOptions,
};
use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint};
use crate::geometry::{self, Aabb};

fn rect_between(a: ImagePoint, b: ImagePoint) -> AnnotationGeometry {
    let bounds = Aabb::from_points(&[a, b]);
    AnnotationGeometry::Rect { left: bounds.x, top: bounds.y, width: bounds.width, height: bounds.height }
}

fn ellipse_between(a: ImagePoint, b: ImagePoint) -> AnnotationGeometry {
    let bounds = Aabb::from_points(&[a, b]);
    AnnotationGeometry::Ellipse {
        left: bounds.x,
        top: bounds.y,
        rx: bounds.width / 2.0,
        ry: bounds.height / 2.0,
    }
}

/// Axis-aligned rectangle created from two corners
#[derive(Debug, Clone, Copy, Default)]
pub struct RectFactory;

impl AnnotationObjectFactory for RectFactory {
    fn factory_id(&self) -> &'static str {
        "rect"
    }

    fn geometry_type(&self) -> &'static str {
        "rect"
    }

    fn title(&self) -> &'static str {
        "Rectangle"
    }

    fn icon(&self) -> &'static str {
        "crop_5_4"
    }

    /// Parameters: `[x1, y1, x2, y2]`, any two opposite corners
    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let c = expect_coords(self.factory_id(), &params, 4)?;
        let geometry = rect_between(ImagePoint::new(c[0], c[1]), ImagePoint::new(c[2], c[3]));
        Ok(styled(self.factory_id(), geometry, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let geometry = match params {
            Some(params) => {
                let c = expect_coords(self.factory_id(), &params, 4)?;
                rect_between(ImagePoint::new(c[0], c[1]), ImagePoint::new(c[2], c[3]))
            }
            None if matches!(object.geometry, AnnotationGeometry::Rect { .. }) => object.geometry.clone(),
            None => return Err(unsupported(self.factory_id(), object)),
        };
        Ok(copy_with(object, self.factory_id(), geometry))
    }

    fn recalculate(&self, object: &AnnotationObject) -> Option<AnnotationObject> {
        match object.geometry {
            AnnotationGeometry::Rect { left, top, width, height } if width < 0.0 || height < 0.0 => {
                let corner = ImagePoint::new(left + width, top + height);
                Some(object.with_geometry(rect_between(ImagePoint::new(left, top), corner)))
            }
            _ => None,
        }
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        styled(self.factory_id(), rect_between(origin, origin), options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, origin: ImagePoint, point: ImagePoint) {
        helper.geometry = rect_between(origin, point);
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        match helper.geometry {
            AnnotationGeometry::Rect { width, height, .. } if width > 0.0 && height > 0.0 => Some(helper),
            _ => None,
        }
    }

    fn to_point_array(&self, object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        match object.geometry {
            AnnotationGeometry::Rect { left, top, width, height } => Some(vec![
                ImagePoint::new(left, top),
                ImagePoint::new(left + width, top),
                ImagePoint::new(left + width, top + height),
                ImagePoint::new(left, top + height),
            ]),
            _ => None,
        }
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["left", "top", "width", "height"]
    }
}

/// Ellipse inscribed in the dragged box
#[derive(Debug, Clone, Copy, Default)]
pub struct EllipseFactory;

impl AnnotationObjectFactory for EllipseFactory {
    fn factory_id(&self) -> &'static str {
        "ellipse"
    }

    fn geometry_type(&self) -> &'static str {
        "ellipse"
    }

    fn title(&self) -> &'static str {
        "Ellipse"
    }

    fn icon(&self) -> &'static str {
        "circle"
    }

    /// Parameters: `[left, top, rx, ry]`
    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let c = expect_coords(self.factory_id(), &params, 4)?;
        let geometry = AnnotationGeometry::Ellipse { left: c[0], top: c[1], rx: c[2].abs(), ry: c[3].abs() };
        Ok(styled(self.factory_id(), geometry, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let geometry = match params {
            Some(params) => {
                let c = expect_coords(self.factory_id(), &params, 4)?;
                AnnotationGeometry::Ellipse { left: c[0], top: c[1], rx: c[2].abs(), ry: c[3].abs() }
            }
            None if matches!(object.geometry, AnnotationGeometry::Ellipse { .. }) => object.geometry.clone(),
            None => return Err(unsupported(self.factory_id(), object)),
        };
        Ok(copy_with(object, self.factory_id(), geometry))
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        styled(self.factory_id(), ellipse_between(origin, origin), options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, origin: ImagePoint, point: ImagePoint) {
        helper.geometry = ellipse_between(origin, point);
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        match helper.geometry {
            AnnotationGeometry::Ellipse { rx, ry, .. } if rx > 0.0 && ry > 0.0 => Some(helper),
            _ => None,
        }
    }

    /// Vertex count grows with the radii and `quality`
    fn to_point_array(&self, object: &AnnotationObject, quality: f64) -> Option<Vec<ImagePoint>> {
        match object.geometry {
            AnnotationGeometry::Ellipse { left, top, rx, ry } => {
                let segments = ((rx + ry) * quality.max(0.1) / 4.0).clamp(16.0, 256.0) as usize;
                Some(geometry::ellipse_points(ImagePoint::new(left + rx, top + ry), rx, ry, segments))
            }
            _ => None,
        }
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["left", "top", "rx", "ry"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_from_corners() {
        let object = RectFactory
            .create(CreateParams::Coords(vec![10.0, 10.0, 50.0, 50.0]), &ObjectOptions::default())
            .expect("rectangle");
        assert_eq!(
            object.geometry,
            AnnotationGeometry::Rect { left: 10.0, top: 10.0, width: 40.0, height: 40.0 }
        );
    }

    #[test]
    fn test_rect_normalizes_reversed_corners() {
        let object = RectFactory
            .create(CreateParams::Coords(vec![50.0, 30.0, 10.0, 10.0]), &ObjectOptions::default())
            .expect("rectangle");
        assert_eq!(
            object.geometry,
            AnnotationGeometry::Rect { left: 10.0, top: 10.0, width: 40.0, height: 20.0 }
        );
    }

    #[test]
    fn test_rect_point_array_is_clockwise_corners() {
        let object = RectFactory
            .create(CreateParams::Coords(vec![0.0, 0.0, 2.0, 1.0]), &ObjectOptions::default())
            .expect("rectangle");
        let points = RectFactory.to_point_array(&object, 1.0).expect("implicit shape");
        assert_eq!(points.len(), 4);
        assert_eq!(points[2], ImagePoint::new(2.0, 1.0));
    }

    #[test]
    fn test_zero_area_drag_is_discarded() {
        let origin = ImagePoint::new(3.0, 3.0);
        let mut helper = RectFactory.init_create(origin, &ObjectOptions::default());
        RectFactory.update_create(&mut helper, origin, ImagePoint::new(3.0, 9.0));
        assert!(RectFactory.finish_direct(helper).is_none());
    }

    #[test]
    fn test_ellipse_drag_and_approximation() {
        let origin = ImagePoint::new(0.0, 0.0);
        let mut helper = EllipseFactory.init_create(origin, &ObjectOptions::default());
        EllipseFactory.update_create(&mut helper, origin, ImagePoint::new(40.0, 20.0));
        let ellipse = EllipseFactory.finish_direct(helper).expect("ellipse");
        assert_eq!(ellipse.geometry, AnnotationGeometry::Ellipse { left: 0.0, top: 0.0, rx: 20.0, ry: 10.0 });

        let points = EllipseFactory.to_point_array(&ellipse, 1.0).expect("approximation");
        assert!(points.len() >= 16);
        assert!(points.iter().all(|p| p.x >= -1e-9 && p.x <= 40.0 + 1e-9));
    }
}
