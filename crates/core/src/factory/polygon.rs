use super::{
    copy_with, styled, unsupported, AnnotationObjectFactory, CreateParams, FactoryError, FactoryResult,
    ObjectOptions,
};
use crate::annotation::{AnnotationGeometry, AnnotationObject, ImagePoint};
use crate::geometry;

/// Vertices closer than this (image pixels) are not recorded while drawing
const MIN_VERTEX_SPACING: f64 = 2.0;

fn vertex_list(factory: &str, params: CreateParams, minimum: usize) -> FactoryResult<Vec<ImagePoint>> {
    let points = match params {
        CreateParams::Points(points) => points,
        CreateParams::Coords(values) if values.len() % 2 == 0 => {
            values.chunks_exact(2).map(|pair| ImagePoint::new(pair[0], pair[1])).collect()
        }
        other => {
            return Err(FactoryError::InvalidParameters {
                factory: factory.to_string(),
                reason: format!("expected a vertex list, got {other:?}"),
            })
        }
    };
    if points.len() < minimum || !points.iter().all(ImagePoint::is_finite) {
        return Err(FactoryError::InvalidParameters {
            factory: factory.to_string(),
            reason: format!("at least {minimum} finite vertices are required, got {}", points.len()),
        });
    }
    Ok(points)
}

fn push_vertex(points: &mut Vec<ImagePoint>, point: ImagePoint) {
    if points.last().map_or(true, |last| last.distance_to(&point) >= MIN_VERTEX_SPACING) {
        points.push(point);
    }
}

/// Closed polygon; the only kind the free-form tool edits natively
#[derive(Debug, Clone)]
pub struct PolygonFactory {
    simplify_tolerance: f64,
}

impl Default for PolygonFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PolygonFactory {
    pub fn new() -> Self {
        Self { simplify_tolerance: 1.0 }
    }

    pub fn with_simplify_tolerance(mut self, tolerance: f64) -> Self {
        self.simplify_tolerance = tolerance;
        self
    }

    pub fn simplify(&self, points: &[ImagePoint]) -> Vec<ImagePoint> {
        geometry::simplify(points, self.simplify_tolerance)
    }
}

impl AnnotationObjectFactory for PolygonFactory {
    fn factory_id(&self) -> &'static str {
        "polygon"
    }

    fn geometry_type(&self) -> &'static str {
        "polygon"
    }

    fn title(&self) -> &'static str {
        "Polygon"
    }

    fn icon(&self) -> &'static str {
        "pentagon"
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let points = vertex_list(self.factory_id(), params, 3)?;
        Ok(styled(self.factory_id(), AnnotationGeometry::Polygon { points }, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let points = match params {
            Some(params) => vertex_list(self.factory_id(), params, 3)?,
            None => object
                .geometry
                .points()
                .map(<[ImagePoint]>::to_vec)
                .ok_or_else(|| unsupported(self.factory_id(), object))?,
        };
        Ok(copy_with(object, self.factory_id(), AnnotationGeometry::Polygon { points }))
    }

    fn recalculate(&self, object: &AnnotationObject) -> Option<AnnotationObject> {
        let points = object.geometry.points()?;
        let simplified = self.simplify(points);
        (simplified.len() != points.len())
            .then(|| object.with_geometry(AnnotationGeometry::Polygon { points: simplified }))
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        styled(self.factory_id(), AnnotationGeometry::Polygon { points: vec![origin] }, options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, _origin: ImagePoint, point: ImagePoint) {
        if let AnnotationGeometry::Polygon { points } = &mut helper.geometry {
            push_vertex(points, point);
        }
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        let points = self.simplify(helper.geometry.points()?);
        (points.len() >= 3).then(|| helper.with_geometry(AnnotationGeometry::Polygon { points }))
    }

    fn to_point_array(&self, object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        object.geometry.points().map(<[ImagePoint]>::to_vec)
    }

    fn is_implicit(&self) -> bool {
        false
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["points"]
    }
}

/// Open vertex chain
#[derive(Debug, Clone, Default)]
pub struct PolylineFactory;

impl PolylineFactory {
    pub fn new() -> Self {
        Self
    }
}

impl AnnotationObjectFactory for PolylineFactory {
    fn factory_id(&self) -> &'static str {
        "polyline"
    }

    fn geometry_type(&self) -> &'static str {
        "polyline"
    }

    fn title(&self) -> &'static str {
        "Polyline"
    }

    fn icon(&self) -> &'static str {
        "timeline"
    }

    fn create(&self, params: CreateParams, options: &ObjectOptions) -> FactoryResult<AnnotationObject> {
        let points = vertex_list(self.factory_id(), params, 2)?;
        Ok(styled(self.factory_id(), AnnotationGeometry::Polyline { points }, options))
    }

    fn copy(&self, object: &AnnotationObject, params: Option<CreateParams>) -> FactoryResult<AnnotationObject> {
        let points = match params {
            Some(params) => vertex_list(self.factory_id(), params, 2)?,
            None => object
                .geometry
                .points()
                .map(<[ImagePoint]>::to_vec)
                .ok_or_else(|| unsupported(self.factory_id(), object))?,
        };
        Ok(copy_with(object, self.factory_id(), AnnotationGeometry::Polyline { points }))
    }

    fn init_create(&self, origin: ImagePoint, options: &ObjectOptions) -> AnnotationObject {
        styled(self.factory_id(), AnnotationGeometry::Polyline { points: vec![origin] }, options)
    }

    fn update_create(&self, helper: &mut AnnotationObject, _origin: ImagePoint, point: ImagePoint) {
        if let AnnotationGeometry::Polyline { points } = &mut helper.geometry {
            push_vertex(points, point);
        }
    }

    fn finish_direct(&self, helper: AnnotationObject) -> Option<AnnotationObject> {
        let count = helper.geometry.points()?.len();
        (count >= 2).then_some(helper)
    }

    fn to_point_array(&self, _object: &AnnotationObject, _quality: f64) -> Option<Vec<ImagePoint>> {
        None
    }

    fn is_editable(&self) -> bool {
        false
    }

    fn is_implicit(&self) -> bool {
        false
    }

    fn geometry_fields(&self) -> &'static [&'static str] {
        &["points"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_three_vertices() {
        let factory = PolygonFactory::new();
        let options = ObjectOptions::default();
        let result = factory.create(CreateParams::Coords(vec![0.0, 0.0, 1.0, 1.0]), &options);
        assert!(matches!(result, Err(FactoryError::InvalidParameters { .. })));

        let object = factory
            .create(CreateParams::Coords(vec![0.0, 0.0, 10.0, 0.0, 0.0, 10.0]), &options)
            .expect("triangle");
        assert_eq!(object.geometry.points().map(<[ImagePoint]>::len), Some(3));
        assert_eq!(object.factory_id, "polygon");
    }

    #[test]
    fn test_drag_create_collects_spaced_vertices() {
        let factory = PolygonFactory::new();
        let origin = ImagePoint::new(0.0, 0.0);
        let mut helper = factory.init_create(origin, &ObjectOptions::default());
        for point in [(0.5, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)] {
            factory.update_create(&mut helper, origin, ImagePoint::new(point.0, point.1));
        }
        assert_eq!(helper.geometry.points().map(<[ImagePoint]>::len), Some(4));

        let finished = factory.finish_direct(helper).expect("valid polygon");
        assert_eq!(finished.geometry.points().map(<[ImagePoint]>::len), Some(4));
    }

    #[test]
    fn test_finish_rejects_degenerate_stroke() {
        let factory = PolygonFactory::new();
        let helper = factory.init_create(ImagePoint::new(5.0, 5.0), &ObjectOptions::default());
        assert!(factory.finish_direct(helper).is_none());
    }

    #[test]
    fn test_copy_replaces_points_and_drops_identity() {
        let factory = PolygonFactory::new();
        let mut original = factory
            .create(CreateParams::Coords(vec![0.0, 0.0, 10.0, 0.0, 0.0, 10.0]), &ObjectOptions::default())
            .expect("triangle");
        original.preset_id = Some("p".into());
        original.set_lifecycle(crate::annotation::Lifecycle::Committed(3));

        let square = vec![
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(5.0, 0.0),
            ImagePoint::new(5.0, 5.0),
            ImagePoint::new(0.0, 5.0),
        ];
        let copy = factory.copy(&original, Some(CreateParams::Points(square))).expect("copy");
        assert_eq!(copy.preset_id.as_deref(), Some("p"));
        assert_eq!(copy.id(), None);
        assert_eq!(copy.geometry.points().map(<[ImagePoint]>::len), Some(4));
    }

    #[test]
    fn test_polyline_is_not_brush_editable() {
        let factory = PolylineFactory::new();
        assert!(!factory.is_editable());
        let line = factory
            .create(CreateParams::Coords(vec![0.0, 0.0, 5.0, 5.0]), &ObjectOptions::default())
            .expect("polyline");
        assert!(factory.to_point_array(&line, 1.0).is_none());
    }
}
