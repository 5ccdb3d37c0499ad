//! Free-form brush: paint or erase polygon regions with a circular stamp
//!
//! The tool owns the working contour of one editing session and computes
//! unions and differences through a [`PolygonClipper`]. It never touches the
//! canvas; the engine mirrors [`FreeFormTool::contour`] into the working
//! polygon after every changed update and applies the [`BrushOutcome`] when
//! the session finishes.

use crate::annotation::{AnnotationObject, ImagePoint, ScreenPoint};
use crate::canvas::CanvasHandle;
use crate::clip::{Contour, PolygonClipper};
use crate::config::EngineConfig;
use crate::geometry::{self, Aabb};
use crate::viewport::Viewport;

/// Offset of the diagonal octagon vertices
pub const SQRT2_DIV2: f64 = 0.707106781187;

/// Result of one brush stroke step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushUpdate {
    /// Nothing computed or the computation failed
    Unchanged,
    Changed,
    /// The remaining region fell below the erase threshold
    Erased,
}

/// How a finished session must be applied to the canvas
#[derive(Debug, Clone, PartialEq)]
pub enum BrushOutcome {
    /// The working polygon was drawn from scratch and becomes a new annotation
    Created { handle: CanvasHandle },
    /// `original` was temporarily swapped out for the working polygon
    Edited { handle: CanvasHandle, original: AnnotationObject, changed: bool },
    /// The working polygon and `original` are both removed
    Erased { handle: CanvasHandle, original: AnnotationObject },
    /// A freshly drawn polygon was erased again before it was committed
    Discarded { handle: CanvasHandle },
}

#[derive(Debug, Clone)]
struct BrushSession {
    handle: CanvasHandle,
    contour: Contour,
    original: Option<AnnotationObject>,
    last_center: Option<ImagePoint>,
    updated: bool,
    erased: bool,
}

pub struct FreeFormTool {
    clipper: Box<dyn PolygonClipper>,
    session: Option<BrushSession>,
    mode_add: bool,
    screen_radius: f64,
    radius: f64,
    min_radius: f64,
    max_radius: f64,
    unify_extra_rounds: usize,
    simplify_tolerance: f64,
}

impl std::fmt::Debug for FreeFormTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeFormTool")
            .field("clipper", &self.clipper.name())
            .field("active", &self.session.is_some())
            .field("mode_add", &self.mode_add)
            .field("screen_radius", &self.screen_radius)
            .field("radius", &self.radius)
            .finish()
    }
}

impl FreeFormTool {
    pub fn new(clipper: Box<dyn PolygonClipper>, config: &EngineConfig) -> Self {
        Self {
            clipper,
            session: None,
            mode_add: true,
            screen_radius: config.brush_radius,
            radius: config.brush_radius,
            min_radius: config.brush_min_radius,
            max_radius: config.brush_max_radius,
            unify_extra_rounds: config.unify_extra_rounds,
            simplify_tolerance: config.simplify_tolerance,
        }
    }

    pub fn mode_add(&self) -> bool {
        self.mode_add
    }

    pub fn set_mode_add(&mut self, add: bool) {
        self.mode_add = add;
    }

    /// Brush radius in image pixels
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Brush radius in screen pixels
    pub fn screen_radius(&self) -> f64 {
        self.screen_radius
    }

    /// Set the screen radius and derive the image radius from the viewport
    ///
    /// The image radius spans twice the screen radius, rounded to whole
    /// image pixels.
    pub fn set_radius(&mut self, screen_radius: f64, viewport: &dyn Viewport) {
        let origin = viewport.window_to_image(ScreenPoint::new(0.0, 0.0));
        let edge = viewport.window_to_image(ScreenPoint::new(screen_radius * 2.0, 0.0));
        self.radius = (edge.x - origin.x).abs().round();
        self.screen_radius = screen_radius;
    }

    /// Like [`set_radius`](Self::set_radius), clamped to the configured bounds
    pub fn set_safe_radius(&mut self, screen_radius: f64, viewport: &dyn Viewport) -> f64 {
        let clamped = screen_radius.clamp(self.min_radius, self.max_radius);
        self.set_radius(clamped, viewport);
        clamped
    }

    /// Re-derive the image radius after the zoom changed
    pub fn recompute_radius(&mut self, viewport: &dyn Viewport) {
        self.set_safe_radius(self.screen_radius, viewport);
    }

    /// Octagon approximating the brush around `center`
    pub fn circle_shape(&self, center: ImagePoint) -> Contour {
        let r = self.radius;
        let d = r * SQRT2_DIV2;
        vec![
            ImagePoint::new(center.x - r, center.y),
            ImagePoint::new(center.x - d, center.y + d),
            ImagePoint::new(center.x, center.y + r),
            ImagePoint::new(center.x + d, center.y + d),
            ImagePoint::new(center.x + r, center.y),
            ImagePoint::new(center.x + d, center.y - d),
            ImagePoint::new(center.x, center.y - r),
            ImagePoint::new(center.x - d, center.y - d),
        ]
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn handle(&self) -> Option<CanvasHandle> {
        self.session.as_ref().map(|session| session.handle)
    }

    pub fn contour(&self) -> Option<&[ImagePoint]> {
        self.session.as_ref().map(|session| session.contour.as_slice())
    }

    /// Whether any update changed the contour in this session
    pub fn updated(&self) -> bool {
        self.session.as_ref().is_some_and(|session| session.updated)
    }

    /// Open a session on the working polygon at `handle`
    ///
    /// `original` is the object the polygon stands in for, `None` when the
    /// polygon was created for this session. An unfinished session is dropped.
    pub fn begin(&mut self, handle: CanvasHandle, contour: Contour, original: Option<AnnotationObject>) {
        if let Some(previous) = &self.session {
            tracing::warn!(handle = ?previous.handle, "brush session replaced before it was finished");
        }
        self.session = Some(BrushSession {
            handle,
            contour,
            original,
            last_center: None,
            updated: false,
            erased: false,
        });
    }

    /// Stamp the brush at `point`
    ///
    /// Moves shorter than a third of the radius are ignored so that the
    /// clipper runs a bounded number of times per stroke.
    pub fn update(&mut self, point: ImagePoint) -> BrushUpdate {
        if !point.is_finite() {
            return BrushUpdate::Unchanged;
        }
        let min_travel = self.radius / 3.0;
        let Some(session) = self.session.as_mut() else {
            return BrushUpdate::Unchanged;
        };
        if session.erased {
            return BrushUpdate::Erased;
        }
        if session.last_center.is_some_and(|last| last.distance_to(&point) < min_travel) {
            return BrushUpdate::Unchanged;
        }
        session.last_center = Some(point);
        let subject = session.contour.clone();

        let brush = self.circle_shape(point);
        let result = if self.mode_add { self.union(&subject, &brush) } else { self.subtract(&subject, &brush) };

        let Some(session) = self.session.as_mut() else {
            return BrushUpdate::Unchanged;
        };
        match result {
            Stroke::Contour(contour) => {
                session.contour = contour;
                session.updated = true;
                BrushUpdate::Changed
            }
            Stroke::Erased => {
                session.erased = true;
                session.updated = true;
                BrushUpdate::Erased
            }
            Stroke::Failed => BrushUpdate::Unchanged,
        }
    }

    fn union(&self, subject: &[ImagePoint], brush: &[ImagePoint]) -> Stroke {
        let contours = match self.clipper.union(subject, brush) {
            Ok(contours) if !contours.is_empty() => contours,
            Ok(_) => return Stroke::Failed,
            Err(error) => {
                tracing::warn!(%error, backend = self.clipper.name(), "unable to unify polygon with brush");
                return Stroke::Failed;
            }
        };
        let contours = if contours.len() > 1 { self.unify(contours) } else { contours };
        match pick_contour(&contours, self.radius) {
            Some((index, _)) => Stroke::Contour(self.simplify(&contours[index])),
            None => {
                tracing::debug!(contours = contours.len(), "union left no usable contour");
                Stroke::Failed
            }
        }
    }

    fn subtract(&self, subject: &[ImagePoint], brush: &[ImagePoint]) -> Stroke {
        let contours = match self.clipper.difference(subject, brush) {
            Ok(contours) => contours,
            Err(error) => {
                tracing::warn!(%error, backend = self.clipper.name(), "unable to subtract brush from polygon");
                return Stroke::Failed;
            }
        };
        if contours.is_empty() {
            return Stroke::Erased;
        }
        let contours = if contours.len() > 1 { self.unify(contours) } else { contours };
        match pick_contour(&contours, self.radius) {
            Some((index, area)) if area >= self.radius * self.radius / 2.0 => {
                Stroke::Contour(self.simplify(&contours[index]))
            }
            _ => Stroke::Erased,
        }
    }

    fn simplify(&self, contour: &[ImagePoint]) -> Contour {
        geometry::simplify(contour, self.simplify_tolerance)
    }

    /// Merge contours by repeated pairwise union
    ///
    /// Runs at most `n² + unify_extra_rounds` rounds; contours that never
    /// touch stay separate once the bound is reached.
    pub(crate) fn unify(&self, contours: Vec<Contour>) -> Vec<Contour> {
        let rounds = contours.len() * contours.len() + self.unify_extra_rounds;
        let mut primary: Vec<Contour> = contours.iter().map(|contour| self.simplify(contour)).collect();

        for _ in 0..rounds {
            if primary.len() < 2 {
                break;
            }
            let mut secondary: Vec<Contour> = Vec::with_capacity(primary.len());
            let mut pairs = primary.chunks_exact(2);
            for pair in pairs.by_ref() {
                let merged = match self.clipper.union(&pair[0], &pair[1]) {
                    Ok(merged) if !merged.is_empty() => merged,
                    Ok(_) => pair.to_vec(),
                    Err(error) => {
                        tracing::debug!(%error, "contour merge failed, keeping both");
                        pair.to_vec()
                    }
                };
                // prepending alternates the pairing between rounds
                secondary.splice(0..0, merged);
            }
            secondary.extend(pairs.remainder().iter().cloned());
            primary = secondary;
        }
        primary
    }

    /// Close the session
    ///
    /// `with_deletion` forces the erase outcome, as does an update that
    /// already erased the region.
    pub fn finish(&mut self, with_deletion: bool) -> Option<BrushOutcome> {
        let session = self.session.take()?;
        let handle = session.handle;
        let outcome = match (session.original, with_deletion || session.erased) {
            (Some(original), true) => BrushOutcome::Erased { handle, original },
            (None, true) => BrushOutcome::Discarded { handle },
            (Some(original), false) => BrushOutcome::Edited { handle, original, changed: session.updated },
            (None, false) => BrushOutcome::Created { handle },
        };
        Some(outcome)
    }
}

enum Stroke {
    Contour(Contour),
    Erased,
    Failed,
}

/// Index and bounding area of the contour best representing a clip result
///
/// Scores are `2 * bbox area + vertex count`; contours whose bounding box is
/// narrower than `radius` on either side are ignored.
pub(crate) fn pick_contour(contours: &[Contour], radius: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64, f64)> = None;
    for (index, contour) in contours.iter().enumerate() {
        if contour.len() < 3 {
            continue;
        }
        let bounds = Aabb::from_points(contour);
        if bounds.width < radius || bounds.height < radius {
            continue;
        }
        let area = bounds.area();
        let score = 2.0 * area + contour.len() as f64;
        if best.map_or(true, |(_, _, best_score)| score > best_score) {
            best = Some((index, area, score));
        }
    }
    best.map(|(index, area, _)| (index, area))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationGeometry;
    use crate::canvas::Canvas;
    use crate::clip::{ClipResult, GeoClipper};
    use crate::viewport::StaticViewport;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Counts calls and returns both inputs untouched
    struct CountingClipper {
        calls: Rc<Cell<usize>>,
    }

    impl PolygonClipper for CountingClipper {
        fn union(&self, subject: &[ImagePoint], clip: &[ImagePoint]) -> ClipResult<Vec<Contour>> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec![subject.to_vec(), clip.to_vec()])
        }

        fn difference(&self, subject: &[ImagePoint], _clip: &[ImagePoint]) -> ClipResult<Vec<Contour>> {
            self.calls.set(self.calls.get() + 1);
            Ok(vec![subject.to_vec()])
        }
    }

    /// Answers every clip with slivers of two vertices
    struct DegenerateClipper;

    impl PolygonClipper for DegenerateClipper {
        fn union(&self, subject: &[ImagePoint], clip: &[ImagePoint]) -> ClipResult<Vec<Contour>> {
            Ok(vec![subject.iter().take(2).copied().collect(), clip.iter().take(2).copied().collect()])
        }

        fn difference(&self, subject: &[ImagePoint], _clip: &[ImagePoint]) -> ClipResult<Vec<Contour>> {
            Ok(vec![subject.iter().take(2).copied().collect()])
        }
    }

    fn square(x: f64, y: f64, side: f64) -> Contour {
        vec![
            ImagePoint::new(x, y),
            ImagePoint::new(x + side, y),
            ImagePoint::new(x + side, y + side),
            ImagePoint::new(x, y + side),
        ]
    }

    fn handle() -> CanvasHandle {
        let mut canvas = Canvas::new();
        canvas.add(AnnotationObject::new("polygon", AnnotationGeometry::Polygon { points: square(0.0, 0.0, 1.0) }))
    }

    fn geo_tool() -> FreeFormTool {
        FreeFormTool::new(Box::new(GeoClipper), &EngineConfig::default())
    }

    #[test]
    fn test_radius_follows_zoom() {
        let mut tool = geo_tool();
        tool.set_radius(20.0, &StaticViewport::default().with_zoom(0.5));
        assert_eq!(tool.radius(), 80.0);
        assert_eq!(tool.screen_radius(), 20.0);

        tool.set_radius(20.0, &StaticViewport::default().with_zoom(3.0));
        assert_eq!(tool.radius(), 13.0);

        assert_eq!(tool.set_safe_radius(1000.0, &StaticViewport::default()), 100.0);
        assert_eq!(tool.set_safe_radius(0.5, &StaticViewport::default()), 3.0);
    }

    #[test]
    fn test_circle_shape_is_octagon() {
        let tool = geo_tool();
        let shape = tool.circle_shape(ImagePoint::new(100.0, 100.0));
        assert_eq!(shape.len(), 8);
        assert_eq!(shape[0], ImagePoint::new(80.0, 100.0));
        assert!(shape.iter().all(|p| (p.distance_to(&ImagePoint::new(100.0, 100.0)) - 20.0).abs() < 1e-6));
    }

    #[test]
    fn test_same_point_twice_runs_clipper_once() {
        let calls = Rc::new(Cell::new(0));
        let mut tool = FreeFormTool::new(
            Box::new(CountingClipper { calls: Rc::clone(&calls) }),
            &EngineConfig::default().with_unify_extra_rounds(0),
        );
        tool.begin(handle(), square(60.0, 60.0, 80.0), None);

        tool.update(ImagePoint::new(100.0, 100.0));
        let after_first = calls.get();
        assert!(after_first > 0);
        assert_eq!(tool.update(ImagePoint::new(100.0, 100.0)), BrushUpdate::Unchanged);
        assert_eq!(tool.update(ImagePoint::new(103.0, 100.0)), BrushUpdate::Unchanged);
        assert_eq!(calls.get(), after_first);
    }

    #[test]
    fn test_union_at_same_point_keeps_contour() {
        let mut tool = geo_tool();
        tool.begin(handle(), square(70.0, 70.0, 60.0), None);

        assert_eq!(tool.update(ImagePoint::new(100.0, 100.0)), BrushUpdate::Changed);
        let vertices = tool.contour().map(<[ImagePoint]>::len);
        assert_eq!(tool.update(ImagePoint::new(100.0, 100.0)), BrushUpdate::Unchanged);
        assert_eq!(tool.contour().map(<[ImagePoint]>::len), vertices);
    }

    #[test]
    fn test_union_grows_region() {
        let mut tool = geo_tool();
        tool.begin(handle(), square(0.0, 0.0, 100.0), None);
        assert_eq!(tool.update(ImagePoint::new(100.0, 50.0)), BrushUpdate::Changed);
        let bounds = Aabb::from_points(tool.contour().expect("active"));
        assert!((bounds.max_x() - 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_union_without_polygon_leaves_contour() {
        let mut tool = FreeFormTool::new(Box::new(DegenerateClipper), &EngineConfig::default());
        tool.begin(handle(), square(70.0, 70.0, 60.0), None);

        assert_eq!(tool.update(ImagePoint::new(100.0, 100.0)), BrushUpdate::Unchanged);
        assert_eq!(tool.contour(), Some(square(70.0, 70.0, 60.0).as_slice()));
        assert!(!tool.updated());
        assert!(tool.unify(vec![square(0.0, 0.0, 10.0), square(50.0, 50.0, 10.0)]).iter().all(|c| c.len() < 3));
    }

    #[test]
    fn test_subtract_covering_brush_erases() {
        let mut tool = geo_tool();
        tool.set_mode_add(false);
        let original = AnnotationObject::new("polygon", AnnotationGeometry::Polygon { points: square(95.0, 95.0, 10.0) });
        tool.begin(handle(), square(95.0, 95.0, 10.0), Some(original.clone()));

        assert_eq!(tool.update(ImagePoint::new(100.0, 100.0)), BrushUpdate::Erased);
        match tool.finish(false) {
            Some(BrushOutcome::Erased { original: erased, .. }) => assert_eq!(erased, original),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!tool.is_active());
    }

    #[test]
    fn test_subtract_bites_into_region() {
        let mut tool = geo_tool();
        tool.set_mode_add(false);
        tool.begin(handle(), square(0.0, 0.0, 200.0), None);
        assert_eq!(tool.update(ImagePoint::new(200.0, 100.0)), BrushUpdate::Changed);
        let contour = tool.contour().expect("active");
        assert!(geometry::polygon_area(contour) < 200.0 * 200.0);
        assert!(matches!(tool.finish(false), Some(BrushOutcome::Created { .. })));
    }

    #[test]
    fn test_pick_contour_discards_slivers() {
        let contours = vec![square(0.0, 0.0, 5.0), square(100.0, 100.0, 200.0)];
        assert_eq!(pick_contour(&contours, 20.0), Some((1, 40_000.0)));
        assert_eq!(pick_contour(&contours[..1], 20.0), None);
    }

    #[test]
    fn test_unify_merges_overlapping_contours() {
        let tool = geo_tool();
        let merged = tool.unify(vec![square(0.0, 0.0, 10.0), square(5.0, 5.0, 10.0), square(12.0, 12.0, 10.0)]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_unify_round_cap_for_disjoint_contours() {
        let calls = Rc::new(Cell::new(0));
        let tool = FreeFormTool::new(
            Box::new(CountingClipper { calls: Rc::clone(&calls) }),
            &EngineConfig::default().with_unify_extra_rounds(3),
        );
        let merged = tool.unify(vec![square(0.0, 0.0, 10.0), square(50.0, 50.0, 10.0)]);
        assert_eq!(merged.len(), 2);
        // 2² + 3 rounds of a single pairwise union each
        assert_eq!(calls.get(), 7);
    }

    #[test]
    fn test_finish_reports_unchanged_edit() {
        let mut tool = geo_tool();
        let original = AnnotationObject::new("polygon", AnnotationGeometry::Polygon { points: square(0.0, 0.0, 50.0) });
        let working = handle();
        tool.begin(working, square(0.0, 0.0, 50.0), Some(original.clone()));
        assert_eq!(
            tool.finish(false),
            Some(BrushOutcome::Edited { handle: working, original, changed: false })
        );
        assert!(tool.finish(false).is_none());
    }
}
