//! Boolean operations on polygon contours
//!
//! The free-form tool only needs union and difference of simple rings, so the
//! backend is hidden behind [`PolygonClipper`]. [`GeoClipper`] delegates to the
//! `geo` crate; other backends can be swapped in through the engine builder.

use crate::annotation::ImagePoint;
use geo::{BooleanOps, Coord, LineString, MultiPolygon, Polygon};

/// Open ring of vertices (the closing vertex is implicit)
pub type Contour = Vec<ImagePoint>;

#[derive(Debug, thiserror::Error)]
pub enum ClipError {
    #[error("contour has {0} vertices, at least three are required")]
    TooFewVertices(usize),

    #[error("contour contains non-finite coordinates")]
    NonFinite,

    #[error("clipping backend failed: {0}")]
    Backend(String),
}

pub type ClipResult<T> = Result<T, ClipError>;

/// Union and difference of two simple polygons
///
/// Results are returned as outer contours only; holes are discarded.
pub trait PolygonClipper {
    fn union(&self, subject: &[ImagePoint], clip: &[ImagePoint]) -> ClipResult<Vec<Contour>>;

    fn difference(&self, subject: &[ImagePoint], clip: &[ImagePoint]) -> ClipResult<Vec<Contour>>;

    fn name(&self) -> &str {
        "custom"
    }
}

/// Clipper backed by `geo`'s boolean operations
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoClipper;

impl GeoClipper {
    fn polygon(points: &[ImagePoint]) -> ClipResult<Polygon<f64>> {
        if points.len() < 3 {
            return Err(ClipError::TooFewVertices(points.len()));
        }
        if !points.iter().all(ImagePoint::is_finite) {
            return Err(ClipError::NonFinite);
        }
        let ring: LineString<f64> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
        Ok(Polygon::new(ring, vec![]))
    }

    fn contours(result: MultiPolygon<f64>) -> Vec<Contour> {
        result
            .0
            .into_iter()
            .map(|polygon| {
                let (exterior, _holes) = polygon.into_inner();
                let mut contour: Contour =
                    exterior.0.into_iter().map(|c| ImagePoint::new(c.x, c.y)).collect();
                if contour.len() > 1 && contour.first() == contour.last() {
                    contour.pop();
                }
                contour
            })
            .filter(|contour| contour.len() >= 3)
            .collect()
    }
}

impl PolygonClipper for GeoClipper {
    fn union(&self, subject: &[ImagePoint], clip: &[ImagePoint]) -> ClipResult<Vec<Contour>> {
        let subject = Self::polygon(subject)?;
        let clip = Self::polygon(clip)?;
        Ok(Self::contours(subject.union(&clip)))
    }

    fn difference(&self, subject: &[ImagePoint], clip: &[ImagePoint]) -> ClipResult<Vec<Contour>> {
        let subject = Self::polygon(subject)?;
        let clip = Self::polygon(clip)?;
        Ok(Self::contours(subject.difference(&clip)))
    }

    fn name(&self) -> &str {
        "geo"
    }
}
