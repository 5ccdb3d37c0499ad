//! Geometry helpers for hit testing, intersection queries and contour cleanup

use crate::annotation::ImagePoint;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in image space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Aabb {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest box containing all points; empty input gives a zero box
    pub fn from_points(points: &[ImagePoint]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for point in &points[1..] {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// Square of side `2 * radius` centred on `center`
    pub fn around(center: ImagePoint, radius: f64) -> Self {
        Self::new(center.x - radius, center.y - radius, radius * 2.0, radius * 2.0)
    }

    /// Grow the box by `amount` on every side
    pub fn expand(&self, amount: f64) -> Self {
        Self::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn center(&self) -> ImagePoint {
        ImagePoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn union(&self, other: &Aabb) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Self::new(x, y, self.max_x().max(other.max_x()) - x, self.max_y().max(other.max_y()) - y)
    }

    pub fn contains(&self, point: &ImagePoint, tolerance: f64) -> bool {
        point.x >= self.x - tolerance
            && point.x <= self.max_x() + tolerance
            && point.y >= self.y - tolerance
            && point.y <= self.max_y() + tolerance
    }
}

/// Overlap test for two boxes; touching edges count as overlap
pub fn intersect_aabb(a: &Aabb, b: &Aabb) -> bool {
    a.x <= b.max_x() && b.x <= a.max_x() && a.y <= b.max_y() && b.y <= a.max_y()
}

/// Separating-axis test for two polygons
///
/// Returns the minimum overlap along all edge normals, or `None` when a
/// separating axis exists. The test is exact for convex polygons and a
/// conservative approximation for concave ones.
pub fn polygons_intersect(first: &[ImagePoint], second: &[ImagePoint]) -> Option<f64> {
    if first.is_empty() || second.is_empty() {
        return None;
    }

    let mut min_overlap = f64::INFINITY;
    for polygon in [first, second] {
        for (index, start) in polygon.iter().enumerate() {
            let end = polygon[(index + 1) % polygon.len()];
            let (edge_x, edge_y) = (end.x - start.x, end.y - start.y);
            let length = (edge_x * edge_x + edge_y * edge_y).sqrt();
            if length <= f64::EPSILON {
                continue;
            }
            let axis = (-edge_y / length, edge_x / length);

            let (min_a, max_a) = project(first, axis);
            let (min_b, max_b) = project(second, axis);
            let overlap = max_a.min(max_b) - min_a.max(min_b);
            if overlap < 0.0 {
                return None;
            }
            min_overlap = min_overlap.min(overlap);
        }
    }

    min_overlap.is_finite().then_some(min_overlap)
}

fn project(polygon: &[ImagePoint], axis: (f64, f64)) -> (f64, f64) {
    polygon.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), point| {
        let projection = point.x * axis.0 + point.y * axis.1;
        (min.min(projection), max.max(projection))
    })
}

/// Even-odd ray casting
pub fn point_in_polygon(point: &ImagePoint, polygon: &[ImagePoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut previous = polygon[polygon.len() - 1];
    for current in polygon {
        if (current.y > point.y) != (previous.y > point.y) {
            let crossing =
                (previous.x - current.x) * (point.y - current.y) / (previous.y - current.y) + current.x;
            if point.x < crossing {
                inside = !inside;
            }
        }
        previous = *current;
    }
    inside
}

/// Distance from `point` to the segment `start`..`end`
pub fn distance_to_segment(point: &ImagePoint, start: &ImagePoint, end: &ImagePoint) -> f64 {
    let (dx, dy) = (end.x - start.x, end.y - start.y);
    let length_sq = dx * dx + dy * dy;
    if length_sq <= f64::EPSILON {
        return point.distance_to(start);
    }
    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    point.distance_to(&ImagePoint::new(start.x + t * dx, start.y + t * dy))
}

pub fn point_near_segment(
    point: &ImagePoint,
    start: &ImagePoint,
    end: &ImagePoint,
    tolerance: f64,
) -> bool {
    distance_to_segment(point, start, end) <= tolerance
}

/// Check the point against every edge of a vertex chain
pub fn point_near_ring(point: &ImagePoint, points: &[ImagePoint], tolerance: f64, closed: bool) -> bool {
    if points.len() == 1 {
        return point.distance_to(&points[0]) <= tolerance;
    }
    let near_open = points.windows(2).any(|edge| point_near_segment(point, &edge[0], &edge[1], tolerance));
    let near_closing = closed
        && points.len() > 2
        && point_near_segment(point, &points[points.len() - 1], &points[0], tolerance);
    near_open || near_closing
}

/// Shoelace area of a ring (absolute value)
pub fn polygon_area(points: &[ImagePoint]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut doubled = 0.0;
    let mut previous = points[points.len() - 1];
    for current in points {
        doubled += previous.x * current.y - current.x * previous.y;
        previous = *current;
    }
    (doubled / 2.0).abs()
}

/// Sample an ellipse outline into `segments` vertices
pub fn ellipse_points(center: ImagePoint, rx: f64, ry: f64, segments: usize) -> Vec<ImagePoint> {
    let segments = segments.max(3);
    (0..segments)
        .map(|index| {
            let angle = std::f64::consts::TAU * index as f64 / segments as f64;
            ImagePoint::new(center.x + rx * angle.cos(), center.y + ry * angle.sin())
        })
        .collect()
}

/// Simplify a closed ring with Ramer-Douglas-Peucker
///
/// Consecutive duplicates and a repeated closing vertex are removed first.
/// The result never drops below three vertices.
pub fn simplify(points: &[ImagePoint], tolerance: f64) -> Vec<ImagePoint> {
    let mut ring: Vec<ImagePoint> = Vec::with_capacity(points.len());
    for point in points {
        if ring.last().map_or(true, |last| last.distance_to(point) > f64::EPSILON) {
            ring.push(*point);
        }
    }
    if ring.len() > 1 && ring[0].distance_to(&ring[ring.len() - 1]) <= f64::EPSILON {
        ring.pop();
    }
    if ring.len() <= 3 || tolerance <= 0.0 {
        return ring;
    }

    let anchor = ring[0];
    let farthest = (1..ring.len())
        .max_by(|&a, &b| anchor.distance_to(&ring[a]).total_cmp(&anchor.distance_to(&ring[b])))
        .unwrap_or(1);

    let mut closed = ring.clone();
    closed.push(anchor);
    let last = closed.len() - 1;

    let mut keep = vec![false; closed.len()];
    keep[0] = true;
    keep[farthest] = true;
    douglas_peucker(&closed, 0, farthest, tolerance, &mut keep);
    douglas_peucker(&closed, farthest, last, tolerance, &mut keep);

    let simplified: Vec<ImagePoint> =
        closed[..last].iter().zip(&keep[..last]).filter(|(_, kept)| **kept).map(|(p, _)| *p).collect();

    if simplified.len() < 3 {
        ring
    } else {
        simplified
    }
}

fn douglas_peucker(points: &[ImagePoint], first: usize, last: usize, tolerance: f64, keep: &mut [bool]) {
    let mut pending = vec![(first, last)];
    while let Some((start, end)) = pending.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_distance = 0.0;
        let mut index = start;
        for candidate in start + 1..end {
            let distance = distance_to_segment(&points[candidate], &points[start], &points[end]);
            if distance > max_distance {
                max_distance = distance;
                index = candidate;
            }
        }
        if max_distance > tolerance {
            keep[index] = true;
            pending.push((start, index));
            pending.push((index, end));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Vec<ImagePoint> {
        vec![
            ImagePoint::new(x, y),
            ImagePoint::new(x + size, y),
            ImagePoint::new(x + size, y + size),
            ImagePoint::new(x, y + size),
        ]
    }

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb::new(0.0, 0.0, 10.0, 10.0);
        assert!(intersect_aabb(&a, &Aabb::new(5.0, 5.0, 10.0, 10.0)));
        assert!(intersect_aabb(&a, &Aabb::new(10.0, 0.0, 5.0, 5.0)));
        assert!(!intersect_aabb(&a, &Aabb::new(10.5, 0.0, 5.0, 5.0)));
    }

    #[test]
    fn test_aabb_from_points_and_union() {
        let bbox = Aabb::from_points(&square(2.0, 3.0, 4.0));
        assert_eq!(bbox, Aabb::new(2.0, 3.0, 4.0, 4.0));
        let joined = bbox.union(&Aabb::new(-1.0, 0.0, 1.0, 1.0));
        assert_eq!(joined, Aabb::new(-1.0, 0.0, 7.0, 7.0));
        assert_eq!(Aabb::from_points(&[]), Aabb::default());
    }

    #[test]
    fn test_sat_reports_overlap_depth() {
        let overlap = polygons_intersect(&square(0.0, 0.0, 10.0), &square(8.0, 0.0, 10.0));
        let depth = overlap.expect("squares overlap");
        assert!((depth - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_sat_separated_polygons() {
        assert_eq!(polygons_intersect(&square(0.0, 0.0, 10.0), &square(20.0, 20.0, 5.0)), None);
        assert_eq!(polygons_intersect(&[], &square(0.0, 0.0, 1.0)), None);
    }

    #[test]
    fn test_point_in_polygon() {
        let ring = square(0.0, 0.0, 10.0);
        assert!(point_in_polygon(&ImagePoint::new(5.0, 5.0), &ring));
        assert!(!point_in_polygon(&ImagePoint::new(15.0, 5.0), &ring));
    }

    #[test]
    fn test_point_near_segment() {
        let a = ImagePoint::new(0.0, 0.0);
        let b = ImagePoint::new(10.0, 0.0);
        assert!(point_near_segment(&ImagePoint::new(5.0, 1.0), &a, &b, 2.0));
        assert!(!point_near_segment(&ImagePoint::new(5.0, 3.0), &a, &b, 2.0));
        assert!(point_near_segment(&ImagePoint::new(11.0, 0.0), &a, &b, 2.0));
    }

    #[test]
    fn test_polygon_area() {
        assert_eq!(polygon_area(&square(0.0, 0.0, 10.0)), 100.0);
        assert_eq!(polygon_area(&square(0.0, 0.0, 10.0)[..2]), 0.0);
    }

    #[test]
    fn test_simplify_drops_collinear_vertices() {
        let ring = vec![
            ImagePoint::new(0.0, 0.0),
            ImagePoint::new(5.0, 0.0),
            ImagePoint::new(10.0, 0.0),
            ImagePoint::new(10.0, 10.0),
            ImagePoint::new(5.0, 10.1),
            ImagePoint::new(0.0, 10.0),
            ImagePoint::new(0.0, 0.0),
        ];
        let simplified = simplify(&ring, 0.5);
        assert_eq!(simplified.len(), 4);
        assert_eq!(polygon_area(&simplified), 100.0);
    }

    #[test]
    fn test_simplify_keeps_triangles() {
        let triangle = vec![ImagePoint::new(0.0, 0.0), ImagePoint::new(1.0, 0.0), ImagePoint::new(0.0, 1.0)];
        assert_eq!(simplify(&triangle, 100.0), triangle);
    }

    #[test]
    fn test_ellipse_points() {
        let points = ellipse_points(ImagePoint::new(0.0, 0.0), 10.0, 5.0, 4);
        assert_eq!(points.len(), 4);
        assert!((points[0].x - 10.0).abs() < 1e-9);
        assert!((points[1].y - 5.0).abs() < 1e-9);
    }
}
