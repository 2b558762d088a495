//! Pure, stateless polygon primitives (§4.A). Built on `geo`/`geo-types`
//! where they already provide a robust implementation (bounds, rotation,
//! area, offset, boolean ops); hand-rolled where the spec pins tolerance
//! or tie-break behaviour `geo` does not expose directly.

use geo::{BooleanOps, BoundingRect, Rotate};
use geo_clipper::Clipper;
use geo_types::{Coord, LineString, Polygon as GeoPolygon};

use crate::types::Point;

/// Absolute tolerance for geometric predicates (point-in-polygon,
/// almost-equal, rectangle tests).
pub const EPS_GEOM: f64 = 1e-9;

/// Default scale applied before handing coordinates to the integer
/// clipping backend (overridable via `NestConfig::clipper_scale`).
pub const CLIPPER_SCALE: f64 = 1.0e7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.width).max(other.x + other.width);
        let max_y = (self.y + self.height).max(other.y + other.height);
        Bounds {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    Inside,
    OnBoundary,
    Outside,
}

fn to_linestring(points: &[Point]) -> LineString<f64> {
    points.iter().map(|p| Coord { x: p.x, y: p.y }).collect()
}

/// Signed area of the polygon (shoelace). Under this kernel's convention
/// (§3/§4.A), CCW outer boundaries have positive signed area.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        area += (points[j].x + points[i].x) * (points[i].y - points[j].y);
        j = i;
    }
    0.5 * area
}

/// Axis-aligned bounds, or `None` for fewer than 3 points.
pub fn polygon_bounds(points: &[Point]) -> Option<Bounds> {
    if points.len() < 3 {
        return None;
    }
    let ls = to_linestring(points);
    let rect = ls.bounding_rect()?;
    Some(Bounds {
        x: rect.min().x,
        y: rect.min().y,
        width: rect.width(),
        height: rect.height(),
    })
}

/// Bounds across several point rings at once (e.g. a part's outer
/// boundary plus its holes, or a placed/candidate pair).
pub fn multi_bounds<'a>(rings: impl IntoIterator<Item = &'a [Point]>) -> Option<Bounds> {
    let mut acc: Option<Bounds> = None;
    for ring in rings {
        if let Some(b) = polygon_bounds(ring) {
            acc = Some(match acc {
                Some(existing) => existing.union(&b),
                None => b,
            });
        }
    }
    acc
}

pub fn almost_equal(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() <= eps
}

pub fn almost_equal_points(a: &Point, b: &Point, eps: f64) -> bool {
    almost_equal(a.x, b.x, eps) && almost_equal(a.y, b.y, eps)
}

/// Rotate every point by `deg` degrees about the origin. The `exact` flag
/// is preserved per vertex.
pub fn rotate_polygon(points: &[Point], deg: f64) -> Vec<Point> {
    if points.is_empty() {
        return Vec::new();
    }
    let ls = to_linestring(points);
    let rotated = ls.rotate_around_point(deg, geo::Point::new(0.0, 0.0));
    rotated
        .coords()
        .zip(points.iter())
        .map(|(c, orig)| Point {
            x: c.x,
            y: c.y,
            exact: orig.exact,
        })
        .collect()
}

/// Tri-state point-in-polygon test with tolerance `EPS_GEOM`. Boundary
/// detection runs first so the result never flips between "on boundary"
/// and "inside"/"outside" for the same inputs.
pub fn point_in_polygon(p: (f64, f64), polygon: &[Point]) -> Containment {
    if polygon.len() < 3 {
        return Containment::Outside;
    }
    let (px, py) = p;
    let n = polygon.len();
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if point_on_segment(px, py, a.x, a.y, b.x, b.y, EPS_GEOM) {
            return Containment::OnBoundary;
        }
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = polygon[i];
        let pj = polygon[j];
        let intersects = ((pi.y > py) != (pj.y > py))
            && (px < (pj.x - pi.x) * (py - pi.y) / (pj.y - pi.y) + pi.x);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    if inside {
        Containment::Inside
    } else {
        Containment::Outside
    }
}

fn point_on_segment(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64, eps: f64) -> bool {
    let cross = (px - ax) * (by - ay) - (py - ay) * (bx - ax);
    let len = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
    if len < eps {
        return almost_equal(px, ax, eps) && almost_equal(py, ay, eps);
    }
    if (cross / len).abs() > eps {
        return false;
    }
    let dot = (px - ax) * (bx - ax) + (py - ay) * (by - ay);
    dot >= -eps && dot <= len * len + eps
}

/// Axis-aligned rectangle test with tolerance.
pub fn is_rectangle(points: &[Point], eps: f64) -> bool {
    if points.len() != 4 {
        return false;
    }
    let bounds = match polygon_bounds(points) {
        Some(b) => b,
        None => return false,
    };
    points.iter().all(|p| {
        (almost_equal(p.x, bounds.x, eps) || almost_equal(p.x, bounds.x + bounds.width, eps))
            && (almost_equal(p.y, bounds.y, eps)
                || almost_equal(p.y, bounds.y + bounds.height, eps))
    })
}

/// Counter-clockwise convex hull (Andrew's monotone chain). Ties broken by
/// lexicographic (x, then y) order, matching the sort used to seed it.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.to_vec();
    pts.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    });
    pts.dedup_by(|a, b| almost_equal_points(a, b, EPS_GEOM));
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    }

    let mut lower: Vec<Point> = Vec::new();
    for p in &pts {
        while lower.len() >= 2
            && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0
        {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for p in pts.iter().rev() {
        while upper.len() >= 2
            && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0
        {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

fn to_geo_polygon(points: &[Point]) -> GeoPolygon<f64> {
    let mut coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }
    GeoPolygon::new(LineString(coords), vec![])
}

fn from_geo_polygon(poly: &GeoPolygon<f64>, exact: bool) -> Vec<Point> {
    let exterior = poly.exterior();
    let mut pts: Vec<Point> = exterior
        .coords()
        .map(|c| Point { x: c.x, y: c.y, exact })
        .collect();
    if pts.len() > 1 && almost_equal_points(&pts[0], &pts[pts.len() - 1], EPS_GEOM) {
        pts.pop();
    }
    pts
}

/// Inflate (`delta > 0`) or deflate (`delta < 0`) a polygon by `delta` at
/// `clipper_scale`. Positive delta adds spacing between parts; a negative
/// delta on a hole shrinks the hole (§4.A).
pub fn polygon_offset(points: &[Point], delta: f64, clipper_scale: f64) -> Vec<Vec<Point>> {
    if delta == 0.0 || points.len() < 3 {
        return vec![points.to_vec()];
    }
    let poly = to_geo_polygon(points);
    let offset = poly.offset(delta, geo_clipper::JoinType::Miter(2.0), geo_clipper::EndType::ClosedPolygon, clipper_scale);
    offset
        .0
        .iter()
        .map(|p| from_geo_polygon(p, false))
        .collect()
}

/// Boolean union of two polygons' outer rings (accumulates the forbidden
/// region in §4.D.2.c).
pub fn union(a: &[Point], b: &[Point], clipper_scale: f64) -> Vec<Vec<Point>> {
    if a.len() < 3 {
        return vec![b.to_vec()];
    }
    if b.len() < 3 {
        return vec![a.to_vec()];
    }
    let pa = to_geo_polygon(a);
    let pb = to_geo_polygon(b);
    let result = pa.union(&pb, clipper_scale);
    result.0.iter().map(|p| from_geo_polygon(p, false)).collect()
}

/// Boolean difference `a - b`.
pub fn difference(a: &[Point], b: &[Point], clipper_scale: f64) -> Vec<Vec<Point>> {
    if a.len() < 3 {
        return Vec::new();
    }
    if b.len() < 3 {
        return vec![a.to_vec()];
    }
    let pa = to_geo_polygon(a);
    let pb = to_geo_polygon(b);
    let result = pa.difference(&pb, clipper_scale);
    result.0.iter().map(|p| from_geo_polygon(p, false)).collect()
}

/// Boolean intersection `a ∩ b`.
pub fn intersection(a: &[Point], b: &[Point], clipper_scale: f64) -> Vec<Vec<Point>> {
    if a.len() < 3 || b.len() < 3 {
        return Vec::new();
    }
    let pa = to_geo_polygon(a);
    let pb = to_geo_polygon(b);
    let result = pa.intersection(&pb, clipper_scale);
    result.0.iter().map(|p| from_geo_polygon(p, false)).collect()
}

/// Normalise winding in place: outer boundary strictly CCW (positive
/// signed area under this module's convention), holes strictly CW.
pub fn normalize_winding(points: &mut Vec<Point>, is_hole: bool) {
    let area = polygon_area(points);
    if area == 0.0 {
        return;
    }
    let is_ccw = area > 0.0;
    if is_ccw == is_hole {
        points.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ]
    }

    #[test]
    fn area_of_square_is_positive_when_ccw() {
        assert_eq!(polygon_area(&square(1.0)), 1.0);
    }

    #[test]
    fn area_of_triangle() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ];
        assert!((polygon_area(&pts) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bounds_of_square() {
        let b = polygon_bounds(&square(2.0)).unwrap();
        assert_eq!(b.width, 2.0);
        assert_eq!(b.height, 2.0);
    }

    #[test]
    fn degenerate_polygon_has_no_bounds() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        assert_eq!(polygon_area(&pts), 0.0);
        assert!(polygon_bounds(&pts).is_none());
    }

    #[test]
    fn rotate_preserves_bounds_for_symmetric_square() {
        let rotated = rotate_polygon(&square(1.0), 90.0);
        let b = polygon_bounds(&rotated).unwrap();
        assert!((b.width - 1.0).abs() < 1e-6);
        assert!((b.height - 1.0).abs() < 1e-6);
    }

    #[test]
    fn point_in_polygon_center_is_inside() {
        assert_eq!(
            point_in_polygon((0.5, 0.5), &square(1.0)),
            Containment::Inside
        );
    }

    #[test]
    fn point_in_polygon_outside() {
        assert_eq!(
            point_in_polygon((2.0, 2.0), &square(1.0)),
            Containment::Outside
        );
    }

    #[test]
    fn point_in_polygon_on_edge_is_boundary() {
        assert_eq!(
            point_in_polygon((0.5, 0.0), &square(1.0)),
            Containment::OnBoundary
        );
    }

    #[test]
    fn axis_aligned_square_is_rectangle() {
        assert!(is_rectangle(&square(3.0), EPS_GEOM));
    }

    #[test]
    fn triangle_is_not_rectangle() {
        let pts = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(0.0, 0.0),
        ];
        assert!(!is_rectangle(&pts, EPS_GEOM));
    }

    #[test]
    fn convex_hull_of_square_plus_interior_point() {
        let mut pts = square(1.0);
        pts.push(Point::new(0.5, 0.5));
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
    }

    #[test]
    fn union_of_touching_squares_covers_both() {
        let a = square(1.0);
        let b: Vec<Point> = square(1.0)
            .into_iter()
            .map(|p| Point::new(p.x + 1.0, p.y))
            .collect();
        let merged = union(&a, &b, CLIPPER_SCALE);
        assert_eq!(merged.len(), 1);
        let area = polygon_area(&merged[0]).abs();
        assert!((area - 2.0).abs() < 1e-6);
    }
}
