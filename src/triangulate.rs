//! Convex decomposition and convex-polygon Minkowski sum.
//!
//! Support machinery for the Minkowski-sum NFP path (§4.B): ear-clipping
//! triangulates a simple polygon into convex pieces (triangles are always
//! convex), and the classical edge-merge algorithm computes the Minkowski
//! sum of two convex, CCW polygons in `O(n+m)`.

use crate::geometry::{self, EPS_GEOM};
use crate::types::Point;

/// Ear-clipping triangulation of a simple polygon (no holes). Assumes CCW
/// winding; each output triangle is convex by construction.
pub fn triangulate(points: &[Point]) -> Vec<[Point; 3]> {
    if points.len() < 3 {
        return Vec::new();
    }
    if points.len() == 3 {
        return vec![[points[0], points[1], points[2]]];
    }

    let mut indices: Vec<usize> = (0..points.len()).collect();
    let mut triangles = Vec::new();
    let mut guard = 0usize;
    let max_guard = points.len() * points.len() + 16;

    while indices.len() > 3 && guard < max_guard {
        guard += 1;
        let n = indices.len();
        let mut ear_found = false;
        for i in 0..n {
            let prev = indices[(i + n - 1) % n];
            let cur = indices[i];
            let next = indices[(i + 1) % n];
            let a = points[prev];
            let b = points[cur];
            let c = points[next];
            if !is_convex_vertex(&a, &b, &c) {
                continue;
            }
            if indices
                .iter()
                .filter(|&&idx| idx != prev && idx != cur && idx != next)
                .any(|&idx| point_in_triangle(&points[idx], &a, &b, &c))
            {
                continue;
            }
            triangles.push([a, b, c]);
            indices.remove(i);
            ear_found = true;
            break;
        }
        if !ear_found {
            // Degenerate / self-intersecting input; fall back to a fan
            // triangulation from the first remaining vertex rather than
            // looping forever.
            let fan = indices[0];
            for w in indices[1..].windows(2) {
                triangles.push([points[fan], points[w[0]], points[w[1]]]);
            }
            indices.clear();
            break;
        }
    }
    if indices.len() == 3 {
        triangles.push([points[indices[0]], points[indices[1]], points[indices[2]]]);
    }
    triangles
}

fn is_convex_vertex(a: &Point, b: &Point, c: &Point) -> bool {
    cross(a, b, c) > EPS_GEOM
}

fn cross(a: &Point, b: &Point, c: &Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn point_in_triangle(p: &Point, a: &Point, b: &Point, c: &Point) -> bool {
    let d1 = cross(a, b, p);
    let d2 = cross(b, c, p);
    let d3 = cross(c, a, p);
    let has_neg = d1 < -EPS_GEOM || d2 < -EPS_GEOM || d3 < -EPS_GEOM;
    let has_pos = d1 > EPS_GEOM || d2 > EPS_GEOM || d3 > EPS_GEOM;
    !(has_neg && has_pos)
}

/// Minkowski sum of two convex, CCW polygons via edge merge: walk both
/// boundaries simultaneously, always advancing along whichever edge has
/// the smaller polar angle. `O(n+m)`.
pub fn convex_minkowski_sum(a: &[Point], b: &[Point]) -> Vec<Point> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    if a.len() == 1 {
        return b.iter().map(|p| Point::new(p.x + a[0].x, p.y + a[0].y)).collect();
    }
    if b.len() == 1 {
        return a.iter().map(|p| Point::new(p.x + b[0].x, p.y + b[0].y)).collect();
    }

    let start_a = lowest_point_index(a);
    let start_b = lowest_point_index(b);
    let na = a.len();
    let nb = b.len();

    let mut result = Vec::with_capacity(na + nb);
    let mut ia = start_a;
    let mut ib = start_b;
    let total = na + nb;
    for _ in 0..total {
        let cur = Point::new(a[ia].x + b[ib].x, a[ia].y + b[ib].y);
        result.push(cur);
        let a_next = a[(ia + 1) % na];
        let a_cur = a[ia];
        let b_next = b[(ib + 1) % nb];
        let b_cur = b[ib];
        let edge_a = (a_next.x - a_cur.x, a_next.y - a_cur.y);
        let edge_b = (b_next.x - b_cur.x, b_next.y - b_cur.y);
        let cross_ab = edge_a.0 * edge_b.1 - edge_a.1 * edge_b.0;
        if cross_ab >= 0.0 {
            ia = (ia + 1) % na;
        }
        if cross_ab <= 0.0 {
            ib = (ib + 1) % nb;
        }
    }
    dedup_consecutive(result)
}

fn lowest_point_index(points: &[Point]) -> usize {
    let mut best = 0;
    for (i, p) in points.iter().enumerate() {
        if p.y < points[best].y || (p.y == points[best].y && p.x < points[best].x) {
            best = i;
        }
    }
    best
}

fn dedup_consecutive(points: Vec<Point>) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if out
            .last()
            .map(|last| geometry::almost_equal_points(last, &p, EPS_GEOM))
            .unwrap_or(false)
        {
            continue;
        }
        out.push(p);
    }
    if out.len() > 1
        && geometry::almost_equal_points(&out[0], &out[out.len() - 1], EPS_GEOM)
    {
        out.pop();
    }
    out
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
    fn triangulate_square_yields_two_triangles() {
        let tris = triangulate(&square(1.0));
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn triangulate_triangle_is_itself() {
        let tri = vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(0.0, 1.0)];
        let tris = triangulate(&tri);
        assert_eq!(tris.len(), 1);
    }

    #[test]
    fn minkowski_sum_of_two_unit_squares_is_2x2_square() {
        let sum = convex_minkowski_sum(&square(1.0), &square(1.0));
        let area = geometry::polygon_area(&sum).abs();
        assert!((area - 4.0).abs() < 1e-6, "area was {area}");
    }

    #[test]
    fn triangulate_l_shape_covers_full_area() {
        let l_shape = vec![
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 2.0),
            Point::new(0.0, 2.0),
        ];
        let tris = triangulate(&l_shape);
        let total_area: f64 = tris
            .iter()
            .map(|t| geometry::polygon_area(t).abs())
            .sum();
        assert!((total_area - 3.0).abs() < 1e-6, "area was {total_area}");
    }
}
