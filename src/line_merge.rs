//! Line-merge post-process (§4.F): detect collinear, overlapping edges
//! between distinct placed parts on the same sheet, accumulate merged
//! length, and fold it into the fitness via `timeRatio`.

use crate::config::NestConfig;
use crate::geometry;
use crate::types::{MergedSegment, Point, Polygon, SheetPlacement};

struct AbsoluteEdge {
    placement_index: usize,
    a: Point,
    b: Point,
}

/// Absolute position of a placed part's vertices: the rotated polygon's
/// first vertex is anchored at `(placement.x, placement.y)` (the anchor
/// convention documented on `SheetPlacement`).
fn absolute_points(polygon: &Polygon, placement: &SheetPlacement) -> Vec<Point> {
    let rotated = geometry::rotate_polygon(&polygon.points, placement.rotation);
    let Some(anchor) = rotated.first().copied() else {
        return Vec::new();
    };
    rotated
        .iter()
        .map(|p| Point {
            x: p.x - anchor.x + placement.x,
            y: p.y - anchor.y + placement.y,
            exact: p.exact,
        })
        .collect()
}

fn edges_for(points: &[Point], placement_index: usize) -> Vec<AbsoluteEdge> {
    let n = points.len();
    if n < 2 {
        return Vec::new();
    }
    (0..n)
        .map(|i| AbsoluteEdge {
            placement_index,
            a: points[i],
            b: points[(i + 1) % n],
        })
        .collect()
}

/// Merge collinear, overlapping edges across all placements on one sheet.
/// `polygon_for` resolves a placement's part geometry (in its own local
/// frame, unrotated) by `(source, id)`. Mutates each involved placement's
/// `merged_length`/`merged_segments` and returns the sheet's total merged
/// length.
pub fn merge_sheet(
    placements: &mut [SheetPlacement],
    polygon_for: impl Fn(u64, u64) -> Option<Polygon>,
    config: &NestConfig,
) -> f64 {
    if !config.merge_lines || placements.len() < 2 {
        return 0.0;
    }

    let min_length = config.min_merge_length();
    let collinearity_tolerance = 0.1 * config.curve_tolerance;

    let mut edges = Vec::new();
    for (idx, placement) in placements.iter().enumerate() {
        let Some(polygon) = polygon_for(placement.source, placement.id) else {
            continue;
        };
        let abs_points = absolute_points(&polygon, placement);
        edges.extend(edges_for(&abs_points, idx));
    }

    let mut total = 0.0;
    let mut contributions: Vec<(usize, f64, MergedSegment)> = Vec::new();

    for i in 0..edges.len() {
        for j in (i + 1)..edges.len() {
            let e1 = &edges[i];
            let e2 = &edges[j];
            if e1.placement_index == e2.placement_index {
                continue;
            }
            if !(e1.a.exact && e1.b.exact && e2.a.exact && e2.b.exact) {
                continue;
            }
            let Some((overlap, length)) =
                collinear_overlap(e1.a, e1.b, e2.a, e2.b, collinearity_tolerance)
            else {
                continue;
            };
            if length < min_length {
                continue;
            }
            total += length;
            contributions.push((e1.placement_index, length, overlap));
            contributions.push((e2.placement_index, length, overlap));
        }
    }

    for (idx, length, segment) in contributions {
        let placement = &mut placements[idx];
        *placement.merged_length.get_or_insert(0.0) += length;
        placement.merged_segments.get_or_insert_with(Vec::new).push(segment);
    }

    total
}

/// `None` unless `(a1,b1)` and `(a2,b2)` are parallel within
/// `tolerance` (radians-equivalent cross/length test) and the
/// perpendicular distance between the two lines is within `tolerance`
/// (in the same units as `a1`/`b1`). On success, returns the overlap
/// segment (in the first edge's frame) and its length.
pub(crate) fn collinear_overlap(
    a1: Point,
    b1: Point,
    a2: Point,
    b2: Point,
    tolerance: f64,
) -> Option<(MergedSegment, f64)> {
    let d1 = (b1.x - a1.x, b1.y - a1.y);
    let len1 = (d1.0 * d1.0 + d1.1 * d1.1).sqrt();
    if len1 < 1e-12 {
        return None;
    }
    let dir1 = (d1.0 / len1, d1.1 / len1);

    let d2 = (b2.x - a2.x, b2.y - a2.y);
    let len2 = (d2.0 * d2.0 + d2.1 * d2.1).sqrt();
    if len2 < 1e-12 {
        return None;
    }
    let dir2 = (d2.0 / len2, d2.1 / len2);

    let cross = dir1.0 * dir2.1 - dir1.1 * dir2.0;
    if cross.abs() > tolerance {
        return None;
    }

    // perpendicular distance of a2 from the line through a1 along dir1
    let rel = (a2.x - a1.x, a2.y - a1.y);
    let perp = (rel.0 * -dir1.1 + rel.1 * dir1.0).abs();
    if perp > tolerance {
        return None;
    }

    let project = |p: Point| -> f64 { (p.x - a1.x) * dir1.0 + (p.y - a1.y) * dir1.1 };
    let (mut lo, mut hi) = (0.0, len1);
    let (t_a2, t_b2) = (project(a2), project(b2));
    let (t_lo2, t_hi2) = if t_a2 <= t_b2 { (t_a2, t_b2) } else { (t_b2, t_a2) };
    lo = lo.max(t_lo2);
    hi = hi.min(t_hi2);
    if hi <= lo {
        return None;
    }

    let length = hi - lo;
    let start = Point::new(a1.x + dir1.0 * lo, a1.y + dir1.1 * lo);
    let end = Point::new(a1.x + dir1.0 * hi, a1.y + dir1.1 * hi);
    Some((MergedSegment { a: start, b: end }, length))
}
