//! No-Fit Polygon kernel (§4.B): outer NFP via Minkowski sum, inner-fit
//! via triangulated erosion, and the analytic rectangle shortcut.

use tracing::warn;

use crate::geometry::{self, EPS_GEOM};
use crate::triangulate;
use crate::types::{Point, Polygon};

/// Zero-area filter threshold for rings returned by the clipping backend,
/// in the same (unscaled) units as the input — concentric touches produce
/// zero-area rings that must be discarded (§4.B).
const EPS_AREA: f64 = EPS_GEOM * EPS_GEOM;

/// Result of an NFP computation. `boundary` is the canonical outer-orbit
/// ring (outer NFP) or one of potentially several disjoint feasible
/// regions (inner-fit of a concave container). `children` holds feasible
/// interior regions — e.g. where B also fits inside a hole of A.
#[derive(Debug, Clone)]
pub struct Nfp {
    pub regions: Vec<Vec<Point>>,
    pub children: Vec<Vec<Point>>,
}

impl Nfp {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn canonical_ring(rings: &[Vec<Point>]) -> Option<Vec<Point>> {
    rings
        .iter()
        .filter(|r| geometry::polygon_area(r).abs() > EPS_AREA)
        .max_by(|a, b| {
            geometry::polygon_area(a)
                .abs()
                .partial_cmp(&geometry::polygon_area(b).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}

/// Minkowski sum of `a` with reflected `b`, translated so that `b`'s
/// reference vertex (its first point) aligns with `a`'s own frame. This
/// is the outer no-fit polygon of A vs B (§4.B path 1), ignoring holes in
/// either operand (used at call sites where holes have already been
/// stripped, e.g. inter-part collision checks with `config.simplify`).
pub fn minkowski_outer_nfp(a: &[Point], b: &[Point], clipper_scale: f64) -> Option<Vec<Point>> {
    if a.len() < 3 || b.len() < 3 {
        return None;
    }
    let b_ref = b[0];
    let reflected_b: Vec<Point> = b
        .iter()
        .map(|p| Point::new(-(p.x - b_ref.x), -(p.y - b_ref.y)))
        .collect();

    let tris_a = triangulate::triangulate(a);
    let tris_b = triangulate::triangulate(&reflected_b);
    if tris_a.is_empty() || tris_b.is_empty() {
        return try_jittered_retry(a, b, clipper_scale);
    }

    let mut rings: Vec<Vec<Point>> = Vec::new();
    for ta in &tris_a {
        for tb in &tris_b {
            let sum = triangulate::convex_minkowski_sum(ta, tb);
            if sum.len() >= 3 {
                rings.push(sum);
            }
        }
    }
    if rings.is_empty() {
        return None;
    }

    let mut unioned = rings[0].clone();
    for ring in &rings[1..] {
        let merged = geometry::union(&unioned, ring, clipper_scale);
        if let Some(best) = canonical_ring(&merged) {
            unioned = best;
        }
    }

    canonical_ring(&[unioned]).map(|ring| translate_to_reference(ring, b_ref))
}

fn translate_to_reference(ring: Vec<Point>, _b_ref: Point) -> Vec<Point> {
    // `ring` already encodes offsets of b's reference vertex relative to
    // a's frame (b was reflected about its own reference point before
    // summing), so no further translation is needed.
    ring
}

fn try_jittered_retry(a: &[Point], b: &[Point], clipper_scale: f64) -> Option<Vec<Point>> {
    const JITTER: f64 = EPS_GEOM;
    let jittered_b: Vec<Point> = b
        .iter()
        .map(|p| Point {
            x: p.x + JITTER,
            y: p.y + JITTER,
            exact: p.exact,
        })
        .collect();
    let tris_a = triangulate::triangulate(a);
    let tris_b = triangulate::triangulate(&jittered_b);
    if tris_a.is_empty() || tris_b.is_empty() {
        warn!(
            a_len = a.len(),
            b_len = b.len(),
            "NFP degenerate after jittered retry"
        );
        return None;
    }
    let mut rings: Vec<Vec<Point>> = Vec::new();
    for ta in &tris_a {
        for tb in &tris_b {
            let sum = triangulate::convex_minkowski_sum(ta, tb);
            if sum.len() >= 3 {
                rings.push(sum);
            }
        }
    }
    canonical_ring(&rings)
}

/// Outer NFP shortcut: when `a` is an axis-aligned rectangle with no
/// holes, the outer NFP of A vs B is just A's bounds offset outward by
/// B's bounds — but the general spec-documented shortcut is for the
/// *inner* fit (see [`rectangle_inner_nfp`]); this helper exists for
/// symmetry and is used by the placement engine's rectangle fast path
/// for sheet-vs-sheet bounding checks.
pub fn no_fit_polygon(a: &Polygon, b: &Polygon, clipper_scale: f64) -> Option<Nfp> {
    let boundary = minkowski_outer_nfp(&a.points, &b.points, clipper_scale)?;
    Some(Nfp {
        regions: vec![boundary],
        children: Vec::new(),
    })
}

/// Analytic inner-fit shortcut: A and B both axis-aligned rectangles, A
/// has no holes. `None` if B doesn't fit in either dimension (P6).
pub fn rectangle_inner_nfp(container: &Polygon, part: &[Point]) -> Option<Vec<Point>> {
    if !container.children.is_empty() {
        return None;
    }
    if !geometry::is_rectangle(&container.points, EPS_GEOM) {
        return None;
    }
    let a_bounds = geometry::polygon_bounds(&container.points)?;
    let b_bounds = geometry::polygon_bounds(part)?;
    if b_bounds.width > a_bounds.width || b_bounds.height > a_bounds.height {
        return None;
    }
    let min_x = a_bounds.x - b_bounds.x;
    let min_y = a_bounds.y - b_bounds.y;
    let max_x = a_bounds.x + a_bounds.width - b_bounds.width - b_bounds.x;
    let max_y = a_bounds.y + a_bounds.height - b_bounds.height - b_bounds.y;
    Some(vec![
        Point::new(min_x, min_y),
        Point::new(max_x, min_y),
        Point::new(max_x, max_y),
        Point::new(min_x, max_y),
    ])
}

/// General inner-fit polygon (§4.B path 2): the locus of valid reference-
/// point translations `t` such that `B+t` lies entirely inside
/// `container` (respecting holes). `container`'s solid area (outer minus
/// holes) is ear-clip triangulated; each convex piece's erosion by `B` is
/// the intersection of `piece` translated by `-v` for every vertex `v` of
/// `B` (exact for convex pieces); the feasible set is the union of all
/// per-piece erosions. Holes large enough (bounding-box filter) to admit
/// `B` get their own erosion, exposed as `Nfp::children`.
pub fn inner_fit_polygon(container: &Polygon, part: &[Point], clipper_scale: f64) -> Option<Nfp> {
    if let Some(rect) = rectangle_inner_nfp(container, part) {
        return Some(Nfp {
            regions: vec![rect],
            children: Vec::new(),
        });
    }

    let part_bounds = geometry::polygon_bounds(part)?;

    let solid_pieces = solid_region_triangles(container, clipper_scale);
    if solid_pieces.is_empty() {
        return None;
    }

    let mut regions: Vec<Vec<Point>> = Vec::new();
    for piece in &solid_pieces {
        if let Some(piece_bounds) = geometry::polygon_bounds(piece) {
            if piece_bounds.width < part_bounds.width || piece_bounds.height < part_bounds.height
            {
                continue;
            }
        }
        if let Some(region) = erode_convex(piece, part, clipper_scale) {
            regions.push(region);
        }
    }

    let children = container
        .children
        .iter()
        .filter_map(|hole| {
            let hole_bounds = geometry::polygon_bounds(&hole.points)?;
            if hole_bounds.width < part_bounds.width || hole_bounds.height < part_bounds.height {
                return None;
            }
            let tris = triangulate::triangulate(&hole.points);
            let mut hole_regions = Vec::new();
            for t in &tris {
                if let Some(r) = erode_convex(t, part, clipper_scale) {
                    hole_regions.push(r);
                }
            }
            canonical_ring(&hole_regions)
        })
        .collect();

    if regions.is_empty() {
        None
    } else {
        Some(Nfp { regions, children })
    }
}

/// Triangulate `container`'s solid area (outer boundary minus holes).
fn solid_region_triangles(container: &Polygon, clipper_scale: f64) -> Vec<Vec<Point>> {
    let mut pieces = triangulate::triangulate(&container.points)
        .into_iter()
        .map(|t| t.to_vec())
        .collect::<Vec<_>>();

    for hole in &container.children {
        let mut next = Vec::new();
        for piece in &pieces {
            let remainder = geometry::difference(piece, &hole.points, clipper_scale);
            if remainder.is_empty() {
                next.push(piece.clone());
                continue;
            }
            for ring in remainder {
                next.extend(
                    triangulate::triangulate(&ring)
                        .into_iter()
                        .map(|t| t.to_vec()),
                );
            }
        }
        pieces = next;
    }
    pieces
}

/// Erosion of convex `piece` by `part`: intersection of `piece` translated
/// by `-v` for every vertex `v` of `part`.
fn erode_convex(piece: &[Point], part: &[Point], clipper_scale: f64) -> Option<Vec<Point>> {
    if part.is_empty() {
        return None;
    }
    let mut acc: Vec<Vec<Point>> = vec![piece.to_vec()];
    for v in part {
        let translated: Vec<Point> = piece.iter().map(|p| Point::new(p.x - v.x, p.y - v.y)).collect();
        let mut next = Vec::new();
        for region in &acc {
            next.extend(geometry::intersection(region, &translated, clipper_scale));
        }
        acc = next;
        if acc.is_empty() {
            return None;
        }
    }
    canonical_ring(&acc)
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
    fn rectangle_shortcut_exact_fit_is_single_point() {
        let container = Polygon::new(square(10.0));
        let part = square(10.0);
        let nfp = rectangle_inner_nfp(&container, &part).unwrap();
        for p in &nfp {
            assert!((p.x - 0.0).abs() < 1e-9);
            assert!((p.y - 0.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rectangle_shortcut_rejects_oversized_part() {
        let container = Polygon::new(square(5.0));
        let part = square(10.0);
        assert!(rectangle_inner_nfp(&container, &part).is_none());
    }

    #[test]
    fn rectangle_shortcut_smaller_part_has_nonzero_region() {
        let container = Polygon::new(square(10.0));
        let part = square(2.0);
        let nfp = rectangle_inner_nfp(&container, &part).unwrap();
        let area = geometry::polygon_area(&nfp).abs();
        assert!((area - 64.0).abs() < 1e-6);
    }

    #[test]
    fn outer_nfp_of_two_unit_squares_has_area() {
        let nfp = minkowski_outer_nfp(&square(1.0), &square(1.0), geometry::CLIPPER_SCALE).unwrap();
        let area = geometry::polygon_area(&nfp).abs();
        assert!(area > 0.0);
    }

    #[test]
    fn inner_fit_with_hole_admits_smaller_part_in_hole() {
        let outer = vec![
            Point::new(0.0, 0.0),
            Point::new(200.0, 0.0),
            Point::new(200.0, 200.0),
            Point::new(0.0, 200.0),
        ];
        let hole = vec![
            Point::new(50.0, 50.0),
            Point::new(150.0, 50.0),
            Point::new(150.0, 150.0),
            Point::new(50.0, 150.0),
        ];
        let mut hole_poly = Polygon::new(hole);
        geometry::normalize_winding(&mut hole_poly.points, true);
        let container = Polygon::with_holes(outer, vec![hole_poly]);
        let part = square(80.0);
        let nfp = inner_fit_polygon(&container, &part, geometry::CLIPPER_SCALE).unwrap();
        assert!(!nfp.children.is_empty(), "expected a feasible hole region");
    }
}
