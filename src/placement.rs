//! Deterministic placement engine (§4.D): greedy bottom-left / box / hull
//! placement of an ordered, rotated part sequence onto an ordered sheet
//! list, using cached NFPs, folding in line-merge savings and computing
//! the fitness term the genetic optimiser ranks by.

use std::collections::HashMap;

use crate::cache::NfpCache;
use crate::config::{NestConfig, PlacementType};
use crate::geometry::{self, Bounds};
use crate::line_merge;
use crate::nfp::{self, Nfp};
use crate::progress::CancellationToken;
use crate::types::{
    CacheKey, Individual, NestResult, PartInstance, Point, Polygon, Sheet, SheetPlacement,
    SheetResult, UnplacedPart,
};

/// Penalty weight on unplaced area, relative to total sheet area (§4.D).
const UNPLACED_PENALTY_WEIGHT: f64 = 1e8;

struct PlacedEntry {
    source: u64,
    id: u64,
    rotation: f64,
    /// The placed part's outline, already rotated and translated into the
    /// sheet's absolute coordinate frame.
    abs_points: Vec<Point>,
}

/// Partial-union memoisation for step 4.D.2.f: for a given `(source,
/// rotation)` key, remembers how many placed parts have already been
/// folded into the cached forbidden-region union, so a later candidate
/// sharing the same key only unions in the parts placed since. Valid only
/// because placement iterates placed parts in a fixed, append-only order
/// within one sheet (§11 open-question resolution).
#[derive(Default)]
struct PartialForbiddenCache {
    entries: HashMap<(u64, i64), (usize, Vec<Vec<Point>>)>,
}

/// Run the placement procedure for one genetic individual and compute its
/// fitness (§4.D, §4.F). `on_progress` receives values in `[0.5, 1.0]`
/// (the placement half of the shared progress interval, §4.D).
pub fn place(
    instances: &[PartInstance],
    individual: &Individual,
    sheets: &[Sheet],
    config: &NestConfig,
    cache: &NfpCache,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(f64),
) -> NestResult {
    let total = individual.order.len().max(1) as f64;
    let mut pending: Vec<(usize, f64)> = individual
        .order
        .iter()
        .zip(individual.rotation.iter())
        .map(|(&idx, &rot)| (idx, rot))
        .collect();

    let mut sheet_results = Vec::new();
    let mut placed_count = 0usize;
    let mut fitness = 0.0;
    let mut total_merged_length = 0.0;
    let mut total_placed_area = 0.0;
    let mut total_opened_area = 0.0;

    for sheet in sheets {
        if pending.is_empty() || cancel.is_cancelled() {
            break;
        }
        let sheet_polygon = simplified_sheet_polygon(sheet, config);
        let sheet_area = geometry::polygon_area(&sheet_polygon.points).abs();

        let mut placed: Vec<PlacedEntry> = Vec::new();
        let mut memo = PartialForbiddenCache::default();
        let mut deferred = Vec::new();
        let mut last_bbox_width = 0.0;

        for (instance_idx, requested_rotation) in pending.drain(..) {
            let instance = &instances[instance_idx];
            let Some((chosen_rotation, rotated_points, inner_nfp)) =
                fit_rotation(instance, sheet.source, requested_rotation, config, &sheet_polygon, cache)
            else {
                deferred.push((instance_idx, requested_rotation));
                continue;
            };

            let (x, y, cost) = if placed.is_empty() {
                let Some(anchor) = lexicographic_min(&inner_nfp) else {
                    deferred.push((instance_idx, requested_rotation));
                    continue;
                };
                (anchor.x, anchor.y, 0.0)
            } else {
                let forbidden = forbidden_region(
                    &mut memo,
                    instance.source,
                    chosen_rotation,
                    &placed,
                    &rotated_points,
                    config,
                    cache,
                );
                let feasible = subtract_many(&inner_nfp, &forbidden, config.clipper_scale);
                let Some((vx, vy, cost)) = select_best_vertex(&feasible, &placed, &rotated_points, config)
                else {
                    deferred.push((instance_idx, requested_rotation));
                    continue;
                };
                (vx, vy, cost)
            };

            let abs_points = translate(&rotated_points, x, y);
            let area = geometry::polygon_area(&abs_points).abs();
            total_placed_area += area;

            let bbox = combined_bounds(&placed, &abs_points);
            last_bbox_width = bbox.width;

            placed.push(PlacedEntry {
                source: instance.source,
                id: instance.id,
                rotation: chosen_rotation,
                abs_points,
            });
            placed_count += 1;
            fitness += cost;

            let denom = total.max(1.0);
            on_progress((0.5 + 0.5 * placed_count as f64 / denom).min(1.0));
        }

        if placed.is_empty() {
            pending = deferred;
            continue;
        }

        total_opened_area += sheet_area;
        fitness += sheet_area;
        if sheet_area > 0.0 {
            fitness += last_bbox_width / sheet_area;
        }

        // `abs_points[0]` is the anchor per the `SheetPlacement` convention.
        let mut sheet_placements: Vec<SheetPlacement> = placed
            .iter()
            .map(|p| {
                let anchor = p.abs_points.first().copied().unwrap_or(Point::new(0.0, 0.0));
                SheetPlacement {
                    source: p.source,
                    id: p.id,
                    x: anchor.x,
                    y: anchor.y,
                    rotation: p.rotation,
                    merged_length: None,
                    merged_segments: None,
                }
            })
            .collect();

        let merged = line_merge::merge_sheet(
            &mut sheet_placements,
            |source, id| {
                placed
                    .iter()
                    .find(|p| p.source == source && p.id == id)
                    .map(|p| Polygon::new(local_frame(&p.abs_points, p.rotation)))
            },
            config,
        );
        total_merged_length += merged;
        fitness -= merged * config.time_ratio;

        sheet_results.push(SheetResult {
            sheet_source: sheet.source,
            sheet_id: sheet.id,
            placements: sheet_placements,
        });

        pending = deferred;
    }

    let unplaced: Vec<UnplacedPart> = pending
        .iter()
        .map(|(idx, _)| {
            let instance = &instances[*idx];
            UnplacedPart { source: instance.source, id: instance.id }
        })
        .collect();

    let total_sheet_area: f64 = sheets
        .iter()
        .map(|s| geometry::polygon_area(&s.polygon.points).abs())
        .sum::<f64>()
        .max(1e-12);
    let unplaced_area: f64 = unplaced
        .iter()
        .zip(pending.iter())
        .map(|(_, (idx, _))| geometry::polygon_area(&instances[*idx].polygon.points).abs())
        .sum();
    fitness += UNPLACED_PENALTY_WEIGHT * (unplaced_area / total_sheet_area);

    let utilisation = if total_opened_area > 0.0 {
        (total_placed_area / total_opened_area).clamp(0.0, 1.0)
    } else {
        0.0
    };

    NestResult {
        sheets: sheet_results,
        fitness,
        utilisation,
        merged_length: total_merged_length,
        unplaced,
    }
}

/// Reconstruct a part's local-frame outline from its placed absolute
/// points, for the line-merge pass (which re-rotates/re-translates from
/// the local frame given a `SheetPlacement`).
fn local_frame(abs_points: &[Point], rotation: f64) -> Vec<Point> {
    let Some(anchor) = abs_points.first().copied() else {
        return Vec::new();
    };
    let shifted: Vec<Point> = abs_points
        .iter()
        .map(|p| Point { x: p.x - anchor.x, y: p.y - anchor.y, exact: p.exact })
        .collect();
    geometry::rotate_polygon(&shifted, -rotation)
}

/// Try the optimiser-chosen rotation first; on an empty inner-NFP, sweep
/// the configured rotation grid. Returns the first rotation (preferring
/// the requested one) admitting a non-empty inner-fit, its rotated
/// (un-translated) outline, and the inner-fit regions to place within.
///
/// Inner-fit is routed through the shared [`NfpCache`] too, keyed by
/// `(sheet_source, part_source, 0.0, rot, inside=true)` — the sheet never
/// rotates, so its rotation component of the key is fixed at zero (§4.C).
fn fit_rotation(
    instance: &PartInstance,
    sheet_source: u64,
    requested_rotation: f64,
    config: &NestConfig,
    sheet_polygon: &Polygon,
    cache: &NfpCache,
) -> Option<(f64, Vec<Point>, Vec<Vec<Point>>)> {
    let part_points = spaced_points(&instance.polygon, config);

    let mut candidates = vec![requested_rotation];
    candidates.extend(config.rotation_grid());

    let mut tried = std::collections::HashSet::new();
    for rot in candidates {
        let key = crate::types::to_millideg(rot);
        if !tried.insert(key) {
            continue;
        }
        let rotated = geometry::rotate_polygon(&part_points, rot);
        let cache_key = CacheKey::new(sheet_source, instance.source, 0.0, rot, true);
        let clipper_scale = config.clipper_scale;
        let container = sheet_polygon.clone();
        let rotated_for_compute = rotated.clone();
        let nfp = cache.get_or_compute(cache_key, move || {
            nfp::inner_fit_polygon(&container, &rotated_for_compute, clipper_scale)
        });
        if let Some(nfp) = nfp {
            let mut regions = nfp.regions;
            regions.extend(nfp.children);
            if !regions.is_empty() {
                return Some((rot, rotated, regions));
            }
        }
    }
    None
}

/// The sheet polygon as placement sees it: holes dropped when
/// `config.simplify` is set (§4.D, §6 `simplify`).
pub(crate) fn simplified_sheet_polygon(sheet: &Sheet, config: &NestConfig) -> Polygon {
    if config.simplify {
        let mut c = sheet.polygon.clone();
        c.children.clear();
        c
    } else {
        sheet.polygon.clone()
    }
}

/// Apply `config.spacing` as an outward polygon offset so placed parts
/// keep clearance from each other (§6 `spacing`).
pub(crate) fn spaced_points(polygon: &Polygon, config: &NestConfig) -> Vec<Point> {
    if config.spacing <= 0.0 {
        return polygon.points.clone();
    }
    let offset = geometry::polygon_offset(&polygon.points, config.spacing, config.clipper_scale);
    offset.into_iter().next().unwrap_or_else(|| polygon.points.clone())
}

fn lexicographic_min(regions: &[Vec<Point>]) -> Option<Point> {
    regions
        .iter()
        .flatten()
        .min_by(|a, b| {
            a.x.partial_cmp(&b.x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
        })
        .copied()
}

/// Union of outer-NFPs of each placed part vs the candidate `(source,
/// rotation)`, amortised via `memo` (§4.D.2.f). Each pairwise outer NFP is
/// computed once in a translation-invariant local frame (both operands
/// shifted so their reference vertex sits at the origin) and routed
/// through the shared [`NfpCache`], keyed by `(A_source, B_source, A_rot,
/// B_rot, inside=false)` (§4.C); the cached ring is then translated by the
/// placed part's own anchor to get absolute forbidden-region geometry.
fn forbidden_region(
    memo: &mut PartialForbiddenCache,
    candidate_source: u64,
    candidate_rotation: f64,
    placed: &[PlacedEntry],
    candidate_points: &[Point],
    config: &NestConfig,
    cache: &NfpCache,
) -> Vec<Vec<Point>> {
    let memo_key = (candidate_source, crate::types::to_millideg(candidate_rotation));
    let (start, mut unioned) = memo.entries.get(&memo_key).cloned().unwrap_or((0, Vec::new()));
    let candidate_local = to_origin(candidate_points);

    for entry in &placed[start.min(placed.len())..] {
        let anchor = entry.abs_points.first().copied().unwrap_or(Point::new(0.0, 0.0));
        let entry_local = to_origin(&entry.abs_points);
        let cache_key = CacheKey::new(entry.source, candidate_source, entry.rotation, candidate_rotation, false);
        let clipper_scale = config.clipper_scale;
        let cached = cache.get_or_compute(cache_key, || {
            nfp::minkowski_outer_nfp(&entry_local, &candidate_local, clipper_scale)
                .map(|ring| Nfp { regions: vec![ring], children: Vec::new() })
        });
        let Some(ring) = cached.and_then(|nfp| nfp.regions.into_iter().next()) else {
            continue;
        };
        let absolute_ring: Vec<Point> = ring.iter().map(|p| Point::new(p.x + anchor.x, p.y + anchor.y)).collect();

        if unioned.is_empty() {
            unioned = vec![absolute_ring];
        } else {
            let mut merged = Vec::new();
            for existing in &unioned {
                merged.extend(geometry::union(existing, &absolute_ring, config.clipper_scale));
            }
            if merged.is_empty() {
                merged.push(absolute_ring);
            }
            unioned = merged;
        }
    }

    memo.entries.insert(memo_key, (placed.len(), unioned.clone()));
    unioned
}

pub(crate) fn to_origin(points: &[Point]) -> Vec<Point> {
    let Some(origin) = points.first().copied() else {
        return Vec::new();
    };
    points
        .iter()
        .map(|p| Point { x: p.x - origin.x, y: p.y - origin.y, exact: p.exact })
        .collect()
}

fn subtract_many(base_regions: &[Vec<Point>], forbidden: &[Vec<Point>], clipper_scale: f64) -> Vec<Vec<Point>> {
    if forbidden.is_empty() {
        return base_regions.to_vec();
    }
    let mut result = Vec::new();
    for region in base_regions {
        let mut pieces = vec![region.clone()];
        for f in forbidden {
            let mut next = Vec::new();
            for piece in &pieces {
                let diff = geometry::difference(piece, f, clipper_scale);
                if diff.is_empty() {
                    continue;
                }
                next.extend(diff);
            }
            pieces = next;
            if pieces.is_empty() {
                break;
            }
        }
        result.extend(pieces);
    }
    result
}

fn select_best_vertex(
    feasible: &[Vec<Point>],
    placed: &[PlacedEntry],
    candidate_points: &[Point],
    config: &NestConfig,
) -> Option<(f64, f64, f64)> {
    let mut best: Option<(f64, f64, f64)> = None;
    for vertex in feasible.iter().flatten() {
        let trial_abs = translate(candidate_points, vertex.x, vertex.y);
        let bbox = combined_bounds(placed, &trial_abs);
        let merge_estimate = estimate_merge_length(placed, &trial_abs, config);
        let mut cost = match config.placement_type {
            PlacementType::Gravity => 2.0 * bbox.width + bbox.height,
            PlacementType::Box => bbox.width * bbox.height,
            PlacementType::Convexhull => {
                let mut all: Vec<Point> = placed.iter().flat_map(|p| p.abs_points.clone()).collect();
                all.extend(trial_abs.iter().copied());
                geometry::polygon_area(&geometry::convex_hull(&all)).abs()
            }
        };
        if config.merge_lines {
            cost -= merge_estimate * config.time_ratio;
        }
        let better = match &best {
            None => true,
            Some((_, _, best_cost)) => {
                cost < *best_cost - 1e-12
                    || ((cost - *best_cost).abs() <= 1e-12
                        && tie_break_better(vertex, best.as_ref().unwrap()))
            }
        };
        if better {
            best = Some((vertex.x, vertex.y, cost));
        }
    }
    best
}

fn tie_break_better(candidate: &Point, current_best: &(f64, f64, f64)) -> bool {
    candidate.x < current_best.0 - 1e-12
        || ((candidate.x - current_best.0).abs() <= 1e-12 && candidate.y < current_best.1 - 1e-12)
}

/// Lightweight line-merge estimate used only to rank trial placements
/// (§4.D.2.d): checks the candidate's edges against every already-placed
/// part's edges, without mutating any placement (the authoritative merge
/// runs once per finished sheet via [`line_merge::merge_sheet`]).
fn estimate_merge_length(placed: &[PlacedEntry], trial_abs: &[Point], config: &NestConfig) -> f64 {
    if !config.merge_lines || trial_abs.len() < 2 {
        return 0.0;
    }
    let min_length = config.min_merge_length();
    let tolerance = 0.1 * config.curve_tolerance;
    let n = trial_abs.len();
    let trial_edges: Vec<(Point, Point)> =
        (0..n).map(|i| (trial_abs[i], trial_abs[(i + 1) % n])).collect();

    let mut total = 0.0;
    for entry in placed {
        let m = entry.abs_points.len();
        if m < 2 {
            continue;
        }
        for i in 0..m {
            let (a, b) = (entry.abs_points[i], entry.abs_points[(i + 1) % m]);
            if !(a.exact && b.exact) {
                continue;
            }
            for &(c, d) in &trial_edges {
                if !(c.exact && d.exact) {
                    continue;
                }
                if let Some((_, length)) = line_merge::collinear_overlap(a, b, c, d, tolerance) {
                    if length >= min_length {
                        total += length;
                    }
                }
            }
        }
    }
    total
}

fn translate(points: &[Point], x: f64, y: f64) -> Vec<Point> {
    let Some(anchor) = points.first().copied() else {
        return Vec::new();
    };
    points
        .iter()
        .map(|p| Point { x: p.x - anchor.x + x, y: p.y - anchor.y + y, exact: p.exact })
        .collect()
}

fn combined_bounds(placed: &[PlacedEntry], trial: &[Point]) -> Bounds {
    let mut bounds = geometry::polygon_bounds(trial).unwrap_or(Bounds { x: 0.0, y: 0.0, width: 0.0, height: 0.0 });
    for entry in placed {
        if let Some(b) = geometry::polygon_bounds(&entry.abs_points) {
            bounds = bounds.union(&b);
        }
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CancellationToken;
    use crate::types::{Part, Sheet};

    fn square(side: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ])
    }

    #[test]
    fn exact_fit_single_part_places_at_origin() {
        let sheet = Sheet::new(1, 1, square(100.0));
        let part = Part::new(2, 2, 1, 0.0, square(100.0));
        let instances = crate::types::expand_parts(&[part]);
        let individual = Individual { order: vec![0], rotation: vec![0.0] };
        let config = NestConfig::default();
        let cache = NfpCache::new();
        let cancel = CancellationToken::new();
        let result = place(&instances, &individual, &[sheet], &config, &cache, &cancel, |_| {});
        assert_eq!(result.sheets.len(), 1);
        assert_eq!(result.sheets[0].placements.len(), 1);
        assert!(result.unplaced.is_empty());
        assert!((result.utilisation - 1.0).abs() < 1e-6);
    }

    #[test]
    fn oversized_part_is_unplaced() {
        let sheet = Sheet::new(1, 1, square(10.0));
        let part = Part::new(2, 2, 1, 0.0, square(20.0));
        let instances = crate::types::expand_parts(&[part]);
        let individual = Individual { order: vec![0], rotation: vec![0.0] };
        let config = NestConfig::default();
        let cache = NfpCache::new();
        let cancel = CancellationToken::new();
        let result = place(&instances, &individual, &[sheet], &config, &cache, &cancel, |_| {});
        assert_eq!(result.sheets.len(), 0);
        assert_eq!(result.unplaced.len(), 1);
    }

    #[test]
    fn two_squares_fit_side_by_side() {
        let sheet = Sheet::new(1, 1, square(200.0));
        let part = Part::new(2, 2, 2, 0.0, square(100.0));
        let instances = crate::types::expand_parts(&[part]);
        let individual = Individual { order: vec![0, 1], rotation: vec![0.0, 0.0] };
        let config = NestConfig::default();
        let cache = NfpCache::new();
        let cancel = CancellationToken::new();
        let result = place(&instances, &individual, &[sheet], &config, &cache, &cancel, |_| {});
        assert_eq!(result.sheets[0].placements.len(), 2);
        assert!(result.unplaced.is_empty());
    }
}
