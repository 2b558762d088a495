//! Engine-level property tests (§8 P3, P6, P7) and a couple of NFP
//! kernel scenarios, driving the library API directly rather than
//! through the CLI subprocess (tests/cli.rs covers the latter).

use nest_engine::cache::NfpCache;
use nest_engine::config::NestConfig;
use nest_engine::geometry;
use nest_engine::nfp;
use nest_engine::placement;
use nest_engine::progress::CancellationToken;
use nest_engine::types::{expand_parts, Individual, Part, Point, Polygon, Sheet};

fn square(side: f64) -> Vec<Point> {
    vec![
        Point::new(0.0, 0.0),
        Point::new(side, 0.0),
        Point::new(side, side),
        Point::new(0.0, side),
    ]
}

fn l_shape() -> Vec<Point> {
    vec![
        Point::new(0.0, 0.0),
        Point::new(2.0, 0.0),
        Point::new(2.0, 1.0),
        Point::new(1.0, 1.0),
        Point::new(1.0, 2.0),
        Point::new(0.0, 2.0),
    ]
}

/// The concave-container erosion path (§4.B path 2) admits a square
/// small enough to fit one of the L-shape's convex triangles.
#[test]
fn concave_container_inner_fit_admits_small_part() {
    let container = Polygon::new(l_shape());
    let part = square(0.5);
    let nfp = nfp::inner_fit_polygon(&container, &part, geometry::CLIPPER_SCALE).unwrap();
    assert!(!nfp.regions.is_empty());
}

/// P6: if sheet and part are both axis-aligned rectangles with part
/// strictly smaller in both dimensions, the analytic rectangle shortcut
/// agrees with the general erosion path on feasibility (both admit it).
#[test]
fn rectangle_shortcut_agrees_with_general_path_on_feasibility() {
    let container = Polygon::new(square(10.0));
    let part = square(2.0);

    let shortcut = nfp::rectangle_inner_nfp(&container, &part);
    let general = nfp::inner_fit_polygon(&container, &part, geometry::CLIPPER_SCALE);
    assert!(shortcut.is_some());
    assert!(general.is_some());
}

/// P6: part larger than the sheet in one dimension has no placement.
#[test]
fn rectangle_shortcut_rejects_part_larger_than_container() {
    let container = Polygon::new(square(10.0));
    let part = square(20.0);
    assert!(nfp::rectangle_inner_nfp(&container, &part).is_none());
}

/// P3: placements on the same sheet never overlap (measured by
/// intersection area below the geometric tolerance).
#[test]
fn placed_parts_on_same_sheet_do_not_overlap() {
    let part = Part::new(1, 1, 4, 0.0, Polygon::new(square(10.0)));
    let sheet = Sheet::new(2, 1, Polygon::new(square(100.0)));
    let instances = expand_parts(&[part]);
    let individual = Individual {
        order: (0..instances.len()).collect(),
        rotation: vec![0.0; instances.len()],
    };
    let config = NestConfig::default();
    let cache = NfpCache::new();
    let cancel = CancellationToken::new();
    let result = placement::place(&instances, &individual, &[sheet], &config, &cache, &cancel, |_| {});

    assert_eq!(result.sheets.len(), 1);
    let placed = &result.sheets[0].placements;
    assert!(placed.len() >= 2);

    for i in 0..placed.len() {
        for j in (i + 1)..placed.len() {
            let a = absolute_square(&placed[i], 10.0);
            let b = absolute_square(&placed[j], 10.0);
            let overlap = geometry::intersection(&a, &b, config.clipper_scale);
            let area: f64 = overlap.iter().map(|r| geometry::polygon_area(r).abs()).sum();
            assert!(area < 1e-6, "placements {i} and {j} overlap by {area}");
        }
    }
}

fn absolute_square(placement: &nest_engine::types::SheetPlacement, side: f64) -> Vec<Point> {
    let local = geometry::rotate_polygon(&square(side), placement.rotation);
    let anchor = local[0];
    local
        .iter()
        .map(|p| Point::new(p.x - anchor.x + placement.x, p.y - anchor.y + placement.y))
        .collect()
}

/// P7: every rotation the optimiser assigns lies on the configured
/// discrete grid.
#[test]
fn rotation_grid_has_expected_step() {
    let mut config = NestConfig::default();
    config.rotations = 8;
    let grid = config.rotation_grid();
    assert_eq!(grid.len(), 8);
    for (i, &deg) in grid.iter().enumerate() {
        assert!((deg - i as f64 * 45.0).abs() < 1e-9);
    }
}

/// P4: two placement runs over identical instances/individual/config
/// produce identical fitness (no hidden nondeterminism in the
/// deterministic placement pass itself).
#[test]
fn placement_is_deterministic_given_fixed_individual() {
    let part = Part::new(1, 1, 3, 0.0, Polygon::new(square(10.0)));
    let sheet = Sheet::new(2, 1, Polygon::new(square(100.0)));
    let instances = expand_parts(&[part]);
    let individual = Individual {
        order: (0..instances.len()).collect(),
        rotation: vec![0.0; instances.len()],
    };
    let config = NestConfig::default();

    let cache_a = NfpCache::new();
    let cancel_a = CancellationToken::new();
    let result_a = placement::place(&instances, &individual, &[sheet.clone()], &config, &cache_a, &cancel_a, |_| {});

    let cache_b = NfpCache::new();
    let cancel_b = CancellationToken::new();
    let result_b = placement::place(&instances, &individual, &[sheet], &config, &cache_b, &cancel_b, |_| {});

    assert_eq!(result_a.fitness, result_b.fitness);
    assert_eq!(result_a.sheets.len(), result_b.sheets.len());
}
