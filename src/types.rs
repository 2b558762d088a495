//! Core data model (§3): `Point`, `Polygon`, parts/sheets, placements and
//! results, and the genetic `Individual`.

use serde::{Deserialize, Serialize};

/// A vertex. `exact` marks endpoints originating from straight input
/// segments (not curve tessellations); only exact/exact pairs participate
/// in line merging (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_exact")]
    pub exact: bool,
}

fn default_exact() -> bool {
    true
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y, exact: true }
    }

    pub fn inexact(x: f64, y: f64) -> Self {
        Point { x, y, exact: false }
    }
}

/// An ordered sequence of points forming a simple closed loop, with
/// optional holes (`children`), an opaque `source` identifier for NFP
/// caching, an absolute `rotation` in degrees, a unique per-instance `id`,
/// and a `sheet` flag marking it as a container rather than a placeable
/// part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
    #[serde(default)]
    pub children: Vec<Polygon>,
    #[serde(default)]
    pub source: Option<u64>,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub sheet: bool,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Polygon {
            points,
            children: Vec::new(),
            source: None,
            rotation: 0.0,
            id: 0,
            sheet: false,
        }
    }

    pub fn with_holes(points: Vec<Point>, children: Vec<Polygon>) -> Self {
        Polygon {
            points,
            children,
            source: None,
            rotation: 0.0,
            id: 0,
            sheet: false,
        }
    }
}

/// A placeable part, as supplied by ingestion (§6). `quantity` copies of
/// this source geometry are each assigned their own slot in a genetic
/// `Individual`'s `order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub source: u64,
    pub id: u64,
    pub quantity: u32,
    #[serde(default)]
    pub rotation: f64,
    pub polygon: Polygon,
}

impl Part {
    pub fn new(source: u64, id: u64, quantity: u32, rotation: f64, mut polygon: Polygon) -> Self {
        polygon.source = Some(source);
        polygon.id = id;
        polygon.rotation = rotation;
        Part {
            source,
            id,
            quantity,
            rotation,
            polygon,
        }
    }
}

/// A container polygon into which parts are placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub source: u64,
    pub id: u64,
    pub polygon: Polygon,
}

impl Sheet {
    pub fn new(source: u64, id: u64, mut polygon: Polygon) -> Self {
        polygon.source = Some(source);
        polygon.id = id;
        polygon.sheet = true;
        Sheet { source, id, polygon }
    }
}

/// One merged collinear segment between two distinct placed parts,
/// expressed in sheet coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergedSegment {
    pub a: Point,
    pub b: Point,
}

/// Where one part instance landed: the anchor point convention places the
/// rotated part's first polygon vertex at `(x, y)` in the sheet's frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetPlacement {
    pub source: u64,
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub rotation: f64,
    #[serde(default)]
    pub merged_length: Option<f64>,
    #[serde(default)]
    pub merged_segments: Option<Vec<MergedSegment>>,
}

/// All placements opened on a single sheet instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetResult {
    pub sheet_source: u64,
    pub sheet_id: u64,
    pub placements: Vec<SheetPlacement>,
}

/// A part instance (source + rotation) that could not be placed on any
/// opened sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnplacedPart {
    pub source: u64,
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestResult {
    pub sheets: Vec<SheetResult>,
    pub fitness: f64,
    pub utilisation: f64,
    pub merged_length: f64,
    #[serde(default)]
    pub unplaced: Vec<UnplacedPart>,
}

/// Terminal state of a run, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalState {
    Completed,
    Cancelled,
    Fatal,
}

/// `(A_source, B_source, A_rot_deg, B_rot_deg, inside)`. Rotations are
/// stored as millidegrees rounded to an integer so the key is `Eq + Hash`;
/// `inside=true` denotes inner-fit (B fits inside A's frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub a_source: u64,
    pub b_source: u64,
    pub a_rot_millideg: i64,
    pub b_rot_millideg: i64,
    pub inside: bool,
}

impl CacheKey {
    pub fn new(a_source: u64, b_source: u64, a_rot_deg: f64, b_rot_deg: f64, inside: bool) -> Self {
        CacheKey {
            a_source,
            b_source,
            a_rot_millideg: to_millideg(a_rot_deg),
            b_rot_millideg: to_millideg(b_rot_deg),
            inside,
        }
    }

    pub fn a_rotation(&self) -> f64 {
        from_millideg(self.a_rot_millideg)
    }

    pub fn b_rotation(&self) -> f64 {
        from_millideg(self.b_rot_millideg)
    }
}

pub fn to_millideg(deg: f64) -> i64 {
    (deg.rem_euclid(360.0) * 1000.0).round() as i64
}

pub(crate) fn from_millideg(m: i64) -> f64 {
    m as f64 / 1000.0
}

/// One candidate solution in the genetic population: a permutation of
/// part-instance indices plus a rotation (degrees) chosen per index.
/// Invariant: `order.len() == rotation.len() == sum(quantities)`.
#[derive(Debug, Clone)]
pub struct Individual {
    pub order: Vec<usize>,
    pub rotation: Vec<f64>,
}

impl Individual {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// One instance-slot of a part: `quantity > 1` parts are unrolled into one
/// `PartInstance` per unit so each occupies its own slot in `Individual`.
#[derive(Debug, Clone)]
pub struct PartInstance {
    pub part_index: usize,
    pub source: u64,
    pub id: u64,
    pub default_rotation: f64,
    pub polygon: Polygon,
}

/// Unroll `parts` (respecting `quantity`) into one slot per unit.
pub fn expand_parts(parts: &[Part]) -> Vec<PartInstance> {
    let mut out = Vec::new();
    for (part_index, part) in parts.iter().enumerate() {
        for copy in 0..part.quantity {
            out.push(PartInstance {
                part_index,
                source: part.source,
                id: part.id * 1_000_000 + copy as u64,
                default_rotation: part.rotation,
                polygon: part.polygon.clone(),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_parts_respects_quantity() {
        let p = Part::new(1, 1, 3, 0.0, Polygon::new(vec![]));
        let instances = expand_parts(&[p]);
        assert_eq!(instances.len(), 3);
        assert!(instances.iter().all(|i| i.source == 1));
    }

    #[test]
    fn cache_key_rotation_roundtrip() {
        let key = CacheKey::new(1, 2, 90.0, 180.5, true);
        assert_eq!(key.a_rotation(), 90.0);
        assert!((key.b_rotation() - 180.5).abs() < 1e-9);
    }

    #[test]
    fn cache_key_equal_for_identical_inputs() {
        let k1 = CacheKey::new(1, 2, 90.0, 0.0, false);
        let k2 = CacheKey::new(1, 2, 90.0, 0.0, false);
        assert_eq!(k1, k2);
    }
}
