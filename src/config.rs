//! `NestConfig`: the recognised engine options and their defaults (§6).

use serde::{Deserialize, Serialize};

use crate::error::{NestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Mm,
    Inch,
}

impl Default for Units {
    fn default() -> Self {
        Units::Mm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementType {
    Gravity,
    Box,
    Convexhull,
}

impl Default for PlacementType {
    fn default() -> Self {
        PlacementType::Gravity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NestConfig {
    pub units: Units,
    /// Internal units per inch; all lengths are multiplied by this before
    /// geometry is touched.
    pub scale: f64,
    /// Per-part clearance in internal units, applied as a polygon offset.
    pub spacing: f64,
    /// Max chord-error for curve tessellation; the engine only consumes it
    /// as `0.1 * curve_tolerance` in line merging.
    pub curve_tolerance: f64,
    /// Equally-spaced discrete rotations on `[0,360)`. `360` means a
    /// 1-degree grid.
    pub rotations: u32,
    /// Worker pool size.
    pub threads: usize,
    pub population_size: usize,
    /// Percent, 1-50.
    pub mutation_rate: u32,
    pub placement_type: PlacementType,
    pub merge_lines: bool,
    /// Blend between material (0) and cut-time (1) in the fitness.
    pub time_ratio: f64,
    /// If true, holes are dropped from per-part NFP computation.
    pub simplify: bool,
    pub clipper_scale: f64,
    pub endpoint_tolerance: f64,
    /// Multiplier on `scale` used for the line-merge minimum length
    /// (`min_merge_length = merge_length_factor * scale`); see
    /// SPEC_FULL.md §11 open-question resolution.
    pub merge_length_factor: f64,
    /// Optional seed for the genetic optimiser's RNG. Absent means the
    /// configured default (0) is used.
    pub rng_seed: Option<u64>,
}

impl Default for NestConfig {
    fn default() -> Self {
        NestConfig {
            units: Units::Mm,
            scale: 72.0,
            spacing: 0.0,
            curve_tolerance: 0.3,
            rotations: 4,
            threads: 1,
            population_size: 10,
            mutation_rate: 10,
            placement_type: PlacementType::Gravity,
            merge_lines: false,
            time_ratio: 0.5,
            simplify: false,
            clipper_scale: 1.0e7,
            endpoint_tolerance: 1.0e-6,
            merge_length_factor: 0.5,
            rng_seed: None,
        }
    }
}

impl NestConfig {
    /// Internal-units minimum merge length, per §4.F.
    pub fn min_merge_length(&self) -> f64 {
        self.merge_length_factor * self.scale
    }

    pub fn rng_seed_or_default(&self) -> u64 {
        self.rng_seed.unwrap_or(0)
    }

    /// Reject contradictory configuration before any sheet is opened.
    pub fn validate(&self) -> Result<()> {
        if self.scale <= 0.0 {
            return Err(NestError::InvalidInput("scale must be positive".into()));
        }
        if self.spacing < 0.0 {
            return Err(NestError::InvalidInput("spacing must not be negative".into()));
        }
        if self.threads == 0 {
            return Err(NestError::InvalidInput("threads must be >= 1".into()));
        }
        if self.population_size == 0 {
            return Err(NestError::InvalidInput(
                "populationSize must be >= 1".into(),
            ));
        }
        if !(1..=50).contains(&self.mutation_rate) {
            return Err(NestError::InvalidInput(
                "mutationRate must be in [1,50]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.time_ratio) {
            return Err(NestError::InvalidInput("timeRatio must be in [0,1]".into()));
        }
        if self.clipper_scale <= 0.0 {
            return Err(NestError::InvalidInput(
                "clipperScale must be positive".into(),
            ));
        }
        if self.endpoint_tolerance < 0.0 {
            return Err(NestError::InvalidInput(
                "endpointTolerance must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// The discrete rotation grid, in degrees, implied by `rotations`.
    pub fn rotation_grid(&self) -> Vec<f64> {
        if self.rotations == 0 {
            return vec![0.0];
        }
        (0..self.rotations)
            .map(|i| i as f64 * 360.0 / self.rotations as f64)
            .collect()
    }
}
