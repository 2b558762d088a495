//! Genetic optimiser (§4.E): maintains a population of `(order,
//! rotations)` individuals, ranks by fitness, applies rank-weighted
//! selection with partially-mapped crossover and per-gene mutation, and
//! evaluates offspring by precomputing the NFP pairs a candidate needs
//! (fanned out across `rayon`'s pool) before running placement (§4.D)
//! synchronously.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::cache::NfpCache;
use crate::config::NestConfig;
use crate::geometry;
use crate::nfp::Nfp;
use crate::placement;
use crate::progress::CancellationToken;
use crate::types::{from_millideg, to_millideg, CacheKey, Individual, NestResult, PartInstance, Point, Polygon, Sheet};

/// One evaluated member of the population: its genes plus the placement
/// result computed from them (§4.D). Ranked ascending by
/// `result.fitness` (lower is better).
#[derive(Clone)]
pub struct Evaluated {
    pub individual: Individual,
    pub result: NestResult,
}

pub struct GeneticOptimiser<'a> {
    instances: &'a [PartInstance],
    sheets: &'a [Sheet],
    config: &'a NestConfig,
    cache: &'a NfpCache,
    rng: StdRng,
    population: Vec<Individual>,
    /// The §5 "worker pool", scoped to `config.threads` rather than
    /// rayon's process-wide global pool, so concurrent runs with
    /// different `threads` settings don't contend over one shared pool.
    pool: rayon::ThreadPool,
}

impl<'a> GeneticOptimiser<'a> {
    /// Builds the initial population: the identity ordering at each
    /// part's declared default rotation, plus `populationSize - 1`
    /// mutated variants of it (§4.E).
    pub fn new(
        instances: &'a [PartInstance],
        sheets: &'a [Sheet],
        config: &'a NestConfig,
        cache: &'a NfpCache,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(config.rng_seed_or_default());
        let base = Individual {
            order: (0..instances.len()).collect(),
            rotation: instances.iter().map(|i| i.default_rotation).collect(),
        };
        let mut population = vec![base.clone()];
        while population.len() < config.population_size {
            population.push(mutate(&base, config, &mut rng));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .expect("failed to build NFP worker pool");
        GeneticOptimiser { instances, sheets, config, cache, rng, population, pool }
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// Runs one generation: precompute → evaluate → rank → select/mate/
    /// mutate into the next population (§4.E steps 1-5). Returns the
    /// generation's evaluated, fitness-ascending population; callers
    /// inspect `ranked[0]` for the generation's best individual.
    ///
    /// Precompute and evaluation both run inside `self.pool` (§5
    /// "degree-of-parallelism = config.threads"); `.collect()` on each is
    /// the join point the backpressure rule refers to ("the optimiser
    /// will not start generation n+1 while generation n has outstanding
    /// NFP computations").
    pub fn step(&mut self, cancel: &CancellationToken) -> Vec<Evaluated> {
        let population = &self.population;
        let instances = self.instances;
        let sheets = self.sheets;
        let config = self.config;
        let cache = self.cache;

        self.pool.install(|| {
            precompute_nfp_pairs(population, instances, sheets, config, cache);
        });

        let mut ranked: Vec<Evaluated> = self.pool.install(|| {
            population
                .par_iter()
                .map(|individual| {
                    let result = placement::place(instances, individual, sheets, config, cache, cancel, |_| {});
                    Evaluated { individual: individual.clone(), result }
                })
                .collect()
        });
        ranked.sort_by(|a, b| {
            a.result.fitness.partial_cmp(&b.result.fitness).unwrap_or(std::cmp::Ordering::Equal)
        });

        if cancel.is_cancelled() {
            return ranked;
        }

        let mut next = vec![ranked[0].individual.clone()]; // elitism: 1
        while next.len() < ranked.len() {
            let m = random_weighted_index(ranked.len(), &mut self.rng, None);
            let f = random_weighted_index(ranked.len(), &mut self.rng, Some(m));
            let (c1, c2) = pmx_crossover(&ranked[m].individual, &ranked[f].individual, &mut self.rng);
            next.push(mutate(&c1, config, &mut self.rng));
            if next.len() < ranked.len() {
                next.push(mutate(&c2, config, &mut self.rng));
            }
        }
        self.population = next;

        ranked
    }
}

/// Rank-weighted selection: lower-ranked (fitter) indices are more
/// likely to be drawn. `exclude` keeps a mate selection from picking the
/// same parent twice.
fn random_weighted_index(len: usize, rng: &mut StdRng, exclude: Option<usize>) -> usize {
    let idxs: Vec<usize> = (0..len).filter(|&i| Some(i) != exclude).collect();
    if idxs.is_empty() {
        return exclude.unwrap_or(0);
    }
    let n = idxs.len() as f64;
    let draw: f64 = rng.r#gen::<f64>();
    let mut lower = 0.0;
    let weight = 1.0 / n;
    let mut upper = weight;
    for (pos, &i) in idxs.iter().enumerate() {
        if draw >= lower && draw < upper {
            return i;
        }
        lower = upper;
        upper += 2.0 * weight * ((idxs.len() - pos) as f64 / n);
    }
    idxs[0]
}

/// Partially-mapped crossover on `order`, with `rotation` swapped along
/// the same crossover mask (§4.E step 3).
fn pmx_crossover(a: &Individual, b: &Individual, rng: &mut StdRng) -> (Individual, Individual) {
    let n = a.order.len();
    if n < 2 {
        return (a.clone(), b.clone());
    }
    let mut cut1 = rng.gen_range(0..n);
    let mut cut2 = rng.gen_range(0..n);
    if cut1 > cut2 {
        std::mem::swap(&mut cut1, &mut cut2);
    }
    if cut1 == cut2 {
        cut2 = (cut1 + 1).min(n);
    }
    (pmx_child(a, b, cut1, cut2), pmx_child(b, a, cut1, cut2))
}

fn pmx_child(primary: &Individual, secondary: &Individual, cut1: usize, cut2: usize) -> Individual {
    let n = primary.order.len();
    let mut order = vec![usize::MAX; n];
    let mut rotation = vec![0.0; n];
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let mut in_segment: HashSet<usize> = HashSet::new();

    for i in cut1..cut2 {
        order[i] = primary.order[i];
        rotation[i] = primary.rotation[i];
        mapping.insert(primary.order[i], secondary.order[i]);
        in_segment.insert(primary.order[i]);
    }

    for j in 0..n {
        if j >= cut1 && j < cut2 {
            continue;
        }
        let mut candidate = secondary.order[j];
        let mut guard = 0;
        while in_segment.contains(&candidate) && guard <= n {
            candidate = *mapping.get(&candidate).unwrap_or(&candidate);
            guard += 1;
        }
        order[j] = candidate;
        rotation[j] = secondary.rotation[j];
    }

    Individual { order, rotation }
}

/// Per-gene mutation with probability `mutationRate/100`: either swap
/// two order positions or resample a rotation from the allowed grid
/// (§4.E step 4).
fn mutate(individual: &Individual, config: &NestConfig, rng: &mut StdRng) -> Individual {
    let mut order = individual.order.clone();
    let mut rotation = individual.rotation.clone();
    let p = config.mutation_rate as f64 * 0.01;
    let grid = config.rotation_grid();
    let n = order.len();

    for i in 0..n {
        if rng.r#gen::<f64>() < p && i + 1 < n {
            order.swap(i, i + 1);
        }
        if rng.r#gen::<f64>() < p && !grid.is_empty() {
            rotation[i] = grid[rng.gen_range(0..grid.len())];
        }
    }

    Individual { order, rotation }
}

/// Enumerates the `(A_source, B_source, A_rot, B_rot)` outer-NFP pairs
/// and `(sheet_source, part_source, rot)` inner-fit pairs the current
/// population could need, and dispatches them to `rayon`'s pool so the
/// subsequent placement pass (run single-threaded per individual, but
/// individuals themselves evaluated in parallel above) finds them
/// already cached (§4.E step 5, §5).
fn precompute_nfp_pairs(
    population: &[Individual],
    instances: &[PartInstance],
    sheets: &[Sheet],
    config: &NestConfig,
    cache: &NfpCache,
) {
    let mut source_polygon: HashMap<u64, &Polygon> = HashMap::new();
    let mut combos: HashSet<(u64, i64)> = HashSet::new();
    for individual in population {
        for (&idx, &rot) in individual.order.iter().zip(&individual.rotation) {
            let instance = &instances[idx];
            source_polygon.entry(instance.source).or_insert(&instance.polygon);
            combos.insert((instance.source, to_millideg(rot)));
        }
    }
    let combos: Vec<(u64, i64)> = combos.into_iter().collect();

    enum Task {
        Outer { key: CacheKey, a_local: Vec<Point>, b_local: Vec<Point> },
        Inner { key: CacheKey, container: Polygon, part: Vec<Point> },
    }

    let mut tasks = Vec::new();
    for &(a_source, a_rot_milli) in &combos {
        let a_rot = from_millideg(a_rot_milli);
        let a_poly = source_polygon[&a_source];
        let a_local = placement::to_origin(&geometry::rotate_polygon(&placement::spaced_points(a_poly, config), a_rot));
        for &(b_source, b_rot_milli) in &combos {
            let b_rot = from_millideg(b_rot_milli);
            let b_poly = source_polygon[&b_source];
            let b_local =
                placement::to_origin(&geometry::rotate_polygon(&placement::spaced_points(b_poly, config), b_rot));
            let key = CacheKey::new(a_source, b_source, a_rot, b_rot, false);
            tasks.push(Task::Outer { key, a_local: a_local.clone(), b_local });
        }
    }

    for sheet in sheets {
        let container = placement::simplified_sheet_polygon(sheet, config);
        for &(source, rot_milli) in &combos {
            let rot = from_millideg(rot_milli);
            let poly = source_polygon[&source];
            let part = geometry::rotate_polygon(&placement::spaced_points(poly, config), rot);
            let key = CacheKey::new(sheet.source, source, 0.0, rot, true);
            tasks.push(Task::Inner { key, container: container.clone(), part });
        }
    }

    let clipper_scale = config.clipper_scale;
    tasks.par_iter().for_each(|task| match task {
        Task::Outer { key, a_local, b_local } => {
            cache.get_or_compute(*key, || {
                crate::nfp::minkowski_outer_nfp(a_local, b_local, clipper_scale)
                    .map(|ring| Nfp { regions: vec![ring], children: Vec::new() })
            });
        }
        Task::Inner { key, container, part } => {
            cache.get_or_compute(*key, || crate::nfp::inner_fit_polygon(container, part, clipper_scale));
        }
    });
}
