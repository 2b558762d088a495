//! Orchestration (§2 data flow): wires the NFP cache, genetic optimiser
//! and placement engine behind a single [`run`] entry point, streaming
//! progress and strictly-improving results over a bounded channel (§9
//! "coroutine/event-loop control flow ... model as tasks communicating
//! over bounded channels"; §6 `ProgressEvent`/`NestResult` streaming).

use crossbeam_channel::Sender;

use crate::cache::NfpCache;
use crate::config::NestConfig;
use crate::error::{NestError, Result};
use crate::ga::GeneticOptimiser;
use crate::geometry;
use crate::progress::{CancellationToken, ProgressEvent, RunEvent};
use crate::types::{expand_parts, NestResult, Part, Polygon, Sheet, TerminalState};

/// Normalise an outer boundary to strictly CCW and its holes to strictly
/// CW (§3 winding convention, I5), in place. Every polygon must pass
/// through this before any NFP computation touches it, since the
/// Minkowski-sum path's ear-clipping triangulation assumes CCW input.
fn normalize_polygon_winding(polygon: &mut Polygon) {
    geometry::normalize_winding(&mut polygon.points, false);
    for hole in &mut polygon.children {
        geometry::normalize_winding(&mut hole.points, true);
    }
}

/// Bounds on how long an unattended run may continue. §5 specifies the
/// optimiser "runs until externally stopped" via [`CancellationToken`];
/// `max_generations` is an additional, non-spec'd convenience so a
/// non-interactive caller (the CLI) can get a terminal result without
/// wiring up its own stop signal.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub max_generations: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            max_generations: Some(50),
        }
    }
}

/// Validate inputs (§7 `InvalidInput`, aborts before any sheet opens),
/// then drive the genetic optimiser generation by generation until
/// cancelled or `options.max_generations` is reached. Cancellation is
/// only observed between generations (§5 suspension points), so a token
/// already cancelled before the first call still yields one generation's
/// worth of best-so-far result rather than an empty run. Emits a
/// `RunEvent::Result` each time the best-seen fitness strictly improves
/// (§6, §8 P5) and a `RunEvent::Progress` once per completed generation.
///
/// Returns the best [`NestResult`] observed and the run's terminal
/// state (§6: `Completed | Cancelled`; `Fatal` is reserved for errors,
/// which this function instead surfaces as `Err`).
pub fn run(
    parts: &[Part],
    sheets: &[Sheet],
    config: &NestConfig,
    cache: &NfpCache,
    cancel: &CancellationToken,
    options: RunOptions,
    events: Sender<RunEvent>,
) -> Result<(NestResult, TerminalState)> {
    config.validate()?;

    if sheets.is_empty() {
        return Err(NestError::InvalidInput("no sheets supplied".into()));
    }
    for sheet in sheets {
        if sheet.polygon.points.len() < 3 {
            return Err(NestError::InvalidInput(format!(
                "sheet {} has fewer than 3 vertices",
                sheet.source
            )));
        }
    }
    for part in parts {
        if part.quantity == 0 {
            return Err(NestError::InvalidInput(format!(
                "part {} has zero quantity",
                part.source
            )));
        }
        if part.polygon.points.len() < 3 {
            return Err(NestError::InvalidInput(format!(
                "part {} has fewer than 3 vertices",
                part.source
            )));
        }
    }

    let mut normalized_parts: Vec<Part> = parts.to_vec();
    for part in &mut normalized_parts {
        normalize_polygon_winding(&mut part.polygon);
    }
    let mut normalized_sheets: Vec<Sheet> = sheets.to_vec();
    for sheet in &mut normalized_sheets {
        normalize_polygon_winding(&mut sheet.polygon);
    }

    let instances = expand_parts(&normalized_parts);
    if instances.is_empty() {
        return Err(NestError::InvalidInput("no parts to place".into()));
    }

    let mut optimiser = GeneticOptimiser::new(&instances, &normalized_sheets, config, cache);
    let mut best: Option<NestResult> = None;
    let mut generation: u64 = 0;

    loop {
        if let Some(max) = options.max_generations {
            if generation >= max {
                break;
            }
        }

        let ranked = optimiser.step(cancel);
        generation += 1;

        if let Some(top) = ranked.into_iter().next() {
            let improved = match &best {
                None => true,
                Some(current) => top.result.fitness < current.fitness - 1e-9,
            };
            if improved {
                best = Some(top.result.clone());
                tracing::info!(generation, fitness = top.result.fitness, "improved result");
                let _ = events.send(RunEvent::Result(top.result));
            }
        }

        let _ = events.send(RunEvent::Progress(ProgressEvent {
            generation: Some(generation),
            placed_fraction: 1.0,
        }));

        if cancel.is_cancelled() {
            break;
        }
    }

    let terminal = if cancel.is_cancelled() {
        tracing::info!(generation, "run cancelled, returning best-so-far");
        TerminalState::Cancelled
    } else {
        tracing::info!(generation, "run completed");
        TerminalState::Completed
    };

    let result = best.ok_or_else(|| {
        NestError::InternalInvariantViolation("optimiser produced no individuals".into())
    })?;
    Ok((result, terminal))
}
