//! Irregular 2D nesting engine: geometry kernel, NFP kernel and cache,
//! deterministic greedy placement, line-merge post-process, and the
//! genetic optimiser that drives placement order and per-part rotation.
//!
//! `engine::run` is the single entry point that wires these together;
//! everything else is a reusable building block a caller can also use
//! directly (e.g. to query the NFP cache standalone, or drive the
//! placement engine with a hand-built `Individual`).

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod ga;
pub mod geometry;
pub mod line_merge;
pub mod nfp;
pub mod placement;
pub mod progress;
pub mod triangulate;
pub mod types;
