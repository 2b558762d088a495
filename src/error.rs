//! Error taxonomy for the nesting engine.
//!
//! Geometry- and NFP-level faults are recovered locally (logged and folded
//! into fitness penalties); configuration and invariant faults terminate a
//! run and are surfaced here to the caller.

use thiserror::Error;

/// Machine-readable classification of a [`NestError`], independent of the
/// human-readable message carried by the variant itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    DegenerateGeometry,
    ClippingFailure,
    CapacityExhausted,
    Cancelled,
    InternalInvariantViolation,
}

#[derive(Debug, Error)]
pub enum NestError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("degenerate geometry for pair ({a_source}, {b_source}): {reason}")]
    DegenerateGeometry {
        a_source: u64,
        b_source: u64,
        reason: String,
    },

    #[error("clipping backend failure on ({a_source}, {b_source}): {reason}")]
    ClippingFailure {
        a_source: u64,
        b_source: u64,
        reason: String,
    },

    #[error("sheets exhausted with {remaining} part(s) remaining")]
    CapacityExhausted { remaining: usize },

    #[error("run cancelled")]
    Cancelled,

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

impl NestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NestError::InvalidInput(_) => ErrorKind::InvalidInput,
            NestError::DegenerateGeometry { .. } => ErrorKind::DegenerateGeometry,
            NestError::ClippingFailure { .. } => ErrorKind::ClippingFailure,
            NestError::CapacityExhausted { .. } => ErrorKind::CapacityExhausted,
            NestError::Cancelled => ErrorKind::Cancelled,
            NestError::InternalInvariantViolation(_) => ErrorKind::InternalInvariantViolation,
        }
    }

    /// Exit code for the CLI wrapper, per the external-interface contract.
    ///
    /// `CapacityExhausted` is not fatal (§7 propagation policy: it is
    /// surfaced via `NestResult::unplaced`, not an `Err`), so engine's
    /// `run()` never actually returns this variant; the mapping exists for
    /// completeness of the taxonomy.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::CapacityExhausted => 0,
            ErrorKind::Cancelled => 1,
            ErrorKind::InvalidInput => 2,
            ErrorKind::DegenerateGeometry
            | ErrorKind::ClippingFailure
            | ErrorKind::InternalInvariantViolation => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, NestError>;
