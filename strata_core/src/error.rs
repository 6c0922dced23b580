//! Error types and result definitions for strata.
//!
//! The collector's internal races (stale cards, lost claims, empty queues)
//! are expected outcomes, not errors; they never surface here. Errors are
//! reserved for misconfiguration and resource exhaustion at setup time.
//! Structural invariant violations are assertions, never `Err` — proceeding
//! past one would risk silent heap corruption.

use thiserror::Error;

/// The unified result type used throughout strata.
pub type GcResult<T> = Result<T, GcError>;

/// Error type covering collector setup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GcError {
    /// A configuration value failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the failing constraint.
        reason: String,
    },

    /// The covered heap range is too large for the requested geometry.
    #[error("heap coverage of {requested} bytes exceeds supported maximum {max}")]
    CoverageTooLarge {
        /// Requested coverage in bytes.
        requested: usize,
        /// Maximum supported coverage in bytes.
        max: usize,
    },
}
