// src/error.rs

use thiserror::Error;

/// Failures the engine reports to its host. Input quality problems never
/// construct one of these; they degrade to empty fields at the mapping
/// step. Both variants are terminal: the driver emits a single `error`
/// message and no `done`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The host raised the cancellation flag; observed at a progress
    /// boundary.
    #[error("cancelled")]
    Cancelled,
    /// The engine broke one of its own guarantees. Always a bug, never an
    /// input problem.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}
