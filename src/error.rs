//! Error taxonomy for the synthesis core.
//!
//! Three kinds are distinguished, matching the failure modes a caller actually
//! needs to tell apart: malformed construction input, a type mismatch the
//! encoder cannot route around, and a solver-level failure. "No solution" is
//! deliberately *not* a variant here — the CEGIS driver reports that as
//! `Ok(None)`, not an error.

use thiserror::Error;

/// Errors surfaced by node construction, circuit encoding, and the solver façade.
#[derive(Debug, Error)]
pub enum SynthError {
    /// Wrong shape or kind of a constructor parameter, mismatched timing-mode
    /// argument lengths, or any other failure detected before a model is built.
    #[error("configuration error: {0}")]
    Config(String),

    /// A sink has no source of the required width, or a node produced a value
    /// whose width disagrees with its declared type.
    #[error("type error: {0}")]
    Type(String),

    /// The SMT backend itself reported a problem (bad sort, solver panic, …).
    #[error("solver error: {0}")]
    Solver(String),
}

pub type Result<T> = std::result::Result<T, SynthError>;
