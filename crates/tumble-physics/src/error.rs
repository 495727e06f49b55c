//! Error types for the simulation core.

use thiserror::Error;

use crate::body::BodyId;
use crate::shape::ShapeKind;

/// Errors that can occur while building or stepping a world.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    /// Shape has invalid geometry or cannot be used with the requested mass.
    #[error("invalid shape: {reason}")]
    InvalidShape {
        /// Why the shape was rejected.
        reason: String,
    },

    /// Mass is negative or not finite.
    #[error("invalid mass {0}: must be finite and >= 0")]
    InvalidMass(f64),

    /// Body id is unknown or was already removed.
    #[error("body not found: {0:?}")]
    UnknownBody(BodyId),

    /// No collision algorithm is registered for this shape combination.
    #[error("no collision algorithm registered for {a:?} vs {b:?}")]
    UnregisteredShapePair {
        /// Shape kind of the first body.
        a: ShapeKind,
        /// Shape kind of the second body.
        b: ShapeKind,
    },

    /// Solver left contacts unresolved after its iteration budget.
    #[error("solver did not converge: {unconverged} contact(s) still approaching")]
    NumericalDivergence {
        /// Number of contacts above the convergence tolerance.
        unconverged: usize,
    },

    /// A vector passed to the world has NaN or infinite components.
    #[error("{what} must be finite")]
    NonFinite {
        /// Which argument was rejected.
        what: &'static str,
    },

    /// Step parameters were rejected before any state changed.
    #[error("invalid step: {0}")]
    InvalidStep(String),

    /// Configuration could not be parsed or failed validation.
    #[error("invalid config: {0}")]
    Config(String),
}

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, PhysicsError>;
