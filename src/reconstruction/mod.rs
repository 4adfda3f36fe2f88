//! Advective charge reconstruction.
//!
//! Each particle carries a patch of mesh elements on which its charge
//! density is stored as per-element DOF slabs and evolved with the local
//! advection equation dρ/dt + v·∇ρ = 0, discretized in DG form:
//!
//!   dρ/dt = -v·∇ρ - M⁻¹ · (surface flux terms)
//!
//! The patch grows by activating neighbors that charge flows into and
//! shrinks by retiring elements whose charge has decayed. The host drives
//! one step as: `calculate_fluxes` (may grow the state) →
//! `calculate_local_div` → `apply_inverse_mass` → time-integrate the
//! combined RHS via `apply_rhs`, with `perform_upkeep` once per step.

mod diagnostics;
mod engine;
mod flux;
mod rhs;
mod shape;
mod state;
mod upkeep;

pub use diagnostics::DebugQuantity;
pub use engine::{AdvectiveReconstructor, ReconstructorConfig};
pub use shape::ShapeFunction;
pub use state::{ActiveElement, AdvectedParticle, AdvectiveState, SlabEvent, MAX_FACES};

use thiserror::Error;

use crate::operators::OperatorError;

/// Fatal conditions of the reconstruction engine. All of these are
/// programming or configuration errors; none is transient and nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("activation threshold must be positive, got {0}")]
    InvalidActivationThreshold(f64),

    #[error("kill threshold must be positive, got {0}")]
    InvalidKillThreshold(f64),

    #[error("upwind blend parameter must lie in [0, 1], got {0}")]
    InvalidUpwindBlend(f64),

    #[error("faces per element must lie in 1..={MAX_FACES}, got {0}")]
    InvalidFaceCount(usize),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error("particle {got} registered out of sequence (expected {expected})")]
    ParticleOutOfSequence { expected: usize, got: usize },

    #[error("slab offset {start} is not a multiple of {dofs} dofs per element")]
    MisalignedDeallocation { start: usize, dofs: usize },

    #[error("no face pair registered for element {element}, face {face}")]
    FacePairNotFound { element: usize, face: usize },

    #[error("element {element}, face {face}: lookup across a domain boundary")]
    CrossBoundaryLookup { element: usize, face: usize },

    #[error("face pair for element {element}, face {face} names neither side")]
    FacePairMismatch { element: usize, face: usize },

    #[error("boundary face {face} of element {element} recorded as an active connection")]
    BoundaryConnectionActive { element: usize, face: usize },

    #[error("active neighbor {neighbor} of element {element} not found in its patch")]
    ActiveNeighborNotFound { element: usize, neighbor: usize },

    #[error("element {element} missing from the face list of its neighbor {neighbor}")]
    AdjacencyInconsistent { element: usize, neighbor: usize },

    #[error("no differentiation matrix registered for axis {axis}")]
    MissingDiffMatrix { axis: usize },
}
