//! # advect-dg
//!
//! Advective charge reconstruction for particle-in-cell simulation on
//! high-order DG meshes.
//!
//! Each particle carries its own patch of mesh elements on which a
//! smooth charge density is deposited once and then evolved with the
//! local advection equation, instead of being re-deposited every step.
//! This crate provides the building blocks:
//! - Gauss-Lobatto reference quads and element-local DG operators
//! - Structured quad mesh geometry with two-sided face adjacency
//! - A packed slab allocator for per-(particle, element) DOF storage
//! - Upwind surface fluxes with dynamic patch activation
//! - Element retirement and particle lifecycle plumbing
//! - Mesh-wide diagnostic scatters of the internal state

pub mod mesh;
pub mod operators;
pub mod reconstruction;

// Re-export main types for convenience
pub use mesh::{ElementInfo, FaceInfo, FacePair, FaceSide, MeshData, INVALID_ELEMENT};
pub use operators::{packed_product, LocalOperators, OperatorError, ReferenceQuad, FACE_NORMALS};
pub use reconstruction::{
    ActiveElement, AdvectedParticle, AdvectiveReconstructor, AdvectiveState, DebugQuantity,
    ReconstructionError, ReconstructorConfig, ShapeFunction, SlabEvent, MAX_FACES,
};
