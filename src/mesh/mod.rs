//! Mesh geometry and adjacency.
//!
//! The reconstruction engine never owns geometry; it reads a [`MeshData`]
//! table of per-element facts (node ranges, jacobians, inverse maps, face
//! neighbors) and a two-sided face-pair registry used for inter-element
//! flux exchange. Elements are referenced by stable integer id everywhere.

mod mesh_data;
mod uniform;

pub use mesh_data::{ElementInfo, FaceInfo, FacePair, FaceSide, MeshData, INVALID_ELEMENT};
