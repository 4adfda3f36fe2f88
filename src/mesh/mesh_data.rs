//! Per-element geometry table and face-pair adjacency.
//!
//! A face is described twice: once per adjacent element, each side with its
//! own outward normal and trace index list. The two trace lists are ordered
//! so that entry `i` on one side and entry `i` on the other side refer to
//! the same physical point on the shared face. Domain-boundary faces have an
//! absent exterior side (`element == INVALID_ELEMENT`).

use std::collections::HashMap;

/// Sentinel for "no element": absent neighbors, severed patch connections.
pub const INVALID_ELEMENT: usize = usize::MAX;

/// One face of an element, as seen from that element.
#[derive(Clone, Copy, Debug)]
pub struct FaceInfo {
    /// Neighboring element id, or [`INVALID_ELEMENT`] on a domain boundary.
    pub neighbor: usize,
}

/// Immutable per-element geometry.
#[derive(Clone, Debug)]
pub struct ElementInfo {
    /// Element id; equals the element's index in [`MeshData::elements`].
    pub id: usize,
    /// First global node (DOF) index of this element.
    pub node_start: usize,
    /// One past the last global node index of this element.
    pub node_end: usize,
    /// Scalar jacobian of the reference-to-physical map.
    pub jacobian: f64,
    /// Inverse geometric map: `inverse_map[loc][glob]` = ∂r_loc/∂x_glob.
    pub inverse_map: [[f64; 2]; 2],
    /// Faces in local face order.
    pub faces: Vec<FaceInfo>,
    /// Centroid, used by the covering-element search.
    pub center: (f64, f64),
    /// Bounding-circle radius around the centroid.
    pub bounding_radius: f64,
}

/// One side of a two-sided face.
#[derive(Clone, Debug)]
pub struct FaceSide {
    /// Element id of this side, or [`INVALID_ELEMENT`] for the absent
    /// exterior side of a boundary face.
    pub element: usize,
    /// Local face index within that element.
    pub face: usize,
    /// Outward unit normal of this side.
    pub normal: (f64, f64),
    /// Surface jacobian of the face.
    pub face_jacobian: f64,
    /// Node offsets within the element (relative to its `node_start`),
    /// ordered to match the opposite side point by point.
    pub trace: Vec<usize>,
}

/// Both sides of a mesh face.
#[derive(Clone, Debug)]
pub struct FacePair {
    pub interior: FaceSide,
    /// Exterior side; `element == INVALID_ELEMENT` on domain boundaries.
    pub exterior: FaceSide,
}

impl FacePair {
    /// Whether the face lies on the domain boundary.
    pub fn is_boundary(&self) -> bool {
        self.exterior.element == INVALID_ELEMENT
    }
}

/// Geometry and adjacency for one mesh.
///
/// All fields are public so that host codes can populate the table from
/// their own mesh infrastructure; [`MeshData::uniform_rectangle`] and
/// [`MeshData::uniform_periodic`] build it for structured quad meshes.
#[derive(Clone)]
pub struct MeshData {
    /// Spatial dimension (2 for quad meshes).
    pub dimensions: usize,
    /// Per-element geometry, indexed by element id.
    pub elements: Vec<ElementInfo>,
    /// Physical coordinates of every global node (discontinuous layout:
    /// each element owns a contiguous node range).
    pub nodes: Vec<(f64, f64)>,
    /// All face pairs of the mesh.
    pub face_pairs: Vec<FacePair>,
    /// Lookup `(element, local face) → face_pairs index`, covering both
    /// sides of every pair.
    pub face_pair_index: HashMap<(usize, usize), usize>,
    /// Translation vectors mapping the domain onto its periodic images
    /// (empty for non-periodic meshes; excludes the identity).
    pub periodic_shifts: Vec<(f64, f64)>,
}

impl MeshData {
    /// Total number of mesh DOFs.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of elements.
    pub fn n_elements(&self) -> usize {
        self.elements.len()
    }

    /// Look up the face pair containing `(element, face)`.
    pub fn face_pair(&self, element: usize, face: usize) -> Option<&FacePair> {
        self.face_pair_index
            .get(&(element, face))
            .map(|&i| &self.face_pairs[i])
    }

    /// Invoke `visit(element_id, image_center)` for every element whose
    /// bounding circle intersects a disc of radius `radius` around
    /// `center`, including periodic images of the disc. An element may be
    /// visited more than once (once per overlapping image); `image_center`
    /// is the translated disc center to sample against.
    ///
    /// Linear scan over the element table; patches are small and meshes
    /// modest, so no spatial index is kept.
    pub fn for_each_covering_element<F>(&self, center: (f64, f64), radius: f64, mut visit: F)
    where
        F: FnMut(usize, (f64, f64)),
    {
        let mut scan = |c: (f64, f64)| {
            for el in &self.elements {
                let dx = el.center.0 - c.0;
                let dy = el.center.1 - c.1;
                let reach = radius + el.bounding_radius;
                if dx * dx + dy * dy <= reach * reach {
                    visit(el.id, c);
                }
            }
        };

        scan(center);
        for i in 0..self.periodic_shifts.len() {
            let (sx, sy) = self.periodic_shifts[i];
            scan((center.0 + sx, center.1 + sy));
        }
    }
}
