//! Structured quadrilateral mesh builders.
//!
//! Face convention (counter-clockwise around the element):
//! - Face 0 (bottom): r runs -1 → +1
//! - Face 1 (right):  s runs -1 → +1
//! - Face 2 (top):    r runs +1 → -1
//! - Face 3 (left):   s runs +1 → -1
//!
//! The exterior trace of a face pair is the neighbor's matching face with
//! its node order reversed; counter-clockwise traversal means the two
//! elements walk a shared edge in opposite directions.

use std::collections::HashMap;

use crate::operators::{ReferenceQuad, FACE_NORMALS};

use super::mesh_data::{ElementInfo, FaceInfo, FacePair, FaceSide, MeshData, INVALID_ELEMENT};

/// Local face opposite to `face` on an axis-aligned quad.
fn opposite_face(face: usize) -> usize {
    (face + 2) % 4
}

impl MeshData {
    /// Uniform quad mesh of `[x0, x1] × [y0, y1]` with wall (open)
    /// boundaries. Nodes are placed at the reference element's node set.
    pub fn uniform_rectangle(
        x0: f64,
        x1: f64,
        y0: f64,
        y1: f64,
        nx: usize,
        ny: usize,
        reference: &ReferenceQuad,
    ) -> MeshData {
        build_uniform(x0, x1, y0, y1, nx, ny, reference, false)
    }

    /// Uniform quad mesh with both directions periodic.
    pub fn uniform_periodic(
        x0: f64,
        x1: f64,
        y0: f64,
        y1: f64,
        nx: usize,
        ny: usize,
        reference: &ReferenceQuad,
    ) -> MeshData {
        build_uniform(x0, x1, y0, y1, nx, ny, reference, true)
    }
}

fn build_uniform(
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
    nx: usize,
    ny: usize,
    reference: &ReferenceQuad,
    periodic: bool,
) -> MeshData {
    assert!(nx > 0 && ny > 0, "need at least one element per direction");
    assert!(x1 > x0 && y1 > y0, "invalid domain bounds");

    let dx = (x1 - x0) / nx as f64;
    let dy = (y1 - y0) / ny as f64;
    let n_elements = nx * ny;
    let n_local = reference.n_nodes;

    let mut elements = Vec::with_capacity(n_elements);
    let mut nodes = Vec::with_capacity(n_elements * n_local);

    for j in 0..ny {
        for i in 0..nx {
            let id = j * nx + i;
            let ex0 = x0 + i as f64 * dx;
            let ey0 = y0 + j as f64 * dy;

            let node_start = nodes.len();
            for n in 0..n_local {
                let x = ex0 + (reference.nodes_r[n] + 1.0) * 0.5 * dx;
                let y = ey0 + (reference.nodes_s[n] + 1.0) * 0.5 * dy;
                nodes.push((x, y));
            }

            // Neighbor ids per face, wrapping if periodic.
            let south = if j > 0 {
                id - nx
            } else if periodic {
                (ny - 1) * nx + i
            } else {
                INVALID_ELEMENT
            };
            let east = if i + 1 < nx {
                id + 1
            } else if periodic {
                j * nx
            } else {
                INVALID_ELEMENT
            };
            let north = if j + 1 < ny {
                id + nx
            } else if periodic {
                i
            } else {
                INVALID_ELEMENT
            };
            let west = if i > 0 {
                id - 1
            } else if periodic {
                j * nx + nx - 1
            } else {
                INVALID_ELEMENT
            };

            elements.push(ElementInfo {
                id,
                node_start,
                node_end: node_start + n_local,
                jacobian: dx * dy / 4.0,
                inverse_map: [[2.0 / dx, 0.0], [0.0, 2.0 / dy]],
                faces: vec![
                    FaceInfo { neighbor: south },
                    FaceInfo { neighbor: east },
                    FaceInfo { neighbor: north },
                    FaceInfo { neighbor: west },
                ],
                center: (ex0 + 0.5 * dx, ey0 + 0.5 * dy),
                bounding_radius: 0.5 * (dx * dx + dy * dy).sqrt(),
            });
        }
    }

    // Register face pairs. Each pair is built once, from whichever side is
    // visited first, and indexed under both (element, face) keys.
    let mut face_pairs: Vec<FacePair> = Vec::new();
    let mut face_pair_index: HashMap<(usize, usize), usize> = HashMap::new();

    for id in 0..n_elements {
        for face in 0..4 {
            if face_pair_index.contains_key(&(id, face)) {
                continue;
            }

            let face_jacobian = if face % 2 == 0 { dx / 2.0 } else { dy / 2.0 };
            let normal = FACE_NORMALS[face];
            let neighbor = elements[id].faces[face].neighbor;
            let opp = opposite_face(face);

            let interior = FaceSide {
                element: id,
                face,
                normal,
                face_jacobian,
                trace: reference.face_nodes[face].clone(),
            };
            let exterior = if neighbor == INVALID_ELEMENT {
                FaceSide {
                    element: INVALID_ELEMENT,
                    face: opp,
                    normal: (-normal.0, -normal.1),
                    face_jacobian,
                    trace: Vec::new(),
                }
            } else {
                let mut trace = reference.face_nodes[opp].clone();
                trace.reverse();
                FaceSide {
                    element: neighbor,
                    face: opp,
                    normal: (-normal.0, -normal.1),
                    face_jacobian,
                    trace,
                }
            };

            let idx = face_pairs.len();
            face_pairs.push(FacePair { interior, exterior });
            face_pair_index.insert((id, face), idx);
            if neighbor != INVALID_ELEMENT {
                face_pair_index.insert((neighbor, opp), idx);
            }
        }
    }

    let periodic_shifts = if periodic {
        let lx = x1 - x0;
        let ly = y1 - y0;
        let mut shifts = Vec::with_capacity(8);
        for sj in -1i32..=1 {
            for si in -1i32..=1 {
                if si == 0 && sj == 0 {
                    continue;
                }
                shifts.push((si as f64 * lx, sj as f64 * ly));
            }
        }
        shifts
    } else {
        Vec::new()
    };

    MeshData {
        dimensions: 2,
        elements,
        nodes,
        face_pairs,
        face_pair_index,
        periodic_shifts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_wiring() {
        let rq = ReferenceQuad::new(1);
        let mesh = MeshData::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 3, 2, &rq);

        // Element 4 = (i=1, j=1): south 1, east 5, north boundary, west 3.
        let faces = &mesh.elements[4].faces;
        assert_eq!(faces[0].neighbor, 1);
        assert_eq!(faces[1].neighbor, 5);
        assert_eq!(faces[2].neighbor, INVALID_ELEMENT);
        assert_eq!(faces[3].neighbor, 3);
    }

    #[test]
    fn test_periodic_wraparound() {
        let rq = ReferenceQuad::new(1);
        let mesh = MeshData::uniform_periodic(0.0, 1.0, 0.0, 1.0, 3, 3, &rq);

        // Element 0 wraps south to 6 and west to 2.
        assert_eq!(mesh.elements[0].faces[0].neighbor, 6);
        assert_eq!(mesh.elements[0].faces[3].neighbor, 2);
        // Adjacency is symmetric across the wrap.
        assert_eq!(mesh.elements[6].faces[2].neighbor, 0);
        assert_eq!(mesh.elements[2].faces[1].neighbor, 0);
    }

    #[test]
    fn test_face_pair_count() {
        let rq = ReferenceQuad::new(1);
        // Open 2x2: 4 interior pairs + 8 boundary faces = 12 pairs.
        let open = MeshData::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 2, 2, &rq);
        assert_eq!(open.face_pairs.len(), 12);
        // Periodic 2x2: every face is interior, 2 per element.
        let per = MeshData::uniform_periodic(0.0, 1.0, 0.0, 1.0, 2, 2, &rq);
        assert_eq!(per.face_pairs.len(), 8);
    }

    #[test]
    fn test_geometry_factors() {
        let rq = ReferenceQuad::new(2);
        let mesh = MeshData::uniform_rectangle(0.0, 2.0, 0.0, 1.0, 2, 2, &rq);

        let el = &mesh.elements[0];
        // dx = 1, dy = 0.5.
        assert!((el.jacobian - 0.125).abs() < 1e-14);
        assert!((el.inverse_map[0][0] - 2.0).abs() < 1e-14);
        assert!((el.inverse_map[1][1] - 4.0).abs() < 1e-14);
        assert!((el.inverse_map[0][1]).abs() < 1e-14);

        // Face jacobians: bottom/top scale with dx, left/right with dy.
        let bottom = mesh.face_pair(0, 0).unwrap();
        assert!((bottom.interior.face_jacobian - 0.5).abs() < 1e-14);
        let right = mesh.face_pair(0, 1).unwrap();
        assert!((right.interior.face_jacobian - 0.25).abs() < 1e-14);
    }
}
