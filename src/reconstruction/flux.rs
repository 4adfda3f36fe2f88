//! Upwind surface fluxes and dynamic patch growth.
//!
//! For every active (particle, element) pair this walks the element's
//! faces, resolves which side of the stored face pair the element sits
//! on, and accumulates the bilinear face-mass flux terms into the packed
//! flux vector. Outflow faces whose trace density exceeds the activation
//! threshold pull the downstream neighbor into the patch before their
//! flux is computed, so a particle can never advect into an element that
//! is not yet tracked.

use crate::mesh::{MeshData, INVALID_ELEMENT};
use crate::reconstruction::engine::AdvectiveReconstructor;
use crate::reconstruction::state::{ActiveElement, AdvectiveState, SlabEvent};
use crate::reconstruction::ReconstructionError;

impl AdvectiveReconstructor {
    /// Accumulate the surface-flux contribution of every particle into
    /// `fluxes`, activating downstream elements as needed.
    ///
    /// `fluxes` is resized to match the packed state vector (growing with
    /// it if activation grows the state) and overwritten. `velocities`
    /// and `charges` are indexed by particle number.
    pub fn calculate_fluxes(
        &mut self,
        mesh: &MeshData,
        state: &mut AdvectiveState,
        velocities: &[(f64, f64)],
        charges: &[f64],
        fluxes: &mut Vec<f64>,
    ) -> Result<(), ReconstructionError> {
        debug_assert_eq!(velocities.len(), state.particles.len());
        debug_assert_eq!(charges.len(), state.particles.len());

        fluxes.clear();
        fluxes.resize(state.rho.len(), 0.0);

        let face_dofs = self.ops.face_dofs();
        let alpha = self.upwind_alpha;

        for pn in 0..state.particles.len() {
            let shape_peak = state.particles[pn].shape.peak() * charges[pn];
            let v = velocities[pn];

            // Activation appends to the element list; indexed iteration
            // picks the newcomers up in the same pass.
            let mut i_el = 0;
            while i_el < state.particles[pn].elements.len() {
                let (en, this_base, mut connections) = {
                    let el = &state.particles[pn].elements[i_el];
                    (el.element, el.start_index, el.connections)
                };

                for face in 0..self.faces_per_element {
                    let pair = mesh
                        .face_pair(en, face)
                        .ok_or(ReconstructionError::FacePairNotFound { element: en, face })?;

                    let (this_side, opp_side) = if pair.interior.element == en {
                        (&pair.interior, &pair.exterior)
                    } else if pair.exterior.element == en {
                        (&pair.exterior, &pair.interior)
                    } else if pair.is_boundary() {
                        // A host adjacency table handed us another
                        // element's boundary face.
                        return Err(ReconstructionError::CrossBoundaryLookup { element: en, face });
                    } else {
                        return Err(ReconstructionError::FacePairMismatch { element: en, face });
                    };
                    if this_side.face != face {
                        return Err(ReconstructionError::FacePairMismatch { element: en, face });
                    }

                    let is_boundary = pair.is_boundary();
                    if is_boundary && connections[face] != INVALID_ELEMENT {
                        return Err(ReconstructionError::BoundaryConnectionActive {
                            element: en,
                            face,
                        });
                    }

                    let n_dot_v = this_side.normal.0 * v.0 + this_side.normal.1 * v.1;
                    let inflow = n_dot_v <= 0.0;
                    let upwind = if inflow { 1.0 } else { 0.0 };
                    let int_coeff =
                        this_side.face_jacobian * -n_dot_v * (alpha * upwind + (1.0 - alpha) * 0.5);
                    let ext_coeff = this_side.face_jacobian
                        * -n_dot_v
                        * (-alpha * upwind - (1.0 - alpha) * 0.5);

                    // Outflow into an untracked neighbor: activate it once
                    // the outgoing trace is no longer negligible.
                    if !is_boundary && connections[face] == INVALID_ELEMENT && !inflow {
                        let mut max_trace = 0.0f64;
                        for &t in &this_side.trace {
                            max_trace = max_trace.max(state.rho[this_base + t].abs());
                        }
                        if max_trace > self.activation_threshold * shape_peak.abs() {
                            let opp_en = opp_side.element;
                            let (start, event) = state.allocate_slab();
                            if let SlabEvent::Grown { new_len } = event {
                                fluxes.resize(new_len, 0.0);
                            }
                            state.slab_mut(start).fill(0.0);

                            let mut new_el = ActiveElement::new(opp_en, start);
                            new_el.min_life = self.activation_min_life;

                            // Wire the newcomer to every patch member it
                            // borders, in both directions.
                            let faces = &mesh.elements[opp_en].faces;
                            for (g, f) in faces.iter().enumerate().take(self.faces_per_element) {
                                if f.neighbor == INVALID_ELEMENT {
                                    continue;
                                }
                                if let Some(sib) =
                                    state.particles[pn].find_element_mut(f.neighbor)
                                {
                                    let back = mesh.elements[f.neighbor]
                                        .faces
                                        .iter()
                                        .position(|bf| bf.neighbor == opp_en)
                                        .ok_or(ReconstructionError::AdjacencyInconsistent {
                                            element: f.neighbor,
                                            neighbor: opp_en,
                                        })?;
                                    sib.connections[back] = opp_en;
                                    new_el.connections[g] = f.neighbor;
                                }
                            }

                            state.particles[pn].elements.push(new_el);
                            self.activations += 1;
                            connections[face] = opp_en;
                            // The wiring above also updated the stored
                            // connection array of this element; the local
                            // copy is refreshed by hand.
                        }
                    }

                    if connections[face] != INVALID_ELEMENT {
                        let opp_base = state.particles[pn]
                            .find_element(connections[face])
                            .ok_or(ReconstructionError::ActiveNeighborNotFound {
                                element: en,
                                neighbor: connections[face],
                            })?
                            .start_index;

                        for i in 0..face_dofs {
                            let ili = this_base + this_side.trace[i];
                            for j in 0..face_dofs {
                                let fmm = self.ops.face_mass[(i, j)];
                                fluxes[ili] += fmm
                                    * (int_coeff * state.rho[this_base + this_side.trace[j]]
                                        + ext_coeff * state.rho[opp_base + opp_side.trace[j]]);
                            }
                        }
                    } else if inflow {
                        // Inflow from an inactive (or absent) neighbor:
                        // the exterior trace is zero, only the interior
                        // term survives.
                        for i in 0..face_dofs {
                            let ili = this_base + this_side.trace[i];
                            for j in 0..face_dofs {
                                let fmm = self.ops.face_mass[(i, j)];
                                fluxes[ili] +=
                                    fmm * int_coeff * state.rho[this_base + this_side.trace[j]];
                            }
                        }
                    }
                }

                i_el += 1;
            }
        }

        Ok(())
    }
}
