//! Mesh-wide views of the packed per-particle state, for visualization
//! and debugging.

use crate::mesh::MeshData;
use crate::reconstruction::engine::AdvectiveReconstructor;
use crate::reconstruction::state::AdvectiveState;
use crate::reconstruction::ReconstructionError;

/// Intermediate quantity of the RHS pipeline, scattered onto the mesh by
/// [`AdvectiveReconstructor::debug_quantity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebugQuantity {
    /// Indicator field: how many particles track each element.
    ActiveElements,
    /// Raw surface-flux accumulator.
    Fluxes,
    /// Surface fluxes after the inverse mass matrix.
    MinvFluxes,
    /// Advective volume term `-v·∇ρ`.
    LocalDiv,
    /// The complete RHS.
    Rhs,
}

impl AdvectiveReconstructor {
    /// Scatter a packed per-slab vector onto the global mesh DOF layout,
    /// summing where particles overlap. `out` must hold one value per
    /// mesh node.
    pub fn map_to_mesh(
        &self,
        mesh: &MeshData,
        state: &AdvectiveState,
        packed: &[f64],
        out: &mut [f64],
    ) {
        debug_assert_eq!(out.len(), mesh.n_nodes());
        out.fill(0.0);
        for p in &state.particles {
            for el in &p.elements {
                let node_start = mesh.elements[el.element].node_start;
                for i in 0..self.dofs_per_element {
                    out[node_start + i] += packed[el.start_index + i];
                }
            }
        }
    }

    /// Total reconstructed charge density on the mesh.
    pub fn reconstructed_density(
        &self,
        mesh: &MeshData,
        state: &AdvectiveState,
        out: &mut [f64],
    ) {
        self.map_to_mesh(mesh, state, &state.rho, out);
    }

    /// Scatter one intermediate quantity of the RHS pipeline onto the
    /// mesh. Flux-carrying quantities recompute the fluxes and may grow
    /// the state through activation, exactly as a real RHS evaluation
    /// would.
    pub fn debug_quantity(
        &mut self,
        mesh: &MeshData,
        state: &mut AdvectiveState,
        quantity: DebugQuantity,
        velocities: &[(f64, f64)],
        charges: &[f64],
        out: &mut [f64],
    ) -> Result<(), ReconstructionError> {
        debug_assert_eq!(out.len(), mesh.n_nodes());

        let mut packed = Vec::new();
        match quantity {
            DebugQuantity::ActiveElements => {
                out.fill(0.0);
                for p in &state.particles {
                    for el in &p.elements {
                        let node_start = mesh.elements[el.element].node_start;
                        for i in 0..self.dofs_per_element {
                            out[node_start + i] += 1.0;
                        }
                    }
                }
                return Ok(());
            }
            DebugQuantity::Fluxes => {
                self.calculate_fluxes(mesh, state, velocities, charges, &mut packed)?;
            }
            DebugQuantity::MinvFluxes => {
                self.calculate_fluxes(mesh, state, velocities, charges, &mut packed)?;
                self.apply_inverse_mass(mesh, state, &mut packed);
            }
            DebugQuantity::LocalDiv => {
                self.calculate_local_div(mesh, state, velocities, &mut packed)?;
            }
            DebugQuantity::Rhs => {
                self.calculate_rhs(mesh, state, velocities, charges, &mut packed)?;
            }
        }

        self.map_to_mesh(mesh, state, &packed, out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::ReferenceQuad;
    use crate::reconstruction::{ReconstructorConfig, ShapeFunction};

    fn setup() -> (MeshData, AdvectiveReconstructor, AdvectiveState) {
        let rq = ReferenceQuad::new(2);
        let mesh = MeshData::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 3, 3, &rq);
        let ops = rq.local_operators().unwrap();
        let eng = AdvectiveReconstructor::new(ReconstructorConfig::default(), ops).unwrap();
        let state = AdvectiveState::new(eng.dofs_per_element());
        (mesh, eng, state)
    }

    #[test]
    fn test_density_scatter_covers_the_patch() {
        let (mesh, eng, mut state) = setup();
        eng.add_particle(
            &mesh,
            &mut state,
            0,
            1.0,
            (0.5, 0.5),
            ShapeFunction::new(0.2, 2.0),
        )
        .unwrap();

        let mut density = vec![0.0; mesh.n_nodes()];
        eng.reconstructed_density(&mesh, &state, &mut density);

        // The node under the particle center carries the peak; nodes of
        // untracked elements stay zero.
        let center_el = &mesh.elements[4];
        let peak_node = (center_el.node_start..center_el.node_end)
            .max_by(|&a, &b| density[a].partial_cmp(&density[b]).unwrap())
            .unwrap();
        assert!(density[peak_node] > 0.0);

        let tracked: Vec<usize> = state.particles[0]
            .elements
            .iter()
            .map(|el| el.element)
            .collect();
        for el in &mesh.elements {
            if !tracked.contains(&el.id) {
                for n in el.node_start..el.node_end {
                    assert_eq!(density[n], 0.0);
                }
            }
        }
    }

    #[test]
    fn test_overlapping_particles_sum() {
        let (mesh, mut eng, mut state) = setup();
        for pn in 0..2 {
            eng.add_particle(
                &mesh,
                &mut state,
                pn,
                1.0,
                (0.5, 0.5),
                ShapeFunction::new(0.2, 2.0),
            )
            .unwrap();
        }

        let mut mask = vec![0.0; mesh.n_nodes()];
        eng.debug_quantity(
            &mesh,
            &mut state,
            DebugQuantity::ActiveElements,
            &[(0.0, 0.0); 2],
            &[1.0; 2],
            &mut mask,
        )
        .unwrap();

        let center = &mesh.elements[4];
        for n in center.node_start..center.node_end {
            assert_eq!(mask[n], 2.0);
        }
    }

    #[test]
    fn test_rhs_quantity_matches_direct_computation() {
        let (mesh, mut eng, mut state) = setup();
        eng.add_particle(
            &mesh,
            &mut state,
            0,
            1.0,
            (0.5, 0.5),
            ShapeFunction::new(0.2, 2.0),
        )
        .unwrap();

        let mut rhs = Vec::new();
        eng.calculate_rhs(&mesh, &mut state, &[(1.0, 0.0)], &[1.0], &mut rhs)
            .unwrap();

        let mut scattered = vec![0.0; mesh.n_nodes()];
        eng.debug_quantity(
            &mesh,
            &mut state,
            DebugQuantity::Rhs,
            &[(1.0, 0.0)],
            &[1.0],
            &mut scattered,
        )
        .unwrap();

        let mut direct = vec![0.0; mesh.n_nodes()];
        eng.map_to_mesh(&mesh, &state, &rhs, &mut direct);
        for (a, b) in scattered.iter().zip(&direct) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
