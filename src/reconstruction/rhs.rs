//! Volume terms and RHS assembly.
//!
//! The reference-space differentiation and inverse-mass matrices are
//! applied to all packed slabs with one GEMM each; the per-element
//! geometric factors (inverse map, jacobian) are folded in afterwards,
//! element by element. Slabs on the free list are zero, so batching over
//! the whole packed prefix costs only the GEMM width.

use faer::Accum;

use crate::mesh::MeshData;
use crate::operators::packed_product;
use crate::reconstruction::engine::AdvectiveReconstructor;
use crate::reconstruction::state::AdvectiveState;
use crate::reconstruction::ReconstructionError;

impl AdvectiveReconstructor {
    /// Accumulate the advective volume term `-v·∇ρ` of every particle
    /// into `local_div`, which is resized to the packed state vector and
    /// overwritten.
    pub fn calculate_local_div(
        &self,
        mesh: &MeshData,
        state: &AdvectiveState,
        velocities: &[(f64, f64)],
        local_div: &mut Vec<f64>,
    ) -> Result<(), ReconstructionError> {
        debug_assert_eq!(velocities.len(), state.particles.len());

        let dofs = self.dofs_per_element;
        let n_packed = state.packed_slab_count();
        let packed_len = n_packed * dofs;

        local_div.clear();
        local_div.resize(state.rho.len(), 0.0);

        // Reference-space derivatives of every slab, one axis at a time.
        let n_axes = mesh.dimensions;
        let mut rst = vec![0.0; packed_len * n_axes];
        for axis in 0..n_axes {
            let d = self
                .ops
                .diff_matrix(axis)
                .ok_or(ReconstructionError::MissingDiffMatrix { axis })?;
            packed_product(
                d,
                &state.rho,
                &mut rst[axis * packed_len..(axis + 1) * packed_len],
                dofs,
                n_packed,
                Accum::Replace,
            );
        }

        // Chain rule: dρ/dx_g = Σ_loc dρ/dr_loc · ∂r_loc/∂x_g.
        for pn in 0..state.particles.len() {
            let v = velocities[pn];
            for el in &state.particles[pn].elements {
                let inv = mesh.elements[el.element].inverse_map;
                for axis in 0..n_axes {
                    let coeff = -(v.0 * inv[axis][0] + v.1 * inv[axis][1]);
                    let base = axis * packed_len + el.start_index;
                    for i in 0..dofs {
                        local_div[el.start_index + i] += coeff * rst[base + i];
                    }
                }
            }
        }

        Ok(())
    }

    /// Apply the element-wise inverse mass matrix to `operand` in place:
    /// reference-space `M⁻¹` over all packed slabs, then `1/jacobian` per
    /// active element. Slabs not owned by any particle end up zero.
    pub fn apply_inverse_mass(
        &self,
        mesh: &MeshData,
        state: &AdvectiveState,
        operand: &mut [f64],
    ) {
        let dofs = self.dofs_per_element;
        let n_packed = state.packed_slab_count();
        let packed_len = n_packed * dofs;

        let mut scratch = vec![0.0; packed_len];
        packed_product(
            self.ops.mass_inv.as_ref(),
            operand,
            &mut scratch,
            dofs,
            n_packed,
            Accum::Replace,
        );

        operand[..packed_len].fill(0.0);
        for p in &state.particles {
            for el in &p.elements {
                let jac = mesh.elements[el.element].jacobian;
                for i in 0..dofs {
                    operand[el.start_index + i] = scratch[el.start_index + i] / jac;
                }
            }
        }
    }

    /// Full advective RHS, `dρ/dt = -v·∇ρ - M⁻¹·(surface fluxes)`, for
    /// every particle at once. Computes the fluxes first (which may grow
    /// the state through activation), so `rhs` matches the post-growth
    /// packed layout on return.
    pub fn calculate_rhs(
        &mut self,
        mesh: &MeshData,
        state: &mut AdvectiveState,
        velocities: &[(f64, f64)],
        charges: &[f64],
        rhs: &mut Vec<f64>,
    ) -> Result<(), ReconstructionError> {
        let mut fluxes = Vec::new();
        self.calculate_fluxes(mesh, state, velocities, charges, &mut fluxes)?;
        self.apply_inverse_mass(mesh, state, &mut fluxes);
        self.calculate_local_div(mesh, state, velocities, rhs)?;

        debug_assert_eq!(rhs.len(), fluxes.len());
        for (r, f) in rhs.iter_mut().zip(&fluxes) {
            *r -= f;
        }
        Ok(())
    }

    /// Integrate a (time-scaled) RHS increment into the density, through
    /// the filter matrix if one is configured.
    pub fn apply_rhs(&self, state: &mut AdvectiveState, rhs: &[f64]) {
        let dofs = self.dofs_per_element;
        let n_packed = state.packed_slab_count();
        let len = (n_packed * dofs).min(rhs.len());
        let n_slabs = len / dofs;

        match &self.ops.filter {
            Some(filter) => packed_product(
                filter.as_ref(),
                &rhs[..len],
                &mut state.rho[..len],
                dofs,
                n_slabs,
                Accum::Add,
            ),
            None => {
                for (r, inc) in state.rho[..len].iter_mut().zip(rhs) {
                    *r += inc;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::ReferenceQuad;
    use crate::reconstruction::{ReconstructorConfig, ShapeFunction};

    fn setup(
        order: usize,
        nx: usize,
        ny: usize,
    ) -> (MeshData, AdvectiveReconstructor, AdvectiveState) {
        let rq = ReferenceQuad::new(order);
        let mesh = MeshData::uniform_rectangle(0.0, 1.0, 0.0, 1.0, nx, ny, &rq);
        let ops = rq.local_operators().unwrap();
        let eng = AdvectiveReconstructor::new(ReconstructorConfig::default(), ops).unwrap();
        let state = AdvectiveState::new(eng.dofs_per_element());
        (mesh, eng, state)
    }

    /// Particle tracking one element, with the density set by `f(x, y)`.
    fn nodal_particle(
        mesh: &MeshData,
        state: &mut AdvectiveState,
        element: usize,
        f: impl Fn(f64, f64) -> f64,
    ) {
        use crate::reconstruction::state::{ActiveElement, AdvectedParticle};
        let (start, _) = state.allocate_slab();
        let node_start = mesh.elements[element].node_start;
        for i in 0..state.dofs_per_element() {
            let (x, y) = mesh.nodes[node_start + i];
            state.rho[start + i] = f(x, y);
        }
        let mut p = AdvectedParticle {
            shape: ShapeFunction::new(0.1, 2.0),
            ..Default::default()
        };
        p.elements.push(ActiveElement::new(element, start));
        state.particles.push(p);
    }

    #[test]
    fn test_local_div_of_linear_profile() {
        // ρ = x, v = (1, 0): -v·∇ρ = -1 on every node of the element.
        let (mesh, eng, mut state) = setup(3, 1, 1);
        nodal_particle(&mesh, &mut state, 0, |x, _| x);

        let mut local_div = Vec::new();
        eng.calculate_local_div(&mesh, &state, &[(1.0, 0.0)], &mut local_div)
            .unwrap();
        for i in 0..eng.dofs_per_element() {
            assert!(
                (local_div[i] + 1.0).abs() < 1e-11,
                "node {}: {}",
                i,
                local_div[i]
            );
        }
    }

    #[test]
    fn test_local_div_uses_both_axes() {
        // ρ = 2x + 3y, v = (1, 1): -v·∇ρ = -5.
        let (mesh, eng, mut state) = setup(2, 2, 2);
        nodal_particle(&mesh, &mut state, 3, |x, y| 2.0 * x + 3.0 * y);

        let mut local_div = Vec::new();
        eng.calculate_local_div(&mesh, &state, &[(1.0, 1.0)], &mut local_div)
            .unwrap();
        for i in 0..eng.dofs_per_element() {
            assert!((local_div[i] + 5.0).abs() < 1e-11);
        }
    }

    #[test]
    fn test_local_div_vanishes_for_zero_velocity() {
        let (mesh, eng, mut state) = setup(3, 2, 2);
        nodal_particle(&mesh, &mut state, 0, |x, y| (x * y).exp());

        let mut local_div = Vec::new();
        eng.calculate_local_div(&mesh, &state, &[(0.0, 0.0)], &mut local_div)
            .unwrap();
        assert!(local_div.iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_inverse_mass_inverts_mass_weights() {
        let (mesh, eng, mut state) = setup(2, 2, 2);
        nodal_particle(&mesh, &mut state, 0, |_, _| 0.0);

        // Feed M·1 (reference weights times jacobian): M⁻¹ gives back 1.
        let jac = mesh.elements[0].jacobian;
        let mut operand: Vec<f64> = eng
            .operators()
            .integral_weights
            .iter()
            .map(|w| w * jac)
            .collect();
        operand.resize(state.rho.len(), 0.0);

        eng.apply_inverse_mass(&mesh, &state, &mut operand);
        for i in 0..eng.dofs_per_element() {
            assert!((operand[i] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rhs_conserves_total_charge() {
        // A particle whose support sits strictly inside its patch: the
        // total charge derivative integrates to zero up to roundoff.
        let (mesh, mut eng, mut state) = setup(3, 4, 4);
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
        eng.calculate_rhs(&mesh, &mut state, &[(1.0, 0.5)], &[1.0], &mut rhs)
            .unwrap();

        let w = &eng.operators().integral_weights;
        let mut d_charge = 0.0;
        for el in &state.particles[0].elements {
            let jac = mesh.elements[el.element].jacobian;
            for i in 0..eng.dofs_per_element() {
                d_charge += jac * w[i] * rhs[el.start_index + i];
            }
        }
        assert!(d_charge.abs() < 1e-10, "d(charge)/dt = {}", d_charge);
    }

    #[test]
    fn test_rhs_moves_charge_downstream() {
        // d/dt ∫xρ = v_x · charge > 0 for v_x > 0.
        let (mesh, mut eng, mut state) = setup(3, 4, 4);
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

        let w = &eng.operators().integral_weights;
        let mut d_moment = 0.0;
        for el in &state.particles[0].elements {
            let info = &mesh.elements[el.element];
            for i in 0..eng.dofs_per_element() {
                let (x, _) = mesh.nodes[info.node_start + i];
                d_moment += info.jacobian * w[i] * x * rhs[el.start_index + i];
            }
        }
        assert!(
            (d_moment - 1.0).abs() < 0.05,
            "d/dt of the x-moment is {}, expected ~1",
            d_moment
        );
    }

    #[test]
    fn test_apply_rhs_without_filter_is_plain_addition() {
        let (_mesh, eng, mut state) = setup(1, 2, 2);
        let (start, _) = state.allocate_slab();
        state.slab_mut(start).fill(2.0);

        let rhs = vec![0.5; state.rho.len()];
        eng.apply_rhs(&mut state, &rhs);
        assert_eq!(state.slab(start), &[2.5, 2.5, 2.5, 2.5]);
    }

    #[test]
    fn test_missing_diff_matrix_is_reported() {
        use crate::operators::LocalOperators;
        use faer::Mat;

        let identity = |n: usize| {
            let mut m = Mat::zeros(n, n);
            for i in 0..n {
                m[(i, i)] = 1.0;
            }
            m
        };
        // Operators with no differentiation matrices at all.
        let ops = LocalOperators::new(identity(4), identity(4), identity(2), None).unwrap();
        let eng = AdvectiveReconstructor::new(ReconstructorConfig::default(), ops).unwrap();

        let rq = ReferenceQuad::new(1);
        let mesh = MeshData::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 2, 2, &rq);
        let state = AdvectiveState::new(4);
        let mut local_div = Vec::new();
        let err = eng
            .calculate_local_div(&mesh, &state, &[], &mut local_div)
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::MissingDiffMatrix { axis: 0 }));
    }
}
