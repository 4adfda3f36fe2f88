//! Engine construction, particle placement, and patch lifecycle plumbing.

use crate::mesh::{MeshData, INVALID_ELEMENT};
use crate::operators::LocalOperators;
use crate::reconstruction::state::{ActiveElement, AdvectedParticle, AdvectiveState};
use crate::reconstruction::{ReconstructionError, ShapeFunction, MAX_FACES};

/// Configuration of the advective reconstructor. All thresholds are
/// validated once, at construction.
#[derive(Clone, Copy, Debug)]
pub struct ReconstructorConfig {
    /// Faces per mesh element (4 for quads). At most [`MAX_FACES`].
    pub faces_per_element: usize,
    /// Relative trace magnitude (fraction of the particle's peak density)
    /// above which an outflow neighbor is activated. Must be positive.
    pub activation_threshold: f64,
    /// Relative charge fraction below which an element may retire. Must be
    /// positive.
    pub kill_threshold: f64,
    /// Upwind/central blend: 1 is pure upwind, 0 pure central.
    pub upwind_alpha: f64,
    /// Upkeep passes a freshly activated element survives unconditionally.
    pub activation_min_life: u32,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        ReconstructorConfig {
            faces_per_element: 4,
            activation_threshold: 1e-4,
            kill_threshold: 1e-5,
            upwind_alpha: 1.0,
            activation_min_life: 10,
        }
    }
}

/// Advective reconstruction engine.
///
/// Holds configuration, the reference-element operators, and running
/// activation/retirement counters. All mesh geometry and per-particle
/// state are passed in by the caller; the engine stores neither.
pub struct AdvectiveReconstructor {
    pub(crate) faces_per_element: usize,
    pub(crate) dofs_per_element: usize,
    pub(crate) ops: LocalOperators,
    pub(crate) activation_threshold: f64,
    pub(crate) kill_threshold: f64,
    pub(crate) upwind_alpha: f64,
    pub(crate) activation_min_life: u32,
    pub(crate) activations: u64,
    pub(crate) retirements: u64,
    warn: Box<dyn Fn(&str) + Send + Sync>,
}

impl std::fmt::Debug for AdvectiveReconstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvectiveReconstructor")
            .field("faces_per_element", &self.faces_per_element)
            .field("dofs_per_element", &self.dofs_per_element)
            .field("activation_threshold", &self.activation_threshold)
            .field("kill_threshold", &self.kill_threshold)
            .field("upwind_alpha", &self.upwind_alpha)
            .field("activation_min_life", &self.activation_min_life)
            .field("activations", &self.activations)
            .field("retirements", &self.retirements)
            .finish_non_exhaustive()
    }
}

impl AdvectiveReconstructor {
    pub fn new(
        config: ReconstructorConfig,
        ops: LocalOperators,
    ) -> Result<Self, ReconstructionError> {
        if !(config.activation_threshold > 0.0) {
            return Err(ReconstructionError::InvalidActivationThreshold(
                config.activation_threshold,
            ));
        }
        if !(config.kill_threshold > 0.0) {
            return Err(ReconstructionError::InvalidKillThreshold(
                config.kill_threshold,
            ));
        }
        if !(0.0..=1.0).contains(&config.upwind_alpha) {
            return Err(ReconstructionError::InvalidUpwindBlend(config.upwind_alpha));
        }
        if config.faces_per_element == 0 || config.faces_per_element > MAX_FACES {
            return Err(ReconstructionError::InvalidFaceCount(
                config.faces_per_element,
            ));
        }

        Ok(AdvectiveReconstructor {
            faces_per_element: config.faces_per_element,
            dofs_per_element: ops.dofs_per_element,
            activation_threshold: config.activation_threshold,
            kill_threshold: config.kill_threshold,
            upwind_alpha: config.upwind_alpha,
            activation_min_life: config.activation_min_life,
            activations: 0,
            retirements: 0,
            warn: Box::new(|msg| log::warn!("{msg}")),
            ops,
        })
    }

    /// Route non-fatal warnings somewhere other than the `log` crate.
    pub fn set_warning_handler(&mut self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.warn = Box::new(handler);
    }

    pub(crate) fn warn(&self, msg: &str) {
        (self.warn)(msg);
    }

    /// Total dynamic activations so far.
    pub fn activation_count(&self) -> u64 {
        self.activations
    }

    /// Total retired elements so far.
    pub fn retirement_count(&self) -> u64 {
        self.retirements
    }

    pub fn dofs_per_element(&self) -> usize {
        self.dofs_per_element
    }

    pub fn operators(&self) -> &LocalOperators {
        &self.ops
    }

    /// Quadrature integral of one slab over its element.
    pub(crate) fn element_integral(&self, jacobian: f64, slab: &[f64]) -> f64 {
        let w = &self.ops.integral_weights;
        jacobian * slab.iter().zip(w).map(|(v, w)| v * w).sum::<f64>()
    }

    /// L1 charge content of one slab.
    pub(crate) fn element_l1(&self, jacobian: f64, slab: &[f64]) -> f64 {
        let w = &self.ops.integral_weights;
        jacobian * slab.iter().zip(w).map(|(v, w)| v.abs() * w).sum::<f64>()
    }

    /// Register particle `pn` (which must be the next particle number):
    /// activate every element the shape's support touches, sample the
    /// shape at each node, wire mesh-adjacent covering elements together,
    /// and rescale so the patch integrates to `charge`.
    ///
    /// If the unscaled patch integrates to exactly zero (support too small
    /// to catch any node), a warning is emitted and the raw charge is used
    /// as the scale factor instead.
    pub fn add_particle(
        &self,
        mesh: &MeshData,
        state: &mut AdvectiveState,
        pn: usize,
        charge: f64,
        center: (f64, f64),
        shape: ShapeFunction,
    ) -> Result<(), ReconstructionError> {
        if pn != state.particles.len() {
            return Err(ReconstructionError::ParticleOutOfSequence {
                expected: state.particles.len(),
                got: pn,
            });
        }

        let dofs = self.dofs_per_element;
        let mut particle = AdvectedParticle {
            shape,
            ..Default::default()
        };

        // Activate and sample every covering element. A periodic image may
        // revisit an element already in the patch; its samples accumulate
        // into the existing slab.
        let mut visits: Vec<(usize, (f64, f64))> = Vec::new();
        mesh.for_each_covering_element(center, shape.radius(), |id, image_center| {
            visits.push((id, image_center));
        });

        for (id, image_center) in visits {
            let einfo = &mesh.elements[id];
            let (start, fresh) = match particle.find_element(id) {
                Some(el) => (el.start_index, false),
                None => {
                    let (start, _) = state.allocate_slab();
                    particle.elements.push(ActiveElement::new(id, start));
                    (start, true)
                }
            };
            for i in 0..dofs {
                let (nx, ny) = mesh.nodes[einfo.node_start + i];
                let value = particle
                    .shape
                    .eval(nx - image_center.0, ny - image_center.1);
                if fresh {
                    state.rho[start + i] = value;
                } else {
                    state.rho[start + i] += value;
                }
            }
        }

        // Wire symmetric connections between covering elements that are
        // mesh-adjacent.
        let patch_ids: Vec<usize> = particle.elements.iter().map(|el| el.element).collect();
        for el in &mut particle.elements {
            let einfo = &mesh.elements[el.element];
            for (face, f) in einfo.faces.iter().enumerate().take(self.faces_per_element) {
                if f.neighbor != INVALID_ELEMENT && patch_ids.contains(&f.neighbor) {
                    el.connections[face] = f.neighbor;
                }
            }
        }

        // Rescale the whole patch so its integral equals the charge.
        let mut unscaled_mass = 0.0;
        for el in &particle.elements {
            let jac = mesh.elements[el.element].jacobian;
            unscaled_mass += self.element_integral(jac, state.slab(el.start_index));
        }

        let scale = if unscaled_mass == 0.0 {
            self.warn(&format!(
                "reconstructed initial mass of particle {} is zero ({} patch elements)",
                pn,
                particle.elements.len()
            ));
            charge
        } else {
            charge / unscaled_mass
        };

        for el in &particle.elements {
            for v in state.slab_mut(el.start_index) {
                *v *= scale;
            }
        }

        state.particles.push(particle);
        Ok(())
    }

    /// Overwrite particles `[to, to + count)` with `[from, from + count)`,
    /// releasing the slabs of the overwritten particles. Used by hosts
    /// that compact their particle arrays; the vacated source entries
    /// still alias their slabs until [`AdvectiveReconstructor::set_particle_count`]
    /// drops them.
    pub fn note_move(
        &self,
        state: &mut AdvectiveState,
        from: usize,
        to: usize,
        count: usize,
    ) -> Result<(), ReconstructionError> {
        for i in 0..count {
            let starts: Vec<usize> = state.particles[to + i]
                .elements
                .iter()
                .map(|el| el.start_index)
                .collect();
            for start in starts {
                state.deallocate_slab(start)?;
            }
            let moved = state.particles[from + i].clone();
            state.particles[to + i] = moved;
        }
        Ok(())
    }

    /// Resize the particle table. Grown entries are empty placeholders; no
    /// slabs are released on shrink (entries dropped here are expected to
    /// have been relocated with [`AdvectiveReconstructor::note_move`]).
    pub fn set_particle_count(&self, state: &mut AdvectiveState, count: usize) {
        state.particles.resize_with(count, AdvectedParticle::default);
    }
}
