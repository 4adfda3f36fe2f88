//! Patch shrinkage: retiring elements whose charge has decayed.
//!
//! Once per step the host calls [`AdvectiveReconstructor::perform_upkeep`].
//! An element retires when its grace period has run out and its L1 charge
//! content has dropped below the kill threshold relative to the particle's
//! charge. Retirement severs the element's patch connections, releases its
//! slab, and compacts the element list.

use crate::mesh::{MeshData, INVALID_ELEMENT};
use crate::reconstruction::engine::AdvectiveReconstructor;
use crate::reconstruction::state::AdvectiveState;
use crate::reconstruction::ReconstructionError;

impl AdvectiveReconstructor {
    /// Run one retirement pass over every particle.
    ///
    /// Freshly activated elements first burn down their `min_life` grace
    /// counter; only elements with an expired counter are candidates. All
    /// candidates of a particle are severed before any is removed, so
    /// adjacent elements may retire together in one pass.
    pub fn perform_upkeep(
        &mut self,
        mesh: &MeshData,
        state: &mut AdvectiveState,
        charges: &[f64],
    ) -> Result<(), ReconstructionError> {
        debug_assert_eq!(charges.len(), state.particles.len());

        for pn in 0..state.particles.len() {
            let charge = charges[pn].abs();

            for el in &mut state.particles[pn].elements {
                if el.min_life > 0 {
                    el.min_life -= 1;
                }
            }

            // Mark.
            let mut retire = Vec::new();
            for idx in 0..state.particles[pn].elements.len() {
                let el = &state.particles[pn].elements[idx];
                if el.min_life != 0 {
                    continue;
                }
                let jac = mesh.elements[el.element].jacobian;
                let l1 = self.element_l1(jac, state.slab(el.start_index));
                let relative = if charge == 0.0 { l1 } else { l1 / charge };
                if relative < self.kill_threshold {
                    retire.push(idx);
                }
            }
            if retire.is_empty() {
                continue;
            }

            // Sever while every element is still present, so that mutually
            // connected candidates can both be looked up.
            for &idx in &retire {
                let (en, connections) = {
                    let el = &state.particles[pn].elements[idx];
                    (el.element, el.connections)
                };
                for &conn in connections.iter() {
                    if conn == INVALID_ELEMENT {
                        continue;
                    }
                    let sib = state.particles[pn].find_element_mut(conn).ok_or(
                        ReconstructionError::ActiveNeighborNotFound {
                            element: en,
                            neighbor: conn,
                        },
                    )?;
                    for c in sib.connections.iter_mut() {
                        if *c == en {
                            *c = INVALID_ELEMENT;
                        }
                    }
                }
            }

            // Release slabs, then compact the element list.
            for &idx in &retire {
                let start = state.particles[pn].elements[idx].start_index;
                state.deallocate_slab(start)?;
                state.particles[pn].elements[idx].element = INVALID_ELEMENT;
                self.retirements += 1;
            }
            state.particles[pn]
                .elements
                .retain(|el| el.element != INVALID_ELEMENT);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::ReferenceQuad;
    use crate::reconstruction::state::{ActiveElement, AdvectedParticle};
    use crate::reconstruction::{ReconstructorConfig, ShapeFunction};

    fn setup(order: usize) -> (MeshData, AdvectiveReconstructor, AdvectiveState) {
        let rq = ReferenceQuad::new(order);
        let mesh = MeshData::uniform_rectangle(0.0, 1.0, 0.0, 1.0, 3, 3, &rq);
        let ops = rq.local_operators().unwrap();
        let eng = AdvectiveReconstructor::new(ReconstructorConfig::default(), ops).unwrap();
        let state = AdvectiveState::new(eng.dofs_per_element());
        (mesh, eng, state)
    }

    /// Particle tracking elements 4 and 5 (center and right of the middle
    /// row), connected across their shared face, with uniform densities
    /// `left` and `right`.
    fn two_element_particle(state: &mut AdvectiveState, left: f64, right: f64) {
        let (a, _) = state.allocate_slab();
        let (b, _) = state.allocate_slab();
        state.slab_mut(a).fill(left);
        state.slab_mut(b).fill(right);

        let mut el_a = ActiveElement::new(4, a);
        el_a.connections[1] = 5;
        let mut el_b = ActiveElement::new(5, b);
        el_b.connections[3] = 4;

        let mut p = AdvectedParticle {
            shape: ShapeFunction::new(0.1, 2.0),
            ..Default::default()
        };
        p.elements.push(el_a);
        p.elements.push(el_b);
        state.particles.push(p);
    }

    #[test]
    fn test_decayed_element_retires_and_is_severed() {
        let (mesh, mut eng, mut state) = setup(2);
        two_element_particle(&mut state, 1.0, 1e-12);
        let live_before = state.active_count();

        eng.perform_upkeep(&mesh, &mut state, &[1.0]).unwrap();

        let p = &state.particles[0];
        assert_eq!(p.elements.len(), 1);
        assert!(p.find_element(5).is_none(), "element 5 should be retired");
        assert_eq!(
            p.find_element(4).unwrap().connections[1],
            INVALID_ELEMENT,
            "connection to the retired element must be severed"
        );
        assert_eq!(state.active_count(), live_before - 1);
        assert_eq!(eng.retirement_count(), 1);
    }

    #[test]
    fn test_min_life_protects_fresh_elements() {
        let (mesh, mut eng, mut state) = setup(2);
        two_element_particle(&mut state, 1.0, 0.0);
        state.particles[0].find_element_mut(5).unwrap().min_life = 3;

        // Two passes only burn the grace counter down; the third retires.
        eng.perform_upkeep(&mesh, &mut state, &[1.0]).unwrap();
        assert!(state.particles[0].find_element(5).is_some());
        eng.perform_upkeep(&mesh, &mut state, &[1.0]).unwrap();
        assert!(state.particles[0].find_element(5).is_some());
        eng.perform_upkeep(&mesh, &mut state, &[1.0]).unwrap();
        assert!(state.particles[0].find_element(5).is_none());
    }

    #[test]
    fn test_adjacent_elements_retire_together() {
        let (mesh, mut eng, mut state) = setup(2);
        two_element_particle(&mut state, 0.0, 0.0);

        eng.perform_upkeep(&mesh, &mut state, &[1.0]).unwrap();
        assert!(state.particles[0].elements.is_empty());
        assert_eq!(state.active_count(), 0);
        assert_eq!(eng.retirement_count(), 2);
    }

    #[test]
    fn test_charged_elements_survive() {
        let (mesh, mut eng, mut state) = setup(2);
        two_element_particle(&mut state, 1.0, 0.5);

        for _ in 0..5 {
            eng.perform_upkeep(&mesh, &mut state, &[1.0]).unwrap();
        }
        assert_eq!(state.particles[0].elements.len(), 2);
        assert_eq!(eng.retirement_count(), 0);
    }
}
