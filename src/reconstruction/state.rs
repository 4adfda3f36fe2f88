//! Packed state vector, slab allocator, and per-particle patch state.
//!
//! Every (particle, element) pair owns one slab of `dofs_per_element`
//! coefficients inside the flat `rho` vector. Slabs are recycled through a
//! LIFO free list; when the packed region is exhausted the backing vector
//! doubles. Allocation and deallocation report what happened through
//! [`SlabEvent`] so callers can keep auxiliary per-step vectors (e.g. the
//! flux accumulator) in lockstep.

use crate::mesh::INVALID_ELEMENT;
use crate::reconstruction::{ReconstructionError, ShapeFunction};

/// Maximum faces per element supported by the fixed-size connection array.
pub const MAX_FACES: usize = 4;

/// What a slab operation did to the backing vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlabEvent {
    /// Nothing beyond the allocation bookkeeping itself.
    None,
    /// The backing vector grew (contents preserved, new region zeroed).
    /// Auxiliary packed vectors must grow to `new_len` as well.
    Grown { new_len: usize },
    /// The slab starting at `start` was released and zeroed.
    Reset { start: usize, len: usize },
}

/// One mesh element tracked by one particle.
#[derive(Clone, Debug)]
pub struct ActiveElement {
    /// Mesh element id (index into the geometry table).
    pub element: usize,
    /// Patch-sibling element ids per local face, [`INVALID_ELEMENT`] where
    /// the neighbor is inactive or the face is a boundary.
    pub connections: [usize; MAX_FACES],
    /// Offset of this element's slab in the packed state vector.
    pub start_index: usize,
    /// Remaining upkeep passes during which the element may not retire.
    pub min_life: u32,
}

impl ActiveElement {
    pub fn new(element: usize, start_index: usize) -> Self {
        ActiveElement {
            element,
            connections: [INVALID_ELEMENT; MAX_FACES],
            start_index,
            min_life: 0,
        }
    }
}

/// One particle's shape and patch of active elements.
#[derive(Clone, Debug, Default)]
pub struct AdvectedParticle {
    pub shape: ShapeFunction,
    pub elements: Vec<ActiveElement>,
}

impl AdvectedParticle {
    /// Linear scan by element id; patches are bounded by local mesh
    /// connectivity and stay small.
    pub fn find_element(&self, element: usize) -> Option<&ActiveElement> {
        if element == INVALID_ELEMENT {
            return None;
        }
        self.elements.iter().find(|el| el.element == element)
    }

    pub fn find_element_mut(&mut self, element: usize) -> Option<&mut ActiveElement> {
        if element == INVALID_ELEMENT {
            return None;
        }
        self.elements.iter_mut().find(|el| el.element == element)
    }
}

/// Packed coefficient vector plus allocator bookkeeping and the particle
/// patches that index into it.
#[derive(Clone, Debug, Default)]
pub struct AdvectiveState {
    /// Flat coefficient vector, `dofs_per_element` per slab.
    pub rho: Vec<f64>,
    /// Released slab indices (slab numbers, not DOF offsets), LIFO.
    freelist: Vec<usize>,
    /// Number of live slabs.
    active_elements: usize,
    /// Per-particle patches, indexed by particle number.
    pub particles: Vec<AdvectedParticle>,
    dofs_per_element: usize,
}

impl AdvectiveState {
    pub fn new(dofs_per_element: usize) -> Self {
        assert!(dofs_per_element > 0, "dofs_per_element must be nonzero");
        AdvectiveState {
            rho: Vec::new(),
            freelist: Vec::new(),
            active_elements: 0,
            particles: Vec::new(),
            dofs_per_element,
        }
    }

    pub fn dofs_per_element(&self) -> usize {
        self.dofs_per_element
    }

    /// Number of live slabs.
    pub fn active_count(&self) -> usize {
        self.active_elements
    }

    /// Slabs in the packed (contiguous) region: live plus free. Batched
    /// operators run over this whole prefix.
    pub fn packed_slab_count(&self) -> usize {
        self.active_elements + self.freelist.len()
    }

    /// Claim a slab and return its DOF offset. Reuses the most recently
    /// freed slab if any; otherwise extends the packed region, doubling
    /// the backing vector when full. O(1) amortized, never blocks.
    pub fn allocate_slab(&mut self) -> (usize, SlabEvent) {
        let dofs = self.dofs_per_element;

        if let Some(idx) = self.freelist.pop() {
            self.active_elements += 1;
            return (idx * dofs, SlabEvent::None);
        }

        let mut event = SlabEvent::None;
        let available = self.rho.len() / dofs;
        if self.active_elements == available {
            let new_len = (2 * self.rho.len()).max(dofs);
            self.rho.resize(new_len, 0.0);
            event = SlabEvent::Grown { new_len };
        }

        let start = self.active_elements * dofs;
        self.active_elements += 1;
        (start, event)
    }

    /// Release the slab at `start_index`. The slab is zeroed; if it is not
    /// the last packed slab it goes on the free list for reuse.
    pub fn deallocate_slab(&mut self, start_index: usize) -> Result<SlabEvent, ReconstructionError> {
        let dofs = self.dofs_per_element;
        if start_index % dofs != 0 {
            return Err(ReconstructionError::MisalignedDeallocation {
                start: start_index,
                dofs,
            });
        }

        let idx = start_index / dofs;
        self.active_elements -= 1;
        if idx != self.active_elements + self.freelist.len() {
            self.freelist.push(idx);
        }
        self.rho[start_index..start_index + dofs].fill(0.0);
        Ok(SlabEvent::Reset {
            start: start_index,
            len: dofs,
        })
    }

    /// Drop all particles and slabs, keeping the backing capacity.
    pub fn clear(&mut self) {
        self.particles.clear();
        self.freelist.clear();
        self.active_elements = 0;
        self.rho.fill(0.0);
    }

    /// Slab view.
    pub fn slab(&self, start_index: usize) -> &[f64] {
        &self.rho[start_index..start_index + self.dofs_per_element]
    }

    /// Mutable slab view.
    pub fn slab_mut(&mut self, start_index: usize) -> &mut [f64] {
        let dofs = self.dofs_per_element;
        &mut self.rho[start_index..start_index + dofs]
    }
}
