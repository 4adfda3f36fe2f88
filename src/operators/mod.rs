//! Element-local operator matrices and packed batched products.
//!
//! The engine stores every particle's per-element DOFs in one flat vector,
//! one slab of `dofs_per_element` coefficients per (particle, element). A
//! reference-space operator is applied to all slabs at once by viewing the
//! flat vector as a `dofs_per_element × n_slabs` column-major matrix and
//! issuing a single GEMM.

mod reference;

pub use reference::{ReferenceQuad, FACE_NORMALS};

use faer::linalg::matmul::matmul;
use faer::{Accum, Mat, MatMut, MatRef, Par};
use thiserror::Error;

/// Error type for operator assembly.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Differentiation matrices must be registered in axis order (r, s, ...).
    #[error("differentiation matrix for axis {got} registered out of order (expected axis {expected})")]
    DiffAxisOutOfOrder { expected: usize, got: usize },

    /// A supplied matrix does not match `dofs_per_element`.
    #[error("{context} is {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    DimensionMismatch {
        context: &'static str,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },
}

/// Reference-element operators shared by every element of the mesh.
///
/// Geometric scaling (jacobians) is applied separately by the engine, so
/// all matrices here live on the reference element.
#[derive(Clone, Debug)]
pub struct LocalOperators {
    /// DOFs per element (side length of the volume matrices).
    pub dofs_per_element: usize,
    /// Mass matrix.
    pub mass: Mat<f64>,
    /// Inverse mass matrix.
    pub mass_inv: Mat<f64>,
    /// Face mass matrix (`face_dofs × face_dofs`).
    pub face_mass: Mat<f64>,
    /// Optional filter applied when integrating the RHS into the density.
    pub filter: Option<Mat<f64>>,
    /// Differentiation matrices, one per reference axis, in axis order.
    diff: Vec<Mat<f64>>,
    /// Quadrature weights `M · 1`, for element integrals.
    pub integral_weights: Vec<f64>,
}

impl LocalOperators {
    /// Bundle the volume and face matrices. Differentiation matrices are
    /// registered afterwards with [`LocalOperators::add_diff_matrix`].
    pub fn new(
        mass: Mat<f64>,
        mass_inv: Mat<f64>,
        face_mass: Mat<f64>,
        filter: Option<Mat<f64>>,
    ) -> Result<Self, OperatorError> {
        let n = mass.nrows();
        check_square("mass matrix", &mass, n)?;
        check_square("inverse mass matrix", &mass_inv, n)?;
        check_square("face mass matrix", &face_mass, face_mass.nrows())?;
        if let Some(f) = &filter {
            check_square("filter matrix", f, n)?;
        }

        let mut integral_weights = vec![0.0; n];
        for i in 0..n {
            for j in 0..n {
                integral_weights[i] += mass[(i, j)];
            }
        }

        Ok(LocalOperators {
            dofs_per_element: n,
            mass,
            mass_inv,
            face_mass,
            filter,
            diff: Vec::new(),
            integral_weights,
        })
    }

    /// Register the differentiation matrix for the given reference axis.
    /// Axes must arrive in order: 0 (r), then 1 (s).
    pub fn add_diff_matrix(&mut self, axis: usize, matrix: Mat<f64>) -> Result<(), OperatorError> {
        if axis != self.diff.len() {
            return Err(OperatorError::DiffAxisOutOfOrder {
                expected: self.diff.len(),
                got: axis,
            });
        }
        check_square("differentiation matrix", &matrix, self.dofs_per_element)?;
        self.diff.push(matrix);
        Ok(())
    }

    /// Differentiation matrix for `axis`, if registered.
    pub fn diff_matrix(&self, axis: usize) -> Option<MatRef<'_, f64>> {
        self.diff.get(axis).map(|m| m.as_ref())
    }

    /// Number of registered differentiation axes.
    pub fn n_diff_axes(&self) -> usize {
        self.diff.len()
    }

    /// Number of DOFs on one face trace.
    pub fn face_dofs(&self) -> usize {
        self.face_mass.nrows()
    }
}

fn check_square(context: &'static str, m: &Mat<f64>, n: usize) -> Result<(), OperatorError> {
    if m.nrows() != n || m.ncols() != n {
        return Err(OperatorError::DimensionMismatch {
            context,
            rows: m.nrows(),
            cols: m.ncols(),
            expected_rows: n,
            expected_cols: n,
        });
    }
    Ok(())
}

/// Apply `matrix` to the first `n_slabs` slabs of `src`, writing into the
/// matching prefix of `dst`. One GEMM over all slabs: the packed vectors
/// are viewed as `dofs × n_slabs` column-major matrices.
pub fn packed_product(
    matrix: MatRef<'_, f64>,
    src: &[f64],
    dst: &mut [f64],
    dofs_per_element: usize,
    n_slabs: usize,
    accum: Accum,
) {
    if n_slabs == 0 {
        return;
    }
    let len = dofs_per_element * n_slabs;
    debug_assert!(src.len() >= len && dst.len() >= len);

    let src_mat = MatRef::from_column_major_slice(&src[..len], dofs_per_element, n_slabs);
    let mut dst_mat =
        MatMut::from_column_major_slice_mut(&mut dst[..len], dofs_per_element, n_slabs);

    matmul(&mut dst_mat, accum, &matrix, &src_mat, 1.0, Par::Seq);
}
