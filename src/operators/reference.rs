//! Gauss-Lobatto-Legendre reference quad and operator factory.
//!
//! Tensor-product GLL collocation on `[-1, 1]²`. With collocated quadrature
//! the mass and face-mass matrices are diagonal, and the differentiation
//! matrix follows from barycentric Lagrange weights:
//!
//!   D[i][j] = (b_j / b_i) / (x_i - x_j)   for i ≠ j,
//!   D[i][i] = -Σ_{j≠i} D[i][j],
//!
//! with b_j = 1 / Π_{k≠j} (x_j - x_k).
//!
//! Node numbering is row-major over (r, s): node `n = s_idx * n_1d + r_idx`.
//! Face traces run counter-clockwise around the element.

use faer::Mat;

use super::{LocalOperators, OperatorError};

/// Outward unit normal of each face of the reference quad.
pub const FACE_NORMALS: [(f64, f64); 4] = [
    (0.0, -1.0), // face 0, bottom
    (1.0, 0.0),  // face 1, right
    (0.0, 1.0),  // face 2, top
    (-1.0, 0.0), // face 3, left
];

/// Node layout, quadrature, and operator factory for one tensor-product
/// GLL quad of a given polynomial order.
#[derive(Clone)]
pub struct ReferenceQuad {
    /// Polynomial order (>= 1).
    pub order: usize,
    /// Nodes per direction = order + 1.
    pub n_1d: usize,
    /// Volume nodes = (order + 1)².
    pub n_nodes: usize,
    /// Nodes per face = order + 1.
    pub n_face_nodes: usize,
    /// 1D GLL nodes in [-1, 1].
    pub nodes_1d: Vec<f64>,
    /// 1D GLL weights.
    pub weights_1d: Vec<f64>,
    /// r-coordinate of each volume node.
    pub nodes_r: Vec<f64>,
    /// s-coordinate of each volume node.
    pub nodes_s: Vec<f64>,
    /// Tensor-product quadrature weight of each volume node.
    pub weights: Vec<f64>,
    /// Volume-node offsets of each face trace, counter-clockwise.
    pub face_nodes: [Vec<usize>; 4],
}

impl ReferenceQuad {
    pub fn new(order: usize) -> Self {
        assert!(order >= 1, "order 0 elements have no face trace");
        let n = order + 1;

        let nodes_1d = gauss_lobatto_nodes(order);
        let weights_1d = gauss_lobatto_weights(order, &nodes_1d);

        let n_nodes = n * n;
        let mut nodes_r = Vec::with_capacity(n_nodes);
        let mut nodes_s = Vec::with_capacity(n_nodes);
        let mut weights = Vec::with_capacity(n_nodes);
        for s in 0..n {
            for r in 0..n {
                nodes_r.push(nodes_1d[r]);
                nodes_s.push(nodes_1d[s]);
                weights.push(weights_1d[r] * weights_1d[s]);
            }
        }

        // Counter-clockwise traces; node (r_idx, s_idx) lives at
        // s_idx * n + r_idx.
        let bottom: Vec<usize> = (0..n).collect();
        let right: Vec<usize> = (0..n).map(|j| j * n + (n - 1)).collect();
        let top: Vec<usize> = (0..n).rev().map(|i| (n - 1) * n + i).collect();
        let left: Vec<usize> = (0..n).rev().map(|j| j * n).collect();

        ReferenceQuad {
            order,
            n_1d: n,
            n_nodes,
            n_face_nodes: n,
            nodes_1d,
            weights_1d,
            nodes_r,
            nodes_s,
            weights,
            face_nodes: [bottom, right, top, left],
        }
    }

    /// Build the collocation operator bundle: diagonal mass/face-mass,
    /// inverse mass, and the tensor-product Dr/Ds differentiation
    /// matrices registered for axes 0 and 1. No filter.
    pub fn local_operators(&self) -> Result<LocalOperators, OperatorError> {
        let n = self.n_1d;
        let nn = self.n_nodes;

        let mut mass = Mat::zeros(nn, nn);
        let mut mass_inv = Mat::zeros(nn, nn);
        for i in 0..nn {
            mass[(i, i)] = self.weights[i];
            mass_inv[(i, i)] = 1.0 / self.weights[i];
        }

        let mut face_mass = Mat::zeros(n, n);
        for i in 0..n {
            face_mass[(i, i)] = self.weights_1d[i];
        }

        let d1 = differentiation_matrix_1d(&self.nodes_1d);
        let mut dr = Mat::zeros(nn, nn);
        let mut ds = Mat::zeros(nn, nn);
        for s in 0..n {
            for r in 0..n {
                let row = s * n + r;
                for k in 0..n {
                    dr[(row, s * n + k)] = d1[(r, k)];
                    ds[(row, k * n + r)] = d1[(s, k)];
                }
            }
        }

        let mut ops = LocalOperators::new(mass, mass_inv, face_mass, None)?;
        ops.add_diff_matrix(0, dr)?;
        ops.add_diff_matrix(1, ds)?;
        Ok(ops)
    }
}

/// GLL nodes: ±1 plus the roots of P'_N, found by Newton iteration from
/// Chebyshev-Lobatto initial guesses.
pub fn gauss_lobatto_nodes(order: usize) -> Vec<f64> {
    use std::f64::consts::PI;

    let n = order;
    if n == 1 {
        return vec![-1.0, 1.0];
    }

    let mut nodes: Vec<f64> = (0..=n).map(|j| -(PI * j as f64 / n as f64).cos()).collect();
    nodes[0] = -1.0;
    nodes[n] = 1.0;

    for node in nodes.iter_mut().take(n).skip(1) {
        let mut x = *node;
        for _ in 0..100 {
            let (p, dp) = legendre_and_derivative(n, x);
            // d/dx [(1-x²) P'_N] = -N(N+1) P_N, so Newton on (1-x²)P'_N
            // reads x += (1-x²) P'_N / (N(N+1) P_N).
            let update = (1.0 - x * x) * dp / (n as f64 * (n + 1) as f64 * p);
            x += update;
            if update.abs() < 1e-15 {
                break;
            }
        }
        *node = x;
    }

    nodes
}

/// GLL weights: w_j = 2 / (N(N+1) P_N(x_j)²).
pub fn gauss_lobatto_weights(order: usize, nodes: &[f64]) -> Vec<f64> {
    let denom = (order * (order + 1)) as f64;
    nodes
        .iter()
        .map(|&x| {
            let (p, _) = legendre_and_derivative(order, x);
            2.0 / (denom * p * p)
        })
        .collect()
}

/// Legendre polynomial P_n and its derivative at `x`, by the three-term
/// recurrence.
fn legendre_and_derivative(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut p_prev = 1.0;
    let mut p = x;
    for k in 1..n {
        let kf = k as f64;
        let p_next = ((2.0 * kf + 1.0) * x * p - kf * p_prev) / (kf + 1.0);
        p_prev = p;
        p = p_next;
    }
    // P'_n = n (x P_n - P_{n-1}) / (x² - 1), regularized at the endpoints.
    let dp = if (x * x - 1.0).abs() < 1e-14 {
        let sign: f64 = if x > 0.0 { 1.0 } else { -1.0 };
        sign.powi(n as i32 + 1) * n as f64 * (n + 1) as f64 / 2.0
    } else {
        n as f64 * (x * p - p_prev) / (x * x - 1.0)
    };
    (p, dp)
}

/// 1D nodal differentiation matrix from barycentric weights.
fn differentiation_matrix_1d(nodes: &[f64]) -> Mat<f64> {
    let n = nodes.len();
    let mut bary = vec![1.0; n];
    for j in 0..n {
        for k in 0..n {
            if k != j {
                bary[j] /= nodes[j] - nodes[k];
            }
        }
    }

    let mut d = Mat::zeros(n, n);
    for i in 0..n {
        let mut row_sum = 0.0;
        for j in 0..n {
            if i != j {
                let v = (bary[j] / bary[i]) / (nodes[i] - nodes[j]);
                d[(i, j)] = v;
                row_sum += v;
            }
        }
        d[(i, i)] = -row_sum;
    }
    d
}
