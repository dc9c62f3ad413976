//! Time-domain discretization: backward Euler and orthogonal collocation on
//! finite elements (Radau roots).
//!
//! The continuous model lives on a normalized horizon τ ∈ \[0, 1\] with the
//! physical duration `Tf` as a decision variable. A [`Mesh`] is the full
//! description of one discretization: the strictly increasing τ points where
//! algebraic constraints are replicated, and the [`DifferentialLink`]s that
//! tie the dried-cake state between points.
//!
//! Both schemes sit behind the small [`Discretization`] capability set, so a
//! third scheme (e.g. trapezoid) can be added without touching the model
//! builder or the staged driver.

use serde::{Deserialize, Serialize};

use crate::scenario::ScenarioError;

/// Discretization family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscretizationMethod {
    /// First-order implicit finite differences.
    BackwardEuler,
    /// Orthogonal collocation on finite elements at Radau roots.
    CollocationRadau,
}

impl DiscretizationMethod {
    /// Method tag used in persisted benchmark records ("fd" / "colloc").
    pub fn as_tag(&self) -> &'static str {
        match self {
            DiscretizationMethod::BackwardEuler => "fd",
            DiscretizationMethod::CollocationRadau => "colloc",
        }
    }
}

/// User-facing mesh request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MeshSpec {
    pub method: DiscretizationMethod,
    /// Number of finite elements (or, with `effective_nfe`, the target
    /// number of interior points for collocation).
    pub n_elements: usize,
    /// Collocation points per element (2, 3 or 5; collocation only).
    pub n_collocation: usize,
    /// Reinterpret `n_elements` as total interior points for collocation so
    /// mesh density is comparable to backward Euler at the same request.
    pub effective_nfe: bool,
}

impl MeshSpec {
    /// Backward Euler with `n_elements` intervals.
    pub fn backward_euler(n_elements: usize) -> Self {
        MeshSpec {
            method: DiscretizationMethod::BackwardEuler,
            n_elements,
            n_collocation: 3,
            effective_nfe: false,
        }
    }

    /// Radau collocation with density parity against backward Euler.
    pub fn collocation(n_elements: usize, n_collocation: usize) -> Self {
        MeshSpec {
            method: DiscretizationMethod::CollocationRadau,
            n_elements,
            n_collocation,
            effective_nfe: true,
        }
    }

    /// Validates the request, collecting every violation.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let mut violations = Vec::new();
        if self.n_elements < 1 {
            violations.push(format!("n_elements = {} must be at least 1", self.n_elements));
        }
        if self.method == DiscretizationMethod::CollocationRadau
            && !matches!(self.n_collocation, 2 | 3 | 5)
        {
            violations.push(format!(
                "n_collocation = {} must be one of 2, 3, 5",
                self.n_collocation
            ));
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ScenarioError::Invalid { violations })
        }
    }

    /// Number of finite elements actually applied (effective-NFE parity).
    pub fn n_elements_applied(&self) -> usize {
        match self.method {
            DiscretizationMethod::BackwardEuler => self.n_elements,
            DiscretizationMethod::CollocationRadau => {
                if self.effective_nfe {
                    self.n_elements.div_ceil(self.n_collocation).max(1)
                } else {
                    self.n_elements
                }
            }
        }
    }
}

/// One discretized differential relation for the cake-length state.
///
/// The link expresses `Σ weights[i]·Lck[stencil[i]] = h·Tf·f(state at
/// eval_point)` where `f` is the continuous right-hand side. Backward Euler
/// is the two-point stencil `[−1, +1]`; a collocation link carries one row
/// of the Lagrange derivative matrix over its element's points.
#[derive(Debug, Clone)]
pub struct DifferentialLink {
    /// Mesh-point indices whose state values enter the relation
    pub stencil: Vec<usize>,
    /// Weight of each stencil entry
    pub weights: Vec<f64>,
    /// Mesh point at which the right-hand side is evaluated
    pub eval_point: usize,
    /// Element length in normalized time
    pub h: f64,
}

/// A placed mesh: ordered τ points plus differential links.
#[derive(Debug, Clone)]
pub struct Mesh {
    /// Strictly increasing normalized time points, τ_0 = 0, τ_M = 1
    pub taus: Vec<f64>,
    /// Differential links in mesh order
    pub links: Vec<DifferentialLink>,
    pub method: DiscretizationMethod,
    pub n_elements_requested: usize,
    pub n_elements_applied: usize,
    /// Collocation points per element (None for finite differences)
    pub n_collocation: Option<usize>,
}

impl Mesh {
    /// Total number of mesh points (algebraic replicas).
    pub fn total_points(&self) -> usize {
        self.taus.len()
    }
}

/// Capability set shared by discretization schemes.
pub trait Discretization {
    /// Record tag ("fd" / "colloc").
    fn tag(&self) -> &'static str;
    /// Places mesh points and emits differential links for a validated spec.
    fn place_mesh(&self, spec: &MeshSpec) -> Mesh;
    /// Mesh points the scheme will produce for a spec.
    fn total_mesh_points(&self, spec: &MeshSpec) -> usize;
}

/// Scheme lookup for a method.
pub fn scheme_for(method: DiscretizationMethod) -> &'static dyn Discretization {
    match method {
        DiscretizationMethod::BackwardEuler => &BackwardEulerScheme,
        DiscretizationMethod::CollocationRadau => &RadauCollocationScheme,
    }
}

/// Places the mesh for a validated spec.
pub fn place_mesh(spec: &MeshSpec) -> Mesh {
    scheme_for(spec.method).place_mesh(spec)
}

struct BackwardEulerScheme;

impl Discretization for BackwardEulerScheme {
    fn tag(&self) -> &'static str {
        "fd"
    }

    fn place_mesh(&self, spec: &MeshSpec) -> Mesh {
        let n = spec.n_elements;
        let h = 1.0 / n as f64;
        let taus: Vec<f64> = (0..=n).map(|k| k as f64 * h).collect();
        let links = (1..=n)
            .map(|k| DifferentialLink {
                stencil: vec![k - 1, k],
                weights: vec![-1.0, 1.0],
                eval_point: k,
                h,
            })
            .collect();
        Mesh {
            taus,
            links,
            method: spec.method,
            n_elements_requested: spec.n_elements,
            n_elements_applied: n,
            n_collocation: None,
        }
    }

    fn total_mesh_points(&self, spec: &MeshSpec) -> usize {
        spec.n_elements + 1
    }
}

struct RadauCollocationScheme;

/// Radau IIA roots on (0, 1], right endpoint included.
fn radau_roots(ncp: usize) -> &'static [f64] {
    match ncp {
        2 => &[1.0 / 3.0, 1.0],
        3 => &[0.155_051_025_721_682_2, 0.644_948_974_278_317_8, 1.0],
        5 => &[
            0.057_104_196_114_517_68,
            0.276_843_013_638_123_83,
            0.583_590_432_368_916_8,
            0.860_240_135_656_219_5,
            1.0,
        ],
        _ => unreachable!("MeshSpec::validate admits only 2, 3, 5 collocation points"),
    }
}

/// Derivative of the Lagrange basis polynomial `L_k` at node `s_j`, over
/// the node set `nodes`.
fn lagrange_basis_derivative(nodes: &[f64], k: usize, j: usize) -> f64 {
    let n = nodes.len();
    if k == j {
        (0..n).filter(|&m| m != j).map(|m| 1.0 / (nodes[j] - nodes[m])).sum()
    } else {
        let mut num = 1.0;
        for m in 0..n {
            if m != k && m != j {
                num *= nodes[j] - nodes[m];
            }
        }
        let mut den = 1.0;
        for m in 0..n {
            if m != k {
                den *= nodes[k] - nodes[m];
            }
        }
        num / den
    }
}

impl Discretization for RadauCollocationScheme {
    fn tag(&self) -> &'static str {
        "colloc"
    }

    fn place_mesh(&self, spec: &MeshSpec) -> Mesh {
        let nfe = spec.n_elements_applied();
        let ncp = spec.n_collocation;
        let roots = radau_roots(ncp);
        let h = 1.0 / nfe as f64;

        // Element-local nodes: the left boundary plus the Radau roots. The
        // rightmost root is 1, so element boundaries are shared points.
        let mut local_nodes = Vec::with_capacity(ncp + 1);
        local_nodes.push(0.0);
        local_nodes.extend_from_slice(roots);

        let mut taus = vec![0.0];
        let mut links = Vec::with_capacity(nfe * ncp);
        for e in 0..nfe {
            let t_start = e as f64 * h;
            let start_idx = taus.len() - 1;
            let mut stencil = vec![start_idx];
            for (j, &root) in roots.iter().enumerate() {
                taus.push(t_start + root * h);
                stencil.push(start_idx + 1 + j);
            }
            for j in 0..ncp {
                // Row j+1 of the derivative matrix: d/ds at the j-th root.
                let weights: Vec<f64> = (0..=ncp)
                    .map(|k| lagrange_basis_derivative(&local_nodes, k, j + 1))
                    .collect();
                links.push(DifferentialLink {
                    stencil: stencil.clone(),
                    weights,
                    eval_point: start_idx + 1 + j,
                    h,
                });
            }
        }

        Mesh {
            taus,
            links,
            method: spec.method,
            n_elements_requested: spec.n_elements,
            n_elements_applied: nfe,
            n_collocation: Some(ncp),
        }
    }

    fn total_mesh_points(&self, spec: &MeshSpec) -> usize {
        spec.n_elements_applied() * spec.n_collocation + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_euler_mesh_shape() {
        let spec = MeshSpec::backward_euler(24);
        spec.validate().unwrap();
        let mesh = place_mesh(&spec);
        assert_eq!(mesh.total_points(), 25);
        assert_eq!(mesh.links.len(), 24);
        assert_eq!(mesh.taus[0], 0.0);
        assert!((mesh.taus[24] - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_mesh_points_strictly_increasing() {
        for spec in [
            MeshSpec::backward_euler(17),
            MeshSpec::collocation(24, 3),
            MeshSpec::collocation(100, 5),
        ] {
            let mesh = place_mesh(&spec);
            for w in mesh.taus.windows(2) {
                assert!(w[1] > w[0], "τ not strictly increasing: {:?}", w);
            }
            assert!((mesh.taus.last().unwrap() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_effective_nfe_parity_with_finite_differences() {
        // With effective NFE on, collocation matches BE density within ±ncp.
        let n = 100;
        let be = place_mesh(&MeshSpec::backward_euler(n));
        let colloc = place_mesh(&MeshSpec::collocation(n, 3));
        let diff = (be.total_points() as i64 - colloc.total_points() as i64).abs();
        assert!(diff <= 3, "BE {} vs colloc {}", be.total_points(), colloc.total_points());
        assert_eq!(colloc.n_elements_requested, 100);
        assert_eq!(colloc.n_elements_applied, 34);
    }

    #[test]
    fn test_raw_collocation_element_count() {
        let mut spec = MeshSpec::collocation(8, 3);
        spec.effective_nfe = false;
        let mesh = place_mesh(&spec);
        assert_eq!(mesh.n_elements_applied, 8);
        assert_eq!(mesh.total_points(), 25);
    }

    #[test]
    fn test_invalid_spec_collects_violations() {
        let spec = MeshSpec { n_collocation: 4, ..MeshSpec::collocation(0, 4) };
        let err = spec.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("n_elements"));
        assert!(msg.contains("n_collocation"));
    }

    #[test]
    fn test_derivative_matrix_annihilates_constants() {
        // Each link row is a differentiation stencil: it must send constant
        // functions to zero and recover the slope of linear functions.
        for ncp in [2, 3, 5] {
            let mesh = place_mesh(&MeshSpec::collocation(ncp * 2, ncp));
            for link in &mesh.links {
                let row_sum: f64 = link.weights.iter().sum();
                assert!(row_sum.abs() < 1e-10, "ncp={ncp}: Σw = {row_sum}");
                // Linear function u(s) = s on local nodes.
                let mut local_nodes = vec![0.0];
                local_nodes.extend_from_slice(radau_roots(ncp));
                let slope: f64 = link
                    .weights
                    .iter()
                    .zip(&local_nodes)
                    .map(|(w, s)| w * s)
                    .sum();
                assert!((slope - 1.0).abs() < 1e-10, "ncp={ncp}: slope = {slope}");
            }
        }
    }

    #[test]
    fn test_backward_euler_link_is_first_difference() {
        let mesh = place_mesh(&MeshSpec::backward_euler(4));
        let link = &mesh.links[2];
        assert_eq!(link.stencil, vec![2, 3]);
        assert_eq!(link.weights, vec![-1.0, 1.0]);
        assert_eq!(link.eval_point, 3);
        assert!((link.h - 0.25).abs() < 1e-15);
    }
}
