//! Nonlinear interior-point solver for the discretized drying problem.
//!
//! The solver is a damped primal-dual interior-point method: slacks on the
//! inequality constraints, logarithmic barriers on slacks and variable
//! bounds, exact first derivatives from dual numbers and exact Lagrangian
//! second derivatives from hyper-duals, and a dense LU factorization of the
//! condensed KKT system at every iteration. Steps obey a
//! fraction-to-boundary rule and a backtracking line search on an exact
//! penalty merit function; the barrier parameter shrinks superlinearly once
//! the current barrier problem is solved.
//!
//! # Option hygiene
//!
//! [`SolverOptions`] is passed **by value** at every invocation and nothing
//! is retained between solves. In particular the warm-start bound-push
//! options exist only inside the option value that carries them; a
//! benchmarking loop can never inherit them from a previous run.
//!
//! # Submodules
//!
//! - [`staged`]: the four-phase F→T→C→O solve driver.

pub mod staged;

use std::collections::BTreeMap;
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::nlp::Nlp;

/// Name of the built-in solver backend.
pub const SOLVER_NAME: &str = "interior_point";

/// Version tag of the solver implementation, reported in diagnostics.
pub const SOLVER_VERSION: &str = concat!("lyodry-ipm/", env!("CARGO_PKG_VERSION"));

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Errors that can occur during solving.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The requested solver backend does not exist. Non-retryable.
    #[error("solver '{0}' is not available (built-in backend: 'interior_point')")]
    Unavailable(String),
    /// The KKT system stayed singular through the regularization ladder.
    #[error("KKT factorization failed even under maximum regularization")]
    SingularKkt,
    /// A residual, gradient or Hessian evaluation produced a non-finite value.
    #[error("non-finite value encountered while evaluating {0}")]
    NonFinite(&'static str),
}

/// Barrier-parameter update strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MuStrategy {
    /// Fixed reduction factor once each barrier problem converges.
    Monotone,
    /// Additionally tracks average complementarity between reductions.
    Adaptive,
}

impl MuStrategy {
    fn as_str(&self) -> &'static str {
        match self {
            MuStrategy::Monotone => "monotone",
            MuStrategy::Adaptive => "adaptive",
        }
    }
}

/// Options enabled only when the caller explicitly requests a warm start.
///
/// These reduce the interiorization push so a consistent initial point is
/// preserved instead of being dragged toward the bound midpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WarmStartOptions {
    /// Relative push of primal values away from their bounds
    pub bound_push: f64,
    /// Floor for the initial bound multipliers
    pub mult_bound_push: f64,
}

impl Default for WarmStartOptions {
    fn default() -> Self {
        WarmStartOptions { bound_push: 1e-8, mult_bound_push: 1e-8 }
    }
}

/// Interior-point solver options.
///
/// Defaults follow the single-control optimization profile; use
/// [`SolverOptions::joint_mode`] for the tighter joint-control profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Solver backend name; anything other than `interior_point` surfaces
    /// [`SolverError::Unavailable`].
    pub solver: String,
    pub max_iter: usize,
    /// KKT error tolerance for optimal termination
    pub tol: f64,
    /// KKT error level considered acceptable after repeated iterations
    pub acceptable_tol: f64,
    /// Maximum scaled constraint violation at termination
    pub constr_viol_tol: f64,
    pub mu_strategy: MuStrategy,
    /// Initial barrier parameter
    pub mu_init: f64,
    /// Relative outward relaxation of variable bounds
    pub bound_relax_factor: f64,
    /// CPU-time budget in seconds, checked every iteration
    pub max_cpu_time: Option<f64>,
    /// Warm-start bound-push options; `Some` only on explicit request
    pub warm_start: Option<WarmStartOptions>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            solver: SOLVER_NAME.to_string(),
            max_iter: 5000,
            tol: 1e-6,
            acceptable_tol: 1e-4,
            constr_viol_tol: 1e-6,
            mu_strategy: MuStrategy::Adaptive,
            mu_init: 0.1,
            bound_relax_factor: 1e-8,
            max_cpu_time: Some(180.0),
            warm_start: None,
        }
    }
}

impl SolverOptions {
    /// Default profile for single-control optimization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tighter profile for joint-control optimization: more iterations and
    /// tighter feasibility.
    pub fn joint_mode() -> Self {
        SolverOptions {
            max_iter: 8000,
            constr_viol_tol: 1e-7,
            bound_relax_factor: 1e-9,
            ..Self::default()
        }
    }

    /// Sets the iteration limit.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Sets the CPU-time budget in seconds.
    pub fn with_max_cpu_time(mut self, seconds: f64) -> Self {
        self.max_cpu_time = Some(seconds);
        self
    }

    /// Enables warm-start bound pushes for this invocation only. The
    /// barrier also starts small so a consistent initial point is not
    /// dragged back toward the central path.
    pub fn with_warm_start(mut self, warm_start: WarmStartOptions) -> Self {
        self.warm_start = Some(warm_start);
        self.mu_init = 1e-6;
        self
    }

    /// Relaxed copy used for the staged driver's single retry.
    pub fn relaxed(&self) -> Self {
        let mut o = self.clone();
        o.tol = (o.tol * 100.0).min(1e-4);
        o.constr_viol_tol = (o.constr_viol_tol * 100.0).min(1e-4);
        o.acceptable_tol = (o.acceptable_tol * 10.0).min(1e-2);
        o
    }

    /// Full option map used for the fingerprint. Keys are sorted so the
    /// hash is order-independent.
    pub fn option_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("linear_solver".to_string(), "dense_lu".to_string());
        map.insert("solver".to_string(), self.solver.clone());
        map.insert("max_iter".to_string(), self.max_iter.to_string());
        map.insert("tol".to_string(), format!("{:e}", self.tol));
        map.insert("acceptable_tol".to_string(), format!("{:e}", self.acceptable_tol));
        map.insert("constr_viol_tol".to_string(), format!("{:e}", self.constr_viol_tol));
        map.insert("mu_strategy".to_string(), self.mu_strategy.as_str().to_string());
        map.insert("mu_init".to_string(), format!("{:e}", self.mu_init));
        map.insert(
            "bound_relax_factor".to_string(),
            format!("{:e}", self.bound_relax_factor),
        );
        if let Some(t) = self.max_cpu_time {
            map.insert("max_cpu_time".to_string(), format!("{t}"));
        }
        if let Some(ws) = &self.warm_start {
            map.insert("warm_start_init_point".to_string(), "yes".to_string());
            map.insert("warm_start_bound_push".to_string(), format!("{:e}", ws.bound_push));
            map.insert(
                "warm_start_mult_bound_push".to_string(),
                format!("{:e}", ws.mult_bound_push),
            );
        }
        map
    }
}

/// Solver termination condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    Optimal,
    /// Converged to the acceptable tolerance but not the target tolerance.
    Acceptable,
    IterationLimit,
    TimeLimit,
    Infeasible,
    Unbounded,
    Other,
}

impl Termination {
    /// Small integer classification used in persisted diagnostics.
    pub fn code(&self) -> i32 {
        match self {
            Termination::Optimal | Termination::Acceptable => 0,
            Termination::IterationLimit | Termination::TimeLimit => 1,
            Termination::Infeasible => 2,
            Termination::Unbounded => 3,
            Termination::Other => -1,
        }
    }

    /// True when a solution usable by the next stage was produced.
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Optimal | Termination::Acceptable)
    }

    /// Status string for persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Optimal => "optimal",
            Termination::Acceptable => "acceptable",
            Termination::IterationLimit => "iteration_limit",
            Termination::TimeLimit => "time_limit",
            Termination::Infeasible => "infeasible",
            Termination::Unbounded => "unbounded",
            Termination::Other => "other",
        }
    }
}

/// Statistics from a solver run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverStats {
    pub iterations: usize,
    pub function_evals: usize,
    pub jacobian_evals: usize,
    pub final_kkt_error: f64,
    pub final_constraint_violation: f64,
    pub cpu_time_s: f64,
}

/// Outcome of one solver invocation. The solution point is written back
/// into the NLP's variable table.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub termination: Termination,
    pub stats: SolverStats,
    /// Objective value at the returned point
    pub objective: f64,
}

const FRACTION_TO_BOUNDARY_MIN: f64 = 0.99;
const ACCEPTABLE_ITER: usize = 10;
const MAX_BACKTRACKS: usize = 25;
const REG_LADDER: usize = 12;

/// Solves the NLP at its current initial point, writing the final point
/// back into the variable table.
pub fn solve(nlp: &mut Nlp, options: SolverOptions) -> SolverResult<SolveOutcome> {
    if options.solver != SOLVER_NAME {
        return Err(SolverError::Unavailable(options.solver));
    }
    let start = Instant::now();

    // Free-variable mapping and scaled, outward-relaxed bounds.
    let free: Vec<usize> =
        (0..nlp.variables.len()).filter(|&i| !nlp.variables[i].fixed).collect();
    let n = free.len();
    let sigma: Vec<f64> = free.iter().map(|&g| nlp.variables[g].scale).collect();
    let brf = options.bound_relax_factor;
    let lb: DVector<f64> = DVector::from_iterator(
        n,
        free.iter().zip(&sigma).map(|(&g, &s)| {
            let b = nlp.variables[g].lower;
            (b - brf * b.abs().max(1.0)) * s
        }),
    );
    let ub: DVector<f64> = DVector::from_iterator(
        n,
        free.iter().zip(&sigma).map(|(&g, &s)| {
            let b = nlp.variables[g].upper;
            (b + brf * b.abs().max(1.0)) * s
        }),
    );

    let eqs = nlp.active_equalities();
    let ineqs = nlp.active_inequalities();
    let me = eqs.len();
    let mi = ineqs.len();

    let mut free_pos = vec![usize::MAX; nlp.variables.len()];
    for (p, &g) in free.iter().enumerate() {
        free_pos[g] = p;
    }

    // Primal initialization: scaled values pushed strictly inside bounds.
    let push = options.warm_start.as_ref().map(|w| w.bound_push).unwrap_or(1e-2);
    let mut x = DVector::zeros(n);
    for p in 0..n {
        let raw = nlp.variables[free[p]].value * sigma[p];
        let width = ub[p] - lb[p];
        let d = (push * width.abs().max(1.0)).min(0.49 * width);
        x[p] = raw.clamp(lb[p] + d, ub[p] - d);
    }

    let mut x_full = nlp.values();
    let write_full = |x: &DVector<f64>, x_full: &mut Vec<f64>| {
        for p in 0..n {
            x_full[free[p]] = x[p] / sigma[p];
        }
    };

    let mut stats = SolverStats {
        iterations: 0,
        function_evals: 0,
        jacobian_evals: 0,
        final_kkt_error: f64::INFINITY,
        final_constraint_violation: f64::INFINITY,
        cpu_time_s: 0.0,
    };

    // Slacks and multipliers.
    write_full(&x, &mut x_full);
    let h0 = eval_list(nlp, &ineqs, &x_full);
    let mut s = DVector::from_iterator(mi, h0.iter().map(|&hi| (-hi).max(1e-4)));
    let mut mu = options.mu_init;
    let mult_floor =
        options.warm_start.as_ref().map(|w| w.mult_bound_push).unwrap_or(1e-8);
    let mut y: DVector<f64> = DVector::zeros(me);
    let mut z = DVector::from_iterator(mi, s.iter().map(|&si| (mu / si).max(mult_floor)));
    let mut zl =
        DVector::from_iterator(n, (0..n).map(|p| (mu / (x[p] - lb[p])).max(mult_floor)));
    let mut zu =
        DVector::from_iterator(n, (0..n).map(|p| (mu / (ub[p] - x[p])).max(mult_floor)));

    let mu_min = options.tol / 10.0;
    let mut acceptable_count = 0usize;
    let mut best_viol = f64::INFINITY;
    let mut last_viol_improvement = 0usize;

    let mut termination = Termination::IterationLimit;

    for iter in 0..options.max_iter {
        stats.iterations = iter + 1;
        if let Some(budget) = options.max_cpu_time {
            if start.elapsed().as_secs_f64() > budget {
                termination = Termination::TimeLimit;
                break;
            }
        }

        write_full(&x, &mut x_full);
        let c = eval_list(nlp, &eqs, &x_full);
        let h = eval_list(nlp, &ineqs, &x_full);
        let f = nlp.objective_value(&x_full);
        stats.function_evals += 1;
        if !f.is_finite() || c.iter().chain(h.iter()).any(|v| !v.is_finite()) {
            store_point(nlp, &x_full);
            return Err(SolverError::NonFinite("constraint residuals"));
        }

        let jc = eval_jacobian(nlp, &eqs, &free_pos, &sigma, &x_full, n);
        let jh = eval_jacobian(nlp, &ineqs, &free_pos, &sigma, &x_full, n);
        let grad = scaled_objective_gradient(nlp, &free, &sigma, &x_full);
        stats.jacobian_evals += 1;

        // KKT residuals.
        let mut r_x = grad.clone() + jc.transpose() * &y + jh.transpose() * &z;
        for p in 0..n {
            r_x[p] += -zl[p] + zu[p];
        }
        let rh = &h + &s;
        let viol = infinity_norm(&c).max(h.iter().fold(0.0f64, |m, &v| m.max(v.max(0.0))));
        let comp_err0 = complementarity_error(&s, &z, &x, &lb, &ub, &zl, &zu, 0.0);
        let comp_err_mu = complementarity_error(&s, &z, &x, &lb, &ub, &zl, &zu, mu);
        let mult_mean = infinity_norm(&y)
            .max(infinity_norm(&z))
            .max(infinity_norm(&zl))
            .max(infinity_norm(&zu))
            .max(1.0);
        let sd = (mult_mean / 100.0).max(1.0);
        let e0 = (infinity_norm(&r_x) / sd)
            .max(infinity_norm(&c))
            .max(infinity_norm(&rh))
            .max(comp_err0 / sd);
        let e_mu = (infinity_norm(&r_x) / sd)
            .max(infinity_norm(&c))
            .max(infinity_norm(&rh))
            .max(comp_err_mu / sd);
        stats.final_kkt_error = e0;
        stats.final_constraint_violation = viol;

        trace!(iter, e0, viol, mu, f, "interior-point iterate");

        if viol < best_viol - 1e-10 {
            best_viol = viol;
            last_viol_improvement = iter;
        }

        if e0 <= options.tol && viol <= options.constr_viol_tol {
            termination = Termination::Optimal;
            break;
        }
        if e0 <= options.acceptable_tol && viol <= options.acceptable_tol {
            acceptable_count += 1;
            if acceptable_count >= ACCEPTABLE_ITER {
                termination = Termination::Acceptable;
                break;
            }
        } else {
            acceptable_count = 0;
        }
        if f < -1e10 {
            termination = Termination::Unbounded;
            break;
        }
        if iter > 100
            && mu <= mu_min * 1.01
            && viol > (options.constr_viol_tol * 1e3).max(1e-4)
            && iter - last_viol_improvement > 50
        {
            termination = Termination::Infeasible;
            break;
        }

        // Barrier update once the current barrier problem is solved.
        if e_mu <= 10.0 * mu {
            let mut next = (0.2 * mu).min(mu.powf(1.5));
            if options.mu_strategy == MuStrategy::Adaptive && mi + n > 0 {
                let avg_comp = (s.dot(&z)
                    + (0..n)
                        .map(|p| (x[p] - lb[p]) * zl[p] + (ub[p] - x[p]) * zu[p])
                        .sum::<f64>())
                    / (mi + 2 * n).max(1) as f64;
                next = next.min((0.1 * avg_comp).max(mu_min));
            }
            mu = next.max(mu_min);
        }

        // Condensed primal-dual system.
        let mut hmat =
            hessian_of_lagrangian(nlp, &eqs, &ineqs, &y, &z, &free_pos, &sigma, &x_full, n);
        for p in 0..n {
            hmat[(p, p)] += zl[p] / (x[p] - lb[p]) + zu[p] / (ub[p] - x[p]);
        }
        // Inequality condensation: Jhᵀ·diag(z/s)·Jh.
        for i in 0..mi {
            let w = z[i] / s[i];
            if w == 0.0 {
                continue;
            }
            for p in 0..n {
                let jip = jh[(i, p)];
                if jip == 0.0 {
                    continue;
                }
                for q in 0..n {
                    let jiq = jh[(i, q)];
                    if jiq != 0.0 {
                        hmat[(p, q)] += w * jip * jiq;
                    }
                }
            }
        }

        let a_vec = DVector::from_iterator(
            mi,
            (0..mi).map(|i| mu / s[i] - z[i] + (z[i] / s[i]) * rh[i]),
        );
        let cl = DVector::from_iterator(n, (0..n).map(|p| mu / (x[p] - lb[p]) - zl[p]));
        let cu = DVector::from_iterator(n, (0..n).map(|p| mu / (ub[p] - x[p]) - zu[p]));
        let mut rhs1 = -(r_x.clone()) - jh.transpose() * &a_vec;
        rhs1 += &cl;
        rhs1 -= &cu;

        // Regularization ladder on the KKT factorization.
        let mut delta = 0.0f64;
        let mut step: Option<(DVector<f64>, DVector<f64>)> = None;
        for attempt in 0..REG_LADDER {
            let dim = n + me;
            let mut kkt = DMatrix::zeros(dim, dim);
            for p in 0..n {
                for q in 0..n {
                    kkt[(p, q)] = hmat[(p, q)];
                }
                kkt[(p, p)] += delta;
            }
            for i in 0..me {
                for p in 0..n {
                    kkt[(n + i, p)] = jc[(i, p)];
                    kkt[(p, n + i)] = jc[(i, p)];
                }
                kkt[(n + i, n + i)] = -delta.max(1e-10);
            }
            let mut rhs = DVector::zeros(dim);
            for p in 0..n {
                rhs[p] = rhs1[p];
            }
            for i in 0..me {
                rhs[n + i] = -c[i];
            }
            if let Some(sol) = kkt.lu().solve(&rhs) {
                if sol.iter().all(|v| v.is_finite()) {
                    let dx = DVector::from_iterator(n, (0..n).map(|p| sol[p]));
                    let dy = DVector::from_iterator(me, (0..me).map(|i| sol[n + i]));
                    step = Some((dx, dy));
                    break;
                }
            }
            delta = if attempt == 0 { 1e-8 } else { delta * 100.0 };
        }
        let Some((dx, dy)) = step else {
            store_point(nlp, &x_full);
            return Err(SolverError::SingularKkt);
        };

        // Recover the eliminated directions.
        let jh_dx = &jh * &dx;
        let ds = DVector::from_iterator(mi, (0..mi).map(|i| -rh[i] - jh_dx[i]));
        let dz =
            DVector::from_iterator(mi, (0..mi).map(|i| a_vec[i] + (z[i] / s[i]) * jh_dx[i]));
        let dzl =
            DVector::from_iterator(n, (0..n).map(|p| cl[p] - (zl[p] / (x[p] - lb[p])) * dx[p]));
        let dzu =
            DVector::from_iterator(n, (0..n).map(|p| cu[p] + (zu[p] / (ub[p] - x[p])) * dx[p]));

        // Fraction-to-boundary step caps.
        let tau = FRACTION_TO_BOUNDARY_MIN.max(1.0 - mu);
        let mut alpha_p: f64 = 1.0;
        for i in 0..mi {
            if ds[i] < 0.0 {
                alpha_p = alpha_p.min(-tau * s[i] / ds[i]);
            }
        }
        for p in 0..n {
            if dx[p] < 0.0 {
                alpha_p = alpha_p.min(-tau * (x[p] - lb[p]) / dx[p]);
            } else if dx[p] > 0.0 {
                alpha_p = alpha_p.min(tau * (ub[p] - x[p]) / dx[p]);
            }
        }
        let mut alpha_d: f64 = 1.0;
        for i in 0..mi {
            if dz[i] < 0.0 {
                alpha_d = alpha_d.min(-tau * z[i] / dz[i]);
            }
        }
        for p in 0..n {
            if dzl[p] < 0.0 {
                alpha_d = alpha_d.min(-tau * zl[p] / dzl[p]);
            }
            if dzu[p] < 0.0 {
                alpha_d = alpha_d.min(-tau * zu[p] / dzu[p]);
            }
        }

        // Backtracking on the exact-penalty barrier merit.
        let rho = 1.0 + 2.0 * mult_mean;
        let merit = |xt: &DVector<f64>, st: &DVector<f64>, buf: &mut Vec<f64>| -> (f64, f64) {
            write_full(xt, buf);
            let ct = eval_list(nlp, &eqs, buf);
            let ht = eval_list(nlp, &ineqs, buf);
            let ft = nlp.objective_value(buf);
            let mut phi = ft;
            for i in 0..mi {
                phi -= mu * st[i].ln();
            }
            for p in 0..n {
                phi -= mu * ((xt[p] - lb[p]).ln() + (ub[p] - xt[p]).ln());
            }
            let mut infeas = ct.norm_squared();
            for i in 0..mi {
                let r = ht[i] + st[i];
                infeas += r * r;
            }
            let infeas = infeas.sqrt();
            (phi + rho * infeas, infeas)
        };
        let (phi0, infeas0) = merit(&x, &s, &mut x_full);

        let mut alpha = alpha_p;
        let mut accepted = false;
        for _ in 0..MAX_BACKTRACKS {
            let x_trial = &x + &dx * alpha;
            let s_trial = &s + &ds * alpha;
            if s_trial.iter().any(|&v| v <= 0.0)
                || (0..n).any(|p| x_trial[p] <= lb[p] || x_trial[p] >= ub[p])
            {
                alpha *= 0.5;
                continue;
            }
            let (phi_trial, infeas_trial) = merit(&x_trial, &s_trial, &mut x_full);
            stats.function_evals += 1;
            if phi_trial.is_finite()
                && (phi_trial < phi0 - 1e-8 * alpha
                    || infeas_trial < infeas0 * (1.0 - 1e-4 * alpha))
            {
                x = x_trial;
                s = s_trial;
                accepted = true;
                break;
            }
            alpha *= 0.5;
        }
        if !accepted {
            // Take the smallest damped step rather than stalling; the merit
            // is re-assessed from the new point next iteration.
            let alpha_min = alpha_p * 0.5f64.powi(MAX_BACKTRACKS as i32);
            x += &dx * alpha_min;
            s += &ds * alpha_min;
            debug!(iter, "line search exhausted; taking minimal damped step");
        }

        y += &dy * alpha_d;
        z += &dz * alpha_d;
        zl += &dzl * alpha_d;
        zu += &dzu * alpha_d;
        // Multiplier safeguards: stay within a wide corridor of the barrier
        // trajectory so a bad step cannot poison later iterations.
        for i in 0..mi {
            let center = mu / s[i];
            z[i] = z[i].clamp(center / 1e10, (center * 1e10).max(mult_floor));
        }
        for p in 0..n {
            let cl_c = mu / (x[p] - lb[p]);
            let cu_c = mu / (ub[p] - x[p]);
            zl[p] = zl[p].clamp(cl_c / 1e10, (cl_c * 1e10).max(mult_floor));
            zu[p] = zu[p].clamp(cu_c / 1e10, (cu_c * 1e10).max(mult_floor));
        }
    }

    write_full(&x, &mut x_full);
    store_point(nlp, &x_full);
    stats.cpu_time_s = start.elapsed().as_secs_f64();
    let objective = nlp.objective_value(&x_full);
    debug!(
        termination = termination.as_str(),
        iterations = stats.iterations,
        kkt = stats.final_kkt_error,
        viol = stats.final_constraint_violation,
        objective,
        "interior-point solve finished"
    );
    Ok(SolveOutcome { termination, stats, objective })
}

fn store_point(nlp: &mut Nlp, x_full: &[f64]) {
    nlp.store_values(x_full);
}

fn infinity_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0f64, |m, &x| m.max(x.abs()))
}

fn eval_list(nlp: &Nlp, list: &[usize], x_full: &[f64]) -> DVector<f64> {
    DVector::from_iterator(
        list.len(),
        list.iter().map(|&ci| nlp.constraint_residual(ci, x_full)),
    )
}

fn eval_jacobian(
    nlp: &Nlp,
    list: &[usize],
    free_pos: &[usize],
    sigma: &[f64],
    x_full: &[f64],
    n: usize,
) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(list.len(), n);
    for (row, &ci) in list.iter().enumerate() {
        for (g, d) in nlp.constraint_gradient(ci, x_full) {
            let p = free_pos[g];
            if p != usize::MAX {
                jac[(row, p)] = d / sigma[p];
            }
        }
    }
    jac
}

fn scaled_objective_gradient(
    nlp: &Nlp,
    free: &[usize],
    sigma: &[f64],
    x_full: &[f64],
) -> DVector<f64> {
    let full = nlp.objective_gradient(x_full);
    DVector::from_iterator(free.len(), free.iter().zip(sigma).map(|(&g, &s)| full[g] / s))
}

#[allow(clippy::too_many_arguments)]
fn hessian_of_lagrangian(
    nlp: &Nlp,
    eqs: &[usize],
    ineqs: &[usize],
    y: &DVector<f64>,
    z: &DVector<f64>,
    free_pos: &[usize],
    sigma: &[f64],
    x_full: &[f64],
    n: usize,
) -> DMatrix<f64> {
    let mut hmat = DMatrix::zeros(n, n);
    let mut add = |triplets: Vec<(usize, usize, f64)>, weight: f64, hmat: &mut DMatrix<f64>| {
        if weight == 0.0 {
            return;
        }
        for (gi, gj, v) in triplets {
            let (p, q) = (free_pos[gi], free_pos[gj]);
            if p == usize::MAX || q == usize::MAX {
                continue;
            }
            let scaled = weight * v / (sigma[p] * sigma[q]);
            hmat[(p, q)] += scaled;
            if p != q {
                hmat[(q, p)] += scaled;
            }
        }
    };
    add(nlp.objective_hessian(), 1.0, &mut hmat);
    for (row, &ci) in eqs.iter().enumerate() {
        add(nlp.constraint_hessian(ci, x_full), y[row], &mut hmat);
    }
    for (row, &ci) in ineqs.iter().enumerate() {
        add(nlp.constraint_hessian(ci, x_full), z[row], &mut hmat);
    }
    hmat
}

#[allow(clippy::too_many_arguments)]
fn complementarity_error(
    s: &DVector<f64>,
    z: &DVector<f64>,
    x: &DVector<f64>,
    lb: &DVector<f64>,
    ub: &DVector<f64>,
    zl: &DVector<f64>,
    zu: &DVector<f64>,
    mu: f64,
) -> f64 {
    let mut err = 0.0f64;
    for i in 0..s.len() {
        err = err.max((s[i] * z[i] - mu).abs());
    }
    for p in 0..x.len() {
        err = err.max(((x[p] - lb[p]) * zl[p] - mu).abs());
        err = err.max(((ub[p] - x[p]) * zu[p] - mu).abs());
    }
    err
}
