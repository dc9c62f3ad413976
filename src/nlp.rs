//! Discretized nonlinear program.
//!
//! [`discretize`] is a pure function from the immutable continuous model and
//! a mesh request to an [`Nlp`]: a variable table (ten unknowns per mesh
//! point plus the total drying time), equality constraints replicating the
//! algebraic relations at every mesh point, differential links tying the
//! dried-cake state across the mesh, and the inequality layer (critical
//! temperature, equipment capacity, ramp limits, completion).
//!
//! The NLP owns no solver state. The staged driver mutates it only through
//! the named operations `fix`, `unfix` and `set_initial`; every other
//! component holds read-only views.

use crate::mesh::{Mesh, MeshSpec, place_mesh};
use crate::model::{DryingModel, EquationKind, POINT_VARS, PointVar, VARS_PER_POINT};
use crate::scenario::ScenarioError;
use num_dual::{Dual64, HyperDual64};
use serde::{Deserialize, Serialize};

/// Whether a constraint is an equality or a `≤ 0` inequality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Equality,
    LessEqual,
}

/// One decision variable of the discretized problem.
#[derive(Debug, Clone)]
pub struct NlpVariable {
    /// Diagnostic name, e.g. `Tsub[12]`
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    /// Nominal scale honored by the solver (scaled value = value · scale)
    pub scale: f64,
    /// Current value (initial point before solving, solution after)
    pub value: f64,
    /// Fixed variables are excluded from the solver's free set
    pub fixed: bool,
}

/// One constraint instance over a small support of global variable indices.
#[derive(Debug, Clone)]
pub struct NlpConstraint {
    /// Diagnostic name, e.g. `energy_balance[12]`
    pub name: String,
    pub relation: Relation,
    /// Global variable indices, ordered per the equation kind's contract
    pub vars: Vec<usize>,
    pub kind: EquationKind,
    /// Residual scale applied before the solver sees the value
    pub scale: f64,
    /// Inactive constraints are skipped entirely (staged solving)
    pub active: bool,
}

/// Objective: total drying time plus an optional quadratic smoothness
/// penalty over consecutive released-control values.
#[derive(Debug, Clone)]
pub struct Objective {
    pub tf_index: usize,
    pub smoothness_weight: f64,
    /// Consecutive (previous, next) index pairs of released controls
    pub control_pairs: Vec<(usize, usize)>,
}

/// Size statistics of the assembled problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSize {
    pub n_variables: usize,
    pub n_constraints: usize,
    pub n_objectives: usize,
}

/// The assembled nonlinear program.
#[derive(Debug, Clone)]
pub struct Nlp {
    pub variables: Vec<NlpVariable>,
    pub constraints: Vec<NlpConstraint>,
    pub objective: Objective,
    pub mesh: Mesh,
    pub model: DryingModel,
    tf_index: usize,
    completion_index: usize,
}

/// Discretizes the continuous model on the requested mesh.
///
/// Pure with respect to the model: a new `Nlp` is produced per `MeshSpec`
/// and the IR is never rewritten in place.
pub fn discretize(model: &DryingModel, spec: &MeshSpec) -> Result<Nlp, ScenarioError> {
    spec.validate()?;
    let mesh = place_mesh(spec);
    let n_points = mesh.total_points();
    let scenario = &model.scenario;
    let tf_template = model.tf_template();

    // ---- Variable table: ten unknowns per mesh point, then Tf. ----
    let mut variables = Vec::with_capacity(n_points * VARS_PER_POINT + 1);
    for k in 0..n_points {
        for var in POINT_VARS {
            let t = model.variable_template(var);
            variables.push(NlpVariable {
                name: format!("{}[{k}]", var.name()),
                lower: t.lower,
                upper: t.upper,
                scale: t.scale,
                value: t.initial,
                fixed: false,
            });
        }
    }
    let tf_index = variables.len();
    variables.push(NlpVariable {
        name: "t_final".to_string(),
        lower: tf_template.lower,
        upper: tf_template.upper,
        scale: tf_template.scale,
        value: tf_template.initial,
        fixed: false,
    });

    let idx = |k: usize, v: PointVar| k * VARS_PER_POINT + v.offset();

    // Prescribed controls are fixed to their schedule, mapped onto the mesh
    // with the initial horizon; a warm start overwrites these values with
    // the reference trajectory's own.
    if let Some(profile) = scenario.tshelf.profile() {
        for k in 0..n_points {
            let i = idx(k, PointVar::Tsh);
            variables[i].value = profile.value_at(mesh.taus[k] * tf_template.initial);
            variables[i].fixed = true;
        }
    }
    if let Some(profile) = scenario.pchamber.profile() {
        for k in 0..n_points {
            let i = idx(k, PointVar::Pch);
            variables[i].value = profile.value_at(mesh.taus[k] * tf_template.initial);
            variables[i].fixed = true;
        }
    }

    // Consistent initial condition for the differential state.
    {
        let i = idx(0, PointVar::Lck);
        variables[i].value = 0.0;
        variables[i].fixed = true;
    }

    // ---- Algebraic replicas at every mesh point. ----
    let mut constraints = Vec::new();
    for k in 0..n_points {
        constraints.push(NlpConstraint {
            name: format!("vapor_pressure_log[{k}]"),
            relation: Relation::Equality,
            vars: vec![idx(k, PointVar::LogPsub), idx(k, PointVar::Tsub)],
            kind: EquationKind::VaporPressureLog,
            scale: 1.0,
            active: true,
        });
        constraints.push(NlpConstraint {
            name: format!("vapor_pressure_exp[{k}]"),
            relation: Relation::Equality,
            vars: vec![idx(k, PointVar::Psub), idx(k, PointVar::LogPsub)],
            kind: EquationKind::VaporPressureExp,
            scale: 1.0,
            active: true,
        });
        constraints.push(NlpConstraint {
            name: format!("product_resistance[{k}]"),
            relation: Relation::Equality,
            vars: vec![idx(k, PointVar::Rp), idx(k, PointVar::Lck)],
            kind: EquationKind::CakeResistance {
                r0: scenario.product.r0,
                a1: scenario.product.a1,
                a2: scenario.product.a2,
            },
            scale: 0.1,
            active: true,
        });
        constraints.push(NlpConstraint {
            name: format!("kv_calc[{k}]"),
            relation: Relation::Equality,
            vars: vec![idx(k, PointVar::Kv), idx(k, PointVar::Pch)],
            kind: EquationKind::HeatTransferCoeff {
                kc: scenario.ht.kc,
                kp: scenario.ht.kp,
                kd: scenario.ht.kd,
            },
            scale: 1000.0,
            active: true,
        });
        constraints.push(NlpConstraint {
            name: format!("sublimation_rate[{k}]"),
            relation: Relation::Equality,
            vars: vec![
                idx(k, PointVar::Dmdt),
                idx(k, PointVar::Rp),
                idx(k, PointVar::Psub),
                idx(k, PointVar::Pch),
            ],
            kind: EquationKind::SublimationRate { ap: scenario.vial.ap },
            scale: 1.0,
            active: true,
        });
        constraints.push(NlpConstraint {
            name: format!("vial_bottom_temp[{k}]"),
            relation: Relation::Equality,
            vars: vec![
                idx(k, PointVar::Tbot),
                idx(k, PointVar::Tsub),
                idx(k, PointVar::Lck),
                idx(k, PointVar::Psub),
                idx(k, PointVar::Pch),
                idx(k, PointVar::Rp),
            ],
            kind: EquationKind::FrozenLayerConduction { lpr0: model.lpr0 },
            scale: 0.1,
            active: true,
        });
        constraints.push(NlpConstraint {
            name: format!("energy_balance[{k}]"),
            relation: Relation::Equality,
            vars: vec![
                idx(k, PointVar::Psub),
                idx(k, PointVar::Pch),
                idx(k, PointVar::Rp),
                idx(k, PointVar::Kv),
                idx(k, PointVar::Tsh),
                idx(k, PointVar::Tbot),
            ],
            kind: EquationKind::EnergyBalance { av: scenario.vial.av, ap: scenario.vial.ap },
            scale: 10.0,
            active: true,
        });
    }

    // ---- Differential links. ----
    for (l, link) in mesh.links.iter().enumerate() {
        let mut vars: Vec<usize> = link.stencil.iter().map(|&k| idx(k, PointVar::Lck)).collect();
        vars.push(idx(link.eval_point, PointVar::Dmdt));
        vars.push(tf_index);
        constraints.push(NlpConstraint {
            name: format!("cake_length_link[{l}]"),
            relation: Relation::Equality,
            vars,
            kind: EquationKind::DifferentialLink {
                weights: link.weights.clone(),
                h: link.h,
                growth: model.growth,
            },
            scale: 1.0 / model.lpr0,
            active: true,
        });
    }

    // ---- Path inequalities at every mesh point. ----
    for k in 0..n_points {
        constraints.push(NlpConstraint {
            name: format!("critical_temp[{k}]"),
            relation: Relation::LessEqual,
            vars: vec![idx(k, PointVar::Tsub)],
            kind: EquationKind::CriticalTemperature { t_crit: scenario.product.t_pr_crit },
            scale: 0.1,
            active: true,
        });
        constraints.push(NlpConstraint {
            name: format!("equipment_capability[{k}]"),
            relation: Relation::LessEqual,
            vars: vec![idx(k, PointVar::Dmdt), idx(k, PointVar::Pch)],
            kind: EquationKind::EquipmentCapacity {
                a: scenario.eq_cap.a,
                b: scenario.eq_cap.b,
                n_vial: scenario.n_vial as f64,
            },
            scale: 0.1,
            active: true,
        });
    }

    // ---- Ramp layer on released controls, attached after discretization.
    // The bound (τ_k − τ_{k−1})·Tf is the physical interval, so the limit is
    // bilinear in Tf. Initial control values at τ=0 stay free.
    let mut control_pairs = Vec::new();
    let mut ramped: Vec<(PointVar, f64, &str)> = Vec::new();
    if model.mode.releases_tsh() {
        if let Some(rate) = model.ramp.tsh_max {
            ramped.push((PointVar::Tsh, rate, "Tsh"));
        }
    }
    if model.mode.releases_pch() {
        if let Some(rate) = model.ramp.pch_max {
            ramped.push((PointVar::Pch, rate, "Pch"));
        }
    }
    for (var, rate, label) in &ramped {
        let scale = model.variable_template(*var).scale;
        for k in 1..n_points {
            let dtau = mesh.taus[k] - mesh.taus[k - 1];
            let up = vec![idx(k, *var), idx(k - 1, *var), tf_index];
            let down = vec![idx(k - 1, *var), idx(k, *var), tf_index];
            constraints.push(NlpConstraint {
                name: format!("ramp_{label}_up[{k}]"),
                relation: Relation::LessEqual,
                vars: up,
                kind: EquationKind::RampLimit { rate: *rate, dtau },
                scale,
                active: true,
            });
            constraints.push(NlpConstraint {
                name: format!("ramp_{label}_down[{k}]"),
                relation: Relation::LessEqual,
                vars: down,
                kind: EquationKind::RampLimit { rate: *rate, dtau },
                scale,
                active: true,
            });
        }
    }
    for var in [PointVar::Tsh, PointVar::Pch] {
        let released = match var {
            PointVar::Tsh => model.mode.releases_tsh(),
            _ => model.mode.releases_pch(),
        };
        if released {
            for k in 1..n_points {
                control_pairs.push((idx(k - 1, var), idx(k, var)));
            }
        }
    }

    // ---- Terminal completion constraint. ----
    let completion_index = constraints.len();
    constraints.push(NlpConstraint {
        name: "final_dryness".to_string(),
        relation: Relation::LessEqual,
        vars: vec![idx(n_points - 1, PointVar::Lck)],
        kind: EquationKind::Completion { target: model.completion_target * model.lpr0 },
        scale: 1.0 / model.lpr0,
        active: true,
    });

    Ok(Nlp {
        variables,
        constraints,
        objective: Objective {
            tf_index,
            smoothness_weight: model.smoothness_weight,
            control_pairs,
        },
        mesh,
        model: model.clone(),
        tf_index,
        completion_index,
    })
}

impl Nlp {
    /// Global index of a per-point variable.
    pub fn var_index(&self, point: usize, var: PointVar) -> usize {
        point * VARS_PER_POINT + var.offset()
    }

    /// Global index of the total drying time.
    pub fn tf_index(&self) -> usize {
        self.tf_index
    }

    /// Number of mesh points.
    pub fn n_points(&self) -> usize {
        self.mesh.total_points()
    }

    /// Current value of a per-point variable.
    pub fn value(&self, point: usize, var: PointVar) -> f64 {
        self.variables[self.var_index(point, var)].value
    }

    /// Current total drying time.
    pub fn tf(&self) -> f64 {
        self.variables[self.tf_index].value
    }

    /// Fixes a variable at its current value.
    pub fn fix(&mut self, index: usize) {
        self.variables[index].fixed = true;
    }

    /// Fixes a variable at an explicit value.
    pub fn fix_at(&mut self, index: usize, value: f64) {
        self.variables[index].value = value;
        self.variables[index].fixed = true;
    }

    /// Releases a fixed variable.
    pub fn unfix(&mut self, index: usize) {
        self.variables[index].fixed = false;
    }

    /// Writes an initial value without changing the fixed flag.
    pub fn set_initial(&mut self, index: usize, value: f64) {
        self.variables[index].value = value;
    }

    /// Enables or disables the terminal completion constraint.
    pub fn set_completion_active(&mut self, active: bool) {
        self.constraints[self.completion_index].active = active;
    }

    /// Size of the assembled problem (active constraints only).
    pub fn model_size(&self) -> ModelSize {
        ModelSize {
            n_variables: self.variables.len(),
            n_constraints: self.constraints.iter().filter(|c| c.active).count(),
            n_objectives: 1,
        }
    }

    /// Current values as a dense vector.
    pub fn values(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.value).collect()
    }

    /// Writes a dense value vector back into the variable table.
    pub fn store_values(&mut self, x: &[f64]) {
        assert_eq!(x.len(), self.variables.len(), "value vector length mismatch");
        for (var, &v) in self.variables.iter_mut().zip(x) {
            var.value = v;
        }
    }

    /// Scaled residual of one constraint at `x`.
    pub fn constraint_residual(&self, ci: usize, x: &[f64]) -> f64 {
        let c = &self.constraints[ci];
        let args: Vec<f64> = c.vars.iter().map(|&i| x[i]).collect();
        c.kind.eval(&args) * c.scale
    }

    /// Scaled residual gradient of one constraint, as (global index, ∂r/∂x)
    /// pairs over the constraint's support.
    pub fn constraint_gradient(&self, ci: usize, x: &[f64]) -> Vec<(usize, f64)> {
        let c = &self.constraints[ci];
        let base: Vec<f64> = c.vars.iter().map(|&i| x[i]).collect();
        let mut grad = Vec::with_capacity(c.vars.len());
        for (j, &vi) in c.vars.iter().enumerate() {
            let mut args: Vec<Dual64> = base.iter().map(|&v| Dual64::from(v)).collect();
            args[j] = Dual64::from(base[j]).derivative();
            let r = c.kind.eval(&args);
            grad.push((vi, r.eps * c.scale));
        }
        grad
    }

    /// Exact second derivatives of one scaled constraint residual as
    /// (global i, global j, ∂²r/∂xᵢ∂xⱼ) triplets with i ≤ j.
    pub fn constraint_hessian(&self, ci: usize, x: &[f64]) -> Vec<(usize, usize, f64)> {
        let c = &self.constraints[ci];
        let base: Vec<f64> = c.vars.iter().map(|&v| x[v]).collect();
        let n = c.vars.len();
        let mut triplets = Vec::new();
        for p in 0..n {
            for q in p..n {
                let mut args: Vec<HyperDual64> =
                    base.iter().map(|&v| HyperDual64::from(v)).collect();
                args[p] = args[p].derivative1();
                args[q] = args[q].derivative2();
                let r = c.kind.eval(&args);
                let h = r.eps1eps2 * c.scale;
                if h != 0.0 {
                    let (i, j) = (c.vars[p].min(c.vars[q]), c.vars[p].max(c.vars[q]));
                    triplets.push((i, j, h));
                }
            }
        }
        triplets
    }

    /// Objective value at `x`.
    pub fn objective_value(&self, x: &[f64]) -> f64 {
        let mut f = x[self.objective.tf_index];
        if self.objective.smoothness_weight > 0.0 {
            let w = self.objective.smoothness_weight;
            for &(a, b) in &self.objective.control_pairs {
                let d = x[b] - x[a];
                f += w * d * d;
            }
        }
        f
    }

    /// Dense objective gradient at `x`.
    pub fn objective_gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut g = vec![0.0; self.variables.len()];
        g[self.objective.tf_index] = 1.0;
        if self.objective.smoothness_weight > 0.0 {
            let w = self.objective.smoothness_weight;
            for &(a, b) in &self.objective.control_pairs {
                let d = x[b] - x[a];
                g[b] += 2.0 * w * d;
                g[a] -= 2.0 * w * d;
            }
        }
        g
    }

    /// Objective Hessian triplets (i ≤ j); empty unless smoothing is on.
    pub fn objective_hessian(&self) -> Vec<(usize, usize, f64)> {
        let mut triplets = Vec::new();
        if self.objective.smoothness_weight > 0.0 {
            let w = self.objective.smoothness_weight;
            for &(a, b) in &self.objective.control_pairs {
                let (i, j) = (a.min(b), a.max(b));
                triplets.push((i, i, 2.0 * w));
                triplets.push((j, j, 2.0 * w));
                triplets.push((i, j, -2.0 * w));
            }
        }
        triplets
    }

    /// Indices of active equality constraints.
    pub fn active_equalities(&self) -> Vec<usize> {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.active && c.relation == Relation::Equality)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of active inequality constraints.
    pub fn active_inequalities(&self) -> Vec<usize> {
        self.constraints
            .iter()
            .enumerate()
            .filter(|(_, c)| c.active && c.relation == Relation::LessEqual)
            .map(|(i, _)| i)
            .collect()
    }

    /// Largest scaled violation over active constraints at the stored point.
    pub fn max_constraint_violation(&self) -> f64 {
        let x = self.values();
        let mut worst: f64 = 0.0;
        for (ci, c) in self.constraints.iter().enumerate() {
            if !c.active {
                continue;
            }
            let r = self.constraint_residual(ci, &x);
            let v = match c.relation {
                Relation::Equality => r.abs(),
                Relation::LessEqual => r.max(0.0),
            };
            worst = worst.max(v);
        }
        worst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshSpec;
    use crate::model::DryingModel;
    use crate::scenario::{
        ControlMode, ControlSetting, PiecewiseConstant, RampRates, named_scenario,
    };

    fn tsh_model(ramp: Option<f64>) -> DryingModel {
        let mut s = named_scenario("baseline").unwrap();
        s.pchamber = ControlSetting::Profile(PiecewiseConstant::constant(0.15));
        DryingModel::new(
            s,
            ControlMode::Tsh,
            RampRates { tsh_max: ramp, pch_max: None },
        )
        .unwrap()
    }

    #[test]
    fn test_variable_count_and_layout() {
        let nlp = discretize(&tsh_model(None), &MeshSpec::backward_euler(8)).unwrap();
        assert_eq!(nlp.variables.len(), 9 * VARS_PER_POINT + 1);
        assert_eq!(nlp.variables[nlp.tf_index()].name, "t_final");
        assert_eq!(nlp.variables[nlp.var_index(3, PointVar::Tsub)].name, "Tsub[3]");
    }

    #[test]
    fn test_prescribed_control_fixed_and_initial_condition() {
        let nlp = discretize(&tsh_model(None), &MeshSpec::backward_euler(8)).unwrap();
        for k in 0..nlp.n_points() {
            let pch = &nlp.variables[nlp.var_index(k, PointVar::Pch)];
            assert!(pch.fixed);
            assert_eq!(pch.value, 0.15);
            assert!(!nlp.variables[nlp.var_index(k, PointVar::Tsh)].fixed);
        }
        let lck0 = &nlp.variables[nlp.var_index(0, PointVar::Lck)];
        assert!(lck0.fixed);
        assert_eq!(lck0.value, 0.0);
    }

    #[test]
    fn test_constraint_counts_backward_euler() {
        let n = 8;
        let nlp = discretize(&tsh_model(Some(40.0)), &MeshSpec::backward_euler(n)).unwrap();
        let points = n + 1;
        let eq = nlp.active_equalities().len();
        let ineq = nlp.active_inequalities().len();
        // 7 algebraic replicas per point + n differential links.
        assert_eq!(eq, 7 * points + n);
        // 2 path inequalities per point + 2n ramp + 1 completion.
        assert_eq!(ineq, 2 * points + 2 * n + 1);
    }

    #[test]
    fn test_ramp_constraints_absent_without_rates() {
        let nlp = discretize(&tsh_model(None), &MeshSpec::backward_euler(8)).unwrap();
        assert!(nlp.constraints.iter().all(|c| !c.name.starts_with("ramp_")));
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let nlp = discretize(&tsh_model(Some(40.0)), &MeshSpec::collocation(6, 3)).unwrap();
        let mut x = nlp.values();
        // Move off the template point so derivatives are generic.
        x[nlp.var_index(2, PointVar::Tsub)] = -21.0;
        x[nlp.var_index(2, PointVar::LogPsub)] = -0.8;
        x[nlp.tf_index()] = 12.0;
        for ci in 0..nlp.constraints.len() {
            let grad = nlp.constraint_gradient(ci, &x);
            for (vi, g) in grad {
                let h = 1e-6 * (1.0 + x[vi].abs());
                let mut xp = x.clone();
                xp[vi] += h;
                let mut xm = x.clone();
                xm[vi] -= h;
                let fd =
                    (nlp.constraint_residual(ci, &xp) - nlp.constraint_residual(ci, &xm)) / (2.0 * h);
                assert!(
                    (g - fd).abs() < 1e-4 * (1.0 + fd.abs()),
                    "{}: var {} dual {} vs fd {}",
                    nlp.constraints[ci].name,
                    vi,
                    g,
                    fd
                );
            }
        }
    }

    #[test]
    fn test_hessian_matches_finite_difference_of_gradient() {
        let nlp = discretize(&tsh_model(None), &MeshSpec::backward_euler(4)).unwrap();
        let mut x = nlp.values();
        x[nlp.var_index(1, PointVar::Tsub)] = -18.0;
        x[nlp.var_index(1, PointVar::LogPsub)] = -0.6;
        // The exponential-recovery equation has the stiffest curvature.
        let ci = nlp
            .constraints
            .iter()
            .position(|c| c.name == "vapor_pressure_exp[1]")
            .unwrap();
        let triplets = nlp.constraint_hessian(ci, &x);
        let log_idx = nlp.var_index(1, PointVar::LogPsub);
        let entry = triplets
            .iter()
            .find(|(i, j, _)| *i == log_idx && *j == log_idx)
            .map(|(_, _, h)| *h)
            .unwrap();
        // d²/dlog² of (psub − exp(log)) = −exp(log).
        let expected = -(-0.6_f64).exp();
        assert!((entry - expected).abs() < 1e-10);
    }

    #[test]
    fn test_fix_unfix_set_initial() {
        let mut nlp = discretize(&tsh_model(None), &MeshSpec::backward_euler(4)).unwrap();
        let i = nlp.var_index(2, PointVar::Tsh);
        nlp.fix_at(i, -10.0);
        assert!(nlp.variables[i].fixed);
        assert_eq!(nlp.variables[i].value, -10.0);
        nlp.unfix(i);
        assert!(!nlp.variables[i].fixed);
        nlp.set_initial(i, -12.0);
        assert_eq!(nlp.variables[i].value, -12.0);
    }

    #[test]
    fn test_completion_toggle_changes_model_size() {
        let mut nlp = discretize(&tsh_model(None), &MeshSpec::backward_euler(4)).unwrap();
        let full = nlp.model_size().n_constraints;
        nlp.set_completion_active(false);
        assert_eq!(nlp.model_size().n_constraints, full - 1);
        nlp.set_completion_active(true);
        assert_eq!(nlp.model_size().n_constraints, full);
    }

    #[test]
    fn test_objective_gradient_is_tf_direction_by_default() {
        let nlp = discretize(&tsh_model(None), &MeshSpec::backward_euler(4)).unwrap();
        let x = nlp.values();
        let g = nlp.objective_gradient(&x);
        assert_eq!(g[nlp.tf_index()], 1.0);
        assert!(g.iter().enumerate().all(|(i, &v)| i == nlp.tf_index() || v == 0.0));
        assert!(nlp.objective_hessian().is_empty());
    }
}
