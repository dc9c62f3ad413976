//! Continuous-time DAE model of primary drying.
//!
//! [`DryingModel`] is an immutable intermediate representation: validated
//! scenario parameters, per-variable metadata (bounds, nominal scales,
//! defaults), and the algebraic/differential relations expressed as the
//! closed [`EquationKind`] enum. Discretization is a pure function from this
//! IR and a mesh to an [`Nlp`](crate::nlp::Nlp) — the IR itself is never
//! mutated, which removes the re-entry hazards of rewriting a model graph
//! in place.
//!
//! The index-1 structure mirrors the quasi-steady physics: the dried-cake
//! length is the only differential state; the sublimation-front and vial
//! bottom temperatures are algebraic, so nothing becomes singular as the
//! frozen layer vanishes.

use serde::{Deserialize, Serialize};

use crate::Scalar;
use crate::constants::*;
use crate::physics;
use crate::scenario::{ControlMode, RampRates, ScenarioError, ScenarioInputs};

/// The per-mesh-point unknowns, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointVar {
    /// Dried-cake length \[cm\] (the differential state)
    Lck,
    /// Sublimation-front temperature \[°C\]
    Tsub,
    /// Vial bottom temperature \[°C\]
    Tbot,
    /// Vapor pressure at the front \[Torr\]
    Psub,
    /// ln(Psub) (numerical-stability variable)
    LogPsub,
    /// Per-vial sublimation rate \[kg/hr\]
    Dmdt,
    /// Vial heat-transfer coefficient \[cal/s/K/cm²\]
    Kv,
    /// Cake resistance \[cm²·hr·Torr/g\]
    Rp,
    /// Shelf temperature \[°C\] (control)
    Tsh,
    /// Chamber pressure \[Torr\] (control)
    Pch,
}

/// All per-point variables in storage order.
pub const POINT_VARS: [PointVar; 10] = [
    PointVar::Lck,
    PointVar::Tsub,
    PointVar::Tbot,
    PointVar::Psub,
    PointVar::LogPsub,
    PointVar::Dmdt,
    PointVar::Kv,
    PointVar::Rp,
    PointVar::Tsh,
    PointVar::Pch,
];

/// Number of unknowns replicated at each mesh point.
pub const VARS_PER_POINT: usize = POINT_VARS.len();

impl PointVar {
    /// Offset of this variable within a mesh point's block.
    pub fn offset(&self) -> usize {
        match self {
            PointVar::Lck => 0,
            PointVar::Tsub => 1,
            PointVar::Tbot => 2,
            PointVar::Psub => 3,
            PointVar::LogPsub => 4,
            PointVar::Dmdt => 5,
            PointVar::Kv => 6,
            PointVar::Rp => 7,
            PointVar::Tsh => 8,
            PointVar::Pch => 9,
        }
    }

    /// Variable name as it appears in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            PointVar::Lck => "Lck",
            PointVar::Tsub => "Tsub",
            PointVar::Tbot => "Tbot",
            PointVar::Psub => "Psub",
            PointVar::LogPsub => "log_Psub",
            PointVar::Dmdt => "dmdt",
            PointVar::Kv => "Kv",
            PointVar::Rp => "Rp",
            PointVar::Tsh => "Tsh",
            PointVar::Pch => "Pch",
        }
    }
}

/// Bounds, nominal scale and default initial value for one variable.
#[derive(Debug, Clone, Copy)]
pub struct VarTemplate {
    pub lower: f64,
    pub upper: f64,
    /// Nominal scale: the solver works on `x · scale`
    pub scale: f64,
    pub initial: f64,
}

/// One relation of the model, parameterized and evaluatable for any scalar.
///
/// Equality kinds evaluate to a residual that must vanish; inequality kinds
/// evaluate to a quantity constrained `≤ 0`. Argument slices are ordered as
/// documented per variant.
#[derive(Debug, Clone)]
pub enum EquationKind {
    /// `log_Psub − (ln C1 − C2/(Tsub+273.15))`; args `[log_psub, tsub]`
    VaporPressureLog,
    /// `Psub − exp(log_Psub)`; args `[psub, log_psub]`
    VaporPressureExp,
    /// `Rp − (R0 + A1·Lck/(1+A2·Lck))`; args `[rp, lck]`
    CakeResistance { r0: f64, a1: f64, a2: f64 },
    /// `Kv·(1+KD·Pch) − KC·(1+KD·Pch) − KP·Pch`; args `[kv, pch]`
    HeatTransferCoeff { kc: f64, kp: f64, kd: f64 },
    /// `dmdt·Rp·1000 − Ap·(Psub − Pch)`; args `[dmdt, rp, psub, pch]`
    SublimationRate { ap: f64 },
    /// `Tbot − Tsub − (Lpr0−Lck)·(Psub−Pch)·ΔHs/(Rp·3600·k_ice)`;
    /// args `[tbot, tsub, lck, psub, pch, rp]`
    FrozenLayerConduction { lpr0: f64 },
    /// `ΔHs·(Psub−Pch)·Ap/(Rp·3600) − Kv·Av·(Tsh−Tbot)`;
    /// args `[psub, pch, rp, kv, tsh, tbot]`
    EnergyBalance { av: f64, ap: f64 },
    /// `Σ wᵢ·Lckᵢ − h·Tf·growth·dmdt`; args `[lck…, dmdt, tf]`
    DifferentialLink { weights: Vec<f64>, h: f64, growth: f64 },
    /// `Tsub − T_pr_crit ≤ 0` (stay below the collapse temperature);
    /// args `[tsub]`
    CriticalTemperature { t_crit: f64 },
    /// `nVial·dmdt − (a·Pch + b) ≤ 0`; args `[dmdt, pch]`
    EquipmentCapacity { a: f64, b: f64, n_vial: f64 },
    /// `(U_to − U_from) − rate·Δτ·Tf ≤ 0`; args `[u_to, u_from, tf]`
    RampLimit { rate: f64, dtau: f64 },
    /// `η·Lpr0 − Lck(1) ≤ 0`; args `[lck_end]`
    Completion { target: f64 },
}

impl EquationKind {
    /// Evaluates the residual for any AD scalar. `x` follows the variant's
    /// documented argument order.
    pub fn eval<S: Scalar>(&self, x: &[S]) -> S {
        match self {
            EquationKind::VaporPressureLog => x[0] - physics::ln_vapor_pressure(x[1]),
            EquationKind::VaporPressureExp => x[0] - x[1].exp(),
            EquationKind::CakeResistance { r0, a1, a2 } => {
                x[0] - physics::cake_resistance(x[1], *r0, *a1, *a2)
            }
            EquationKind::HeatTransferCoeff { kc, kp, kd } => {
                let (kv, pch) = (x[0], x[1]);
                kv * (pch * *kd + 1.0) - (pch * *kd + 1.0) * *kc - pch * *kp
            }
            EquationKind::SublimationRate { ap } => {
                let (dmdt, rp, psub, pch) = (x[0], x[1], x[2], x[3]);
                dmdt * rp * KG_TO_G - (psub - pch) * *ap
            }
            EquationKind::FrozenLayerConduction { lpr0 } => {
                let (tbot, tsub, lck, psub, pch, rp) = (x[0], x[1], x[2], x[3], x[4], x[5]);
                let gradient = (-lck + *lpr0) * (psub - pch) / rp
                    * (DHS_SUBLIMATION / (HR_TO_S * K_ICE));
                tbot - tsub - gradient
            }
            EquationKind::EnergyBalance { av, ap } => {
                let (psub, pch, rp, kv, tsh, tbot) = (x[0], x[1], x[2], x[3], x[4], x[5]);
                let q_sub = (psub - pch) / rp * (DHS_SUBLIMATION * *ap / HR_TO_S);
                let q_shelf = kv * (tsh - tbot) * *av;
                q_sub - q_shelf
            }
            EquationKind::DifferentialLink { weights, h, growth } => {
                let n = weights.len();
                let (dmdt, tf) = (x[n], x[n + 1]);
                let mut acc = x[0] * weights[0];
                for i in 1..n {
                    acc = acc + x[i] * weights[i];
                }
                acc - dmdt * tf * (*h * *growth)
            }
            EquationKind::CriticalTemperature { t_crit } => x[0] - *t_crit,
            EquationKind::EquipmentCapacity { a, b, n_vial } => {
                let (dmdt, pch) = (x[0], x[1]);
                dmdt * *n_vial - (pch * *a + *b)
            }
            EquationKind::RampLimit { rate, dtau } => {
                let (u_to, u_from, tf) = (x[0], x[1], x[2]);
                u_to - u_from - tf * (*rate * *dtau)
            }
            EquationKind::Completion { target } => -x[0] + *target,
        }
    }

    /// Number of arguments the variant consumes.
    pub fn arity(&self) -> usize {
        match self {
            EquationKind::VaporPressureLog
            | EquationKind::VaporPressureExp
            | EquationKind::CakeResistance { .. }
            | EquationKind::HeatTransferCoeff { .. }
            | EquationKind::EquipmentCapacity { .. } => 2,
            EquationKind::SublimationRate { .. } => 4,
            EquationKind::FrozenLayerConduction { .. } | EquationKind::EnergyBalance { .. } => 6,
            EquationKind::DifferentialLink { weights, .. } => weights.len() + 2,
            EquationKind::CriticalTemperature { .. } | EquationKind::Completion { .. } => 1,
            EquationKind::RampLimit { .. } => 3,
        }
    }
}

/// Validated, immutable continuous-time model.
#[derive(Debug, Clone)]
pub struct DryingModel {
    pub scenario: ScenarioInputs,
    pub mode: ControlMode,
    pub ramp: RampRates,
    /// Initial frozen product height \[cm\]
    pub lpr0: f64,
    /// Conversion from sublimation rate to cake growth \[cm/kg\]
    pub growth: f64,
    /// Drying completion target η
    pub completion_target: f64,
    /// Weight of the optional quadratic control-smoothness penalty
    pub smoothness_weight: f64,
}

impl DryingModel {
    /// Validates the scenario for `mode` and captures the model parameters.
    ///
    /// Fails with [`ScenarioError::Invalid`] listing every violation before
    /// any optimization variable exists.
    pub fn new(
        scenario: ScenarioInputs,
        mode: ControlMode,
        ramp: RampRates,
    ) -> Result<Self, ScenarioError> {
        scenario.validate(mode)?;
        let lpr0 = physics::initial_product_length(
            scenario.vial.vfill,
            scenario.vial.ap,
            scenario.product.c_solid,
        );
        let growth = physics::cake_growth_factor(scenario.vial.ap, scenario.product.c_solid);
        Ok(DryingModel {
            scenario,
            mode,
            ramp,
            lpr0,
            growth,
            completion_target: COMPLETION_TARGET,
            smoothness_weight: 0.0,
        })
    }

    /// Sets the quadratic smoothness penalty weight on released controls.
    pub fn with_smoothness_weight(mut self, weight: f64) -> Self {
        self.smoothness_weight = weight;
        self
    }

    /// Sets the completion target η.
    pub fn with_completion_target(mut self, target: f64) -> Self {
        self.completion_target = target;
        self
    }

    /// Bounds, scale and default initial value for a per-point variable.
    pub fn variable_template(&self, var: PointVar) -> VarTemplate {
        match var {
            PointVar::Lck => VarTemplate {
                lower: 0.0,
                upper: 1.1 * self.lpr0,
                scale: 1.0 / self.lpr0,
                initial: 0.1,
            },
            PointVar::Tsub => VarTemplate { lower: -60.0, upper: 0.0, scale: 0.1, initial: -30.0 },
            PointVar::Tbot => VarTemplate { lower: -60.0, upper: 50.0, scale: 0.1, initial: -30.0 },
            PointVar::Psub => VarTemplate { lower: 1e-4, upper: 10.0, scale: 5.0, initial: 0.1 },
            PointVar::LogPsub => VarTemplate {
                lower: -14.0,
                upper: 2.5,
                scale: 1.0,
                initial: 0.1_f64.ln(),
            },
            PointVar::Dmdt => VarTemplate { lower: 0.0, upper: 10.0, scale: 1000.0, initial: 1e-4 },
            PointVar::Kv => VarTemplate {
                lower: 1e-5,
                upper: 1e-2,
                scale: 1000.0,
                initial: 3e-4,
            },
            PointVar::Rp => VarTemplate { lower: 0.1, upper: 1000.0, scale: 0.05, initial: 10.0 },
            PointVar::Tsh => {
                let (lower, upper) = self
                    .scenario
                    .tshelf
                    .bounds()
                    .unwrap_or((crate::scenario::TSH_VALID_RANGE.0, 120.0));
                // Cold-start default: warm enough to complete drying within
                // the horizon bound, cool enough that the late-drying energy
                // balance keeps the front below the critical temperature
                // while the control is still frozen at this value.
                let initial = (self.scenario.product.t_pr_crit + 10.0).clamp(lower, upper);
                VarTemplate { lower, upper, scale: 0.05, initial }
            }
            PointVar::Pch => {
                let (lower, upper) = self.scenario.pchamber.bounds().unwrap_or((0.01, 0.5));
                VarTemplate { lower, upper, scale: 5.0, initial: 0.1 }
            }
        }
    }

    /// Bounds, scale and default initial value for the total drying time.
    pub fn tf_template(&self) -> VarTemplate {
        VarTemplate { lower: 0.1, upper: 50.0, scale: 0.2, initial: 5.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ControlSetting, PiecewiseConstant, named_scenario};

    fn model() -> DryingModel {
        let mut s = named_scenario("baseline").unwrap();
        s.pchamber = ControlSetting::Profile(PiecewiseConstant::constant(0.15));
        DryingModel::new(s, ControlMode::Tsh, RampRates::default()).unwrap()
    }

    #[test]
    fn test_builder_rejects_invalid_scenario_before_building() {
        let mut s = named_scenario("baseline").unwrap();
        s.pchamber = ControlSetting::Bounds { min: 0.5, max: 0.1 };
        let err = DryingModel::new(s, ControlMode::Pch, RampRates::default()).unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid { .. }));
    }

    #[test]
    fn test_point_var_offsets_are_dense() {
        for (i, v) in POINT_VARS.iter().enumerate() {
            assert_eq!(v.offset(), i);
        }
    }

    #[test]
    fn test_released_control_takes_scenario_bounds() {
        let m = model();
        let tsh = m.variable_template(PointVar::Tsh);
        assert_eq!((tsh.lower, tsh.upper), (-45.0, 120.0));
    }

    #[test]
    fn test_vapor_pressure_equations_consistent() {
        // At a satisfied point both vapor-pressure residual forms vanish
        // together.
        let tsub = -22.0;
        let log_psub = physics::ln_vapor_pressure(tsub);
        let psub = log_psub.exp();
        let r_log = EquationKind::VaporPressureLog.eval(&[log_psub, tsub]);
        let r_exp = EquationKind::VaporPressureExp.eval(&[psub, log_psub]);
        assert!(r_log.abs() < 1e-12);
        assert!(r_exp.abs() < 1e-12);
    }

    #[test]
    fn test_energy_balance_residual_sign() {
        let m = model();
        let (av, ap) = (m.scenario.vial.av, m.scenario.vial.ap);
        let kind = EquationKind::EnergyBalance { av, ap };
        // Hot shelf, small sublimation: shelf heat dominates → negative.
        let r = kind.eval(&[0.5, 0.15, 10.0, 3e-4, 20.0, -30.0]);
        assert!(r < 0.0);
    }

    #[test]
    fn test_differential_link_matches_growth() {
        let m = model();
        let kind = EquationKind::DifferentialLink {
            weights: vec![-1.0, 1.0],
            h: 0.1,
            growth: m.growth,
        };
        let tf = 10.0;
        let dmdt = 2e-4;
        let lck0 = 0.2;
        let lck1 = lck0 + 0.1 * tf * m.growth * dmdt;
        let r = kind.eval(&[lck0, lck1, dmdt, tf]);
        assert!(r.abs() < 1e-12);
    }

    #[test]
    fn test_critical_temperature_inequality_direction() {
        let kind = EquationKind::CriticalTemperature { t_crit: -5.0 };
        // The product must stay below the collapse temperature (≤ 0 when
        // colder than critical).
        assert!(kind.eval(&[-8.0]) <= 0.0);
        assert!(kind.eval(&[-3.0]) > 0.0);
    }

    #[test]
    fn test_hyperdual_second_derivative_of_exp_recovery() {
        use num_dual::HyperDual64;
        // d²/dlog² of (psub − exp(log)) is −exp(log).
        let log_psub = HyperDual64::from(-2.0).derivative1().derivative2();
        let psub = HyperDual64::from(0.135);
        let r = EquationKind::VaporPressureExp.eval(&[psub, log_psub]);
        assert!((r.eps1eps2 - -(-2.0_f64).exp()).abs() < 1e-12);
    }
}
