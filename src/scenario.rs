//! Scenario data model: vial geometry, product properties, heat transfer,
//! equipment capability and control settings.
//!
//! A [`ScenarioInputs`] value is immutable once validated; the model builder
//! consumes it read-only. Validation is eager and collective: every
//! violation is gathered into a single [`ScenarioError::Invalid`] before any
//! optimization variable is created, so a malformed bound never surfaces as
//! pages of solver diagnostics far from the cause.
//!
//! Grid sweeps mutate scenarios only through [`ScenarioInputs::apply_override`],
//! a total function over a closed set of dotted paths that rejects unknown
//! paths at parse time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by scenario construction and mutation.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// One or more scenario fields violate their contract. All violations
    /// are listed; no solver is invoked.
    #[error("invalid scenario: {}", violations.join("; "))]
    Invalid {
        /// Human-readable description of each offending field
        violations: Vec<String>,
    },
    /// An override path does not name a known scenario field.
    #[error("unknown override path '{0}'")]
    UnknownPath(String),
    /// A scenario name is not present in the registry.
    #[error("unknown scenario '{name}'; available: {available:?}")]
    UnknownScenario {
        name: String,
        available: Vec<&'static str>,
    },
}

/// Which control trajectories the optimizer is free to shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// Shelf temperature free; chamber pressure prescribed.
    Tsh,
    /// Chamber pressure free; shelf temperature prescribed.
    Pch,
    /// Both controls free.
    Both,
}

impl ControlMode {
    /// Task tag used in persisted benchmark records.
    pub fn as_task(&self) -> &'static str {
        match self {
            ControlMode::Tsh => "Tsh",
            ControlMode::Pch => "Pch",
            ControlMode::Both => "both",
        }
    }

    /// Parses the task tag ("Tsh", "Pch", "both").
    pub fn from_task(s: &str) -> Option<Self> {
        match s {
            "Tsh" => Some(ControlMode::Tsh),
            "Pch" => Some(ControlMode::Pch),
            "both" => Some(ControlMode::Both),
            _ => None,
        }
    }

    /// True if the shelf temperature is a free control in this mode.
    pub fn releases_tsh(&self) -> bool {
        matches!(self, ControlMode::Tsh | ControlMode::Both)
    }

    /// True if the chamber pressure is a free control in this mode.
    pub fn releases_pch(&self) -> bool {
        matches!(self, ControlMode::Pch | ControlMode::Both)
    }
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_task())
    }
}

/// Vial geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VialGeometry {
    /// Vial cross-sectional area \[cm²\]
    #[serde(rename = "Av")]
    pub av: f64,
    /// Product cross-sectional area \[cm²\]
    #[serde(rename = "Ap")]
    pub ap: f64,
    /// Fill volume \[mL\]
    #[serde(rename = "Vfill")]
    pub vfill: f64,
}

/// Product thermophysical properties.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProductProperties {
    /// Base cake resistance \[cm²·hr·Torr/g\]
    #[serde(rename = "R0")]
    pub r0: f64,
    /// Resistance growth coefficient \[cm·hr·Torr/g\]
    #[serde(rename = "A1")]
    pub a1: f64,
    /// Resistance saturation coefficient \[1/cm\]
    #[serde(rename = "A2")]
    pub a2: f64,
    /// Critical product temperature \[°C\]
    #[serde(rename = "T_pr_crit")]
    pub t_pr_crit: f64,
    /// Solid content \[g/mL\]
    #[serde(rename = "cSolid")]
    pub c_solid: f64,
}

/// Pikal heat-transfer correlation coefficients.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeatTransfer {
    /// Contact conduction \[cal/s/K/cm²\]
    #[serde(rename = "KC")]
    pub kc: f64,
    /// Gas conduction \[cal/s/K/cm²/Torr\]
    #[serde(rename = "KP")]
    pub kp: f64,
    /// Pressure correction \[1/Torr\]
    #[serde(rename = "KD")]
    pub kd: f64,
}

/// Affine equipment sublimation-capacity envelope `mdot_max(Pch) = a·Pch + b`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquipmentCapability {
    /// Slope \[kg/hr/Torr\]
    pub a: f64,
    /// Intercept \[kg/hr\]
    pub b: f64,
}

/// A piecewise-constant setpoint schedule for a prescribed control.
///
/// `setpoints[i]` is held for `hold_hr[i]` hours; the final setpoint is held
/// indefinitely so a prescribed control is always defined on the whole
/// (optimized) horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiecewiseConstant {
    /// Setpoint values (Torr for pressure, °C for shelf temperature)
    pub setpoints: Vec<f64>,
    /// Hold duration of each setpoint \[hr\]
    pub hold_hr: Vec<f64>,
}

impl PiecewiseConstant {
    /// A schedule holding one value for the whole horizon.
    ///
    /// The hold duration is a large finite sentinel rather than infinity so
    /// the schedule survives a JSON round trip.
    pub fn constant(value: f64) -> Self {
        PiecewiseConstant { setpoints: vec![value], hold_hr: vec![1e6] }
    }

    /// Value of the schedule at time `t_hr` \[hr\].
    pub fn value_at(&self, t_hr: f64) -> f64 {
        let mut elapsed = 0.0;
        for (v, dt) in self.setpoints.iter().zip(&self.hold_hr) {
            elapsed += dt;
            if t_hr < elapsed {
                return *v;
            }
        }
        *self.setpoints.last().expect("validated schedule is non-empty")
    }

    fn check(&self, label: &str, violations: &mut Vec<String>) {
        if self.setpoints.is_empty() {
            violations.push(format!("{label}: schedule has no setpoints"));
        }
        if self.setpoints.len() != self.hold_hr.len() {
            violations.push(format!(
                "{label}: {} setpoints but {} hold durations",
                self.setpoints.len(),
                self.hold_hr.len()
            ));
        }
        if self.hold_hr.iter().any(|&dt| dt <= 0.0) {
            violations.push(format!("{label}: hold durations must be positive"));
        }
    }
}

/// Configuration of one control: bounds if released, a schedule if prescribed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlSetting {
    /// Box bounds for a control the optimizer shapes
    Bounds {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
    /// Prescribed reference trajectory for a fixed control
    Profile(PiecewiseConstant),
}

impl ControlSetting {
    /// Returns the bounds if this setting releases the control.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            ControlSetting::Bounds { min, max } => Some((*min, *max)),
            ControlSetting::Profile(_) => None,
        }
    }

    /// Returns the prescribed schedule if this setting fixes the control.
    pub fn profile(&self) -> Option<&PiecewiseConstant> {
        match self {
            ControlSetting::Profile(p) => Some(p),
            ControlSetting::Bounds { .. } => None,
        }
    }
}

/// Optional ramp-rate limits on released controls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RampRates {
    /// Maximum shelf-temperature ramp \[°C/hr\]
    pub tsh_max: Option<f64>,
    /// Maximum chamber-pressure ramp \[Torr/hr\]
    pub pch_max: Option<f64>,
}

/// Immutable inputs consumed by the model builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInputs {
    pub vial: VialGeometry,
    pub product: ProductProperties,
    pub ht: HeatTransfer,
    pub eq_cap: EquipmentCapability,
    #[serde(rename = "nVial")]
    pub n_vial: u32,
    /// Chamber-pressure setting (bounds or prescribed schedule)
    pub pchamber: ControlSetting,
    /// Shelf-temperature setting (bounds or prescribed schedule)
    pub tshelf: ControlSetting,
}

/// Valid shelf-temperature bound window \[°C\].
pub const TSH_VALID_RANGE: (f64, f64) = (-50.0, 150.0);
/// Valid chamber-pressure bound window \[Torr\].
pub const PCH_VALID_RANGE: (f64, f64) = (0.01, 1.0);

impl ScenarioInputs {
    /// Validates the scenario against the requested control mode.
    ///
    /// Collects every violation before returning, so a caller sees the full
    /// list at once rather than fixing fields one solver crash at a time.
    pub fn validate(&self, mode: ControlMode) -> Result<(), ScenarioError> {
        let mut violations = Vec::new();

        if self.vial.av <= 0.0 {
            violations.push(format!("vial.Av = {} must be positive", self.vial.av));
        }
        if self.vial.ap <= 0.0 {
            violations.push(format!("vial.Ap = {} must be positive", self.vial.ap));
        }
        if self.vial.vfill <= 0.0 {
            violations.push(format!("vial.Vfill = {} must be positive", self.vial.vfill));
        }
        if !(0.0..1.0).contains(&self.product.c_solid) {
            violations.push(format!(
                "product.cSolid = {} must lie in [0, 1)",
                self.product.c_solid
            ));
        }
        if self.product.r0 <= 0.0 {
            violations.push(format!("product.R0 = {} must be positive", self.product.r0));
        }
        if self.product.a1 < 0.0 || self.product.a2 < 0.0 {
            violations.push(format!(
                "product.A1 = {}, product.A2 = {} must be non-negative",
                self.product.a1, self.product.a2
            ));
        }
        if self.n_vial < 1 {
            violations.push("nVial must be at least 1".to_string());
        }

        if mode.releases_tsh() {
            match self.tshelf.bounds() {
                Some((min, max)) => {
                    let (lo, hi) = TSH_VALID_RANGE;
                    if min >= max {
                        violations.push(format!("Tshelf.min = {min} must be < Tshelf.max = {max}"));
                    }
                    if min < lo || min > hi {
                        violations
                            .push(format!("Tshelf.min = {min} outside valid range [{lo}, {hi}] °C"));
                    }
                    if max < lo || max > hi {
                        violations
                            .push(format!("Tshelf.max = {max} outside valid range [{lo}, {hi}] °C"));
                    }
                }
                None => violations.push(format!(
                    "control mode '{mode}' requires Tshelf bounds, got a prescribed profile"
                )),
            }
        } else {
            match self.tshelf.profile() {
                Some(p) => p.check("Tshelf profile", &mut violations),
                None => violations.push(format!(
                    "control mode '{mode}' requires a prescribed Tshelf profile"
                )),
            }
        }

        if mode.releases_pch() {
            match self.pchamber.bounds() {
                Some((min, max)) => {
                    let (lo, hi) = PCH_VALID_RANGE;
                    if min >= max {
                        violations
                            .push(format!("Pchamber.min = {min} must be < Pchamber.max = {max}"));
                    }
                    if min < lo || min > hi {
                        violations.push(format!(
                            "Pchamber.min = {min} outside valid range [{lo}, {hi}] Torr"
                        ));
                    }
                    if max < lo || max > hi {
                        violations.push(format!(
                            "Pchamber.max = {max} outside valid range [{lo}, {hi}] Torr"
                        ));
                    }
                }
                None => violations.push(format!(
                    "control mode '{mode}' requires Pchamber bounds, got a prescribed profile"
                )),
            }
        } else {
            match self.pchamber.profile() {
                Some(p) => p.check("Pchamber profile", &mut violations),
                None => violations.push(format!(
                    "control mode '{mode}' requires a prescribed Pchamber profile"
                )),
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ScenarioError::Invalid { violations })
        }
    }

    /// Applies one dotted-path override, e.g. `product.A1 = 18.0`.
    ///
    /// The path set is closed; unknown paths are rejected here, at parse
    /// time, rather than surfacing as a silently ignored key.
    pub fn apply_override(&mut self, path: &str, value: f64) -> Result<(), ScenarioError> {
        match path {
            "vial.Av" => self.vial.av = value,
            "vial.Ap" => self.vial.ap = value,
            "vial.Vfill" => self.vial.vfill = value,
            "product.R0" => self.product.r0 = value,
            "product.A1" => self.product.a1 = value,
            "product.A2" => self.product.a2 = value,
            "product.T_pr_crit" => self.product.t_pr_crit = value,
            "product.cSolid" => self.product.c_solid = value,
            "ht.KC" => self.ht.kc = value,
            "ht.KP" => self.ht.kp = value,
            "ht.KD" => self.ht.kd = value,
            "eq_cap.a" => self.eq_cap.a = value,
            "eq_cap.b" => self.eq_cap.b = value,
            "nVial" => self.n_vial = value as u32,
            _ => return Err(ScenarioError::UnknownPath(path.to_string())),
        }
        Ok(())
    }
}

/// Names of the pre-registered benchmark scenarios.
pub const SCENARIO_NAMES: [&str; 5] = [
    "baseline",
    "high_resistance",
    "tight_temperature",
    "aggressive_drying",
    "large_batch",
];

/// Looks up a pre-registered scenario by name.
///
/// Registered scenarios carry released bounds for both controls; the grid
/// runner narrows them to the task at hand (prescribing the non-optimized
/// control) before building the model.
pub fn named_scenario(name: &str) -> Result<ScenarioInputs, ScenarioError> {
    let base = |product: ProductProperties, ht: HeatTransfer, vfill: f64, n_vial: u32| {
        ScenarioInputs {
            vial: VialGeometry { av: 3.8, ap: 3.14, vfill },
            product,
            ht,
            eq_cap: EquipmentCapability { a: -0.182, b: 11.7 },
            n_vial,
            pchamber: ControlSetting::Bounds { min: 0.05, max: 0.5 },
            tshelf: ControlSetting::Bounds { min: -45.0, max: 120.0 },
        }
    };
    let standard_ht = HeatTransfer { kc: 2.75e-4, kp: 8.93e-4, kd: 0.46 };
    let standard_product = ProductProperties {
        r0: 1.4,
        a1: 16.0,
        a2: 0.0,
        t_pr_crit: -25.0,
        c_solid: 0.05,
    };

    match name {
        "baseline" => Ok(base(standard_product, standard_ht, 2.0, 400)),
        "high_resistance" => Ok(base(
            ProductProperties { a1: 30.0, a2: 0.2, ..standard_product },
            standard_ht,
            2.0,
            400,
        )),
        "tight_temperature" => Ok(base(
            ProductProperties { t_pr_crit: -15.0, ..standard_product },
            standard_ht,
            2.0,
            400,
        )),
        "aggressive_drying" => Ok(base(
            standard_product,
            HeatTransfer { kc: 4.00e-4, kp: 1.20e-3, kd: 0.46 },
            2.0,
            400,
        )),
        "large_batch" => Ok(base(standard_product, standard_ht, 2.5, 1200)),
        _ => Err(ScenarioError::UnknownScenario {
            name: name.to_string(),
            available: SCENARIO_NAMES.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tsh_mode_scenario() -> ScenarioInputs {
        let mut s = named_scenario("baseline").unwrap();
        s.pchamber = ControlSetting::Profile(PiecewiseConstant::constant(0.15));
        s
    }

    #[test]
    fn test_named_scenarios_all_valid_in_both_mode() {
        for name in SCENARIO_NAMES {
            let s = named_scenario(name).unwrap();
            s.validate(ControlMode::Both).unwrap();
        }
    }

    #[test]
    fn test_unknown_scenario_lists_available() {
        let err = named_scenario("nope").unwrap_err();
        assert!(err.to_string().contains("baseline"));
    }

    #[test]
    fn test_validation_collects_all_violations() {
        let mut s = tsh_mode_scenario();
        s.vial.av = -1.0;
        s.tshelf = ControlSetting::Bounds { min: 120.0, max: -45.0 };
        let err = s.validate(ControlMode::Tsh).unwrap_err();
        match err {
            ScenarioError::Invalid { violations } => {
                assert!(violations.len() >= 2, "got {:?}", violations);
                assert!(violations.iter().any(|v| v.contains("vial.Av")));
                assert!(violations.iter().any(|v| v.contains("Tshelf.min")));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_inverted_pch_bounds_rejected() {
        let mut s = named_scenario("baseline").unwrap();
        s.pchamber = ControlSetting::Bounds { min: 0.20, max: 0.06 };
        s.tshelf = ControlSetting::Profile(PiecewiseConstant::constant(-20.0));
        let err = s.validate(ControlMode::Pch).unwrap_err();
        assert!(err.to_string().contains("Pchamber.min"));
    }

    #[test]
    fn test_mode_requires_profile_for_fixed_control() {
        // Tsh mode with Pch given as bounds: the prescribed control is missing.
        let s = named_scenario("baseline").unwrap();
        let err = s.validate(ControlMode::Tsh).unwrap_err();
        assert!(err.to_string().contains("Pchamber profile"));
    }

    #[test]
    fn test_apply_override_known_paths() {
        let mut s = tsh_mode_scenario();
        s.apply_override("product.A1", 18.0).unwrap();
        s.apply_override("ht.KC", 3.3e-4).unwrap();
        s.apply_override("nVial", 398.0).unwrap();
        assert_eq!(s.product.a1, 18.0);
        assert_eq!(s.ht.kc, 3.3e-4);
        assert_eq!(s.n_vial, 398);
    }

    #[test]
    fn test_apply_override_unknown_path() {
        let mut s = tsh_mode_scenario();
        let err = s.apply_override("product.A9", 1.0).unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownPath(_)));
    }

    #[test]
    fn test_piecewise_schedule_lookup() {
        let p = PiecewiseConstant {
            setpoints: vec![-35.0, -20.0, 20.0],
            hold_hr: vec![1.0, 3.0, 40.0],
        };
        assert_eq!(p.value_at(0.5), -35.0);
        assert_eq!(p.value_at(2.0), -20.0);
        assert_eq!(p.value_at(10.0), 20.0);
        // Held past the schedule end.
        assert_eq!(p.value_at(100.0), 20.0);
    }

    #[test]
    fn test_scenario_serde_wire_names() {
        let s = tsh_mode_scenario();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"Av\""));
        assert!(json.contains("\"T_pr_crit\""));
        assert!(json.contains("\"cSolid\""));
        assert!(json.contains("\"nVial\""));
        let back: ScenarioInputs = serde_json::from_str(&json).unwrap();
        back.validate(ControlMode::Tsh).unwrap();
    }
}
