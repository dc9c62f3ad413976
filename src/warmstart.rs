//! Warm-start adapter: initializes the discretized NLP from a sequentially
//! integrated reference trajectory.
//!
//! The reference comes from an external baseline solver; only its output
//! format is consumed here — a sorted sequence of 7-column rows
//! `(t, Tsub, Tbot, Tsh, Pch_mTorr, flux, frac_dried)`.
//!
//! Mapping is nearest-neighbor, not interpolation: an interpolated point
//! would satisfy none of the algebraic relations exactly, while a copied
//! point preserves them at the cost of slight mesh misalignment that the
//! feasibility stage then absorbs. After the state and controls are
//! written, every derived algebraic (Psub, log_Psub, Kv, Rp, dmdt) is
//! recomputed from the model's own relations so the initial point satisfies
//! them to machine precision.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::PointVar;
use crate::nlp::{Nlp, Relation};
use crate::physics;
use crate::scenario::PCH_VALID_RANGE;

// Reference rows share the extracted-trajectory column convention.
pub use crate::trajectory::{
    IDX_FLUX, IDX_FRAC, IDX_PCH_MTORR, IDX_TBOT, IDX_TIME, IDX_TSH, IDX_TSUB,
};

/// Errors raised by the warm-start adapter.
#[derive(Debug, Error)]
pub enum WarmStartError {
    #[error("reference trajectory is empty")]
    Empty,
    #[error("reference trajectory times are not strictly increasing at row {0}")]
    NotSorted(usize),
    #[error("reference trajectory contains a non-finite value at row {0}")]
    NonFinite(usize),
    /// The pressure column is not in milli-Torr: after conversion the values
    /// fall clearly outside the physical chamber-pressure window.
    #[error(
        "pressure column looks mis-scaled: after mTorr→Torr conversion values span \
         [{min_torr:.4}, {max_torr:.4}] Torr, outside [{lo}, {hi}] Torr",
        lo = PCH_VALID_RANGE.0,
        hi = PCH_VALID_RANGE.1
    )]
    UnitMismatch { min_torr: f64, max_torr: f64 },
    /// The reference violates the model's algebraic relations beyond the
    /// tolerance and the adapter was configured to refuse.
    #[error("reference trajectory inconsistent with model: max residual {max_residual:.3e} in {constraint}")]
    Inconsistent { max_residual: f64, constraint: String },
    #[error("failed to read reference trajectory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse reference trajectory: {0}")]
    Json(#[from] serde_json::Error),
}

/// What to do when the reference violates the algebraic relations beyond
/// the audit tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InconsistencyPolicy {
    /// Log the residuals and proceed; the feasibility stage cleans up.
    #[default]
    Proceed,
    /// Refuse initialization with [`WarmStartError::Inconsistent`].
    Refuse,
}

/// A sequentially integrated reference trajectory (7 columns per row).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceTrajectory {
    pub rows: Vec<[f64; 7]>,
}

impl ReferenceTrajectory {
    /// Wraps rows, validating ordering and finiteness.
    pub fn new(rows: Vec<[f64; 7]>) -> Result<Self, WarmStartError> {
        if rows.is_empty() {
            return Err(WarmStartError::Empty);
        }
        for (i, row) in rows.iter().enumerate() {
            if row.iter().any(|v| !v.is_finite()) {
                return Err(WarmStartError::NonFinite(i));
            }
            if i > 0 && row[IDX_TIME] <= rows[i - 1][IDX_TIME] {
                return Err(WarmStartError::NotSorted(i));
            }
        }
        Ok(ReferenceTrajectory { rows })
    }

    /// Loads a trajectory from a JSON file holding nested row lists.
    pub fn from_json_file(path: &std::path::Path) -> Result<Self, WarmStartError> {
        let text = std::fs::read_to_string(path)?;
        let rows: Vec<[f64; 7]> = serde_json::from_str(&text)?;
        Self::new(rows)
    }

    /// Final time of the reference \[hr\].
    pub fn t_final(&self) -> f64 {
        self.rows.last().expect("validated trajectory is non-empty")[IDX_TIME]
    }

    /// Index of the row nearest to physical time `t`.
    fn nearest_row(&self, t: f64) -> usize {
        let idx = self
            .rows
            .partition_point(|row| row[IDX_TIME] < t)
            .min(self.rows.len() - 1);
        if idx > 0 {
            let left = (t - self.rows[idx - 1][IDX_TIME]).abs();
            let right = (self.rows[idx][IDX_TIME] - t).abs();
            if left < right {
                return idx - 1;
            }
        }
        idx
    }
}

/// Outcome of a warm-start initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmStartReport {
    /// Horizon taken from the reference \[hr\]
    pub t_final: f64,
    /// Fraction of NLP variables written with an in-bounds value
    pub variable_match_ratio: f64,
    /// Largest scaled algebraic residual of the initialized point
    pub max_residual: f64,
    /// Name of the constraint carrying the largest residual
    pub worst_constraint: String,
    /// Short hash of the reference rows, for provenance
    pub source_hash: String,
}

/// Residual level above which the reference counts as inconsistent.
pub const CONSISTENCY_TOL: f64 = 1e-3;

/// Initializes every NLP variable from the reference trajectory.
///
/// Steps: set `Tf` to the reference horizon, map each mesh point to its
/// nearest reference row, write states and controls (pressure converted
/// from milli-Torr with a mandatory unit sanity check), derive the cake
/// length from the dried fraction, then recompute the remaining algebraics
/// from the model relations. The audit then evaluates the algebraic
/// constraint families at the initialized point and either logs or refuses
/// per `policy`.
pub fn apply_warm_start(
    nlp: &mut Nlp,
    reference: &ReferenceTrajectory,
    policy: InconsistencyPolicy,
) -> Result<WarmStartReport, WarmStartError> {
    let t_final = reference.t_final();

    // Unit sanity: the external convention stores Pch in milli-Torr. If the
    // converted values sit clearly outside the valid chamber window the
    // caller almost certainly handed us Torr already; refuse.
    let (mut pch_min, mut pch_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for row in &reference.rows {
        let torr = row[IDX_PCH_MTORR] / crate::constants::TORR_TO_MTORR;
        pch_min = pch_min.min(torr);
        pch_max = pch_max.max(torr);
    }
    let (lo, hi) = PCH_VALID_RANGE;
    if pch_min < lo / 2.0 || pch_max > hi * 2.0 {
        return Err(WarmStartError::UnitMismatch { min_torr: pch_min, max_torr: pch_max });
    }

    let lpr0 = nlp.model.lpr0;
    let product = nlp.model.scenario.product;
    let ht = nlp.model.scenario.ht;
    let ap = nlp.model.scenario.vial.ap;

    let tf_index = nlp.tf_index();
    nlp.set_initial(tf_index, t_final);

    let mut written = 0usize;
    let mut matched = 0usize;
    let mut write = |nlp: &mut Nlp, k: usize, var: PointVar, value: f64| {
        let i = nlp.var_index(k, var);
        let (lower, upper) = (nlp.variables[i].lower, nlp.variables[i].upper);
        written += 1;
        if value.is_finite() && value >= lower && value <= upper {
            matched += 1;
            nlp.set_initial(i, value);
        } else {
            nlp.set_initial(i, value.clamp(lower, upper));
        }
    };

    let taus: Vec<f64> = nlp.mesh.taus.clone();
    for (k, &tau) in taus.iter().enumerate() {
        let row = reference.rows[reference.nearest_row(tau * t_final)];
        let tsub = row[IDX_TSUB];
        let pch = row[IDX_PCH_MTORR] / crate::constants::TORR_TO_MTORR;
        let lck = row[IDX_FRAC] * lpr0;

        write(nlp, k, PointVar::Tsub, tsub);
        write(nlp, k, PointVar::Tbot, row[IDX_TBOT]);
        write(nlp, k, PointVar::Tsh, row[IDX_TSH]);
        write(nlp, k, PointVar::Pch, pch);
        write(nlp, k, PointVar::Lck, lck);

        // Derived algebraics from the model's own relations, so the vapor
        // pressure, heat-transfer and resistance equations hold to machine
        // precision at the initial point.
        let log_psub = physics::ln_vapor_pressure(tsub);
        let psub = log_psub.exp();
        let rp = physics::cake_resistance(lck, product.r0, product.a1, product.a2);
        let kv = physics::vial_heat_transfer(pch, ht.kc, ht.kp, ht.kd);
        let dmdt = physics::sublimation_rate(psub, pch, rp, ap).max(0.0);
        write(nlp, k, PointVar::LogPsub, log_psub);
        write(nlp, k, PointVar::Psub, psub);
        write(nlp, k, PointVar::Rp, rp);
        write(nlp, k, PointVar::Kv, kv);
        write(nlp, k, PointVar::Dmdt, dmdt);
    }

    // The reference's own initial dried length becomes the consistent
    // initial condition (it is usually zero but need not be).
    let lck0 = reference.rows[reference.nearest_row(0.0)][IDX_FRAC] * lpr0;
    let lck0_index = nlp.var_index(0, PointVar::Lck);
    nlp.fix_at(lck0_index, lck0);

    // Tf itself always initializes from the reference horizon.
    let variable_match_ratio = (matched + 1) as f64 / (written + 1) as f64;

    // Audit the algebraic families (the differential links are deliberately
    // excluded: nearest-neighbor mesh misalignment lands there and is the
    // feasibility stage's job).
    let x = nlp.values();
    let mut max_residual = 0.0f64;
    let mut worst = String::new();
    for (ci, c) in nlp.constraints.iter().enumerate() {
        if !c.active
            || c.name.starts_with("cake_length_link")
            || c.name.starts_with("ramp_")
            || c.name.starts_with("final_dryness")
        {
            continue;
        }
        let r = nlp.constraint_residual(ci, &x);
        let v = match c.relation {
            Relation::Equality => r.abs(),
            Relation::LessEqual => r.max(0.0),
        };
        if v > max_residual {
            max_residual = v;
            worst = c.name.clone();
        }
    }

    if max_residual > CONSISTENCY_TOL {
        match policy {
            InconsistencyPolicy::Refuse => {
                return Err(WarmStartError::Inconsistent {
                    max_residual,
                    constraint: worst,
                });
            }
            InconsistencyPolicy::Proceed => {
                warn!(
                    max_residual,
                    constraint = worst.as_str(),
                    "warm-start reference violates algebraic relations; proceeding"
                );
            }
        }
    } else {
        debug!(max_residual, "warm-start reference consistent");
    }

    Ok(WarmStartReport {
        t_final,
        variable_match_ratio,
        max_residual,
        worst_constraint: worst,
        source_hash: crate::diagnostics::sha16(
            serde_json::to_string(&reference.rows).unwrap_or_default().as_bytes(),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshSpec;
    use crate::model::DryingModel;
    use crate::nlp::discretize;
    use crate::scenario::{
        ControlMode, ControlSetting, PiecewiseConstant, RampRates, named_scenario,
    };

    fn tsh_nlp() -> Nlp {
        let mut s = named_scenario("baseline").unwrap();
        s.pchamber = ControlSetting::Profile(PiecewiseConstant::constant(0.15));
        let model = DryingModel::new(s, ControlMode::Tsh, RampRates::default()).unwrap();
        discretize(&model, &MeshSpec::backward_euler(8)).unwrap()
    }

    /// Rows with exact algebraic consistency except for the energy balance
    /// (Tbot is copied from the reference, not re-derived).
    fn plausible_rows(n: usize, t_final: f64) -> Vec<[f64; 7]> {
        (0..n)
            .map(|i| {
                let frac = i as f64 / (n - 1) as f64;
                let t = frac * t_final;
                let tsub = -32.0 + 6.0 * frac;
                [t, tsub, tsub + 2.0, -10.0, 150.0, 0.3, frac * 0.995]
            })
            .collect()
    }

    #[test]
    fn test_rejects_empty_and_unsorted() {
        assert!(matches!(ReferenceTrajectory::new(vec![]), Err(WarmStartError::Empty)));
        let mut rows = plausible_rows(5, 10.0);
        rows[3][IDX_TIME] = rows[2][IDX_TIME];
        assert!(matches!(
            ReferenceTrajectory::new(rows),
            Err(WarmStartError::NotSorted(3))
        ));
    }

    #[test]
    fn test_unit_mismatch_refused() {
        // Pressure handed over in Torr instead of milli-Torr.
        let mut rows = plausible_rows(5, 10.0);
        for row in &mut rows {
            row[IDX_PCH_MTORR] = 0.15;
        }
        let reference = ReferenceTrajectory::new(rows).unwrap();
        let mut nlp = tsh_nlp();
        let err =
            apply_warm_start(&mut nlp, &reference, InconsistencyPolicy::Proceed).unwrap_err();
        assert!(matches!(err, WarmStartError::UnitMismatch { .. }));
    }

    #[test]
    fn test_nearest_neighbor_mapping() {
        let reference = ReferenceTrajectory::new(plausible_rows(11, 10.0)).unwrap();
        assert_eq!(reference.nearest_row(0.0), 0);
        assert_eq!(reference.nearest_row(10.0), 10);
        // 3.4 hr sits closest to the 3 hr row on a 1 hr grid.
        assert_eq!(reference.nearest_row(3.4), 3);
        assert_eq!(reference.nearest_row(3.6), 4);
    }

    #[test]
    fn test_initialization_writes_consistent_algebraics() {
        let reference = ReferenceTrajectory::new(plausible_rows(41, 12.0)).unwrap();
        let mut nlp = tsh_nlp();
        let report =
            apply_warm_start(&mut nlp, &reference, InconsistencyPolicy::Proceed).unwrap();
        assert!((nlp.variables[nlp.tf_index()].value - 12.0).abs() < 1e-12);
        assert!(report.variable_match_ratio > 0.9);
        // Recomputed families hold to machine precision even though the
        // reference's Tbot column is fabricated.
        let x = nlp.values();
        for (ci, c) in nlp.constraints.iter().enumerate() {
            if c.name.starts_with("vapor_pressure")
                || c.name.starts_with("product_resistance")
                || c.name.starts_with("kv_calc")
                || c.name.starts_with("sublimation_rate")
            {
                let r = nlp.constraint_residual(ci, &x);
                assert!(r.abs() < 1e-9, "{}: {}", c.name, r);
            }
        }
        // The energy balance does not hold for the fabricated Tbot, and the
        // audit must have noticed.
        assert!(report.max_residual > CONSISTENCY_TOL);
    }

    #[test]
    fn test_refuse_policy_surfaces_inconsistency() {
        let reference = ReferenceTrajectory::new(plausible_rows(41, 12.0)).unwrap();
        let mut nlp = tsh_nlp();
        let err =
            apply_warm_start(&mut nlp, &reference, InconsistencyPolicy::Refuse).unwrap_err();
        assert!(matches!(err, WarmStartError::Inconsistent { .. }));
    }

    #[test]
    fn test_initial_condition_follows_reference() {
        let mut rows = plausible_rows(21, 8.0);
        for row in &mut rows {
            row[IDX_FRAC] += 0.002;
        }
        let reference = ReferenceTrajectory::new(rows).unwrap();
        let mut nlp = tsh_nlp();
        apply_warm_start(&mut nlp, &reference, InconsistencyPolicy::Proceed).unwrap();
        let lck0 = &nlp.variables[nlp.var_index(0, PointVar::Lck)];
        assert!(lck0.fixed);
        assert!((lck0.value - 0.002 * nlp.model.lpr0).abs() < 1e-12);
    }
}
