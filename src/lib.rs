#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]

use thiserror::Error;

pub mod bench;
pub mod constants;
pub mod diagnostics;
pub mod mesh;
pub mod model;
pub mod nlp;
pub mod physics;
pub mod scenario;
pub mod solvers;
pub mod trajectory;
pub mod warmstart;

pub use mesh::{DiscretizationMethod, MeshSpec};
pub use model::DryingModel;
pub use scenario::{ControlMode, RampRates, ScenarioError, ScenarioInputs, named_scenario};
pub use solvers::staged::{StagedReport, staged_solve};
pub use solvers::{SolveOutcome, SolverError, SolverOptions, Termination, WarmStartOptions};
pub use trajectory::{PostCheckReport, Trajectory, TrajectoryError, TrajectoryMetrics};
pub use warmstart::{InconsistencyPolicy, ReferenceTrajectory, WarmStartError};

/// Trait for scalar types usable in model residuals.
///
/// Implemented for `f64` and for the dual-number types, so the same
/// residual expression evaluates plain values, first derivatives
/// (`Dual64`) and second derivatives (`HyperDual64`).
pub trait Scalar: num_dual::DualNum<f64> + Copy + Send + Sync + 'static {}

impl<T: num_dual::DualNum<f64> + Copy + Send + Sync + 'static> Scalar for T {}

/// Aggregate error type for the high-level optimization entry point.
#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    WarmStart(#[from] WarmStartError),
    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),
}

/// Result of one complete staged optimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Extracted 7-column trajectory in physical time
    pub trajectory: Trajectory,
    /// Optimized total drying time \[hr\]
    pub t_final: f64,
    /// True when every stage terminated successfully and the post-checks
    /// passed
    pub success: bool,
    /// Per-stage solve reports
    pub staged: StagedReport,
    /// Post-solve constraint verification
    pub post_check: PostCheckReport,
    /// Full diagnostics block for persistence
    pub diagnostics: diagnostics::RunDiagnostics,
}

/// Runs the complete optimization pipeline: build, discretize, optionally
/// warm-start, staged solve, extraction and post-checks.
///
/// Stage failures are data (`success = false` with the failing stage in
/// the diagnostics); hard errors — invalid scenario, missing solver
/// backend, warm-start refusal, numeric damage in the extracted
/// trajectory — surface as [`OptimizeError`].
pub fn optimize(
    scenario: ScenarioInputs,
    mode: ControlMode,
    mesh: &MeshSpec,
    ramp: RampRates,
    reference: Option<&ReferenceTrajectory>,
) -> Result<OptimizationResult, OptimizeError> {
    let options = match mode {
        ControlMode::Both => SolverOptions::joint_mode(),
        _ => SolverOptions::default(),
    };
    optimize_with_options(scenario, mode, mesh, ramp, reference, options)
}

/// [`optimize`] with explicit solver options (warm-start pushes are still
/// added automatically when a reference is supplied).
pub fn optimize_with_options(
    scenario: ScenarioInputs,
    mode: ControlMode,
    mesh: &MeshSpec,
    ramp: RampRates,
    reference: Option<&ReferenceTrajectory>,
    options: SolverOptions,
) -> Result<OptimizationResult, OptimizeError> {
    let wall = std::time::Instant::now();
    let model = DryingModel::new(scenario, mode, ramp)?;
    let mut nlp = nlp::discretize(&model, mesh)?;

    let mut warm_meta = diagnostics::WarmstartMeta::disabled();
    let mut options = options;
    if let Some(reference) = reference {
        let report =
            warmstart::apply_warm_start(&mut nlp, reference, InconsistencyPolicy::Proceed)?;
        warm_meta = diagnostics::WarmstartMeta {
            enabled: true,
            source_hash: Some(report.source_hash),
            variable_match_ratio: Some(report.variable_match_ratio),
        };
        options = options.with_warm_start(WarmStartOptions::default());
    }

    let staged = staged_solve(&mut nlp, &options)?;
    let trajectory = trajectory::extract_trajectory(&nlp)?;
    let post = trajectory::post_check(
        &trajectory,
        model.completion_target,
        if mode.releases_tsh() { ramp.tsh_max } else { None },
        if mode.releases_pch() { ramp.pch_max } else { None },
    );
    let diagnostics = diagnostics::RunDiagnostics::collect(
        nlp.model_size(),
        &staged,
        &options,
        warm_meta,
        wall.elapsed().as_secs_f64(),
        Some(post.clone()),
    );
    Ok(OptimizationResult {
        t_final: trajectory.final_time(),
        success: staged.success && post.passed,
        trajectory,
        staged,
        post_check: post,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ControlSetting, PiecewiseConstant};

    #[test]
    fn test_optimize_rejects_invalid_scenario() {
        let mut s = named_scenario("baseline").unwrap();
        s.tshelf = ControlSetting::Bounds { min: 50.0, max: -45.0 };
        s.pchamber = ControlSetting::Profile(PiecewiseConstant::constant(0.15));
        let err = optimize(
            s,
            ControlMode::Tsh,
            &MeshSpec::backward_euler(8),
            RampRates::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, OptimizeError::Scenario(ScenarioError::Invalid { .. })));
    }

    #[test]
    fn test_scalar_trait_covers_ad_types() {
        fn takes_scalar<S: Scalar>(x: S) -> S {
            x * 2.0
        }
        assert_eq!(takes_scalar(3.0_f64), 6.0);
        let d = takes_scalar(num_dual::Dual64::from(3.0).derivative());
        assert_eq!(d.re, 6.0);
        assert_eq!(d.eps, 2.0);
    }
}
