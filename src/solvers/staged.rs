//! Four-phase staged solve driver.
//!
//! Solving the full optimal-control problem from an arbitrary point is
//! fragile; the driver instead releases degrees of freedom progressively,
//! re-invoking the interior-point solver with fresh option values at each
//! phase:
//!
//! - **Stage F (feasibility)**: total time and every released control fixed
//!   at their current values, terminal completion disabled. Establishes a
//!   consistent algebraic state; with a consistent warm start this costs a
//!   handful of iterations at most.
//! - **Stage T (time minimization)**: total time released, completion
//!   re-enabled, controls still fixed.
//! - **Stage C (control release)**: released controls freed. In joint mode
//!   the thermally dominant control (shelf temperature) is released and
//!   solved first, then chamber pressure, avoiding large simultaneous jumps.
//! - **Stage O (full optimization)**: one more solve with every degree of
//!   freedom, polishing to the target tolerance.
//!
//! A stage that returns a non-optimal but acceptable status logs a warning
//! and proceeds. An outright failure is retried once with relaxed
//! tolerances; if it still fails the driver stops and reports the failing
//! stage, leaving the last solution in the variable table.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::nlp::Nlp;
use crate::scenario::ControlMode;
use crate::model::PointVar;

use super::{SolveOutcome, SolverOptions, SolverResult, Termination, solve};

/// Identifier of one staged-solve phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Feasibility,
    TimeMinimization,
    ControlRelease,
    FullOptimization,
}

impl Stage {
    /// Failure-classification tag for persisted diagnostics.
    pub fn tag(&self) -> &'static str {
        match self {
            Stage::Feasibility => "stage_F",
            Stage::TimeMinimization => "stage_T",
            Stage::ControlRelease => "stage_C",
            Stage::FullOptimization => "stage_O",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Stage::Feasibility => "feasibility (controls and t_final fixed)",
            Stage::TimeMinimization => "time minimization (controls fixed)",
            Stage::ControlRelease => "control release",
            Stage::FullOptimization => "full optimization (all DOFs free)",
        }
    }
}

/// Record of one solver invocation inside the staged sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Short textual tag, e.g. `stage_C:Tsh`
    pub tag: String,
    pub termination: Termination,
    pub iterations: usize,
    pub cpu_time_s: f64,
    pub objective: f64,
    /// True if this invocation was the relaxed-tolerance retry
    pub retried: bool,
}

/// Outcome of the full staged sequence. `failure_stage` is `None` on
/// success; on failure the last stage's solution remains in the NLP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedReport {
    pub stages: Vec<StageReport>,
    pub success: bool,
    pub failure_stage: Option<String>,
}

impl StagedReport {
    /// Total solver CPU time across all invocations.
    pub fn total_cpu_time_s(&self) -> f64 {
        self.stages.iter().map(|s| s.cpu_time_s).sum()
    }

    /// Total iterations across all invocations.
    pub fn total_iterations(&self) -> usize {
        self.stages.iter().map(|s| s.iterations).sum()
    }

    /// Report of the final invocation, if any ran.
    pub fn last(&self) -> Option<&StageReport> {
        self.stages.last()
    }
}

fn released_control_indices(nlp: &Nlp, var: PointVar) -> Vec<usize> {
    (0..nlp.n_points()).map(|k| nlp.var_index(k, var)).collect()
}

/// Runs one stage with the retry policy: non-optimal-but-acceptable
/// proceeds with a warning, an outright failure is retried once relaxed.
fn run_stage(
    nlp: &mut Nlp,
    stage: Stage,
    tag: String,
    options: &SolverOptions,
    reports: &mut Vec<StageReport>,
) -> SolverResult<bool> {
    info!(stage = stage.tag(), "{}", stage.describe());
    let outcome = solve(nlp, options.clone())?;
    let ok = push_report(stage, tag.clone(), &outcome, false, reports);
    if ok {
        return Ok(true);
    }
    warn!(
        stage = stage.tag(),
        termination = outcome.termination.as_str(),
        "stage failed; retrying once with relaxed tolerances"
    );
    let outcome = solve(nlp, options.relaxed())?;
    Ok(push_report(stage, tag, &outcome, true, reports))
}

fn push_report(
    stage: Stage,
    tag: String,
    outcome: &SolveOutcome,
    retried: bool,
    reports: &mut Vec<StageReport>,
) -> bool {
    let ok = outcome.termination.is_success();
    if ok && outcome.termination == Termination::Acceptable {
        warn!(
            stage = stage.tag(),
            "stage reached only acceptable tolerance; proceeding with warning"
        );
    }
    reports.push(StageReport {
        stage,
        tag,
        termination: outcome.termination,
        iterations: outcome.stats.iterations,
        cpu_time_s: outcome.stats.cpu_time_s,
        objective: outcome.objective,
        retried,
    });
    ok
}

/// Executes the F→T→C→O sequence on a (typically warm-started) NLP.
///
/// Options are cloned into every invocation so nothing set for one stage
/// can leak into another run; hard solver errors (backend unavailable,
/// singular KKT, non-finite evaluation) propagate, while non-optimal
/// terminations become `success = false` with the failing stage recorded.
pub fn staged_solve(nlp: &mut Nlp, options: &SolverOptions) -> SolverResult<StagedReport> {
    let mode = nlp.model.mode;
    let mut reports = Vec::new();

    let tsh_indices = if mode.releases_tsh() {
        released_control_indices(nlp, PointVar::Tsh)
    } else {
        Vec::new()
    };
    let pch_indices = if mode.releases_pch() {
        released_control_indices(nlp, PointVar::Pch)
    } else {
        Vec::new()
    };

    // ---- Stage F: freeze everything the optimizer would move. ----
    let tf_index = nlp.tf_index();
    nlp.fix(tf_index);
    for &i in tsh_indices.iter().chain(&pch_indices) {
        nlp.fix(i);
    }
    nlp.set_completion_active(false);
    if !run_stage(nlp, Stage::Feasibility, "stage_F".to_string(), options, &mut reports)? {
        return Ok(StagedReport {
            stages: reports,
            success: false,
            failure_stage: Some("stage_F".to_string()),
        });
    }

    // ---- Stage T: release the horizon. ----
    nlp.unfix(tf_index);
    nlp.set_completion_active(true);
    if !run_stage(nlp, Stage::TimeMinimization, "stage_T".to_string(), options, &mut reports)? {
        return Ok(StagedReport {
            stages: reports,
            success: false,
            failure_stage: Some("stage_T".to_string()),
        });
    }
    info!(t_final = nlp.tf(), "time minimization complete");

    // ---- Stage C: release controls, thermally dominant first. ----
    let control_batches: Vec<(String, &[usize])> = match mode {
        ControlMode::Tsh => vec![("stage_C:Tsh".to_string(), tsh_indices.as_slice())],
        ControlMode::Pch => vec![("stage_C:Pch".to_string(), pch_indices.as_slice())],
        ControlMode::Both => vec![
            ("stage_C:Tsh".to_string(), tsh_indices.as_slice()),
            ("stage_C:Pch".to_string(), pch_indices.as_slice()),
        ],
    };
    for (tag, indices) in control_batches {
        for &i in indices {
            nlp.unfix(i);
        }
        if !run_stage(nlp, Stage::ControlRelease, tag.clone(), options, &mut reports)? {
            return Ok(StagedReport {
                stages: reports,
                success: false,
                failure_stage: Some("stage_C".to_string()),
            });
        }
    }

    // ---- Stage O: polish with every degree of freedom. ----
    if !run_stage(nlp, Stage::FullOptimization, "stage_O".to_string(), options, &mut reports)? {
        return Ok(StagedReport {
            stages: reports,
            success: false,
            failure_stage: Some("stage_O".to_string()),
        });
    }
    info!(t_final = nlp.tf(), "staged solve complete");

    Ok(StagedReport { stages: reports, success: true, failure_stage: None })
}
