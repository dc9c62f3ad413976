//! Benchmark grid runner: cartesian parameter sweeps over scenarios,
//! one persisted record per (combination, method).
//!
//! The runner is robustness-first: solver-level failures become data, not
//! crashes — every case ends in a sealed record with `failed` and the
//! failure classification filled in. The process exits nonzero only for
//! configuration errors (2), a missing solver backend (3) or I/O damage
//! (4).
//!
//! Independent simultaneous solves run in separate OS processes by
//! default (the binary re-executes itself with a hidden subcommand and a
//! case spec on stdin). The process boundary guarantees that no solver or
//! linear-algebra state survives between cases and gives the runner a
//! reliable wall-time kill when the in-solver CPU cap is not enough.

use std::collections::BTreeMap;
use std::io::{Read, Write as IoWrite};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::{
    BaselineBlock, BenchError, BenchmarkRecord, DiscretizationInfo, GridParam, RecordWriter,
    SimultaneousBlock, SolverInfo, hash_inputs, should_skip_generation,
};
use crate::diagnostics::{RunDiagnostics, WarmstartMeta, environment_info};
use crate::mesh::{DiscretizationMethod, MeshSpec};
use crate::model::DryingModel;
use crate::nlp::discretize;
use crate::scenario::{
    ControlMode, ControlSetting, PiecewiseConstant, RampRates, ScenarioError, ScenarioInputs,
    named_scenario,
};
use crate::solvers::staged::staged_solve;
use crate::solvers::{SolverError, SolverOptions, Termination, WarmStartOptions};
use crate::trajectory::{Trajectory, compute_metrics, extract_trajectory, post_check};
use crate::warmstart::{InconsistencyPolicy, ReferenceTrajectory, WarmStartError, apply_warm_start};

/// Errors of the grid runner, mapped onto process exit codes.
#[derive(Debug, Error)]
pub enum GridError {
    /// Configuration/validation problem; nothing was solved.
    #[error("{0}")]
    User(String),
    /// Required solver backend missing; non-retryable.
    #[error("solver unavailable: {0}")]
    SolverUnavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Bench(#[from] BenchError),
}

impl GridError {
    /// Process exit code: 2 user error, 3 solver unavailable, 4 I/O.
    pub fn exit_code(&self) -> i32 {
        match self {
            GridError::User(_) => 2,
            GridError::SolverUnavailable(_) => 3,
            GridError::Io(_) | GridError::Json(_) | GridError::Bench(_) => 4,
        }
    }
}

impl From<ScenarioError> for GridError {
    fn from(e: ScenarioError) -> Self {
        GridError::User(e.to_string())
    }
}

/// Benchmark methods the runner can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    SequentialBaseline,
    FiniteDifferences,
    Collocation,
}

impl Method {
    /// Parses a method name (long form or the record tag).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sequential_baseline" | "scipy" => Some(Method::SequentialBaseline),
            "finite_differences" | "fd" => Some(Method::FiniteDifferences),
            "collocation" | "colloc" => Some(Method::Collocation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::SequentialBaseline => "sequential_baseline",
            Method::FiniteDifferences => "finite_differences",
            Method::Collocation => "collocation",
        }
    }
}

/// One `--vary path=v1,v2,…` specification.
#[derive(Debug, Clone)]
pub struct VarySpec {
    pub path: String,
    pub values: Vec<f64>,
}

/// Parses repeated vary specifications.
pub fn parse_vary(specs: &[String]) -> Result<Vec<VarySpec>, GridError> {
    let mut out = Vec::new();
    for item in specs {
        let Some((path, raw)) = item.split_once('=') else {
            return Err(GridError::User(format!("invalid --vary spec (missing '='): {item}")));
        };
        let mut values = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let v: f64 = part
                .parse()
                .map_err(|_| GridError::User(format!("non-numeric value '{part}' in {item}")))?;
            values.push(v);
        }
        if values.is_empty() {
            return Err(GridError::User(format!("no values parsed for {path}")));
        }
        out.push(VarySpec { path: path.to_string(), values });
    }
    Ok(out)
}

/// Full configuration surface of the grid runner.
#[derive(Debug, Clone)]
pub struct GridConfig {
    pub task: ControlMode,
    pub scenario: String,
    pub vary: Vec<VarySpec>,
    pub methods: Vec<Method>,
    pub n_elements: usize,
    pub n_collocation: usize,
    /// Reference baseline step \[hr\]; recorded for provenance
    pub dt: f64,
    pub warmstart: bool,
    pub effective_nfe: bool,
    pub ramp_tsh_max: Option<f64>,
    pub ramp_pch_max: Option<f64>,
    /// Released-control bound overrides
    pub tsh_bounds: Option<(f64, f64)>,
    pub pch_bounds: Option<(f64, f64)>,
    pub force: bool,
    pub out: PathBuf,
    /// External baseline trajectory (JSON nested rows), if available
    pub baseline: Option<PathBuf>,
    /// Run simultaneous solves in this process instead of children
    pub in_process: bool,
    /// Wall-clock kill budget per case \[s\]
    pub wall_timeout_s: f64,
    /// In-solver CPU budget per invocation \[s\]
    pub solver_timeout_s: f64,
    /// Solver backend name
    pub solver: String,
}

/// Self-contained case description shipped to the child process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSpec {
    pub scenario: ScenarioInputs,
    pub task: ControlMode,
    pub method: DiscretizationMethod,
    pub n_elements: usize,
    pub n_collocation: usize,
    pub effective_nfe: bool,
    pub warmstart: bool,
    pub ramp: RampRates,
    pub solver_timeout_s: f64,
    pub solver: String,
    pub baseline_rows: Option<ReferenceTrajectory>,
}

/// Narrows a registry scenario to the task: the non-optimized control gets
/// a prescribed schedule, the optimized side keeps (or receives) bounds.
pub fn prepare_scenario_for_task(
    mut scenario: ScenarioInputs,
    task: ControlMode,
    tsh_bounds: Option<(f64, f64)>,
    pch_bounds: Option<(f64, f64)>,
) -> ScenarioInputs {
    if let Some((min, max)) = tsh_bounds {
        scenario.tshelf = ControlSetting::Bounds { min, max };
    }
    if let Some((min, max)) = pch_bounds {
        scenario.pchamber = ControlSetting::Bounds { min, max };
    }
    match task {
        ControlMode::Tsh => {
            if scenario.pchamber.profile().is_none() {
                scenario.pchamber =
                    ControlSetting::Profile(PiecewiseConstant::constant(0.1));
            }
        }
        ControlMode::Pch => {
            if scenario.tshelf.profile().is_none() {
                scenario.tshelf = ControlSetting::Profile(PiecewiseConstant {
                    setpoints: vec![-20.0, 20.0],
                    hold_hr: vec![5.0, 95.0],
                });
            }
        }
        ControlMode::Both => {}
    }
    scenario
}

fn baseline_block(reference: Option<&ReferenceTrajectory>) -> BaselineBlock {
    match reference {
        Some(r) => {
            let traj = Trajectory { rows: r.rows.clone() };
            let metrics = compute_metrics(&traj, crate::constants::COMPLETION_TARGET);
            BaselineBlock {
                success: true,
                wall_time_s: 0.0,
                objective_time_hr: Some(traj.final_time()),
                solver: SolverInfo {
                    status: Some("external".to_string()),
                    termination_condition: Some("n/a".to_string()),
                    ..Default::default()
                },
                metrics: Some(metrics),
                message: None,
                trajectory: Some(traj),
            }
        }
        None => BaselineBlock {
            success: false,
            wall_time_s: 0.0,
            objective_time_hr: None,
            solver: SolverInfo::default(),
            metrics: None,
            message: Some("no baseline trajectory supplied".to_string()),
            trajectory: None,
        },
    }
}

fn solver_options_for(spec: &CaseSpec) -> SolverOptions {
    let mut options = match spec.task {
        ControlMode::Both => SolverOptions::joint_mode(),
        _ => SolverOptions::default(),
    };
    options.solver = spec.solver.clone();
    options = options.with_max_cpu_time(spec.solver_timeout_s);
    if spec.warmstart {
        options = options.with_warm_start(WarmStartOptions::default());
    }
    options
}

fn failure_block(
    wall: Instant,
    stage: &str,
    message: String,
    options: &SolverOptions,
    warmstart_used: bool,
) -> SimultaneousBlock {
    SimultaneousBlock {
        success: false,
        wall_time_s: wall.elapsed().as_secs_f64(),
        objective_time_hr: None,
        solver: SolverInfo {
            status: Some("error".to_string()),
            termination_condition: Some(stage.to_string()),
            ..Default::default()
        },
        metrics: None,
        discretization: None,
        warmstart_used,
        diagnostics: Some(RunDiagnostics::failure(stage, options)),
        message: Some(message),
        trajectory: None,
    }
}

/// Executes one simultaneous case in this process.
///
/// Only a missing solver backend is an error; every other failure is
/// reported inside the block with its stage classification.
pub fn run_case(spec: &CaseSpec) -> Result<SimultaneousBlock, GridError> {
    let wall = Instant::now();
    let options_probe = solver_options_for(spec);

    let model = match DryingModel::new(spec.scenario.clone(), spec.task, spec.ramp) {
        Ok(m) => m,
        Err(e) => {
            return Ok(failure_block(wall, "build_error", e.to_string(), &options_probe, false));
        }
    };
    let mesh_spec = MeshSpec {
        method: spec.method,
        n_elements: spec.n_elements,
        n_collocation: spec.n_collocation,
        effective_nfe: spec.effective_nfe,
    };
    let mut nlp = match discretize(&model, &mesh_spec) {
        Ok(nlp) => nlp,
        Err(e) => {
            return Ok(failure_block(wall, "build_error", e.to_string(), &options_probe, false));
        }
    };

    let mut warm_meta = WarmstartMeta::disabled();
    if spec.warmstart {
        match &spec.baseline_rows {
            Some(reference) => {
                match apply_warm_start(&mut nlp, reference, InconsistencyPolicy::Proceed) {
                    Ok(report) => {
                        warm_meta = WarmstartMeta {
                            enabled: true,
                            source_hash: Some(report.source_hash),
                            variable_match_ratio: Some(report.variable_match_ratio),
                        };
                    }
                    Err(e) => {
                        return Ok(failure_block(
                            wall,
                            "presolve",
                            e.to_string(),
                            &options_probe,
                            true,
                        ));
                    }
                }
            }
            None => {
                warn!("warm start requested but no baseline trajectory supplied; starting cold");
            }
        }
    }

    let options = solver_options_for(spec);
    let staged = match staged_solve(&mut nlp, &options) {
        Ok(report) => report,
        Err(SolverError::Unavailable(name)) => {
            return Err(GridError::SolverUnavailable(name));
        }
        Err(e) => {
            return Ok(failure_block(
                wall,
                "presolve",
                e.to_string(),
                &options,
                warm_meta.enabled,
            ));
        }
    };

    let discretization = Some(DiscretizationInfo {
        method: spec.method.as_tag().to_string(),
        n_elements_requested: nlp.mesh.n_elements_requested,
        n_elements_applied: nlp.mesh.n_elements_applied,
        n_collocation: nlp.mesh.n_collocation,
        effective_nfe: spec.effective_nfe
            && spec.method == DiscretizationMethod::CollocationRadau,
        total_mesh_points: nlp.mesh.total_points(),
    });

    let (trajectory, metrics, checks) = match extract_trajectory(&nlp) {
        Ok(traj) => {
            let metrics = compute_metrics(&traj, model.completion_target);
            let checks = post_check(
                &traj,
                model.completion_target,
                if spec.task.releases_tsh() { spec.ramp.tsh_max } else { None },
                if spec.task.releases_pch() { spec.ramp.pch_max } else { None },
            );
            (Some(traj), Some(metrics), Some(checks))
        }
        Err(e) => {
            warn!(error = %e, "trajectory extraction failed; record flagged");
            (None, None, None)
        }
    };

    let diagnostics = RunDiagnostics::collect(
        nlp.model_size(),
        &staged,
        &options,
        warm_meta,
        wall.elapsed().as_secs_f64(),
        checks,
    );
    let last = staged.last();
    Ok(SimultaneousBlock {
        success: staged.success && trajectory.is_some(),
        wall_time_s: wall.elapsed().as_secs_f64(),
        objective_time_hr: trajectory.as_ref().map(|t| t.final_time()),
        solver: SolverInfo {
            status: last.map(|r| r.termination.as_str().to_string()),
            termination_condition: last.map(|r| r.termination.as_str().to_string()),
            iterations: Some(staged.total_iterations()),
            n_points: Some(nlp.n_points()),
            staged_solve_success: Some(staged.success),
        },
        metrics,
        discretization,
        warmstart_used: spec.warmstart && spec.baseline_rows.is_some(),
        diagnostics: Some(diagnostics),
        message: None,
        trajectory,
    })
}

/// Executes one case in a child process with a wall-clock kill guard.
pub fn run_case_subprocess(
    spec: &CaseSpec,
    wall_timeout_s: f64,
) -> Result<SimultaneousBlock, GridError> {
    let exe = std::env::current_exe()?;
    let mut child = Command::new(exe)
        .arg("run-case")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()?;

    {
        let mut stdin = child.stdin.take().expect("child stdin is piped");
        stdin.write_all(serde_json::to_string(spec)?.as_bytes())?;
    }
    // Drain stdout on a thread so a large record cannot deadlock the child
    // against a full pipe.
    let mut stdout = child.stdout.take().expect("child stdout is piped");
    let reader = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        buf
    });

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed().as_secs_f64() > wall_timeout_s {
            warn!(timeout_s = wall_timeout_s, "case exceeded wall budget; killing child");
            let _ = child.kill();
            let _ = child.wait();
            let _ = reader.join();
            let options = solver_options_for(spec);
            let mut block = failure_block(
                Instant::now(),
                "stage_O",
                format!("wall-time budget of {wall_timeout_s} s exceeded; process killed"),
                &options,
                spec.warmstart,
            );
            block.wall_time_s = started.elapsed().as_secs_f64();
            block.solver.termination_condition = Some(Termination::TimeLimit.as_str().to_string());
            return Ok(block);
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    let output = reader.join().unwrap_or_default();

    match status.code() {
        Some(0) => Ok(serde_json::from_str(&output)?),
        Some(3) => Err(GridError::SolverUnavailable(spec.solver.clone())),
        code => {
            let options = solver_options_for(spec);
            Ok(failure_block(
                Instant::now(),
                "presolve",
                format!("case process exited abnormally (status {code:?})"),
                &options,
                spec.warmstart,
            ))
        }
    }
}

fn cartesian(vary: &[VarySpec]) -> Vec<Vec<f64>> {
    let mut combos: Vec<Vec<f64>> = vec![Vec::new()];
    for spec in vary {
        let mut next = Vec::with_capacity(combos.len() * spec.values.len());
        for combo in &combos {
            for &v in &spec.values {
                let mut c = combo.clone();
                c.push(v);
                next.push(c);
            }
        }
        combos = next;
    }
    combos
}

fn record_failed(record: &BenchmarkRecord) -> bool {
    let baseline_bad = record.baseline.as_ref().is_some_and(|b| {
        !b.success || b.metrics.as_ref().is_some_and(|m| !m.dryness_target_met)
    });
    let simultaneous_bad = record.simultaneous.as_ref().is_some_and(|p| {
        !p.success
            || p.metrics.as_ref().is_some_and(|m| !m.dryness_target_met)
            || p.diagnostics
                .as_ref()
                .and_then(|d| d.post_check.as_ref())
                .is_some_and(|c| !c.passed)
    });
    baseline_bad || simultaneous_bad
}

/// Runs the full grid, writing one sealed record per (combination, method).
pub fn run_grid(config: &GridConfig) -> Result<(), GridError> {
    if config.methods.is_empty() {
        return Err(GridError::User("no methods selected".to_string()));
    }
    let base = named_scenario(&config.scenario)?;
    let base = prepare_scenario_for_task(base, config.task, config.tsh_bounds, config.pch_bounds);

    // Validate vary paths on a scratch copy before anything runs.
    {
        let mut scratch = base.clone();
        for spec in &config.vary {
            scratch.apply_override(&spec.path, spec.values[0])?;
        }
    }

    if should_skip_generation(&config.out, config.force) {
        info!(out = %config.out.display(), "reuse-first: output exists, skipping generation");
        return Ok(());
    }

    let reference = match &config.baseline {
        Some(path) => Some(load_reference(path)?),
        None => None,
    };

    let ramp = RampRates { tsh_max: config.ramp_tsh_max, pch_max: config.ramp_pch_max };

    // Eager validation: a malformed configuration must fail with exit code
    // 2 and an InvalidScenario record, before any solver is invoked.
    if let Err(e) = base.validate(config.task) {
        let mut writer = RecordWriter::create(&config.out)?;
        let mut record = BenchmarkRecord::new(
            config.task.as_task(),
            &config.scenario,
            BTreeMap::new(),
            environment_info(),
        );
        record.simultaneous = Some(failure_block(
            Instant::now(),
            "build_error",
            e.to_string(),
            &SolverOptions::default(),
            false,
        ));
        record.failed = true;
        record.seal(hash_inputs(&BTreeMap::from([(
            "scenario".to_string(),
            config.scenario.clone(),
        )])))?;
        writer.write_record(&record)?;
        return Err(GridError::User(e.to_string()));
    }

    let combos = cartesian(&config.vary);
    let total = combos.len() * config.methods.len();
    info!(
        combinations = combos.len(),
        methods = config.methods.len(),
        records = total,
        out = %config.out.display(),
        "generating benchmark grid"
    );

    let mut writer = RecordWriter::create(&config.out)?;
    let mut k = 0usize;
    for combo in &combos {
        let mut scenario = base.clone();
        for (spec, &value) in config.vary.iter().zip(combo) {
            scenario.apply_override(&spec.path, value)?;
        }

        let grid_block: BTreeMap<String, GridParam> = config
            .vary
            .iter()
            .zip(combo)
            .enumerate()
            .map(|(i, (spec, &value))| {
                (format!("param{}", i + 1), GridParam { path: spec.path.clone(), value })
            })
            .collect();

        for &method in &config.methods {
            k += 1;
            let mut record = BenchmarkRecord::new(
                config.task.as_task(),
                &config.scenario,
                grid_block.clone(),
                environment_info(),
            );

            let mut inputs: BTreeMap<String, String> = BTreeMap::new();
            inputs.insert("task".to_string(), config.task.as_task().to_string());
            inputs.insert("scenario".to_string(), config.scenario.clone());
            inputs.insert("method".to_string(), method.as_str().to_string());
            inputs.insert("n_elements".to_string(), config.n_elements.to_string());
            inputs.insert("n_collocation".to_string(), config.n_collocation.to_string());
            inputs.insert("effective_nfe".to_string(), config.effective_nfe.to_string());
            inputs.insert("warmstart".to_string(), config.warmstart.to_string());
            inputs.insert("dt".to_string(), format!("{}", config.dt));
            inputs.insert("solver".to_string(), config.solver.clone());
            for (spec, &value) in config.vary.iter().zip(combo) {
                inputs.insert(spec.path.clone(), format!("{value}"));
            }

            match method {
                Method::SequentialBaseline => {
                    record.baseline = Some(baseline_block(reference.as_ref()));
                }
                Method::FiniteDifferences | Method::Collocation => {
                    let case = CaseSpec {
                        scenario: scenario.clone(),
                        task: config.task,
                        method: if method == Method::FiniteDifferences {
                            DiscretizationMethod::BackwardEuler
                        } else {
                            DiscretizationMethod::CollocationRadau
                        },
                        n_elements: config.n_elements,
                        n_collocation: config.n_collocation,
                        effective_nfe: config.effective_nfe,
                        warmstart: config.warmstart,
                        ramp,
                        solver_timeout_s: config.solver_timeout_s,
                        solver: config.solver.clone(),
                        baseline_rows: reference.clone(),
                    };
                    let block = if config.in_process {
                        run_case(&case)?
                    } else {
                        run_case_subprocess(&case, config.wall_timeout_s)?
                    };
                    record.baseline = reference.as_ref().map(|_| baseline_block(reference.as_ref()));
                    record.simultaneous = Some(block);
                }
            }

            record.failed = record_failed(&record);
            record.seal(hash_inputs(&inputs))?;
            writer.write_record(&record)?;
            info!(
                case = k,
                total,
                method = method.as_str(),
                failed = record.failed,
                "record written"
            );
        }
    }
    info!(out = %config.out.display(), "grid complete");
    Ok(())
}

fn load_reference(path: &PathBuf) -> Result<ReferenceTrajectory, GridError> {
    ReferenceTrajectory::from_json_file(path).map_err(|e| match e {
        WarmStartError::Io(io) => GridError::Io(io),
        other => GridError::User(format!("baseline trajectory rejected: {other}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vary() {
        let specs = parse_vary(&["product.A1=16,18,20".to_string(), "ht.KC=2.75e-4".to_string()])
            .unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].values, vec![16.0, 18.0, 20.0]);
        assert_eq!(specs[1].path, "ht.KC");
        assert!((specs[1].values[0] - 2.75e-4).abs() < 1e-18);
    }

    #[test]
    fn test_parse_vary_rejects_malformed() {
        assert!(matches!(
            parse_vary(&["product.A1".to_string()]),
            Err(GridError::User(_))
        ));
        assert!(matches!(
            parse_vary(&["product.A1=a,b".to_string()]),
            Err(GridError::User(_))
        ));
        assert!(matches!(parse_vary(&["product.A1=".to_string()]), Err(GridError::User(_))));
    }

    #[test]
    fn test_method_parsing_accepts_aliases() {
        assert_eq!(Method::parse("fd"), Some(Method::FiniteDifferences));
        assert_eq!(Method::parse("finite_differences"), Some(Method::FiniteDifferences));
        assert_eq!(Method::parse("colloc"), Some(Method::Collocation));
        assert_eq!(Method::parse("scipy"), Some(Method::SequentialBaseline));
        assert_eq!(Method::parse("shooting"), None);
    }

    #[test]
    fn test_cartesian_expansion() {
        let specs = vec![
            VarySpec { path: "a".to_string(), values: vec![1.0, 2.0] },
            VarySpec { path: "b".to_string(), values: vec![10.0, 20.0, 30.0] },
        ];
        let combos = cartesian(&specs);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![1.0, 10.0]);
        assert_eq!(combos[5], vec![2.0, 30.0]);
        // No vary: exactly one empty combination.
        assert_eq!(cartesian(&[]).len(), 1);
    }

    #[test]
    fn test_prepare_scenario_prescribes_fixed_control() {
        let base = named_scenario("baseline").unwrap();
        let tsh = prepare_scenario_for_task(base.clone(), ControlMode::Tsh, None, None);
        assert!(tsh.pchamber.profile().is_some());
        assert!(tsh.tshelf.bounds().is_some());
        let pch = prepare_scenario_for_task(base.clone(), ControlMode::Pch, None, None);
        assert!(pch.tshelf.profile().is_some());
        assert!(pch.pchamber.bounds().is_some());
        let both = prepare_scenario_for_task(base, ControlMode::Both, None, None);
        assert!(both.pchamber.bounds().is_some());
        assert!(both.tshelf.bounds().is_some());
    }

    #[test]
    fn test_bound_overrides_applied() {
        let base = named_scenario("baseline").unwrap();
        let s = prepare_scenario_for_task(
            base,
            ControlMode::Pch,
            None,
            Some((0.06, 0.20)),
        );
        assert_eq!(s.pchamber.bounds(), Some((0.06, 0.20)));
    }

    #[test]
    fn test_build_error_becomes_failure_block() {
        // Inverted pressure bounds: no solver must run, the block must
        // carry the build_error classification.
        let mut scenario = named_scenario("baseline").unwrap();
        scenario.pchamber = ControlSetting::Bounds { min: 0.2, max: 0.06 };
        scenario.tshelf = ControlSetting::Profile(PiecewiseConstant::constant(-20.0));
        let case = CaseSpec {
            scenario,
            task: ControlMode::Pch,
            method: DiscretizationMethod::BackwardEuler,
            n_elements: 8,
            n_collocation: 3,
            effective_nfe: true,
            warmstart: false,
            ramp: RampRates::default(),
            solver_timeout_s: 10.0,
            solver: "interior_point".to_string(),
            baseline_rows: None,
        };
        let block = run_case(&case).unwrap();
        assert!(!block.success);
        assert_eq!(
            block.diagnostics.unwrap().failure_stage.as_deref(),
            Some("build_error")
        );
        assert!(block.message.unwrap().contains("Pchamber.min"));
    }

    #[test]
    fn test_unknown_solver_aborts_run() {
        let scenario = prepare_scenario_for_task(
            named_scenario("baseline").unwrap(),
            ControlMode::Tsh,
            None,
            None,
        );
        let case = CaseSpec {
            scenario,
            task: ControlMode::Tsh,
            method: DiscretizationMethod::BackwardEuler,
            n_elements: 4,
            n_collocation: 3,
            effective_nfe: true,
            warmstart: false,
            ramp: RampRates::default(),
            solver_timeout_s: 10.0,
            solver: "ipopt_hsl".to_string(),
            baseline_rows: None,
        };
        let err = run_case(&case).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(GridError::User("x".to_string()).exit_code(), 2);
        assert_eq!(GridError::SolverUnavailable("x".to_string()).exit_code(), 3);
        assert_eq!(
            GridError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).exit_code(),
            4
        );
    }
}
