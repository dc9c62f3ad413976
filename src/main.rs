//! Benchmark grid runner CLI.
//!
//! `lyodry generate` sweeps parameter grids and persists one schema-v2
//! JSONL record per solved case. The hidden `run-case` subcommand is the
//! child side of the process-isolation scheme: it reads a case spec on
//! stdin, solves it, and writes the result block to stdout.

use std::io::Read;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use lyodry::bench::grid::{
    CaseSpec, GridConfig, GridError, Method, parse_vary, run_case, run_grid,
};
use lyodry::scenario::ControlMode;

#[derive(Parser)]
#[command(
    name = "lyodry",
    version,
    about = "Primary-drying dynamic optimization benchmark runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate JSONL benchmark records for a parameter grid
    Generate(GenerateArgs),
    /// Internal: solve one case read from stdin (child process side)
    #[command(hide = true)]
    RunCase,
}

#[derive(Args)]
struct GenerateArgs {
    /// Optimization task: which control trajectories are free
    #[arg(long, value_parser = parse_task)]
    task: ControlMode,

    /// Name of a pre-registered scenario
    #[arg(long)]
    scenario: String,

    /// Parameter sweep spec `path=v1,v2,...` (repeatable)
    #[arg(long)]
    vary: Vec<String>,

    /// Comma-separated methods to run
    #[arg(long, default_value = "sequential_baseline,finite_differences,collocation")]
    methods: String,

    /// Discretization granularity (elements, or interior points with
    /// effective-NFE collocation)
    #[arg(long, default_value_t = 24)]
    n_elements: usize,

    /// Collocation points per element (2, 3 or 5)
    #[arg(long, default_value_t = 3)]
    n_collocation: usize,

    /// Reference baseline time step [hr]
    #[arg(long, default_value_t = 0.01)]
    dt: f64,

    /// Initialize solves from the baseline trajectory
    #[arg(long)]
    warmstart: bool,

    /// Disable effective-NFE parity for collocation
    #[arg(long)]
    raw_colloc: bool,

    /// Maximum shelf-temperature ramp [°C/hr]
    #[arg(long)]
    ramp_tsh_max: Option<f64>,

    /// Maximum chamber-pressure ramp [Torr/hr]
    #[arg(long)]
    ramp_pch_max: Option<f64>,

    /// Override released shelf-temperature bounds [°C]
    #[arg(long)]
    tsh_min: Option<f64>,
    #[arg(long)]
    tsh_max: Option<f64>,

    /// Override released chamber-pressure bounds [Torr]
    #[arg(long)]
    pch_min: Option<f64>,
    #[arg(long)]
    pch_max: Option<f64>,

    /// Output JSONL path
    #[arg(long)]
    out: PathBuf,

    /// External baseline trajectory file (JSON nested rows)
    #[arg(long)]
    baseline: Option<PathBuf>,

    /// Overwrite an existing output file
    #[arg(long)]
    force: bool,

    /// Solve cases in this process instead of isolated children
    #[arg(long)]
    in_process: bool,

    /// Wall-clock kill budget per case [s]
    #[arg(long, default_value_t = 300.0)]
    wall_timeout: f64,

    /// In-solver CPU budget per invocation [s]
    #[arg(long, default_value_t = 180.0)]
    solver_timeout: f64,

    /// Solver backend name
    #[arg(long, default_value = "interior_point")]
    solver: String,
}

fn parse_task(s: &str) -> Result<ControlMode, String> {
    ControlMode::from_task(s).ok_or_else(|| format!("task must be one of Tsh, Pch, both; got '{s}'"))
}

fn bounds_pair(
    min: Option<f64>,
    max: Option<f64>,
    label: &str,
) -> Result<Option<(f64, f64)>, GridError> {
    match (min, max) {
        (None, None) => Ok(None),
        (Some(lo), Some(hi)) => Ok(Some((lo, hi))),
        _ => Err(GridError::User(format!(
            "both --{label}-min and --{label}-max must be given together"
        ))),
    }
}

fn generate(args: GenerateArgs) -> Result<(), GridError> {
    let mut methods = Vec::new();
    for name in args.methods.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let method = Method::parse(name)
            .ok_or_else(|| GridError::User(format!("unknown method '{name}'")))?;
        methods.push(method);
    }
    let config = GridConfig {
        task: args.task,
        scenario: args.scenario,
        vary: parse_vary(&args.vary)?,
        methods,
        n_elements: args.n_elements,
        n_collocation: args.n_collocation,
        dt: args.dt,
        warmstart: args.warmstart,
        effective_nfe: !args.raw_colloc,
        ramp_tsh_max: args.ramp_tsh_max,
        ramp_pch_max: args.ramp_pch_max,
        tsh_bounds: bounds_pair(args.tsh_min, args.tsh_max, "tsh")?,
        pch_bounds: bounds_pair(args.pch_min, args.pch_max, "pch")?,
        force: args.force,
        out: args.out,
        baseline: args.baseline,
        in_process: args.in_process,
        wall_timeout_s: args.wall_timeout,
        solver_timeout_s: args.solver_timeout,
        solver: args.solver,
    };
    run_grid(&config)
}

fn run_case_from_stdin() -> Result<(), GridError> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let spec: CaseSpec = serde_json::from_str(&input)?;
    let block = run_case(&spec)?;
    println!("{}", serde_json::to_string(&block)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Generate(args) => generate(args),
        Commands::RunCase => run_case_from_stdin(),
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            let code = e.exit_code();
            // Solver failures inside cases are data; reaching here means a
            // configuration, environment or I/O problem.
            let err = anyhow::Error::new(e).context("grid run failed");
            eprintln!("{err:#}");
            std::process::exit(code);
        }
    }
}
