//! Solver diagnostics, fingerprints and environment metadata.
//!
//! Everything a benchmark record needs to make a solve reproducible and
//! auditable: the model size, a small-integer termination classification,
//! a SHA-256 fingerprint of the full solver-option map (so silent
//! configuration drift between runs is detectable), the runtime
//! environment, the source revision, and the warm-start provenance block.

use std::collections::BTreeMap;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::nlp::ModelSize;
use crate::solvers::staged::{StageReport, StagedReport};
use crate::solvers::{SOLVER_VERSION, SolverOptions};
use crate::trajectory::PostCheckReport;

/// First 16 hex characters of the SHA-256 digest of `bytes`.
pub fn sha16(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Key solver options kept in plaintext next to the hash for readability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyOptions {
    pub linear_solver: Option<String>,
    pub tol: Option<String>,
    pub constr_viol_tol: Option<String>,
    pub mu_strategy: Option<String>,
    pub max_iter: Option<String>,
}

/// Fingerprint of a solver-option map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionFingerprint {
    /// SHA-256 (first 16 hex) over the sorted full option map
    pub option_hash: String,
    pub key_options: KeyOptions,
}

/// Fingerprints an option value. The map is sorted by key, so the hash is
/// independent of construction order.
pub fn option_fingerprint(options: &SolverOptions) -> OptionFingerprint {
    let map: BTreeMap<String, String> = options.option_map();
    let canonical = serde_json::to_string(&map).expect("string map serializes");
    let pick = |key: &str| map.get(key).cloned();
    OptionFingerprint {
        option_hash: sha16(canonical.as_bytes()),
        key_options: KeyOptions {
            linear_solver: pick("linear_solver"),
            tol: pick("tol"),
            constr_viol_tol: pick("constr_viol_tol"),
            mu_strategy: pick("mu_strategy"),
            max_iter: pick("max_iter"),
        },
    }
}

/// Runtime environment of a benchmark run. Wire names follow the persisted
/// schema-v2 contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Language/toolchain version
    #[serde(rename = "python")]
    pub language: String,
    /// Modeling-library version
    #[serde(rename = "pyomo")]
    pub modeling_lib: String,
    /// Solver backend version
    #[serde(rename = "ipopt")]
    pub solver: String,
    pub os: String,
    pub host: String,
    /// ISO-8601 UTC timestamp of record creation
    pub timestamp: String,
}

/// Collects the current environment metadata.
pub fn environment_info() -> EnvironmentInfo {
    EnvironmentInfo {
        language: read_stdout("rustc", &["--version"])
            .unwrap_or_else(|| "rust (toolchain unknown)".to_string()),
        modeling_lib: format!("lyodry/{}", env!("CARGO_PKG_VERSION")),
        solver: SOLVER_VERSION.to_string(),
        os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        host: std::env::var("HOSTNAME")
            .ok()
            .or_else(|| read_stdout("hostname", &[]))
            .unwrap_or_else(|| "unknown".to_string()),
        timestamp: now_iso8601_utc(),
    }
}

/// Short source revision, when the binary runs inside a git checkout.
pub fn code_version() -> Option<String> {
    read_stdout("git", &["rev-parse", "--short", "HEAD"])
}

fn read_stdout(cmd: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(cmd).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

/// ISO-8601 UTC timestamp computed from the system clock (no calendar
/// dependency; civil conversion after Hinnant's days-from-epoch algorithm).
pub fn now_iso8601_utc() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    iso8601_from_unix(secs)
}

fn iso8601_from_unix(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    let (year, month, day) = civil_from_days(days);
    format!("{year:04}-{month:02}-{day:02}T{h:02}:{m:02}:{s:02}Z")
}

fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Warm-start provenance block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmstartMeta {
    pub enabled: bool,
    pub source_hash: Option<String>,
    pub variable_match_ratio: Option<f64>,
}

impl WarmstartMeta {
    /// Metadata for a cold-started run.
    pub fn disabled() -> Self {
        WarmstartMeta { enabled: false, source_hash: None, variable_match_ratio: None }
    }
}

/// Full per-solve diagnostics block persisted with benchmark records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub model_size: ModelSize,
    /// 0 optimal, 1 iteration/time limit, 2 infeasible, 3 unbounded, −1 other
    pub termination: i32,
    pub termination_condition: String,
    pub iterations: usize,
    pub solver_cpu_time_s: f64,
    pub wall_time_s: f64,
    pub option_fingerprint: OptionFingerprint,
    pub environment: EnvironmentInfo,
    pub code_version: Option<String>,
    pub warmstart: WarmstartMeta,
    pub failure_stage: Option<String>,
    pub stages: Vec<StageReport>,
    pub post_check: Option<PostCheckReport>,
}

impl RunDiagnostics {
    /// Minimal block for a case that never reached the solver (build or
    /// presolve failure).
    pub fn failure(stage: &str, options: &SolverOptions) -> Self {
        RunDiagnostics {
            model_size: ModelSize { n_variables: 0, n_constraints: 0, n_objectives: 0 },
            termination: -1,
            termination_condition: stage.to_string(),
            iterations: 0,
            solver_cpu_time_s: 0.0,
            wall_time_s: 0.0,
            option_fingerprint: option_fingerprint(options),
            environment: environment_info(),
            code_version: code_version(),
            warmstart: WarmstartMeta::disabled(),
            failure_stage: Some(stage.to_string()),
            stages: Vec::new(),
            post_check: None,
        }
    }

    /// Assembles the block from a finished staged solve.
    pub fn collect(
        model_size: ModelSize,
        staged: &StagedReport,
        options: &SolverOptions,
        warmstart: WarmstartMeta,
        wall_time_s: f64,
        post_check: Option<PostCheckReport>,
    ) -> Self {
        let last = staged.last();
        let failure_stage = staged.failure_stage.clone().or_else(|| {
            post_check.as_ref().and_then(|p| {
                if p.passed { None } else { Some("postcheck".to_string()) }
            })
        });
        RunDiagnostics {
            model_size,
            termination: last.map(|r| r.termination.code()).unwrap_or(-1),
            termination_condition: last
                .map(|r| r.termination.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            iterations: staged.total_iterations(),
            solver_cpu_time_s: staged.total_cpu_time_s(),
            wall_time_s,
            option_fingerprint: option_fingerprint(options),
            environment: environment_info(),
            code_version: code_version(),
            warmstart,
            failure_stage,
            stages: staged.stages.clone(),
            post_check,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha16_shape() {
        let h = sha16(b"lyodry");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic.
        assert_eq!(h, sha16(b"lyodry"));
        assert_ne!(h, sha16(b"lyodrx"));
    }

    #[test]
    fn test_option_fingerprint_tracks_changes() {
        let base = SolverOptions::default();
        let fp1 = option_fingerprint(&base);
        let fp2 = option_fingerprint(&base.clone().with_max_iter(9000));
        assert_ne!(fp1.option_hash, fp2.option_hash);
        assert_eq!(fp1.key_options.mu_strategy.as_deref(), Some("adaptive"));
        assert_eq!(fp1.key_options.max_iter.as_deref(), Some("5000"));
        assert_eq!(fp1.key_options.linear_solver.as_deref(), Some("dense_lu"));
    }

    #[test]
    fn test_warm_start_changes_fingerprint() {
        // The contamination guard: a warm-start option set must be visible
        // in the fingerprint, never silently shared.
        let cold = option_fingerprint(&SolverOptions::default());
        let warm = option_fingerprint(
            &SolverOptions::default().with_warm_start(Default::default()),
        );
        assert_ne!(cold.option_hash, warm.option_hash);
    }

    #[test]
    fn test_iso8601_epoch_and_known_date() {
        assert_eq!(iso8601_from_unix(0), "1970-01-01T00:00:00Z");
        // 2024-02-29 00:00:00 UTC (leap day).
        assert_eq!(iso8601_from_unix(1_709_164_800), "2024-02-29T00:00:00Z");
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = now_iso8601_utc();
        assert_eq!(ts.len(), 20);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_environment_wire_names() {
        let env = environment_info();
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains("\"python\""));
        assert!(json.contains("\"pyomo\""));
        assert!(json.contains("\"ipopt\""));
        assert!(env.modeling_lib.starts_with("lyodry/"));
    }
}
