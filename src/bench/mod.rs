//! Persisted benchmark records (schema v2).
//!
//! One newline-delimited JSON record per solved case is the stable
//! contract between the engine and downstream analysis. Wire field names
//! (`scipy`, `pyomo`, `python`, `ipopt`) are preserved from the schema that
//! external tooling already parses; the struct fields carry the neutral
//! names.
//!
//! Hashing rules: `hash.inputs` covers only the case's input fields (so
//! records dedupe regardless of how large their trajectories grow);
//! `hash.record` covers the whole record minus the hash block itself.
//! Trajectories are embedded as plain nested lists, never as binary blobs.

pub mod grid;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::{EnvironmentInfo, RunDiagnostics, sha16};
use crate::trajectory::{Trajectory, TrajectoryMetrics};

/// Schema version of the persisted records.
pub const SCHEMA_VERSION: u32 = 2;

/// Errors of the persistence layer.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("record I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Input and whole-record hashes (16-hex each).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashBlock {
    pub inputs: String,
    pub record: String,
}

/// One grid parameter: a dotted scenario path and the value applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridParam {
    pub path: String,
    pub value: f64,
}

/// Solver identification block shared by both method sides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverInfo {
    pub status: Option<String>,
    pub termination_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_points: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged_solve_success: Option<bool>,
}

/// Discretization metadata of a simultaneous solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscretizationInfo {
    /// "fd" or "colloc"
    pub method: String,
    pub n_elements_requested: usize,
    pub n_elements_applied: usize,
    pub n_collocation: Option<usize>,
    pub effective_nfe: bool,
    pub total_mesh_points: usize,
}

/// Result block of the sequential baseline (wire name `scipy`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineBlock {
    pub success: bool,
    pub wall_time_s: f64,
    pub objective_time_hr: Option<f64>,
    pub solver: SolverInfo,
    pub metrics: Option<TrajectoryMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Trajectory>,
}

/// Result block of the simultaneous optimizer (wire name `pyomo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimultaneousBlock {
    pub success: bool,
    pub wall_time_s: f64,
    pub objective_time_hr: Option<f64>,
    pub solver: SolverInfo,
    pub metrics: Option<TrajectoryMetrics>,
    pub discretization: Option<DiscretizationInfo>,
    pub warmstart_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<RunDiagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trajectory: Option<Trajectory>,
}

/// One persisted benchmark record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub version: u32,
    /// Present once the record is sealed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashBlock>,
    pub environment: EnvironmentInfo,
    pub task: String,
    pub scenario: String,
    pub grid: BTreeMap<String, GridParam>,
    #[serde(rename = "scipy")]
    pub baseline: Option<BaselineBlock>,
    #[serde(rename = "pyomo")]
    pub simultaneous: Option<SimultaneousBlock>,
    pub failed: bool,
}

impl BenchmarkRecord {
    /// Starts an unsealed record for one (combo, method) case.
    pub fn new(
        task: &str,
        scenario: &str,
        grid: BTreeMap<String, GridParam>,
        environment: EnvironmentInfo,
    ) -> Self {
        BenchmarkRecord {
            version: SCHEMA_VERSION,
            hash: None,
            environment,
            task: task.to_string(),
            scenario: scenario.to_string(),
            grid,
            baseline: None,
            simultaneous: None,
            failed: false,
        }
    }

    /// Seals the record: stores the input hash and computes the record hash
    /// over everything except the hash block itself.
    pub fn seal(&mut self, inputs_hash: String) -> Result<(), BenchError> {
        self.hash = None;
        let mut value = serde_json::to_value(&self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("hash");
        }
        // serde_json maps are key-sorted, so this form is canonical.
        let canonical = serde_json::to_string(&value)?;
        self.hash = Some(HashBlock { inputs: inputs_hash, record: sha16(canonical.as_bytes()) });
        Ok(())
    }

    /// Compact single-line JSON for the JSONL file.
    pub fn to_jsonl(&self) -> Result<String, BenchError> {
        debug_assert!(self.hash.is_some(), "seal the record before writing");
        Ok(serde_json::to_string(self)?)
    }
}

/// Stable hash over a case's input fields only (order-independent).
pub fn hash_inputs(inputs: &BTreeMap<String, String>) -> String {
    let canonical = serde_json::to_string(inputs).expect("string map serializes");
    sha16(canonical.as_bytes())
}

/// Reuse rule: an existing output file is never regenerated unless the
/// caller forces it.
pub fn should_skip_generation(out: &Path, force: bool) -> bool {
    out.exists() && !force
}

/// Append-only JSONL writer, flushed per record so a crashed sweep leaves
/// complete lines behind.
pub struct RecordWriter {
    writer: BufWriter<File>,
}

impl RecordWriter {
    /// Creates (or truncates) the output file.
    pub fn create(path: &Path) -> Result<Self, BenchError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        Ok(RecordWriter { writer: BufWriter::new(file) })
    }

    /// Writes one sealed record as a JSON line and flushes.
    pub fn write_record(&mut self, record: &BenchmarkRecord) -> Result<(), BenchError> {
        let line = record.to_jsonl()?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}
