//! A computation engine that hands jobs to an external launch script.
//!
//! The engine writes a plain TOML job input into the attempt directory, runs
//! the configured script with that directory as its working directory, and
//! captures whatever the script prints. The script wraps the actual
//! electronic-structure program; the only contract is the input document
//! written here and the output markers configured in the job file.

use crate::config::Markers;
use cairn::core::models::geometry::{Geometry, Structure, ZMatrix};
use cairn::core::models::key::{CoordName, JobKind};
use cairn::core::store::layout::{INPUT_FILE, OUTPUT_FILE};
use cairn::engine::compute::{ComputationEngine, ComputeError, ErrorKind, JobSpec, JobTexts};
use cairn::engine::options::{OptOption, ScfOption};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

pub struct ScriptEngine {
    script: PathBuf,
    program: String,
    markers: Markers,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct InputDoc<'a> {
    job: JobKind,
    program: &'a str,
    method: &'a str,
    basis: &'a str,
    charge: i32,
    multiplicity: u32,
    restricted: bool,
    scf: Vec<String>,
    opt: Vec<String>,
    frozen: &'a [CoordName],
    structure: StructureDoc<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case", tag = "coords")]
enum StructureDoc<'a> {
    Cartesian { xyz: String },
    Internal { zmatrix: &'a ZMatrix },
}

impl ScriptEngine {
    pub fn new(script: PathBuf, program: String, markers: Markers) -> Self {
        Self { script, program, markers }
    }

    fn render_input(&self, job: &JobSpec<'_>) -> Result<String, ComputeError> {
        let structure = match job.structure {
            Structure::Cartesian(geometry) => StructureDoc::Cartesian { xyz: geometry.to_xyz() },
            Structure::Internal(zmatrix) => StructureDoc::Internal { zmatrix },
        };
        let doc = InputDoc {
            job: job.kind,
            program: &self.program,
            method: job.method,
            basis: job.basis,
            charge: job.charge,
            multiplicity: job.multiplicity,
            restricted: job.restricted,
            scf: job.options.scf.iter().map(scf_keyword).collect(),
            opt: job.options.opt.iter().map(opt_keyword).collect(),
            frozen: job.frozen,
            structure,
        };
        toml::to_string_pretty(&doc).map_err(|e| ComputeError::Launch {
            detail: format!("failed to render the job input: {}", e),
        })
    }

    /// Returns the lines between the final begin marker and the next end
    /// marker, exclusive of both marker lines.
    fn last_block<'t>(&self, output: &'t str, begin: &str, end: &str) -> Option<&'t str> {
        let marker = output.rfind(begin)?;
        let start = output[marker..].find('\n')? + marker + 1;
        let stop = output[start..].find(end)? + start;
        Some(&output[start..stop])
    }
}

fn scf_keyword(option: &ScfOption) -> String {
    match option {
        ScfOption::GuessCore => "guess=core".to_string(),
        ScfOption::GuessHuckel => "guess=huckel".to_string(),
        ScfOption::Diis(true) => "diis=on".to_string(),
        ScfOption::Diis(false) => "diis=off".to_string(),
        ScfOption::MaxIter(n) => format!("maxiter={}", n),
    }
}

fn opt_keyword(option: &OptOption) -> String {
    match option {
        OptOption::InternalCoords => "coords=internal".to_string(),
        OptOption::MaxIter(n) => format!("maxiter={}", n),
    }
}

impl ComputationEngine for ScriptEngine {
    fn program(&self) -> &str {
        &self.program
    }

    fn submit(&self, workdir: &Path, job: &JobSpec<'_>) -> Result<JobTexts, ComputeError> {
        let input = self.render_input(job)?;
        fs::write(workdir.join(INPUT_FILE), &input)?;

        debug!(
            script = %self.script.display(),
            workdir = %workdir.display(),
            "running the launch script"
        );
        let result = Command::new(&self.script)
            .arg(INPUT_FILE)
            .current_dir(workdir)
            .output()
            .map_err(|e| ComputeError::Launch {
                detail: format!("{}: {}", self.script.display(), e),
            })?;

        let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
        if !result.stderr.is_empty() {
            output.push('\n');
            output.push_str(&String::from_utf8_lossy(&result.stderr));
        }
        if !result.status.success() {
            debug!(status = %result.status, "the launch script exited abnormally");
        }
        fs::write(workdir.join(OUTPUT_FILE), &output)?;
        Ok(JobTexts { input, output })
    }

    fn has_normal_exit(&self, output: &str) -> bool {
        output.contains(&self.markers.normal_exit)
    }

    fn has_error(&self, output: &str, kind: ErrorKind) -> bool {
        output.contains(&format!("{} {}", self.markers.error_prefix, kind))
    }

    fn read_energy(&self, output: &str) -> Result<f64, ComputeError> {
        // The last occurrence wins; iterative programs may print the marker
        // once per cycle.
        let value = output
            .lines()
            .rev()
            .find_map(|line| {
                let at = line.find(&self.markers.energy_prefix)?;
                Some(line[at + self.markers.energy_prefix.len()..].trim())
            })
            .ok_or(ComputeError::MissingOutput { what: "energy" })?;
        value.parse().map_err(|_| ComputeError::MalformedOutput {
            what: "energy",
            detail: value.to_string(),
        })
    }

    fn read_geometry(&self, output: &str) -> Result<Geometry, ComputeError> {
        let block = self
            .last_block(output, &self.markers.geometry_begin, &self.markers.geometry_end)
            .ok_or(ComputeError::MissingOutput { what: "geometry" })?;
        let atoms: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        let xyz = format!("{}\n\n{}\n", atoms.len(), atoms.join("\n"));
        Geometry::from_xyz(&xyz).map_err(|e| ComputeError::MalformedOutput {
            what: "geometry",
            detail: e.to_string(),
        })
    }

    fn read_internal(&self, output: &str) -> Result<ZMatrix, ComputeError> {
        let block = self
            .last_block(output, &self.markers.zmatrix_begin, &self.markers.zmatrix_end)
            .ok_or(ComputeError::MissingOutput { what: "z-matrix" })?;
        toml::from_str(block).map_err(|e| ComputeError::MalformedOutput {
            what: "z-matrix",
            detail: e.to_string(),
        })
    }
}
