//! Implements the options-matrix retry engine.
//!
//! A job is executed repeatedly inside numbered attempt directories
//! (`try0`, `try1`, ...) until its output shows none of the failure
//! categories in the fallback matrix, or until some category runs out of
//! alternatives. Each failed attempt advances exactly one row's cursor, so
//! successive attempts walk monotonically through the matrix.

use crate::engine::compute::{ComputationEngine, ErrorKind, JobSpec, JobTexts};
use crate::engine::error::EngineError;
use crate::engine::options::FallbackMatrix;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    // The matrix ran out of alternatives; the final attempt still showed
    // the listed failure categories.
    Degraded { errors: Vec<ErrorKind> },
}

impl Verdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, Verdict::Clean)
    }
}

// Texts are those of the final attempt, degraded or not, so callers can
// persist them for inspection.
#[derive(Debug)]
pub struct RobustOutcome {
    pub texts: JobTexts,
    pub attempts: usize,
    pub verdict: Verdict,
}

/// Executes a job until it is free of classified failures or the fallback
/// matrix is exhausted. Attempt `k` runs in `<workdir>/try<k>` with the base
/// options overridden by the option set at each row's cursor.
pub fn robust_run<E: ComputationEngine>(
    engine: &E,
    workdir: &Path,
    job: &JobSpec<'_>,
    matrix: &FallbackMatrix,
) -> Result<RobustOutcome, EngineError> {
    let mut cursor = matrix.cursor();
    let mut attempt = 0usize;
    loop {
        let attempt_dir = attempt_dir(workdir, attempt)?;
        let mut attempt_job = job.clone();
        attempt_job.options = job.options.overridden_all(cursor.current(matrix));
        debug!(attempt, dir = %attempt_dir.display(), "submitting attempt");
        let texts = engine.submit(&attempt_dir, &attempt_job).map_err(EngineError::Compute)?;

        let matched = matrix
            .rows()
            .iter()
            .position(|row| engine.has_error(&texts.output, row.trigger));
        let Some(row_index) = matched else {
            return Ok(RobustOutcome { texts, attempts: attempt + 1, verdict: Verdict::Clean });
        };

        let trigger = matrix.rows()[row_index].trigger;
        info!(attempt, error = %trigger, "attempt hit a classified failure; advancing its fallback row");
        cursor.advance(row_index);
        if cursor.is_exhausted(matrix) {
            let errors: Vec<ErrorKind> = matrix
                .rows()
                .iter()
                .map(|row| row.trigger)
                .filter(|kind| engine.has_error(&texts.output, *kind))
                .collect();
            warn!(dir = %workdir.display(), "fallback alternatives exhausted; keeping the last attempt");
            return Ok(RobustOutcome {
                texts,
                attempts: attempt + 1,
                verdict: Verdict::Degraded { errors },
            });
        }
        attempt += 1;
    }
}

// Attempt numbers never repeat within a run instance, so a directory that
// already exists means the numbering invariant is broken; the attempt fails
// rather than overwrite whatever is in there.
pub(crate) fn attempt_dir(workdir: &Path, attempt: usize) -> Result<PathBuf, EngineError> {
    let dir = workdir.join(format!("try{}", attempt));
    match fs::create_dir(&dir) {
        Ok(()) => Ok(dir),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(EngineError::Internal(format!(
            "attempt directory '{}' already exists",
            dir.display()
        ))),
        Err(e) => Err(EngineError::Io { path: dir, source: e }),
    }
}
