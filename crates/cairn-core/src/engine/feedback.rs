//! Implements feedback restarts for unconverged geometry optimizations.
//!
//! An optimization that runs out of steps often converges when restarted
//! from the geometry it got stuck at. The feedback loop does exactly that:
//! each try runs in its own numbered directory, and while the output shows
//! the optimizer's non-convergence condition, the next try starts from the
//! structure read back out of the previous output. Any other result, clean
//! or not, is surfaced as-is.

use crate::core::models::geometry::Structure;
use crate::engine::compute::{ComputationEngine, ErrorKind, JobSpec};
use crate::engine::error::EngineError;
use crate::engine::options::FallbackMatrix;
use crate::engine::retry::{RobustOutcome, Verdict, attempt_dir, robust_run};
use std::path::Path;
use tracing::{info, warn};

enum FeedbackMode<'m> {
    Direct,
    Robust(&'m FallbackMatrix),
}

/// Runs an optimization with feedback restarts, submitting each try
/// directly to the engine.
pub fn feedback_optimize<E: ComputationEngine>(
    engine: &E,
    workdir: &Path,
    job: &JobSpec<'_>,
    max_tries: usize,
) -> Result<RobustOutcome, EngineError> {
    feedback_loop(engine, workdir, job, max_tries, FeedbackMode::Direct)
}

/// Runs an optimization with feedback restarts, delegating each try to the
/// options-matrix retry engine.
///
/// The matrix cursor starts fresh on every try; the two recovery mechanisms
/// compose but do not share state.
pub fn robust_feedback<E: ComputationEngine>(
    engine: &E,
    workdir: &Path,
    job: &JobSpec<'_>,
    matrix: &FallbackMatrix,
    max_tries: usize,
) -> Result<RobustOutcome, EngineError> {
    feedback_loop(engine, workdir, job, max_tries, FeedbackMode::Robust(matrix))
}

fn feedback_loop<E: ComputationEngine>(
    engine: &E,
    workdir: &Path,
    job: &JobSpec<'_>,
    max_tries: usize,
    mode: FeedbackMode<'_>,
) -> Result<RobustOutcome, EngineError> {
    let tries = max_tries.max(1);
    let mut restart: Option<Structure> = None;
    let mut try_index = 0usize;
    loop {
        let try_dir = attempt_dir(workdir, try_index)?;
        let try_job = match &restart {
            None => job.clone(),
            Some(structure) => job.with_structure(structure),
        };
        let outcome = match &mode {
            FeedbackMode::Direct => {
                let texts = engine.submit(&try_dir, &try_job).map_err(EngineError::Compute)?;
                RobustOutcome { texts, attempts: 1, verdict: Verdict::Clean }
            }
            FeedbackMode::Robust(matrix) => robust_run(engine, &try_dir, &try_job, matrix)?,
        };

        let unconverged = engine.has_error(&outcome.texts.output, ErrorKind::OptNoConv);
        if !unconverged {
            return Ok(RobustOutcome {
                texts: outcome.texts,
                attempts: try_index + 1,
                verdict: outcome.verdict,
            });
        }
        if try_index + 1 >= tries {
            warn!(dir = %workdir.display(), "feedback optimization exhausted its tries without converging");
            let mut errors = vec![ErrorKind::OptNoConv];
            if let Verdict::Degraded { errors: inner } = &outcome.verdict {
                for kind in inner {
                    if !errors.contains(kind) {
                        errors.push(*kind);
                    }
                }
            }
            return Ok(RobustOutcome {
                texts: outcome.texts,
                attempts: try_index + 1,
                verdict: Verdict::Degraded { errors },
            });
        }

        info!(try_index, "optimization did not converge; restarting from its last structure");
        let next = match job.structure {
            Structure::Cartesian(_) => {
                Structure::Cartesian(engine.read_geometry(&outcome.texts.output)?)
            }
            Structure::Internal(_) => {
                Structure::Internal(engine.read_internal(&outcome.texts.output)?)
            }
        };
        restart = Some(next);
        try_index += 1;
    }
}
