//! Launches follow-up jobs at structures that already earned a saved leaf.
//!
//! Typical use is requesting gradients, Hessians, or re-optimizations at a
//! tighter level across a whole sample space after the sampling campaign has
//! settled.

use crate::core::models::geometry::Structure;
use crate::core::models::key::{JobKind, RootKey};
use crate::engine::compute::{ComputationEngine, JobSpec};
use crate::engine::config::RefineConfig;
use crate::engine::context::RunContext;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::run;
use crate::engine::toolkit::GeometryToolkit;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefineSummary {
    pub visited: usize,
    pub launched: usize,
    pub skipped_high_energy: usize,
}

/// Runs one job kind at every saved sample of a root key.
///
/// Saved leaves are visited in stable order. When the configuration carries
/// an energy ceiling, leaves whose stored energy lies above it are skipped.
/// Each remaining leaf's geometry is submitted as a Cartesian structure
/// through the run supervisor, so finished work is skipped and crashed work
/// is retried on re-invocation.
#[instrument(skip_all, name = "run_at_saved", fields(species = %root.species, job = %job))]
pub fn run_at_saved<E, T>(
    ctx: &RunContext<'_, E, T>,
    root: &RootKey,
    job: JobKind,
    config: &RefineConfig,
) -> Result<RefineSummary, EngineError>
where
    E: ComputationEngine,
    T: GeometryToolkit,
{
    ctx.reporter.report(Progress::PhaseStart { name: "Refining" });
    let ids = ctx.save_store.list_samples(root)?;
    let mut summary = RefineSummary { visited: 0, launched: 0, skipped_high_energy: 0 };

    ctx.reporter.report(Progress::TaskStart { total: ids.len() as u64 });
    for id in ids {
        summary.visited += 1;
        let sample = root.sample(id);
        if let Some(ceiling) = config.energy_ceiling {
            let energy = ctx.save_store.read_energy(&sample)?;
            if energy > ceiling {
                info!(sample = %sample.id, energy, ceiling, "energy above the ceiling; skipping");
                summary.skipped_high_energy += 1;
                ctx.reporter.report(Progress::TaskAdvance);
                continue;
            }
        }
        let geometry = ctx.save_store.read_geometry(&sample)?;
        let structure = Structure::Cartesian(geometry);
        let spec =
            JobSpec::for_root(job, &structure, root).with_options(config.base_options.clone());
        run::launch(
            ctx.run_store,
            &sample.run(job),
            ctx.engine,
            &spec,
            &config.retry,
            ctx.lease,
        )?;
        summary.launched += 1;
        ctx.reporter.report(Progress::TaskAdvance);
    }
    ctx.reporter.report(Progress::TaskFinish);
    ctx.reporter.report(Progress::PhaseFinish);
    info!(
        visited = summary.visited,
        launched = summary.launched,
        skipped = summary.skipped_high_energy,
        "follow-up pass finished"
    );
    Ok(summary)
}
