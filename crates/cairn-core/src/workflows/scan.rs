//! Implements relaxed coordinate scans around saved samples.
//!
//! A scan walks each free coordinate of a saved structure across a grid,
//! re-optimizing at every point with that coordinate frozen. Results live in
//! branch directories under the sample, one grid point per leaf.

use crate::core::models::geometry::Structure;
use crate::core::models::key::{JobKind, SampleKey};
use crate::core::models::record::{BranchRecord, RunStatus};
use crate::core::store::StoreError;
use crate::engine::compute::{ComputationEngine, JobSpec};
use crate::engine::config::ScanConfig;
use crate::engine::context::RunContext;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use crate::engine::run;
use crate::engine::toolkit::GeometryToolkit;
use crate::workflows::sample::SaveSummary;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Scans every free coordinate of one saved sample.
///
/// Samples without a saved geometry are skipped with a log line, as are
/// species without free coordinates. The sample's scan template is recorded
/// on first use and must match on every later invocation. Grid points are
/// visited in order; each one is a constrained optimization with the scanned
/// coordinate frozen at the grid value.
#[instrument(skip_all, name = "run_scan", fields(sample = %sample.id))]
pub fn run_scan<E, T>(
    ctx: &RunContext<'_, E, T>,
    sample: &SampleKey,
    config: &ScanConfig,
) -> Result<(), EngineError>
where
    E: ComputationEngine,
    T: GeometryToolkit,
{
    let geometry = match ctx.save_store.read_geometry(sample) {
        Ok(geometry) => geometry,
        Err(StoreError::NotFound { .. }) => {
            info!("sample has no saved geometry; skipping the scan");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let zmatrix = ctx.toolkit.internal_coordinates(&geometry)?;
    let free = ctx.toolkit.free_coordinate_names(&geometry)?;
    if free.is_empty() {
        info!("sample has no free coordinates; nothing to scan");
        return Ok(());
    }
    ctx.reporter.report(Progress::PhaseStart { name: "Scanning" });

    ctx.save_store.create_scan_trunk(sample)?;
    ctx.save_store.write_scan_template(sample, zmatrix.template())?;

    let grids = ctx.toolkit.grid_points(&zmatrix, &free, config.increment);
    for (coord, linspace) in grids {
        let branch = sample.branch(coord.clone());
        ctx.save_store.create(&branch)?;
        let mut grid = BTreeMap::new();
        grid.insert(coord.clone(), linspace.clone());
        ctx.save_store.write_branch(&branch, &BranchRecord { grid })?;

        let values = linspace.values();
        info!(coordinate = %coord, points = values.len(), "scanning a coordinate");
        ctx.reporter.report(Progress::TaskStart { total: values.len() as u64 });
        for (index, value) in values.into_iter().enumerate() {
            let point = zmatrix.with_value(&coord, value)?;
            let structure = Structure::Internal(point);
            let frozen = [coord.clone()];
            let job = JobSpec::for_root(JobKind::Optimization, &structure, &sample.root)
                .with_options(config.base_options.clone())
                .with_frozen(&frozen);
            run::launch(
                ctx.run_store,
                &branch.grid(index).run(JobKind::Optimization),
                ctx.engine,
                &job,
                &config.retry,
                ctx.lease,
            )?;
            ctx.reporter.report(Progress::TaskAdvance);
        }
        ctx.reporter.report(Progress::TaskFinish);
    }
    ctx.reporter.report(Progress::PhaseFinish);
    Ok(())
}

/// Harvests finished grid points of one sample's scan into the save area.
///
/// Every grid point with a successful run is persisted; scans keep all
/// points, so there is no uniqueness filter here.
#[instrument(skip_all, name = "save_scan", fields(sample = %sample.id))]
pub fn save_scan<E, T>(
    ctx: &RunContext<'_, E, T>,
    sample: &SampleKey,
) -> Result<SaveSummary, EngineError>
where
    E: ComputationEngine,
    T: GeometryToolkit,
{
    ctx.reporter.report(Progress::PhaseStart { name: "Harvesting scan" });
    let mut summary = SaveSummary { examined: 0, completed: 0, saved: 0 };
    for coord in ctx.run_store.list_branches(sample)? {
        let branch = sample.branch(coord);
        for index in ctx.run_store.list_grid_points(&branch)? {
            summary.examined += 1;
            let grid = branch.grid(index);
            let run_key = grid.run(JobKind::Optimization);
            let output = match ctx.run_store.read_run_output(&run_key) {
                Ok(output) => output,
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            let record = ctx.run_store.read_run_record(&run_key)?;
            if record.status != RunStatus::Success || !ctx.engine.has_normal_exit(&output) {
                continue;
            }
            summary.completed += 1;

            let input = ctx.run_store.read_run_input(&run_key)?;
            let energy = ctx.engine.read_energy(&output)?;
            let geometry = ctx.engine.read_geometry(&output)?;
            ctx.save_store.create(&grid)?;
            ctx.save_store.write_leaf_record(&grid, &record)?;
            ctx.save_store.write_input(&grid, &input)?;
            ctx.save_store.write_output(&grid, &output)?;
            ctx.save_store.write_energy(&grid, energy)?;
            ctx.save_store.write_geometry(&grid, &geometry)?;
            summary.saved += 1;
        }
    }
    info!(
        examined = summary.examined,
        completed = summary.completed,
        saved = summary.saved,
        "scan harvest finished"
    );
    ctx.reporter.report(Progress::PhaseFinish);
    Ok(summary)
}
