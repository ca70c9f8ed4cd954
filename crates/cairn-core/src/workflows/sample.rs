//! Implements the stochastic sampling workflow: populate a sample space
//! with optimized structures, then harvest the unique ones.
//!
//! The two halves are separate operations so that expensive runs and cheap
//! harvesting can be scheduled independently. Both are idempotent: re-running
//! either against an unchanged store does no new work.

use crate::core::models::geometry::{Geometry, Structure};
use crate::core::models::key::{JobKind, RootKey, SampleId};
use crate::core::models::record::{RunRecord, RunStatus, TrunkRecord};
use crate::core::store::StoreError;
use crate::core::utils::ids;
use crate::engine::compute::{ComputationEngine, JobSpec};
use crate::engine::config::SamplingConfig;
use crate::engine::context::RunContext;
use crate::engine::dedup;
use crate::engine::error::EngineError;
use crate::engine::lease;
use crate::engine::progress::Progress;
use crate::engine::run;
use crate::engine::toolkit::GeometryToolkit;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveSummary {
    pub examined: usize,
    pub completed: usize,
    pub saved: usize,
}

/// Brings the sample space of a root key up to its requested size.
///
/// The requested count is reduced by what already exists: the trunk's saved
/// count, successful runs that have not been harvested yet, and runs
/// currently in flight. Failed runs are not counted; fresh samples replace
/// them. Whatever remains is drawn from the toolkit and launched one
/// optimization at a time.
///
/// The first invocation records the space's coordinate template and sampling
/// ranges at the trunk; every later invocation must present the identical
/// template.
#[instrument(skip_all, name = "ensure_samples", fields(species = %root.species))]
pub fn ensure_samples<E, T>(
    ctx: &RunContext<'_, E, T>,
    root: &RootKey,
    config: &SamplingConfig,
) -> Result<(), EngineError>
where
    E: ComputationEngine,
    T: GeometryToolkit,
{
    ctx.reporter.report(Progress::PhaseStart { name: "Sampling" });
    let geometry = ctx.toolkit.geometry_from_identity(&root.species)?;
    let zmatrix = ctx.toolkit.internal_coordinates(&geometry)?;
    let free = ctx.toolkit.free_coordinate_names(&geometry)?;
    let ranges = ctx.toolkit.sampling_ranges(&zmatrix, &free);

    let mut remaining = config.nsamp;
    if ranges.is_empty() {
        info!("no free coordinates; sampling a single structure");
        remaining = 1;
    }

    if ctx.save_store.trunk_exists(root) {
        ctx.save_store.write_template(root, zmatrix.template())?;
        let trunk = ctx.save_store.read_trunk(root)?;
        remaining = remaining.saturating_sub(trunk.nsamp);
        info!(
            saved = trunk.nsamp,
            remaining,
            "found a previous saved space; adjusting the sample count"
        );
    } else {
        ctx.save_store.create_trunk(root)?;
        ctx.save_store.write_template(root, zmatrix.template())?;
        ctx.save_store.write_trunk(root, &TrunkRecord::new(ranges.clone()))?;
    }

    let pending = pending_run_count(ctx, root)?;
    if pending > 0 {
        remaining = remaining.saturating_sub(pending);
        info!(pending, remaining, "found unharvested or in-flight runs; adjusting the sample count");
    }
    if remaining == 0 {
        info!("sample space is already satisfied; nothing to run");
        ctx.reporter.report(Progress::PhaseFinish);
        return Ok(());
    }

    let structures = ctx.toolkit.sample_structures(&zmatrix, remaining, &ranges);
    let ids = fresh_ids(ctx, root, structures.len());
    let total = structures.len();

    ctx.reporter.report(Progress::TaskStart { total: total as u64 });
    for (position, (id, sample_zmatrix)) in ids.into_iter().zip(structures).enumerate() {
        let sample = root.sample(id);
        ctx.run_store.create(&sample)?;
        let structure = Structure::Internal(sample_zmatrix);
        let job = JobSpec::for_root(JobKind::Optimization, &structure, root)
            .with_options(config.base_options.clone());
        info!(sample = %sample.id, position = position + 1, total, "launching a sample optimization");
        run::launch(
            ctx.run_store,
            &sample.run(JobKind::Optimization),
            ctx.engine,
            &job,
            &config.retry,
            ctx.lease,
        )?;
        ctx.reporter.report(Progress::TaskAdvance);
    }
    ctx.reporter.report(Progress::TaskFinish);
    ctx.reporter.report(Progress::PhaseFinish);
    Ok(())
}

/// Harvests successful sample runs into the save area, keeping only
/// structures that are unique by Coulomb-spectrum fingerprint, and bumps the
/// trunk's saved count by the number kept.
#[instrument(skip_all, name = "save_samples", fields(species = %root.species))]
pub fn save_samples<E, T>(
    ctx: &RunContext<'_, E, T>,
    root: &RootKey,
    config: &SamplingConfig,
) -> Result<SaveSummary, EngineError>
where
    E: ComputationEngine,
    T: GeometryToolkit,
{
    ctx.reporter.report(Progress::PhaseStart { name: "Harvesting" });
    let run_ids = ctx.run_store.list_samples(root)?;
    if run_ids.is_empty() {
        info!("no sample runs to harvest");
        ctx.reporter.report(Progress::PhaseFinish);
        return Ok(SaveSummary { examined: 0, completed: 0, saved: 0 });
    }

    let mut harvested = Vec::new();
    for id in &run_ids {
        let sample = root.sample(id.clone());
        let run_key = sample.run(JobKind::Optimization);
        let output = match ctx.run_store.read_run_output(&run_key) {
            Ok(output) => output,
            Err(StoreError::NotFound { .. }) => continue,
            Err(e) => return Err(e.into()),
        };
        let record = ctx.run_store.read_run_record(&run_key)?;
        if record.status != RunStatus::Success || !ctx.engine.has_normal_exit(&output) {
            continue;
        }
        let input = ctx.run_store.read_run_input(&run_key)?;
        let energy = ctx.engine.read_energy(&output)?;
        let geometry = ctx.engine.read_geometry(&output)?;
        harvested.push(Harvested { id: id.clone(), record, input, output, energy, geometry });
    }
    let completed = harvested.len();

    let saved_ids = ctx.save_store.list_samples(root)?;
    let mut seen = Vec::with_capacity(saved_ids.len());
    for id in &saved_ids {
        seen.push(ctx.save_store.read_geometry(&root.sample(id.clone()))?);
    }

    let candidates: Vec<Geometry> = harvested.iter().map(|h| h.geometry.clone()).collect();
    let unique = dedup::argunique(&candidates, &seen, config.dedup_rtol)?;
    if unique.len() < completed {
        ctx.reporter.report(Progress::Message(format!(
            "Discarding {} duplicate structure(s).",
            completed - unique.len()
        )));
    }

    for &index in &unique {
        let h = &harvested[index];
        let sample = root.sample(h.id.clone());
        info!(sample = %h.id, "saving a unique structure");
        ctx.save_store.create(&sample)?;
        ctx.save_store.write_leaf_record(&sample, &h.record)?;
        ctx.save_store.write_input(&sample, &h.input)?;
        ctx.save_store.write_output(&sample, &h.output)?;
        ctx.save_store.write_energy(&sample, h.energy)?;
        ctx.save_store.write_geometry(&sample, &h.geometry)?;
    }

    let mut trunk = ctx.save_store.read_trunk(root)?;
    trunk.nsamp += unique.len();
    ctx.save_store.write_trunk(root, &trunk)?;
    info!(
        examined = run_ids.len(),
        completed,
        saved = unique.len(),
        total = trunk.nsamp,
        "harvest finished"
    );
    ctx.reporter.report(Progress::PhaseFinish);
    Ok(SaveSummary { examined: run_ids.len(), completed, saved: unique.len() })
}

struct Harvested {
    id: SampleId,
    record: RunRecord,
    input: String,
    output: String,
    energy: f64,
    geometry: Geometry,
}

// Runs that succeeded but are not yet saved, plus runs someone is executing
// now.
fn pending_run_count<E, T>(
    ctx: &RunContext<'_, E, T>,
    root: &RootKey,
) -> Result<usize, EngineError> {
    let saved_ids = ctx.save_store.list_samples(root)?;
    let mut pending = 0usize;
    for id in ctx.run_store.list_samples(root)? {
        let sample = root.sample(id);
        let run_key = sample.run(JobKind::Optimization);
        if !ctx.run_store.run_exists(&run_key) {
            continue;
        }
        match ctx.run_store.read_run_record(&run_key) {
            Ok(record) => match record.status {
                RunStatus::Success => {
                    if !saved_ids.contains(&sample.id) {
                        pending += 1;
                    }
                }
                RunStatus::Running | RunStatus::Pending => {
                    if lease::is_live(&ctx.run_store.path_of(&run_key)) {
                        pending += 1;
                    }
                }
                RunStatus::Failure => {}
            },
            Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(pending)
}

fn fresh_ids<E, T>(ctx: &RunContext<'_, E, T>, root: &RootKey, count: usize) -> Vec<SampleId> {
    let mut drawn = Vec::with_capacity(count);
    while drawn.len() < count {
        let id = ids::fresh_sample_id();
        let sample = root.sample(id.clone());
        if drawn.contains(&id) || ctx.run_store.exists(&sample) || ctx.save_store.exists(&sample)
        {
            continue;
        }
        drawn.push(id);
    }
    drawn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::geometry::{Atom, TemplateRow, VariableTemplate};
    use crate::engine::config::SamplingConfigBuilder;
    use crate::engine::lease::{self, LeaseDecision};
    use crate::engine::progress::ProgressReporter;
    use crate::test_support::{
        FakeEngine, FakeToolkit, WorkflowSetup, fake_failure, fake_success, fake_success_with,
        workflow_setup,
    };
    use nalgebra::Point3;

    fn config(nsamp: usize) -> SamplingConfig {
        SamplingConfigBuilder::new().nsamp(nsamp).build().unwrap()
    }

    fn bent_water(angle_degrees: f64) -> Geometry {
        let (sin, cos) = angle_degrees.to_radians().sin_cos();
        Geometry::new(vec![
            Atom::new("O", Point3::new(0.0, 0.0, 0.0)),
            Atom::new("H", Point3::new(0.9572, 0.0, 0.0)),
            Atom::new("H", Point3::new(0.9572 * cos, 0.9572 * sin, 0.0)),
        ])
    }

    #[test]
    fn ensure_populates_the_requested_number_of_samples() {
        let s: WorkflowSetup = workflow_setup();
        let engine = FakeEngine::scripted(vec![
            fake_success(-76.0),
            fake_success(-76.1),
            fake_success(-76.2),
        ]);
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);

        ensure_samples(&ctx, &s.root, &config(3)).unwrap();

        let ids = s.run.list_samples(&s.root).unwrap();
        assert_eq!(ids.len(), 3);
        for id in ids {
            let record =
                s.run.read_run_record(&s.root.sample(id).run(JobKind::Optimization)).unwrap();
            assert_eq!(record.status, RunStatus::Success);
        }
        // The trunk was initialized on the save side.
        assert_eq!(s.save.read_trunk(&s.root).unwrap().nsamp, 0);
        assert!(s.save.read_template(&s.root).is_ok());
    }

    #[test]
    fn a_species_without_free_coordinates_gets_a_single_sample() {
        let s = workflow_setup();
        let engine = FakeEngine::scripted(vec![fake_success(-76.0)]);
        let toolkit = FakeToolkit { free: Vec::new(), ..FakeToolkit::default() };
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);

        ensure_samples(&ctx, &s.root, &config(10)).unwrap();
        assert_eq!(s.run.list_samples(&s.root).unwrap().len(), 1);
    }

    #[test]
    fn the_saved_trunk_count_reduces_new_work() {
        let s = workflow_setup();
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();

        // A previous campaign saved two structures.
        s.save.create_trunk(&s.root).unwrap();
        let zmatrix = crate::test_support::water_zmatrix();
        s.save.write_template(&s.root, zmatrix.template()).unwrap();
        let mut trunk = TrunkRecord::new(Default::default());
        trunk.nsamp = 2;
        s.save.write_trunk(&s.root, &trunk).unwrap();

        let engine = FakeEngine::scripted(vec![fake_success(-76.0)]);
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);
        ensure_samples(&ctx, &s.root, &config(3)).unwrap();
        assert_eq!(engine.submitted_inputs().len(), 1);
    }

    #[test]
    fn reinvoking_ensure_with_unharvested_successes_does_no_new_work() {
        let s = workflow_setup();
        let engine = FakeEngine::scripted(vec![fake_success(-76.0), fake_success(-76.1)]);
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);

        ensure_samples(&ctx, &s.root, &config(2)).unwrap();
        ensure_samples(&ctx, &s.root, &config(2)).unwrap();
        assert_eq!(engine.submitted_inputs().len(), 2);
        assert_eq!(s.run.list_samples(&s.root).unwrap().len(), 2);
    }

    #[test]
    fn failed_runs_are_replaced_by_fresh_samples() {
        let s = workflow_setup();
        let engine = FakeEngine::scripted(vec![
            fake_success(-76.0),
            fake_failure(&[]),
            fake_success(-76.1),
            fake_success(-76.2),
        ]);
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);

        ensure_samples(&ctx, &s.root, &config(3)).unwrap();
        // One of the three failed; a second pass replaces just that one.
        ensure_samples(&ctx, &s.root, &config(3)).unwrap();
        assert_eq!(engine.submitted_inputs().len(), 4);
        assert_eq!(s.run.list_samples(&s.root).unwrap().len(), 4);
    }

    #[test]
    fn an_in_flight_run_counts_toward_the_request() {
        let s = workflow_setup();
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();

        // Someone else is optimizing a sample right now.
        let foreign = s.root.sample(crate::core::models::key::SampleId::new("sforeign001"));
        let run_key = foreign.run(JobKind::Optimization);
        s.run.create(&run_key).unwrap();
        let record = RunRecord::begin(JobKind::Optimization, "other", "b3lyp", "6-31g*");
        s.run.write_run_record(&run_key, &record).unwrap();
        let LeaseDecision::Acquired(_held) =
            lease::acquire(&s.run.path_of(&run_key), &s.lease).unwrap()
        else {
            panic!("expected to acquire the lease");
        };

        let engine = FakeEngine::scripted(vec![]);
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);
        ensure_samples(&ctx, &s.root, &config(1)).unwrap();
        assert!(engine.submitted_inputs().is_empty());
    }

    #[test]
    fn a_changed_template_is_rejected() {
        let s = workflow_setup();
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();

        s.save.create_trunk(&s.root).unwrap();
        let other = VariableTemplate::new(vec![TemplateRow::new("N", vec![], vec![])]);
        s.save.write_template(&s.root, &other).unwrap();
        s.save.write_trunk(&s.root, &TrunkRecord::new(Default::default())).unwrap();

        let engine = FakeEngine::scripted(vec![]);
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);
        let err = ensure_samples(&ctx, &s.root, &config(1)).unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::TemplateMismatch(_))));
    }

    #[test]
    fn harvest_saves_unique_structures_and_bumps_the_trunk() {
        let s = workflow_setup();
        let engine = FakeEngine::scripted(vec![
            fake_success_with(-76.00, &bent_water(104.5)),
            fake_success_with(-76.01, &bent_water(104.5000001)),
            fake_success_with(-75.98, &bent_water(95.0)),
            fake_failure(&[]),
        ]);
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);

        ensure_samples(&ctx, &s.root, &config(4)).unwrap();
        let summary = save_samples(&ctx, &s.root, &config(4)).unwrap();
        assert_eq!(summary.examined, 4);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.saved, 2);
        assert_eq!(s.save.read_trunk(&s.root).unwrap().nsamp, 2);

        // Saved leaves carry the full artifact set.
        let saved = s.save.list_samples(&s.root).unwrap();
        assert_eq!(saved.len(), 2);
        for id in saved {
            let sample = s.root.sample(id);
            assert!(s.save.read_leaf_record(&sample).is_ok());
            assert!(s.save.read_input(&sample).is_ok());
            assert!(s.save.read_output(&sample).is_ok());
            assert!(s.save.read_energy(&sample).is_ok());
            assert!(s.save.read_geometry(&sample).is_ok());
        }
    }

    #[test]
    fn harvesting_twice_saves_nothing_new() {
        let s = workflow_setup();
        let engine = FakeEngine::scripted(vec![
            fake_success_with(-76.00, &bent_water(104.5)),
            fake_success_with(-75.98, &bent_water(95.0)),
        ]);
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);

        ensure_samples(&ctx, &s.root, &config(2)).unwrap();
        let first = save_samples(&ctx, &s.root, &config(2)).unwrap();
        assert_eq!(first.saved, 2);
        let second = save_samples(&ctx, &s.root, &config(2)).unwrap();
        assert_eq!(second.completed, 2);
        assert_eq!(second.saved, 0);
        assert_eq!(s.save.read_trunk(&s.root).unwrap().nsamp, 2);
    }

    #[test]
    fn a_satisfied_space_requests_zero_additional_samples() {
        let s = workflow_setup();
        let engine = FakeEngine::scripted(vec![
            fake_success_with(-76.00, &bent_water(104.5)),
            fake_success_with(-76.01, &bent_water(104.5000001)),
            fake_success_with(-75.98, &bent_water(95.0)),
            fake_success_with(-75.95, &bent_water(85.0)),
        ]);
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);

        ensure_samples(&ctx, &s.root, &config(4)).unwrap();
        let summary = save_samples(&ctx, &s.root, &config(4)).unwrap();
        assert_eq!(summary.completed, 4);
        assert_eq!(summary.saved, 3);

        // Three saved plus one computed-but-duplicate account for all four.
        ensure_samples(&ctx, &s.root, &config(4)).unwrap();
        assert_eq!(engine.submitted_inputs().len(), 4);
    }

    #[test]
    fn harvesting_an_empty_space_is_a_no_op() {
        let s = workflow_setup();
        let engine = FakeEngine::scripted(vec![]);
        let toolkit = FakeToolkit::default();
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&s.run, &s.save, &engine, &toolkit, &reporter, &s.lease);
        let summary = save_samples(&ctx, &s.root, &config(2)).unwrap();
        assert_eq!(summary, SaveSummary { examined: 0, completed: 0, saved: 0 });
    }
}
