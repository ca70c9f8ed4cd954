//! Implements the run supervisor: launch-or-skip decisions for run
//! instances.
//!
//! The supervisor makes re-invocation cheap. A run that already succeeded is
//! skipped, a failed run is cleared and retried, and a run someone else is
//! executing right now is left alone, so driving the same work list twice
//! costs nothing but directory probes.

use crate::core::models::key::{JobKind, RunKey};
use crate::core::models::record::{RunRecord, RunStatus};
use crate::core::store::{ArtifactStore, StoreError};
use crate::engine::compute::{ComputationEngine, JobSpec};
use crate::engine::config::RetryPolicy;
use crate::engine::error::EngineError;
use crate::engine::feedback::robust_feedback;
use crate::engine::lease::{self, LeaseConfig, LeaseDecision};
use crate::engine::retry::{Verdict, robust_run};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    AlreadySucceeded,
    // Recorded as in flight and the lease is live.
    InFlight,
    // Another process holds the directory's lease.
    LeaseHeld { owner: String },
}

#[derive(Debug)]
pub enum LaunchOutcome {
    Skipped(SkipReason),
    Completed { status: RunStatus, verdict: Verdict, attempts: usize },
}

/// Launches a job at a run key, unless the stored state says not to.
///
/// The decision sequence:
///
/// 1. A recorded `success` skips; a recorded `failure` is removed and
///    retried. An in-flight record with a live lease skips; without one the
///    run is presumed crashed, removed, and retried.
/// 2. The directory lease is acquired; losing it to another process skips.
/// 3. A record with `running` status is written, the job executes
///    (optimizations through the feedback loop, everything else through the
///    retry engine), and the record is flipped to its terminal status.
///
/// The final attempt's input is always persisted at the run key; its output
/// only on success. Attempt directories are left behind either way.
#[instrument(skip_all, name = "launch_run", fields(job = %key.job))]
pub fn launch<E: ComputationEngine>(
    store: &ArtifactStore,
    key: &RunKey,
    engine: &E,
    job: &JobSpec<'_>,
    policy: &RetryPolicy,
    lease_config: &LeaseConfig,
) -> Result<LaunchOutcome, EngineError> {
    if key.job != job.kind {
        return Err(EngineError::Internal(format!(
            "job kind mismatch: run key says {}, job spec says {}",
            key.job, job.kind
        )));
    }

    let run_dir = store.path_of(key);
    if store.run_exists(key) {
        match store.read_run_record(key) {
            Ok(record) => match record.status {
                RunStatus::Success => {
                    info!(dir = %run_dir.display(), "found a completed run; skipping");
                    return Ok(LaunchOutcome::Skipped(SkipReason::AlreadySucceeded));
                }
                RunStatus::Failure => {
                    info!(dir = %run_dir.display(), "found a failed run; removing and retrying");
                    store.remove(key)?;
                }
                RunStatus::Running | RunStatus::Pending => {
                    if lease::is_live(&run_dir) {
                        info!(dir = %run_dir.display(), "found a run in flight; skipping");
                        return Ok(LaunchOutcome::Skipped(SkipReason::InFlight));
                    }
                    warn!(
                        dir = %run_dir.display(),
                        "found an in-flight record with no live lease; removing and retrying"
                    );
                    store.remove(key)?;
                }
            },
            Err(StoreError::NotFound { .. }) => {
                if lease::is_live(&run_dir) {
                    let owner =
                        lease::holder(&run_dir).unwrap_or_else(|| "unknown".to_string());
                    info!(
                        dir = %run_dir.display(),
                        owner = %owner,
                        "run directory is leased but has no record yet; skipping"
                    );
                    return Ok(LaunchOutcome::Skipped(SkipReason::LeaseHeld { owner }));
                }
                warn!(
                    dir = %run_dir.display(),
                    "found a run directory without a record; removing and retrying"
                );
                store.remove(key)?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    store.create(key)?;
    let held = match lease::acquire(&run_dir, lease_config)? {
        LeaseDecision::Acquired(held) => held,
        LeaseDecision::Busy { owner } => {
            info!(dir = %run_dir.display(), owner = %owner, "lost the lease race; skipping");
            return Ok(LaunchOutcome::Skipped(SkipReason::LeaseHeld { owner }));
        }
    };

    let mut record = RunRecord::begin(key.job, engine.program(), job.method, job.basis);
    store.write_run_record(key, &record)?;

    info!(dir = %run_dir.display(), "starting the run");
    let outcome = match key.job {
        JobKind::Optimization => {
            robust_feedback(engine, &run_dir, job, &policy.matrix, policy.feedback_tries)?
        }
        _ => robust_run(engine, &run_dir, job, &policy.matrix)?,
    };

    let status = if engine.has_normal_exit(&outcome.texts.output) {
        RunStatus::Success
    } else {
        RunStatus::Failure
    };
    store.write_run_input(key, &outcome.texts.input)?;
    if status == RunStatus::Success {
        store.write_run_output(key, &outcome.texts.output)?;
        info!("run succeeded");
    } else {
        warn!("run failed");
    }
    record.finish(status);
    store.write_run_record(key, &record)?;
    held.release()?;

    Ok(LaunchOutcome::Completed { status, verdict: outcome.verdict, attempts: outcome.attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::key::SampleId;
    use crate::test_support::{
        FakeEngine, StoreSetup, fake_failure, fake_noconv, fake_success, store_setup,
        water_structure, water_zmatrix,
    };

    fn opt_key(s: &StoreSetup) -> RunKey {
        s.root.sample(SampleId::new("sab12cd34ef")).run(JobKind::Optimization)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy { matrix: Default::default(), feedback_tries: 3 }
    }

    #[test]
    fn a_fresh_run_executes_and_records_success() {
        let s = store_setup();
        let key = opt_key(&s);
        let engine = FakeEngine::scripted(vec![fake_success(-76.02)]);
        let structure = water_structure();
        let job = engine.job_for(&structure);

        let outcome =
            launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        let LaunchOutcome::Completed { status, attempts, .. } = outcome else {
            panic!("expected the run to complete");
        };
        assert_eq!(status, RunStatus::Success);
        assert_eq!(attempts, 1);

        let record = s.store.read_run_record(&key).unwrap();
        assert_eq!(record.status, RunStatus::Success);
        assert_eq!(record.program, "fakeqc");
        assert!(record.utc_end_time.is_some());
        assert!(s.store.read_run_output(&key).is_ok());
        assert!(s.store.read_run_input(&key).is_ok());
        assert!(s.store.path_of(&key).join("try0").is_dir());
        assert!(!lease::is_live(&s.store.path_of(&key)));
    }

    #[test]
    fn a_run_without_normal_exit_records_failure_and_keeps_no_output() {
        let s = store_setup();
        let key = opt_key(&s);
        let engine = FakeEngine::scripted(vec![fake_failure(&[])]);
        let structure = water_structure();
        let job = engine.job_for(&structure);

        let outcome =
            launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        assert!(matches!(
            outcome,
            LaunchOutcome::Completed { status: RunStatus::Failure, .. }
        ));
        assert_eq!(s.store.read_run_record(&key).unwrap().status, RunStatus::Failure);
        assert!(matches!(
            s.store.read_run_output(&key),
            Err(StoreError::NotFound { .. })
        ));
        assert!(s.store.read_run_input(&key).is_ok());
    }

    #[test]
    fn a_completed_run_is_skipped_on_reinvocation() {
        let s = store_setup();
        let key = opt_key(&s);
        let engine = FakeEngine::scripted(vec![fake_success(-76.02)]);
        let structure = water_structure();
        let job = engine.job_for(&structure);

        launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        let second = launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        assert!(matches!(
            second,
            LaunchOutcome::Skipped(SkipReason::AlreadySucceeded)
        ));
        // No further submission happened.
        assert_eq!(engine.submitted_inputs().len(), 1);
    }

    #[test]
    fn a_failed_run_is_cleared_and_retried() {
        let s = store_setup();
        let key = opt_key(&s);
        let engine = FakeEngine::scripted(vec![fake_failure(&[]), fake_success(-76.02)]);
        let structure = water_structure();
        let job = engine.job_for(&structure);

        launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        let second = launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        assert!(matches!(
            second,
            LaunchOutcome::Completed { status: RunStatus::Success, .. }
        ));
        assert_eq!(s.store.read_run_record(&key).unwrap().status, RunStatus::Success);
        assert_eq!(engine.submitted_inputs().len(), 2);
    }

    #[test]
    fn an_in_flight_run_with_a_live_lease_is_skipped() {
        let s = store_setup();
        let key = opt_key(&s);
        s.store.create(&key).unwrap();
        let record = RunRecord::begin(JobKind::Optimization, "other", "b3lyp", "6-31g*");
        s.store.write_run_record(&key, &record).unwrap();
        let LeaseDecision::Acquired(_held) =
            lease::acquire(&s.store.path_of(&key), &s.lease).unwrap()
        else {
            panic!("expected to acquire the lease");
        };

        let engine = FakeEngine::scripted(vec![]);
        let structure = water_structure();
        let job = engine.job_for(&structure);
        let outcome = launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        assert!(matches!(outcome, LaunchOutcome::Skipped(SkipReason::InFlight)));
        assert!(engine.submitted_inputs().is_empty());
    }

    #[test]
    fn a_stale_in_flight_record_without_a_lease_is_retried() {
        let s = store_setup();
        let key = opt_key(&s);
        s.store.create(&key).unwrap();
        let record = RunRecord::begin(JobKind::Optimization, "other", "b3lyp", "6-31g*");
        s.store.write_run_record(&key, &record).unwrap();

        let engine = FakeEngine::scripted(vec![fake_success(-76.02)]);
        let structure = water_structure();
        let job = engine.job_for(&structure);
        let outcome = launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        assert!(matches!(
            outcome,
            LaunchOutcome::Completed { status: RunStatus::Success, .. }
        ));
    }

    #[test]
    fn a_leased_directory_without_a_record_is_left_alone() {
        let s = store_setup();
        let key = opt_key(&s);
        s.store.create(&key).unwrap();
        let foreign = LeaseConfig { ttl_seconds: 600, owner: "other-host".to_string() };
        let LeaseDecision::Acquired(_held) =
            lease::acquire(&s.store.path_of(&key), &foreign).unwrap()
        else {
            panic!("expected to acquire the lease");
        };

        let engine = FakeEngine::scripted(vec![]);
        let structure = water_structure();
        let job = engine.job_for(&structure);
        let outcome = launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        let LaunchOutcome::Skipped(SkipReason::LeaseHeld { owner }) = outcome else {
            panic!("expected a lease-held skip");
        };
        assert_eq!(owner, "other-host");
    }

    #[test]
    fn optimizations_run_through_the_feedback_loop() {
        let s = store_setup();
        let key = opt_key(&s);
        let stuck = water_zmatrix();
        let engine = FakeEngine::scripted(vec![fake_noconv(&stuck), fake_success(-76.02)]);
        let structure = water_structure();
        let job = engine.job_for(&structure);

        let outcome =
            launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap();
        let LaunchOutcome::Completed { status, attempts, verdict } = outcome else {
            panic!("expected the run to complete");
        };
        assert_eq!(status, RunStatus::Success);
        assert_eq!(attempts, 2);
        assert!(verdict.is_clean());
        // Matrix attempts nest inside feedback tries.
        assert!(s.store.path_of(&key).join("try0").join("try0").is_dir());
        assert!(s.store.path_of(&key).join("try1").join("try0").is_dir());
    }

    #[test]
    fn a_mismatched_job_kind_is_an_internal_error() {
        let s = store_setup();
        let key = s.root.sample(SampleId::new("sab12cd34ef")).run(JobKind::Hessian);
        let engine = FakeEngine::scripted(vec![]);
        let structure = water_structure();
        let job = engine.job_for(&structure);
        let err = launch(&s.store, &key, &engine, &job, &policy(), &s.lease).unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
    }
}
