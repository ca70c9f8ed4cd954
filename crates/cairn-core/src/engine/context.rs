use crate::core::store::ArtifactStore;
use crate::engine::lease::LeaseConfig;
use crate::engine::progress::ProgressReporter;

// `run_store` is the scratch area where jobs execute, `save_store` the
// curated area harvested results move into. The two may point at the same
// directory.
pub struct RunContext<'a, E, T> {
    pub run_store: &'a ArtifactStore,
    pub save_store: &'a ArtifactStore,
    pub engine: &'a E,
    pub toolkit: &'a T,
    pub reporter: &'a ProgressReporter<'a>,
    pub lease: &'a LeaseConfig,
}

impl<'a, E, T> RunContext<'a, E, T> {
    pub fn new(
        run_store: &'a ArtifactStore,
        save_store: &'a ArtifactStore,
        engine: &'a E,
        toolkit: &'a T,
        reporter: &'a ProgressReporter<'a>,
        lease: &'a LeaseConfig,
    ) -> Self {
        Self { run_store, save_store, engine, toolkit, reporter, lease }
    }
}
