pub mod refine;
pub mod sample;
pub mod scan;

use crate::config::CampaignConfig;
use crate::engine::ScriptEngine;
use crate::error::Result;
use crate::toolkit::XyzLibraryToolkit;
use crate::utils::progress::TerminalProgress;
use cairn::core::store::ArtifactStore;
use cairn::engine::context::RunContext;
use cairn::engine::progress::ProgressReporter;
use std::path::Path;

/// The collaborators every subcommand assembles from a job file.
pub struct Workbench {
    pub config: CampaignConfig,
    run_store: ArtifactStore,
    save_store: ArtifactStore,
    engine: ScriptEngine,
    toolkit: XyzLibraryToolkit,
    reporter: ProgressReporter<'static>,
}

impl Workbench {
    pub fn new(job_file: &Path) -> Result<Self> {
        let config = CampaignConfig::load(job_file)?;
        let run_store = ArtifactStore::new(&config.run_root);
        let save_store = ArtifactStore::new(&config.save_root);
        let engine = ScriptEngine::new(
            config.script.clone(),
            config.program.clone(),
            config.markers.clone(),
        );
        let toolkit = XyzLibraryToolkit::new(config.geometry_dir.clone());
        let display = TerminalProgress::new();
        let reporter = ProgressReporter::with_callback(display.callback());
        Ok(Self { config, run_store, save_store, engine, toolkit, reporter })
    }

    pub fn context(&self) -> RunContext<'_, ScriptEngine, XyzLibraryToolkit> {
        RunContext::new(
            &self.run_store,
            &self.save_store,
            &self.engine,
            &self.toolkit,
            &self.reporter,
            &self.config.lease,
        )
    }
}
