use super::Workbench;
use crate::cli::RefineArgs;
use crate::error::Result;
use cairn::core::models::key::JobKind;
use cairn::engine::config::RefineConfig;
use cairn::workflows::refine;
use tracing::{info, instrument};

#[instrument(skip_all, name = "refine_command")]
pub fn run(args: RefineArgs) -> Result<()> {
    let bench = Workbench::new(&args.campaign.job_file)?;
    let species = bench.config.selected_species(args.campaign.species.as_deref())?;

    let job = JobKind::from(args.job);
    let config = RefineConfig {
        energy_ceiling: args.ceiling.or(bench.config.energy_ceiling),
        retry: bench.config.retry.clone(),
        ..RefineConfig::default()
    };

    let ctx = bench.context();
    for entry in species {
        let root = bench.config.root_for(entry);
        info!(species = %root.species, %job, "Launching follow-up jobs.");
        println!("Running {} jobs at the saved samples of {}...", job, entry.identity);
        let summary = refine::run_at_saved(&ctx, &root, job, &config)?;
        println!(
            "✓ {}: {} visited, {} launched, {} above the energy ceiling",
            entry.identity, summary.visited, summary.launched, summary.skipped_high_energy
        );
    }
    Ok(())
}
