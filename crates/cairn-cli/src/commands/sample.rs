use super::Workbench;
use crate::cli::SampleArgs;
use crate::error::{CliError, Result};
use cairn::engine::config::SamplingConfigBuilder;
use cairn::workflows::sample;
use tracing::{info, instrument};

#[instrument(skip_all, name = "sample_command")]
pub fn run(args: SampleArgs) -> Result<()> {
    let bench = Workbench::new(&args.campaign.job_file)?;
    let species = bench.config.selected_species(args.campaign.species.as_deref())?;

    let nsamp = args.nsamp.or(bench.config.nsamp).ok_or_else(|| {
        CliError::Config(
            "no sample count: set [sampling] nsamp in the job file or pass --nsamp".to_string(),
        )
    })?;
    let mut builder = SamplingConfigBuilder::new().nsamp(nsamp).retry(bench.config.retry.clone());
    if let Some(rtol) = bench.config.dedup_rtol {
        builder = builder.dedup_rtol(rtol);
    }
    let config = builder.build().map_err(|e| CliError::Config(e.to_string()))?;

    let ctx = bench.context();
    for entry in species {
        let root = bench.config.root_for(entry);
        info!(species = %root.species, nsamp, "Sampling a conformer space.");
        println!("Sampling {} ({} requested)...", entry.identity, nsamp);
        sample::ensure_samples(&ctx, &root, &config)?;
        if args.no_harvest {
            continue;
        }
        let summary = sample::save_samples(&ctx, &root, &config)?;
        println!(
            "✓ {}: {} runs examined, {} completed, {} unique saved",
            entry.identity, summary.examined, summary.completed, summary.saved
        );
    }
    Ok(())
}
