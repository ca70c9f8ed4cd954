use super::Workbench;
use crate::cli::ScanArgs;
use crate::error::{CliError, Result};
use cairn::engine::config::ScanConfig;
use cairn::engine::error::EngineError;
use cairn::workflows::sample::SaveSummary;
use cairn::workflows::scan;
use tracing::{info, instrument};

#[instrument(skip_all, name = "scan_command")]
pub fn run(args: ScanArgs) -> Result<()> {
    let bench = Workbench::new(&args.campaign.job_file)?;
    let species = bench.config.selected_species(args.campaign.species.as_deref())?;

    let mut config = ScanConfig { retry: bench.config.retry.clone(), ..ScanConfig::default() };
    if let Some(increment) =
        increment_radians(args.increment_degrees.or(bench.config.increment_degrees))?
    {
        config.increment = increment;
    }

    let ctx = bench.context();
    for entry in species {
        let root = bench.config.root_for(entry);
        let ids = ctx.save_store.list_samples(&root).map_err(EngineError::from)?;
        info!(species = %root.species, samples = ids.len(), "Scanning saved samples.");
        println!("Scanning {} saved samples of {}...", ids.len(), entry.identity);
        let mut totals = SaveSummary { examined: 0, completed: 0, saved: 0 };
        for id in ids {
            let sample = root.sample(id);
            scan::run_scan(&ctx, &sample, &config)?;
            let summary = scan::save_scan(&ctx, &sample)?;
            totals.examined += summary.examined;
            totals.completed += summary.completed;
            totals.saved += summary.saved;
        }
        println!(
            "✓ {}: {} grid points examined, {} completed, {} saved",
            entry.identity, totals.examined, totals.completed, totals.saved
        );
    }
    Ok(())
}

// Grid sizes are derived by dividing a full turn by the increment, so a
// zero, negative, or non-finite increment must be rejected before it
// reaches the toolkit.
fn increment_radians(degrees: Option<f64>) -> Result<Option<f64>> {
    match degrees {
        None => Ok(None),
        Some(d) if d.is_finite() && d > 0.0 => Ok(Some(d.to_radians())),
        Some(d) => Err(CliError::Argument(format!(
            "the scan increment must be a positive number of degrees, got {}",
            d
        ))),
    }
}
