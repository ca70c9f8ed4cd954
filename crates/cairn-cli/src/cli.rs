use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "cairn - A command-line driver for cached electronic-structure campaigns: stochastic conformer sampling, coordinate scans, and follow-up jobs through an external launch script.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Raise console verbosity (repeat: -v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Limit the console to errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Append logs to this file as well as the console.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Populate the sample spaces of a job file and harvest unique results.
    Sample(SampleArgs),
    /// Scan the free coordinates of every saved sample and harvest the grids.
    Scan(ScanArgs),
    /// Run a follow-up job kind at every saved sample.
    Refine(RefineArgs),
}

/// Arguments shared by every campaign subcommand.
#[derive(Args, Debug)]
pub struct CampaignArgs {
    /// Path to the job file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub job_file: PathBuf,

    /// Restrict the run to one species identity from the job file.
    #[arg(long, value_name = "IDENTITY")]
    pub species: Option<String>,
}

/// Arguments for the `sample` subcommand.
#[derive(Args, Debug)]
pub struct SampleArgs {
    #[command(flatten)]
    pub campaign: CampaignArgs,

    /// Override the requested number of samples per species.
    #[arg(short, long, value_name = "INT")]
    pub nsamp: Option<usize>,

    /// Launch runs without harvesting afterwards.
    #[arg(long)]
    pub no_harvest: bool,
}

/// Arguments for the `scan` subcommand.
#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub campaign: CampaignArgs,

    /// Override the grid increment in degrees.
    #[arg(long, value_name = "DEGREES")]
    pub increment_degrees: Option<f64>,
}

/// Arguments for the `refine` subcommand.
#[derive(Args, Debug)]
pub struct RefineArgs {
    #[command(flatten)]
    pub campaign: CampaignArgs,

    /// The job kind to run at each saved structure.
    #[arg(short = 'k', long, value_name = "KIND", default_value = "energy")]
    pub job: JobKindArg,

    /// Skip saved structures whose energy lies above this value (hartree).
    #[arg(long, value_name = "FLOAT")]
    pub ceiling: Option<f64>,
}

/// The job kinds the `refine` subcommand accepts.
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum JobKindArg {
    Energy,
    Gradient,
    Hessian,
    Optimization,
}

impl From<JobKindArg> for cairn::core::models::key::JobKind {
    fn from(arg: JobKindArg) -> Self {
        match arg {
            JobKindArg::Energy => Self::Energy,
            JobKindArg::Gradient => Self::Gradient,
            JobKindArg::Hessian => Self::Hessian,
            JobKindArg::Optimization => Self::Optimization,
        }
    }
}
