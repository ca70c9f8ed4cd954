//! Defines the seam between the supervisor and external computation programs.

use crate::core::models::geometry::{Geometry, Structure, ZMatrix};
use crate::core::models::key::{CoordName, JobKind, RootKey};
use crate::engine::options::JobOptions;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("failed to launch the external program: {detail}")]
    Launch { detail: String },
    #[error("I/O failure during job execution: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing {what} in program output")]
    MissingOutput { what: &'static str },
    #[error("malformed {what} in program output: {detail}")]
    MalformedOutput { what: &'static str, detail: String },
}

/// The failure categories the retry machinery can react to; anything else a
/// program reports is either a normal exit or an unclassified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ScfNoConv,
    OptNoConv,
    IrcNoConv,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ScfNoConv => "scf_noconv",
            ErrorKind::OptNoConv => "opt_noconv",
            ErrorKind::IrcNoConv => "irc_noconv",
        };
        f.write_str(name)
    }
}

/// The raw text artifacts of one job execution.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTexts {
    pub input: String,
    pub output: String,
}

/// Everything an engine needs to execute one job.
#[derive(Debug, Clone)]
pub struct JobSpec<'a> {
    pub kind: JobKind,
    pub structure: &'a Structure,
    pub charge: i32,
    pub multiplicity: u32,
    pub method: &'a str,
    pub basis: &'a str,
    pub restricted: bool,
    pub options: JobOptions,
    // Coordinates held fixed during optimization.
    pub frozen: &'a [CoordName],
}

impl<'a> JobSpec<'a> {
    /// A job for the model chemistry of a root key, with default options and
    /// nothing frozen.
    pub fn for_root(kind: JobKind, structure: &'a Structure, root: &'a RootKey) -> Self {
        Self {
            kind,
            structure,
            charge: root.charge,
            multiplicity: root.multiplicity,
            method: &root.method,
            basis: &root.basis,
            restricted: root.restricted,
            options: JobOptions::default(),
            frozen: &[],
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_frozen(mut self, frozen: &'a [CoordName]) -> Self {
        self.frozen = frozen;
        self
    }

    /// The same job with a different starting structure.
    pub fn with_structure<'b>(&self, structure: &'b Structure) -> JobSpec<'b>
    where
        'a: 'b,
    {
        JobSpec {
            kind: self.kind,
            structure,
            charge: self.charge,
            multiplicity: self.multiplicity,
            method: self.method,
            basis: self.basis,
            restricted: self.restricted,
            options: self.options.clone(),
            frozen: self.frozen,
        }
    }
}

/// Executes jobs through an external electronic-structure program and reads
/// values back out of its output text.
///
/// The supervisor never interprets program text itself; everything it needs
/// (exit condition, failure categories, energies, structures) goes through
/// this trait, so supporting another program means implementing it once.
pub trait ComputationEngine {
    /// Returns the name of the external program, for bookkeeping records.
    fn program(&self) -> &str;

    /// Renders the input, executes the job inside `workdir`, and returns the
    /// input/output text pair.
    ///
    /// A non-zero program exit is not an error at this level; whatever output
    /// text exists is returned and classified by the caller.
    fn submit(&self, workdir: &Path, job: &JobSpec<'_>) -> Result<JobTexts, ComputeError>;

    /// Reports whether the output text carries the program's normal-exit
    /// marker.
    fn has_normal_exit(&self, output: &str) -> bool;

    /// Reports whether the output text shows the given failure category.
    fn has_error(&self, output: &str, kind: ErrorKind) -> bool;

    /// Reads the final electronic energy from the output text.
    fn read_energy(&self, output: &str) -> Result<f64, ComputeError>;

    /// Reads the final Cartesian geometry from the output text.
    fn read_geometry(&self, output: &str) -> Result<Geometry, ComputeError>;

    /// Reads the final internal-coordinate structure from the output text.
    fn read_internal(&self, output: &str) -> Result<ZMatrix, ComputeError>;
}
