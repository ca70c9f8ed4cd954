//! Defines the metadata records persisted alongside computed artifacts.
//!
//! Records are small TOML-serializable structs. Run records carry the status
//! lifecycle the supervisor keys its skip/retry decisions off; trunk and
//! branch records carry the bookkeeping for sample spaces and scan grids.

use super::key::{CoordName, JobKind};
use crate::core::models::geometry::Linspace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// The lifecycle state of one run instance.
///
/// A record is written with [`RunStatus::Running`] before the external
/// program is launched and flipped to a terminal state afterwards, so a
/// non-terminal status on disk means the job is (or was) in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run has been registered but not launched.
    Pending,
    /// The run has been launched and has not finished.
    Running,
    /// The run finished and the program reported a normal exit.
    Success,
    /// The run finished without a normal exit.
    Failure,
}

impl RunStatus {
    /// Reports whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failure)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        };
        f.write_str(name)
    }
}

/// The metadata record of one run instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// The job kind this run performs.
    pub job: JobKind,
    /// The external program that executed the job.
    pub program: String,
    /// The electronic-structure method label.
    pub method: String,
    /// The basis-set label.
    pub basis: String,
    /// The lifecycle state.
    pub status: RunStatus,
    /// Seconds since the Unix epoch when the run started.
    pub utc_start_time: u64,
    /// Seconds since the Unix epoch when the run reached a terminal state.
    pub utc_end_time: Option<u64>,
}

impl RunRecord {
    /// Creates a record for a run that is about to launch.
    pub fn begin(job: JobKind, program: &str, method: &str, basis: &str) -> Self {
        Self {
            job,
            program: program.to_string(),
            method: method.to_string(),
            basis: basis.to_string(),
            status: RunStatus::Running,
            utc_start_time: epoch_seconds(),
            utc_end_time: None,
        }
    }

    /// Moves the record to a terminal state, stamping the end time.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.utc_end_time = Some(epoch_seconds());
    }
}

/// The bookkeeping record at the trunk of a sample space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrunkRecord {
    /// The number of unique samples saved so far.
    pub nsamp: usize,
    /// The sampling range used for each free coordinate.
    pub ranges: BTreeMap<CoordName, (f64, f64)>,
}

impl TrunkRecord {
    /// Creates an empty trunk record with the given sampling ranges.
    pub fn new(ranges: BTreeMap<CoordName, (f64, f64)>) -> Self {
        Self { nsamp: 0, ranges }
    }
}

/// The bookkeeping record of one scan branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// The grid scanned along each coordinate of this branch.
    pub grid: BTreeMap<CoordName, Linspace>,
}

/// Returns the current time as whole seconds since the Unix epoch.
pub fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
