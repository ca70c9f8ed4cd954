//! Defines the key hierarchy that addresses every record in an artifact store.
//!
//! Keys are plain data: equal keys denote the same logical record, and the
//! storage layer derives filesystem paths from them deterministically. Nothing
//! here touches the disk.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque molecular identity string, typically an InChI.
///
/// The store never interprets the contents beyond using it as a path segment;
/// two values are the same species exactly when the strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesId(String);

impl SpeciesId {
    /// Creates a new species identity from a raw identity string.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// Returns the raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpeciesId {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

/// Identifies one electronic/model-chemistry realization of a species.
///
/// This is the root of the key hierarchy: every sample, scan branch, grid
/// point, and run instance lives underneath exactly one root key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RootKey {
    /// The molecular identity of the species.
    pub species: SpeciesId,
    /// The total molecular charge.
    pub charge: i32,
    /// The spin multiplicity (2S + 1).
    pub multiplicity: u32,
    /// The electronic-structure method label (e.g. "b3lyp").
    pub method: String,
    /// The basis-set label (e.g. "6-31g*").
    pub basis: String,
    /// Whether the reference wavefunction is spin-restricted.
    pub restricted: bool,
}

impl RootKey {
    /// Addresses one stochastic sample under this root.
    pub fn sample(&self, id: SampleId) -> SampleKey {
        SampleKey { root: self.clone(), id }
    }
}

/// A short random identifier for one stochastic sample.
///
/// Identifiers are drawn freshly at generation time (see
/// [`crate::core::utils::ids`]) and never reused within a sample space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    /// Wraps a raw identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parses a directory name back into a sample identifier.
    ///
    /// Accepts the `s` prefix followed by at least one ASCII alphanumeric
    /// character, which is the shape the generator produces. Anything else
    /// (including the reserved trunk directory) is rejected.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        let rest = name.strip_prefix('s')?;
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(Self(name.to_string()))
        } else {
            None
        }
    }

    /// Returns the raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Addresses one sampled structure under a root key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleKey {
    /// The root this sample belongs to.
    pub root: RootKey,
    /// The sample identifier.
    pub id: SampleId,
}

impl SampleKey {
    /// Addresses the scan branch along one coordinate of this sample.
    pub fn branch(&self, coord: CoordName) -> BranchKey {
        BranchKey { sample: self.clone(), coord }
    }

    /// Addresses a run instance of the given job kind at this sample.
    pub fn run(&self, job: JobKind) -> RunKey {
        RunKey { leaf: RunLeaf::Sample(self.clone()), job }
    }
}

/// The symbolic name of one internal coordinate (e.g. `D4`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoordName(String);

impl CoordName {
    /// Creates a coordinate name from a raw string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CoordName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Addresses a one-dimensional scan along a named coordinate of a sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BranchKey {
    /// The sample the scan starts from.
    pub sample: SampleKey,
    /// The scanned coordinate.
    pub coord: CoordName,
}

impl BranchKey {
    /// Addresses one grid point along this branch.
    pub fn grid(&self, index: usize) -> GridKey {
        GridKey { branch: self.clone(), index }
    }
}

/// Addresses one point on a scan grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridKey {
    /// The branch this point lies on.
    pub branch: BranchKey,
    /// The zero-based position along the grid.
    pub index: usize,
}

impl GridKey {
    /// Addresses a run instance of the given job kind at this grid point.
    pub fn run(&self, job: JobKind) -> RunKey {
        RunKey { leaf: RunLeaf::Grid(self.clone()), job }
    }
}

/// The kind of electronic-structure job a run instance performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// A single-point energy evaluation.
    Energy,
    /// A nuclear gradient evaluation.
    Gradient,
    /// A second-derivative (Hessian) evaluation.
    Hessian,
    /// A geometry optimization.
    Optimization,
}

impl JobKind {
    /// Returns the directory name used for run instances of this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            JobKind::Energy => "energy",
            JobKind::Gradient => "gradient",
            JobKind::Hessian => "hessian",
            JobKind::Optimization => "optimization",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// The leaf record a run instance is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunLeaf {
    /// A run attached to a sampled structure.
    Sample(SampleKey),
    /// A run attached to a scan grid point.
    Grid(GridKey),
}

/// Addresses one run instance: a job kind executed at a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    /// The leaf the run belongs to.
    pub leaf: RunLeaf,
    /// The kind of job being run.
    pub job: JobKind,
}
