//! Implements the on-disk artifact store.
//!
//! An [`ArtifactStore`] is a view over one root directory. Deployments
//! conventionally use two stores side by side: a scratch area where runs
//! execute and a curated area where harvested results are saved. The store
//! itself is area-agnostic; both are plain [`ArtifactStore`] values.
//!
//! All structured records are TOML files; geometry and raw program text are
//! stored in their natural plain-text forms. Reads of missing artifacts
//! report [`StoreError::NotFound`] so that callers can distinguish "not yet
//! computed" from real I/O failures.

pub mod layout;

use crate::core::models::geometry::{Geometry, VariableTemplate};
use crate::core::models::key::{BranchKey, CoordName, RootKey, RunKey, SampleId, SampleKey};
use crate::core::models::record::{BranchRecord, RunRecord, TrunkRecord};
use layout::{LeafLocator, Locator};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Represents errors that can occur while accessing an artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested artifact does not exist.
    #[error("{what} not found at '{path}'")]
    NotFound {
        /// What kind of artifact was requested.
        what: &'static str,
        /// The path that was probed.
        path: PathBuf,
    },
    /// A directory was requested at a path occupied by a non-directory.
    #[error("path exists but is not a directory: '{0}'")]
    AlreadyExists(PathBuf),
    /// A template write conflicts with the template already stored.
    #[error("coordinate template mismatch at '{0}': the stored template differs from the one being written")]
    TemplateMismatch(PathBuf),
    /// An artifact exists but could not be decoded.
    #[error("malformed {what} at '{path}': {detail}")]
    Malformed {
        /// What kind of artifact was being decoded.
        what: &'static str,
        /// The path of the offending file.
        path: PathBuf,
        /// A description of the decoding failure.
        detail: String,
    },
    /// An underlying filesystem operation failed.
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// The path the operation was applied to.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
}

/// A content-addressed store of computation artifacts rooted at a directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates a store view over the given root directory.
    ///
    /// The directory does not need to exist yet; it is created lazily when
    /// the first record is written.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the absolute directory path for a key.
    pub fn path_of(&self, loc: &impl Locator) -> PathBuf {
        self.root.join(loc.rel_path())
    }

    /// Reports whether the directory for a key exists.
    pub fn exists(&self, loc: &impl Locator) -> bool {
        self.path_of(loc).is_dir()
    }

    /// Creates the directory for a key, including missing parents.
    ///
    /// Creating an existing directory is a no-op, so repeated invocations
    /// are safe.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the path is occupied by a
    /// non-directory.
    pub fn create(&self, loc: &impl Locator) -> Result<(), StoreError> {
        create_dir(&self.path_of(loc))
    }

    /// Removes the directory for a key and everything underneath it.
    ///
    /// Removing an absent directory is a no-op.
    pub fn remove(&self, loc: &impl Locator) -> Result<(), StoreError> {
        let path = self.path_of(loc);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io { path, source: e }),
        }
    }

    // Trunk of a sample space.

    /// Reports whether the trunk of a sample space exists.
    pub fn trunk_exists(&self, root: &RootKey) -> bool {
        self.root.join(layout::trunk_dir(root)).is_dir()
    }

    /// Creates the trunk directory of a sample space.
    pub fn create_trunk(&self, root: &RootKey) -> Result<(), StoreError> {
        create_dir(&self.root.join(layout::trunk_dir(root)))
    }

    /// Reads the trunk bookkeeping record.
    pub fn read_trunk(&self, root: &RootKey) -> Result<TrunkRecord, StoreError> {
        read_toml(&self.root.join(layout::trunk_dir(root)).join(layout::INFO_FILE), "trunk record")
    }

    /// Writes the trunk bookkeeping record.
    pub fn write_trunk(&self, root: &RootKey, record: &TrunkRecord) -> Result<(), StoreError> {
        write_toml(&self.root.join(layout::trunk_dir(root)).join(layout::INFO_FILE), record)
    }

    /// Reads the coordinate template of a sample space.
    pub fn read_template(&self, root: &RootKey) -> Result<VariableTemplate, StoreError> {
        read_toml(
            &self.root.join(layout::trunk_dir(root)).join(layout::TEMPLATE_FILE),
            "coordinate template",
        )
    }

    /// Writes the coordinate template of a sample space.
    ///
    /// The first write records the template; every later write is compared
    /// against the stored one and must be identical. This is what guarantees
    /// that all samples in one space share a single coordinate definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TemplateMismatch`] if a different template is
    /// already stored.
    pub fn write_template(
        &self,
        root: &RootKey,
        template: &VariableTemplate,
    ) -> Result<(), StoreError> {
        let path = self.root.join(layout::trunk_dir(root)).join(layout::TEMPLATE_FILE);
        write_template_checked(&path, template)
    }

    // Scan trunk of one sample.

    /// Creates the scan trunk directory of a sample.
    pub fn create_scan_trunk(&self, sample: &SampleKey) -> Result<(), StoreError> {
        create_dir(&self.root.join(layout::scan_trunk_dir(sample)))
    }

    /// Reads the coordinate template governing a sample's scans.
    pub fn read_scan_template(&self, sample: &SampleKey) -> Result<VariableTemplate, StoreError> {
        read_toml(
            &self.root.join(layout::scan_trunk_dir(sample)).join(layout::TEMPLATE_FILE),
            "scan template",
        )
    }

    /// Writes the coordinate template governing a sample's scans, with the
    /// same compare-on-write rule as [`ArtifactStore::write_template`].
    pub fn write_scan_template(
        &self,
        sample: &SampleKey,
        template: &VariableTemplate,
    ) -> Result<(), StoreError> {
        let path = self.root.join(layout::scan_trunk_dir(sample)).join(layout::TEMPLATE_FILE);
        write_template_checked(&path, template)
    }

    // Scan branches.

    /// Reads the bookkeeping record of a scan branch.
    pub fn read_branch(&self, branch: &BranchKey) -> Result<BranchRecord, StoreError> {
        read_toml(&self.path_of(branch).join(layout::INFO_FILE), "branch record")
    }

    /// Writes the bookkeeping record of a scan branch.
    pub fn write_branch(&self, branch: &BranchKey, record: &BranchRecord) -> Result<(), StoreError> {
        write_toml(&self.path_of(branch).join(layout::INFO_FILE), record)
    }

    // Leaf artifacts (samples and grid points).

    /// Reads the metadata record of a leaf.
    pub fn read_leaf_record(&self, leaf: &impl LeafLocator) -> Result<RunRecord, StoreError> {
        read_toml(&self.path_of(leaf).join(layout::INFO_FILE), "leaf record")
    }

    /// Writes the metadata record of a leaf.
    pub fn write_leaf_record(
        &self,
        leaf: &impl LeafLocator,
        record: &RunRecord,
    ) -> Result<(), StoreError> {
        write_toml(&self.path_of(leaf).join(layout::INFO_FILE), record)
    }

    /// Reads the input text of a leaf.
    pub fn read_input(&self, leaf: &impl LeafLocator) -> Result<String, StoreError> {
        read_text(&self.path_of(leaf).join(layout::INPUT_FILE), "input text")
    }

    /// Writes the input text of a leaf.
    pub fn write_input(&self, leaf: &impl LeafLocator, text: &str) -> Result<(), StoreError> {
        write_text(&self.path_of(leaf).join(layout::INPUT_FILE), text)
    }

    /// Reads the output text of a leaf.
    pub fn read_output(&self, leaf: &impl LeafLocator) -> Result<String, StoreError> {
        read_text(&self.path_of(leaf).join(layout::OUTPUT_FILE), "output text")
    }

    /// Writes the output text of a leaf.
    pub fn write_output(&self, leaf: &impl LeafLocator, text: &str) -> Result<(), StoreError> {
        write_text(&self.path_of(leaf).join(layout::OUTPUT_FILE), text)
    }

    /// Reads the Cartesian geometry of a leaf.
    pub fn read_geometry(&self, leaf: &impl LeafLocator) -> Result<Geometry, StoreError> {
        let path = self.path_of(leaf).join(layout::GEOMETRY_FILE);
        let text = read_text(&path, "geometry")?;
        Geometry::from_xyz(&text).map_err(|e| StoreError::Malformed {
            what: "geometry",
            path,
            detail: e.to_string(),
        })
    }

    /// Writes the Cartesian geometry of a leaf.
    pub fn write_geometry(
        &self,
        leaf: &impl LeafLocator,
        geometry: &Geometry,
    ) -> Result<(), StoreError> {
        write_text(&self.path_of(leaf).join(layout::GEOMETRY_FILE), &geometry.to_xyz())
    }

    /// Reads the electronic energy of a leaf, in Hartree.
    pub fn read_energy(&self, leaf: &impl LeafLocator) -> Result<f64, StoreError> {
        let path = self.path_of(leaf).join(layout::ENERGY_FILE);
        let text = read_text(&path, "energy")?;
        text.trim().parse().map_err(|_| StoreError::Malformed {
            what: "energy",
            path,
            detail: format!("unparsable float '{}'", text.trim()),
        })
    }

    /// Writes the electronic energy of a leaf, in Hartree.
    pub fn write_energy(&self, leaf: &impl LeafLocator, energy: f64) -> Result<(), StoreError> {
        write_text(&self.path_of(leaf).join(layout::ENERGY_FILE), &format!("{:.12e}\n", energy))
    }

    // Run instances.

    /// Reports whether the directory of a run instance exists.
    pub fn run_exists(&self, run: &RunKey) -> bool {
        self.exists(run)
    }

    /// Reads the metadata record of a run instance.
    pub fn read_run_record(&self, run: &RunKey) -> Result<RunRecord, StoreError> {
        read_toml(&self.path_of(run).join(layout::INFO_FILE), "run record")
    }

    /// Writes the metadata record of a run instance.
    pub fn write_run_record(&self, run: &RunKey, record: &RunRecord) -> Result<(), StoreError> {
        write_toml(&self.path_of(run).join(layout::INFO_FILE), record)
    }

    /// Reads the input text of a run instance.
    pub fn read_run_input(&self, run: &RunKey) -> Result<String, StoreError> {
        read_text(&self.path_of(run).join(layout::INPUT_FILE), "run input")
    }

    /// Writes the input text of a run instance.
    pub fn write_run_input(&self, run: &RunKey, text: &str) -> Result<(), StoreError> {
        write_text(&self.path_of(run).join(layout::INPUT_FILE), text)
    }

    /// Reads the output text of a run instance.
    ///
    /// Output is only persisted for runs that ended in success, so a
    /// [`StoreError::NotFound`] here is the normal signal for "nothing to
    /// harvest".
    pub fn read_run_output(&self, run: &RunKey) -> Result<String, StoreError> {
        read_text(&self.path_of(run).join(layout::OUTPUT_FILE), "run output")
    }

    /// Writes the output text of a run instance.
    pub fn write_run_output(&self, run: &RunKey, text: &str) -> Result<(), StoreError> {
        write_text(&self.path_of(run).join(layout::OUTPUT_FILE), text)
    }

    // Listings. All listings are sorted so traversal order is deterministic.

    /// Lists the samples present under a root key, in identifier order.
    ///
    /// An absent sample space yields an empty list.
    pub fn list_samples(&self, root: &RootKey) -> Result<Vec<SampleId>, StoreError> {
        let mut ids: Vec<SampleId> =
            list_dir_names(&self.path_of(root))?
                .into_iter()
                .filter_map(|name| SampleId::from_dir_name(&name))
                .collect();
        ids.sort();
        Ok(ids)
    }

    /// Lists the scan branches of a sample, in coordinate-name order.
    ///
    /// An absent scan directory yields an empty list.
    pub fn list_branches(&self, sample: &SampleKey) -> Result<Vec<CoordName>, StoreError> {
        let mut coords: Vec<CoordName> =
            list_dir_names(&self.root.join(layout::scan_dir(sample)))?
                .into_iter()
                .filter(|name| name != layout::TRUNK_DIR)
                .filter_map(|name| layout::decode_segment(&name))
                .map(CoordName::new)
                .collect();
        coords.sort();
        Ok(coords)
    }

    /// Lists the grid points present on a branch, in index order.
    ///
    /// An absent branch directory yields an empty list.
    pub fn list_grid_points(&self, branch: &BranchKey) -> Result<Vec<usize>, StoreError> {
        let mut indices: Vec<usize> =
            list_dir_names(&self.path_of(branch))?
                .into_iter()
                .filter_map(|name| layout::parse_grid_dir_name(&name))
                .collect();
        indices.sort_unstable();
        Ok(indices)
    }
}

fn create_dir(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        if path.is_dir() {
            return Ok(());
        }
        return Err(StoreError::AlreadyExists(path.to_path_buf()));
    }
    fs::create_dir_all(path).map_err(|e| StoreError::Io { path: path.to_path_buf(), source: e })
}

fn write_template_checked(path: &Path, template: &VariableTemplate) -> Result<(), StoreError> {
    if path.is_file() {
        let stored: VariableTemplate = read_toml(path, "coordinate template")?;
        if &stored != template {
            let dir = path.parent().unwrap_or(path).to_path_buf();
            return Err(StoreError::TemplateMismatch(dir));
        }
        return Ok(());
    }
    write_toml(path, template)
}

fn list_dir_names(dir: &Path) -> Result<Vec<String>, StoreError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries =
        fs::read_dir(dir).map_err(|e| StoreError::Io { path: dir.to_path_buf(), source: e })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::Io { path: dir.to_path_buf(), source: e })?;
        let is_dir = entry
            .file_type()
            .map_err(|e| StoreError::Io { path: entry.path(), source: e })?
            .is_dir();
        if is_dir {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

fn read_toml<T: DeserializeOwned>(path: &Path, what: &'static str) -> Result<T, StoreError> {
    let content = read_text(path, what)?;
    toml::from_str(&content).map_err(|e| StoreError::Malformed {
        what,
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content = toml::to_string_pretty(value).map_err(|e| StoreError::Malformed {
        what: "record",
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    write_text(path, &content)
}

fn read_text(path: &Path, what: &'static str) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound { what, path: path.to_path_buf() }
        } else {
            StoreError::Io { path: path.to_path_buf(), source: e }
        }
    })
}

fn write_text(path: &Path, content: &str) -> Result<(), StoreError> {
    fs::write(path, content).map_err(|e| StoreError::Io { path: path.to_path_buf(), source: e })
}
