//! Derives filesystem paths from keys.
//!
//! Every key maps to exactly one directory underneath a store root, built
//! from sanitized path segments. The mapping is pure: equal keys always give
//! equal paths, and nothing here touches the disk.
//!
//! The directory shape underneath one root key is:
//!
//! ```text
//! <species>/<charge>_<multiplicity>/<method>__<basis>__<r|u>/samples/
//!     _trunk/                  template and trunk bookkeeping
//!     <sample-id>/             one saved or running sample
//!         run/<job>/           run instances, with try0/, try1/, ... inside
//!         scan/_trunk/         scan template bookkeeping
//!         scan/<coord>/<NN>/   one grid point of a coordinate scan
//! ```

use crate::core::models::key::{BranchKey, GridKey, RootKey, RunKey, RunLeaf, SampleKey};
use std::path::PathBuf;

pub(crate) const TRUNK_DIR: &str = "_trunk";
pub(crate) const SCAN_DIR: &str = "scan";
pub(crate) const RUN_DIR: &str = "run";

pub(crate) const INFO_FILE: &str = "info.toml";
pub(crate) const TEMPLATE_FILE: &str = "template.toml";
pub(crate) const GEOMETRY_FILE: &str = "geometry.xyz";
pub(crate) const ENERGY_FILE: &str = "energy.txt";

// Written by engine implementations inside an attempt directory.
pub const INPUT_FILE: &str = "input.dat";
pub const OUTPUT_FILE: &str = "output.dat";

/// ASCII alphanumerics and `.`, `_`, `-` pass through; every other byte is
/// percent-encoded. Empty and dot-only inputs are rewritten, so the result
/// is always a safe directory name, and distinct inputs give distinct
/// segments.
pub fn encode_segment(raw: &str) -> String {
    if raw.is_empty() {
        return "_".to_string();
    }
    if raw == "." || raw == ".." {
        return raw.bytes().map(|b| format!("%{:02X}", b)).collect();
    }
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Returns `None` for names that are not valid encodings, which lets
/// listings skip foreign directories.
pub(crate) fn decode_segment(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hi = (hex[0] as char).to_digit(16)?;
            let lo = (hex[1] as char).to_digit(16)?;
            out.push((hi * 16 + lo) as u8);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

pub(crate) fn grid_dir_name(index: usize) -> String {
    format!("{:02}", index)
}

pub(crate) fn parse_grid_dir_name(name: &str) -> Option<usize> {
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

pub trait Locator {
    /// The directory for this key, relative to the store root.
    fn rel_path(&self) -> PathBuf;
}

/// Marks keys whose directories hold leaf artifacts.
pub trait LeafLocator: Locator {}

impl Locator for RootKey {
    fn rel_path(&self) -> PathBuf {
        let charge_mult = format!("{}_{}", self.charge, self.multiplicity);
        let model = format!(
            "{}__{}__{}",
            encode_segment(&self.method.to_lowercase()),
            encode_segment(&self.basis.to_lowercase()),
            if self.restricted { "r" } else { "u" }
        );
        [encode_segment(self.species.as_str()), charge_mult, model, "samples".to_string()]
            .iter()
            .collect()
    }
}

impl Locator for SampleKey {
    fn rel_path(&self) -> PathBuf {
        self.root.rel_path().join(self.id.as_str())
    }
}

impl LeafLocator for SampleKey {}

impl Locator for BranchKey {
    fn rel_path(&self) -> PathBuf {
        self.sample.rel_path().join(SCAN_DIR).join(encode_segment(self.coord.as_str()))
    }
}

impl Locator for GridKey {
    fn rel_path(&self) -> PathBuf {
        self.branch.rel_path().join(grid_dir_name(self.index))
    }
}

impl LeafLocator for GridKey {}

impl Locator for RunKey {
    fn rel_path(&self) -> PathBuf {
        let leaf = match &self.leaf {
            RunLeaf::Sample(sample) => sample.rel_path(),
            RunLeaf::Grid(grid) => grid.rel_path(),
        };
        leaf.join(RUN_DIR).join(self.job.dir_name())
    }
}

pub(crate) fn trunk_dir(root: &RootKey) -> PathBuf {
    root.rel_path().join(TRUNK_DIR)
}

pub(crate) fn scan_trunk_dir(sample: &SampleKey) -> PathBuf {
    sample.rel_path().join(SCAN_DIR).join(TRUNK_DIR)
}

pub(crate) fn scan_dir(sample: &SampleKey) -> PathBuf {
    sample.rel_path().join(SCAN_DIR)
}
