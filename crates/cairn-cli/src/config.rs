use crate::error::{CliError, Result};
use cairn::core::models::key::{RootKey, SpeciesId};
use cairn::engine::config::RetryPolicy;
use cairn::engine::lease::LeaseConfig;
use cairn::engine::options::FallbackMatrix;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The text patterns the script engine recognizes in program output.
#[derive(Debug, Clone)]
pub struct Markers {
    pub normal_exit: String,
    pub error_prefix: String,
    pub energy_prefix: String,
    pub geometry_begin: String,
    pub geometry_end: String,
    pub zmatrix_begin: String,
    pub zmatrix_end: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            normal_exit: "NORMAL TERMINATION".to_string(),
            error_prefix: "ERROR:".to_string(),
            energy_prefix: "FINAL ENERGY:".to_string(),
            geometry_begin: "BEGIN GEOMETRY".to_string(),
            geometry_end: "END GEOMETRY".to_string(),
            zmatrix_begin: "BEGIN ZMATRIX".to_string(),
            zmatrix_end: "END ZMATRIX".to_string(),
        }
    }
}

/// One species of the campaign, as declared in the job file.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SpeciesEntry {
    pub identity: String,
    pub charge: i32,
    pub multiplicity: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ProgramSection {
    script: PathBuf,
    name: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ModelSection {
    method: String,
    basis: String,
    restricted: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct SamplingSection {
    nsamp: Option<usize>,
    dedup_rtol: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ScanSection {
    increment_degrees: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RefineSection {
    energy_ceiling: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RetrySection {
    fallbacks: Option<bool>,
    feedback_tries: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct LeaseSection {
    ttl_seconds: Option<u64>,
    owner: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct MarkersSection {
    normal_exit: Option<String>,
    error_prefix: Option<String>,
    energy_prefix: Option<String>,
    geometry_begin: Option<String>,
    geometry_end: Option<String>,
    zmatrix_begin: Option<String>,
    zmatrix_end: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct JobFile {
    run_root: PathBuf,
    save_root: PathBuf,
    geometry_dir: PathBuf,
    program: ProgramSection,
    model: ModelSection,
    #[serde(default)]
    sampling: SamplingSection,
    #[serde(default)]
    scan: ScanSection,
    #[serde(default)]
    refine: RefineSection,
    #[serde(default)]
    retry: RetrySection,
    #[serde(default)]
    lease: LeaseSection,
    #[serde(default)]
    markers: MarkersSection,
    species: Vec<SpeciesEntry>,
}

/// The fully resolved campaign description every subcommand works from.
///
/// Sections a subcommand does not use stay as plain values here; each
/// command assembles the core configuration it needs from them.
#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub run_root: PathBuf,
    pub save_root: PathBuf,
    pub geometry_dir: PathBuf,
    pub script: PathBuf,
    pub program: String,
    pub method: String,
    pub basis: String,
    pub restricted: bool,
    pub species: Vec<SpeciesEntry>,
    pub retry: RetryPolicy,
    pub lease: LeaseConfig,
    pub markers: Markers,
    pub nsamp: Option<usize>,
    pub dedup_rtol: Option<f64>,
    pub increment_degrees: Option<f64>,
    pub energy_ceiling: Option<f64>,
}

impl CampaignConfig {
    /// Loads and resolves a job file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::JobFile {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        let file: JobFile = toml::from_str(&content).map_err(|e| CliError::JobFile {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        debug!("Job file parsed: {:?}", &file);

        if file.species.is_empty() {
            return Err(CliError::Config("the job file defines no species".to_string()));
        }

        let program = file.program.name.clone().unwrap_or_else(|| {
            file.program
                .script
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "script".to_string())
        });

        let mut retry = if file.retry.fallbacks.unwrap_or(true) {
            RetryPolicy::standard()
        } else {
            RetryPolicy::new(FallbackMatrix::default())
        };
        if let Some(tries) = file.retry.feedback_tries {
            retry.feedback_tries = tries;
        }

        let mut lease = LeaseConfig::default();
        if let Some(ttl) = file.lease.ttl_seconds {
            lease.ttl_seconds = ttl;
        }
        if let Some(owner) = file.lease.owner {
            lease.owner = owner;
        }

        let defaults = Markers::default();
        let markers = Markers {
            normal_exit: file.markers.normal_exit.unwrap_or(defaults.normal_exit),
            error_prefix: file.markers.error_prefix.unwrap_or(defaults.error_prefix),
            energy_prefix: file.markers.energy_prefix.unwrap_or(defaults.energy_prefix),
            geometry_begin: file.markers.geometry_begin.unwrap_or(defaults.geometry_begin),
            geometry_end: file.markers.geometry_end.unwrap_or(defaults.geometry_end),
            zmatrix_begin: file.markers.zmatrix_begin.unwrap_or(defaults.zmatrix_begin),
            zmatrix_end: file.markers.zmatrix_end.unwrap_or(defaults.zmatrix_end),
        };

        Ok(Self {
            run_root: file.run_root,
            save_root: file.save_root,
            geometry_dir: file.geometry_dir,
            script: file.program.script,
            program,
            method: file.model.method,
            basis: file.model.basis,
            restricted: file.model.restricted.unwrap_or(true),
            species: file.species,
            retry,
            lease,
            markers,
            nsamp: file.sampling.nsamp,
            dedup_rtol: file.sampling.dedup_rtol,
            increment_degrees: file.scan.increment_degrees,
            energy_ceiling: file.refine.energy_ceiling,
        })
    }

    /// Builds the storage root key of one species at this campaign's model.
    pub fn root_for(&self, species: &SpeciesEntry) -> RootKey {
        RootKey {
            species: SpeciesId::new(species.identity.clone()),
            charge: species.charge,
            multiplicity: species.multiplicity,
            method: self.method.clone(),
            basis: self.basis.clone(),
            restricted: self.restricted,
        }
    }

    /// Returns the species to work on, restricted to `filter` when given.
    pub fn selected_species(&self, filter: Option<&str>) -> Result<Vec<&SpeciesEntry>> {
        let selected: Vec<&SpeciesEntry> = match filter {
            Some(identity) => {
                self.species.iter().filter(|s| s.identity == identity).collect()
            }
            None => self.species.iter().collect(),
        };
        if selected.is_empty() {
            return Err(CliError::Argument(format!(
                "species '{}' is not declared in the job file",
                filter.unwrap_or_default()
            )));
        }
        Ok(selected)
    }
}
