//! Shared fixtures for unit tests: a scriptable fake engine, a
//! deterministic fake toolkit, and small reference structures.

use crate::core::models::geometry::{
    Atom, Geometry, Linspace, Structure, TemplateRow, VariableTemplate, ZMatrix,
    parse_atom_line,
};
use crate::core::models::key::{CoordName, JobKind, RootKey, SpeciesId};
use crate::core::store::ArtifactStore;
use crate::engine::compute::{ComputationEngine, ComputeError, ErrorKind, JobSpec, JobTexts};
use crate::engine::lease::LeaseConfig;
use crate::engine::toolkit::{GeometryToolkit, SamplingRanges, ToolkitError};
use nalgebra::Point3;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub fn test_root() -> RootKey {
    RootKey {
        species: SpeciesId::new("InChI=1S/H2O/h1H2"),
        charge: 0,
        multiplicity: 1,
        method: "b3lyp".to_string(),
        basis: "6-31g*".to_string(),
        restricted: true,
    }
}

pub fn water_geometry() -> Geometry {
    Geometry::new(vec![
        Atom::new("O", Point3::new(0.0, 0.0, 0.0)),
        Atom::new("H", Point3::new(0.9572, 0.0, 0.0)),
        Atom::new("H", Point3::new(-0.2399, 0.9266, 0.0)),
    ])
}

pub fn water_template() -> VariableTemplate {
    VariableTemplate::new(vec![
        TemplateRow::new("O", vec![], vec![]),
        TemplateRow::new("H", vec![0], vec![CoordName::new("R1")]),
        TemplateRow::new("H", vec![0, 1], vec![CoordName::new("R2"), CoordName::new("A2")]),
    ])
}

pub fn water_zmatrix() -> ZMatrix {
    let mut values = BTreeMap::new();
    values.insert(CoordName::new("R1"), 0.9572);
    values.insert(CoordName::new("R2"), 0.9572);
    values.insert(CoordName::new("A2"), 1.8239);
    ZMatrix::new(water_template(), values).unwrap()
}

pub fn water_structure() -> Structure {
    Structure::Internal(water_zmatrix())
}

pub struct StoreSetup {
    pub _dir: TempDir,
    pub store: ArtifactStore,
    pub root: RootKey,
    pub lease: LeaseConfig,
}

pub fn store_setup() -> StoreSetup {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path());
    StoreSetup { _dir: dir, store, root: test_root(), lease: test_lease() }
}

pub struct WorkflowSetup {
    pub _dir: TempDir,
    pub run: ArtifactStore,
    pub save: ArtifactStore,
    pub root: RootKey,
    pub lease: LeaseConfig,
}

pub fn workflow_setup() -> WorkflowSetup {
    let dir = TempDir::new().unwrap();
    let run = ArtifactStore::new(dir.path().join("run"));
    let save = ArtifactStore::new(dir.path().join("save"));
    WorkflowSetup { _dir: dir, run, save, root: test_root(), lease: test_lease() }
}

fn test_lease() -> LeaseConfig {
    LeaseConfig { ttl_seconds: 600, owner: "test-runner".to_string() }
}

// Fake program output. The text markers mirror what a simple wrapper script
// would emit.

fn render_output(
    normal: bool,
    errors: &[ErrorKind],
    energy: Option<f64>,
    geometry: Option<&Geometry>,
    zmatrix: Option<&ZMatrix>,
) -> String {
    let mut out = String::new();
    for kind in errors {
        out.push_str(&format!("ERROR: {}\n", kind));
    }
    if let Some(energy) = energy {
        out.push_str(&format!("FINAL ENERGY: {:.12}\n", energy));
    }
    if let Some(geometry) = geometry {
        out.push_str("BEGIN GEOMETRY\n");
        for atom in geometry.atoms() {
            out.push_str(&format!(
                "{} {:.12} {:.12} {:.12}\n",
                atom.symbol, atom.position.x, atom.position.y, atom.position.z
            ));
        }
        out.push_str("END GEOMETRY\n");
    }
    if let Some(zmatrix) = zmatrix {
        out.push_str("BEGIN ZMATRIX\n");
        out.push_str(&toml::to_string(zmatrix).unwrap());
        out.push_str("END ZMATRIX\n");
    }
    if normal {
        out.push_str("NORMAL TERMINATION\n");
    }
    out
}

pub fn fake_success(energy: f64) -> String {
    fake_success_with(energy, &water_geometry())
}

pub fn fake_success_with(energy: f64, geometry: &Geometry) -> String {
    render_output(true, &[], Some(energy), Some(geometry), Some(&water_zmatrix()))
}

// Normal termination, unconverged optimization, carrying the structure it
// got stuck at.
pub fn fake_noconv(zmatrix: &ZMatrix) -> String {
    render_output(
        true,
        &[ErrorKind::OptNoConv],
        Some(-75.9),
        Some(&water_geometry()),
        Some(zmatrix),
    )
}

pub fn fake_failure(errors: &[ErrorKind]) -> String {
    let mut out = String::from("FakeQC terminated abnormally\n");
    out.push_str(&render_output(false, errors, None, None, None));
    out
}

// Outputs are served in order, one per submission; the rendered inputs are
// recorded so tests can assert which options each attempt carried.
pub struct FakeEngine {
    root: RootKey,
    outputs: RefCell<VecDeque<String>>,
    inputs: RefCell<Vec<String>>,
}

impl FakeEngine {
    pub fn scripted(outputs: Vec<String>) -> Self {
        Self {
            root: test_root(),
            outputs: RefCell::new(outputs.into()),
            inputs: RefCell::new(Vec::new()),
        }
    }

    pub fn job_for<'a>(&'a self, structure: &'a Structure) -> JobSpec<'a> {
        JobSpec::for_root(JobKind::Optimization, structure, &self.root)
    }

    pub fn submitted_inputs(&self) -> Vec<String> {
        self.inputs.borrow().clone()
    }
}

fn render_input(job: &JobSpec<'_>) -> String {
    let structure = match job.structure {
        Structure::Cartesian(geometry) => format!(
            "cartesian: {:?}",
            geometry
                .atoms()
                .iter()
                .map(|a| (a.position.x, a.position.y, a.position.z))
                .collect::<Vec<_>>()
        ),
        Structure::Internal(zmatrix) => format!("internal: {:?}", zmatrix.values()),
    };
    format!(
        "job = {}\nmodel = {}/{} charge = {} mult = {} restricted = {}\nscf = {:?}\nopt = {:?}\nfrozen = {:?}\n{}\n",
        job.kind,
        job.method,
        job.basis,
        job.charge,
        job.multiplicity,
        job.restricted,
        job.options.scf,
        job.options.opt,
        job.frozen,
        structure,
    )
}

fn extract_block<'t>(output: &'t str, begin: &str, end: &str) -> Option<&'t str> {
    let start = output.find(begin)? + begin.len();
    let stop = output[start..].find(end)? + start;
    Some(&output[start..stop])
}

impl ComputationEngine for FakeEngine {
    fn program(&self) -> &str {
        "fakeqc"
    }

    fn submit(&self, workdir: &Path, job: &JobSpec<'_>) -> Result<JobTexts, ComputeError> {
        let input = render_input(job);
        let output = self
            .outputs
            .borrow_mut()
            .pop_front()
            .expect("FakeEngine ran out of scripted outputs");
        self.inputs.borrow_mut().push(input.clone());
        fs::write(workdir.join("input.dat"), &input)?;
        fs::write(workdir.join("output.dat"), &output)?;
        Ok(JobTexts { input, output })
    }

    fn has_normal_exit(&self, output: &str) -> bool {
        output.contains("NORMAL TERMINATION")
    }

    fn has_error(&self, output: &str, kind: ErrorKind) -> bool {
        output.contains(&format!("ERROR: {}", kind))
    }

    fn read_energy(&self, output: &str) -> Result<f64, ComputeError> {
        let line = output
            .lines()
            .find_map(|l| l.strip_prefix("FINAL ENERGY:"))
            .ok_or(ComputeError::MissingOutput { what: "energy" })?;
        line.trim().parse().map_err(|_| ComputeError::MalformedOutput {
            what: "energy",
            detail: line.trim().to_string(),
        })
    }

    fn read_geometry(&self, output: &str) -> Result<Geometry, ComputeError> {
        let block = extract_block(output, "BEGIN GEOMETRY\n", "END GEOMETRY")
            .ok_or(ComputeError::MissingOutput { what: "geometry" })?;
        let atoms = block
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, l)| {
                parse_atom_line(l, i + 1).map_err(|e| ComputeError::MalformedOutput {
                    what: "geometry",
                    detail: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Geometry::new(atoms))
    }

    fn read_internal(&self, output: &str) -> Result<ZMatrix, ComputeError> {
        let block = extract_block(output, "BEGIN ZMATRIX\n", "END ZMATRIX")
            .ok_or(ComputeError::MissingOutput { what: "z-matrix" })?;
        toml::from_str(block).map_err(|e| ComputeError::MalformedOutput {
            what: "z-matrix",
            detail: e.to_string(),
        })
    }
}

// Sampled structures spread each free coordinate evenly across its range,
// so workflow tests know exactly which values each sample carries.
pub struct FakeToolkit {
    pub free: Vec<CoordName>,
    pub grid_count: usize,
}

impl Default for FakeToolkit {
    fn default() -> Self {
        Self { free: vec![CoordName::new("A2")], grid_count: 3 }
    }
}

impl GeometryToolkit for FakeToolkit {
    fn geometry_from_identity(&self, _identity: &SpeciesId) -> Result<Geometry, ToolkitError> {
        Ok(water_geometry())
    }

    fn internal_coordinates(&self, _geometry: &Geometry) -> Result<ZMatrix, ToolkitError> {
        Ok(water_zmatrix())
    }

    fn free_coordinate_names(&self, _geometry: &Geometry) -> Result<Vec<CoordName>, ToolkitError> {
        Ok(self.free.clone())
    }

    fn sampling_ranges(&self, _zmatrix: &ZMatrix, names: &[CoordName]) -> SamplingRanges {
        names.iter().map(|name| (name.clone(), (0.0, std::f64::consts::TAU))).collect()
    }

    fn sample_structures(
        &self,
        zmatrix: &ZMatrix,
        count: usize,
        ranges: &SamplingRanges,
    ) -> Vec<ZMatrix> {
        (0..count)
            .map(|k| {
                let fraction = (k as f64 + 1.0) / (count as f64 + 1.0);
                let mut sample = zmatrix.clone();
                for (name, (lo, hi)) in ranges {
                    sample = sample.with_value(name, lo + fraction * (hi - lo)).unwrap();
                }
                sample
            })
            .collect()
    }

    fn grid_points(
        &self,
        zmatrix: &ZMatrix,
        names: &[CoordName],
        increment: f64,
    ) -> BTreeMap<CoordName, Linspace> {
        names
            .iter()
            .map(|name| {
                let start = zmatrix.value(name).unwrap_or(0.0);
                let stop = start + increment * (self.grid_count.saturating_sub(1)) as f64;
                (name.clone(), Linspace::new(start, stop, self.grid_count))
            })
            .collect()
    }
}
