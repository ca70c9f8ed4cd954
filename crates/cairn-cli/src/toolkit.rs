//! A geometry toolkit backed by a directory of `.xyz` files.
//!
//! Species identities resolve against the comment line of each file in the
//! geometry directory. Internal coordinates follow the chain convention:
//! atom `k` is placed by a bond to atom `k-1`, an angle through `k-2`, and a
//! dihedral through `k-3`, named `R{k}`, `A{k}`, `D{k}`. The dihedrals are
//! the free coordinates; sampling and scan grids cover their full turn.

use cairn::core::models::geometry::{Geometry, Linspace, TemplateRow, VariableTemplate, ZMatrix};
use cairn::core::models::key::{CoordName, SpeciesId};
use cairn::engine::toolkit::{GeometryToolkit, SamplingRanges, ToolkitError};
use nalgebra::{Point3, Vector3};
use rand::Rng;
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

const DEGENERATE_NORM: f64 = 1.0e-12;

pub struct XyzLibraryToolkit {
    geometry_dir: PathBuf,
}

impl XyzLibraryToolkit {
    pub fn new(geometry_dir: PathBuf) -> Self {
        Self { geometry_dir }
    }

    /// Lists the library's `.xyz` files in name order.
    fn library_files(&self) -> Result<Vec<PathBuf>, ToolkitError> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.geometry_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "xyz") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl GeometryToolkit for XyzLibraryToolkit {
    fn geometry_from_identity(&self, identity: &SpeciesId) -> Result<Geometry, ToolkitError> {
        for path in self.library_files()? {
            let text = fs::read_to_string(&path)?;
            if text.lines().nth(1).map(str::trim) != Some(identity.as_str()) {
                continue;
            }
            debug!(file = %path.display(), "resolved a species identity");
            return Geometry::from_xyz(&text).map_err(|e| ToolkitError::InternalCoordinates {
                detail: format!("{}: {}", path.display(), e),
            });
        }
        Err(ToolkitError::UnknownIdentity { identity: identity.to_string() })
    }

    fn internal_coordinates(&self, geometry: &Geometry) -> Result<ZMatrix, ToolkitError> {
        let atoms = geometry.atoms();
        let mut rows = Vec::with_capacity(atoms.len());
        let mut values = BTreeMap::new();

        for (k, atom) in atoms.iter().enumerate() {
            let mut refs = Vec::new();
            let mut names = Vec::new();
            if k >= 1 {
                refs.push(k - 1);
                let name = CoordName::new(format!("R{}", k));
                values.insert(name.clone(), bond(&atoms[k].position, &atoms[k - 1].position));
                names.push(name);
            }
            if k >= 2 {
                refs.push(k - 2);
                let name = CoordName::new(format!("A{}", k));
                values.insert(
                    name.clone(),
                    angle(&atoms[k].position, &atoms[k - 1].position, &atoms[k - 2].position)?,
                );
                names.push(name);
            }
            if k >= 3 {
                refs.push(k - 3);
                let name = CoordName::new(format!("D{}", k));
                values.insert(
                    name.clone(),
                    dihedral(
                        &atoms[k].position,
                        &atoms[k - 1].position,
                        &atoms[k - 2].position,
                        &atoms[k - 3].position,
                    )?,
                );
                names.push(name);
            }
            rows.push(TemplateRow::new(atom.symbol.clone(), refs, names));
        }

        ZMatrix::new(VariableTemplate::new(rows), values)
            .map_err(|e| ToolkitError::InternalCoordinates { detail: e.to_string() })
    }

    fn free_coordinate_names(&self, geometry: &Geometry) -> Result<Vec<CoordName>, ToolkitError> {
        Ok((3..geometry.atoms().len())
            .map(|k| CoordName::new(format!("D{}", k)))
            .collect())
    }

    fn sampling_ranges(&self, _zmatrix: &ZMatrix, names: &[CoordName]) -> SamplingRanges {
        names.iter().map(|name| (name.clone(), (0.0, TAU))).collect()
    }

    fn sample_structures(
        &self,
        zmatrix: &ZMatrix,
        count: usize,
        ranges: &SamplingRanges,
    ) -> Vec<ZMatrix> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let mut sample = zmatrix.clone();
                for (name, (lo, hi)) in ranges {
                    let value = rng.gen_range(*lo..*hi);
                    match sample.with_value(name, value) {
                        Ok(next) => sample = next,
                        Err(e) => {
                            warn!(coordinate = %name, error = %e, "skipping an unknown sampling coordinate");
                        }
                    }
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
        let count = ((TAU / increment).round() as usize).max(1);
        names
            .iter()
            .map(|name| {
                let start = zmatrix.value(name).unwrap_or(0.0);
                let stop = start + increment * (count - 1) as f64;
                (name.clone(), Linspace::new(start, stop, count))
            })
            .collect()
    }
}

fn bond(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    nalgebra::distance(a, b)
}

fn angle(a: &Point3<f64>, apex: &Point3<f64>, c: &Point3<f64>) -> Result<f64, ToolkitError> {
    let u: Vector3<f64> = a - apex;
    let v: Vector3<f64> = c - apex;
    if u.norm_squared() < DEGENERATE_NORM || v.norm_squared() < DEGENERATE_NORM {
        return Err(ToolkitError::InternalCoordinates {
            detail: "coincident atoms leave an angle undefined".to_string(),
        });
    }
    Ok((u.dot(&v) / (u.norm() * v.norm())).clamp(-1.0, 1.0).acos())
}

fn dihedral(
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    d: &Point3<f64>,
) -> Result<f64, ToolkitError> {
    let b0: Vector3<f64> = b - a;
    let b1: Vector3<f64> = c - b;
    let b2: Vector3<f64> = d - c;
    let n1 = b0.cross(&b1);
    let n2 = b1.cross(&b2);
    if n1.norm_squared() < DEGENERATE_NORM || n2.norm_squared() < DEGENERATE_NORM {
        return Err(ToolkitError::InternalCoordinates {
            detail: "collinear atoms leave a dihedral undefined".to_string(),
        });
    }
    let m1 = n1.cross(&b1.normalize());
    Ok(m1.dot(&n2).atan2(n1.dot(&n2)))
}
