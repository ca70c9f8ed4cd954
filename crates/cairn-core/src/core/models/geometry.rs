//! Defines molecular structure representations and their text encodings.
//!
//! Two representations coexist: Cartesian geometries (lists of atoms with 3D
//! positions, exchanged as XYZ text) and internal-coordinate z-matrices (a
//! symbolic template shared by a whole sample space, plus per-structure values
//! for the named coordinates).

use super::key::CoordName;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Represents errors for malformed or inconsistent structures.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// XYZ text could not be parsed.
    #[error("malformed XYZ text at line {line}: {detail}")]
    MalformedXyz {
        /// The 1-based line number where parsing failed.
        line: usize,
        /// A description of what was wrong.
        detail: String,
    },
    /// A z-matrix value set does not match its coordinate template.
    #[error("inconsistent z-matrix: {detail}")]
    InconsistentZMatrix {
        /// A description of the mismatch.
        detail: String,
    },
    /// A coordinate name does not occur in the template.
    #[error("unknown coordinate '{name}'")]
    UnknownCoordinate {
        /// The offending coordinate name.
        name: CoordName,
    },
}

/// A single atom: an element symbol and a position in Cartesian space.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The element symbol (e.g. "C", "Cl").
    pub symbol: String,
    /// The position in Angstroms.
    pub position: Point3<f64>,
}

impl Atom {
    /// Creates a new atom.
    pub fn new(symbol: impl Into<String>, position: Point3<f64>) -> Self {
        Self { symbol: symbol.into(), position }
    }
}

/// A molecular geometry in Cartesian coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Geometry {
    atoms: Vec<Atom>,
}

impl Geometry {
    /// Creates a geometry from a list of atoms.
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    /// Returns the atoms in order.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Returns the number of atoms.
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    /// Reports whether the geometry contains no atoms.
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Renders the geometry as XYZ text.
    ///
    /// The comment line is left empty; positions are written with enough
    /// digits to round-trip the stored coordinates for comparison purposes.
    pub fn to_xyz(&self) -> String {
        let mut out = format!("{}\n\n", self.atoms.len());
        for atom in &self.atoms {
            out.push_str(&format!(
                "{:<2} {:>18.12} {:>18.12} {:>18.12}\n",
                atom.symbol, atom.position.x, atom.position.y, atom.position.z
            ));
        }
        out
    }

    /// Parses XYZ text into a geometry.
    ///
    /// Expects the conventional layout: an atom count, a comment line, then
    /// one `symbol x y z` line per atom. Extra trailing blank lines are
    /// tolerated; a wrong atom count or an unparsable coordinate is not.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::MalformedXyz`] describing the first offending
    /// line.
    pub fn from_xyz(text: &str) -> Result<Self, GeometryError> {
        let mut lines = text.lines().enumerate();
        let (_, count_line) = lines.next().ok_or(GeometryError::MalformedXyz {
            line: 1,
            detail: "empty input".to_string(),
        })?;
        let count: usize = count_line.trim().parse().map_err(|_| GeometryError::MalformedXyz {
            line: 1,
            detail: format!("expected an atom count, found '{}'", count_line.trim()),
        })?;
        // Comment line; its contents are ignored.
        lines.next().ok_or(GeometryError::MalformedXyz {
            line: 2,
            detail: "missing comment line".to_string(),
        })?;

        let mut atoms = Vec::with_capacity(count);
        for (idx, line) in lines {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            if atoms.len() == count {
                return Err(GeometryError::MalformedXyz {
                    line: line_no,
                    detail: "more atom lines than the declared count".to_string(),
                });
            }
            atoms.push(parse_atom_line(line, line_no)?);
        }
        if atoms.len() != count {
            return Err(GeometryError::MalformedXyz {
                line: 1,
                detail: format!("declared {} atoms, found {}", count, atoms.len()),
            });
        }
        Ok(Self { atoms })
    }
}

/// Parses a single `symbol x y z` line.
pub(crate) fn parse_atom_line(line: &str, line_no: usize) -> Result<Atom, GeometryError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 4 {
        return Err(GeometryError::MalformedXyz {
            line: line_no,
            detail: format!("expected 'symbol x y z', found {} fields", fields.len()),
        });
    }
    let mut coords = [0.0f64; 3];
    for (slot, field) in coords.iter_mut().zip(&fields[1..]) {
        *slot = field.parse().map_err(|_| GeometryError::MalformedXyz {
            line: line_no,
            detail: format!("unparsable coordinate '{}'", field),
        })?;
    }
    Ok(Atom::new(fields[0], Point3::new(coords[0], coords[1], coords[2])))
}

/// One row of a symbolic z-matrix template.
///
/// Row `k` references up to `min(k, 3)` earlier atoms; `refs` and `names`
/// always have the same length, pairing each referenced atom with the name of
/// the coordinate (distance, angle, dihedral) defined against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRow {
    /// The element symbol of the atom this row places.
    pub symbol: String,
    /// Zero-based indices of the referenced atoms.
    pub refs: Vec<usize>,
    /// The coordinate names defined by this row, parallel to `refs`.
    pub names: Vec<CoordName>,
}

impl TemplateRow {
    /// Creates a template row.
    pub fn new(symbol: impl Into<String>, refs: Vec<usize>, names: Vec<CoordName>) -> Self {
        Self { symbol: symbol.into(), refs, names }
    }
}

/// The symbolic connectivity template of a z-matrix.
///
/// All structures in one sample space share a single template; only the
/// coordinate values differ between samples. The store enforces this with a
/// compare-on-write check at the trunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableTemplate {
    rows: Vec<TemplateRow>,
}

impl VariableTemplate {
    /// Creates a template from its rows.
    pub fn new(rows: Vec<TemplateRow>) -> Self {
        Self { rows }
    }

    /// Returns the rows in atom order.
    pub fn rows(&self) -> &[TemplateRow] {
        &self.rows
    }

    /// Returns the number of atoms the template places.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Reports whether the template places no atoms.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns every coordinate name, in row-definition order.
    pub fn coordinate_names(&self) -> Vec<&CoordName> {
        self.rows.iter().flat_map(|row| row.names.iter()).collect()
    }

    /// Reports whether `name` is defined by this template.
    pub fn defines(&self, name: &CoordName) -> bool {
        self.rows.iter().any(|row| row.names.contains(name))
    }
}

/// A structure in internal coordinates: a template plus one value per name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZMatrix {
    template: VariableTemplate,
    values: BTreeMap<CoordName, f64>,
}

impl ZMatrix {
    /// Creates a z-matrix, checking that the value set covers the template.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InconsistentZMatrix`] if any template name is
    /// missing a value or any value names a coordinate the template does not
    /// define.
    pub fn new(
        template: VariableTemplate,
        values: BTreeMap<CoordName, f64>,
    ) -> Result<Self, GeometryError> {
        for name in template.coordinate_names() {
            if !values.contains_key(name) {
                return Err(GeometryError::InconsistentZMatrix {
                    detail: format!("no value for coordinate '{}'", name),
                });
            }
        }
        for name in values.keys() {
            if !template.defines(name) {
                return Err(GeometryError::InconsistentZMatrix {
                    detail: format!("value for undefined coordinate '{}'", name),
                });
            }
        }
        Ok(Self { template, values })
    }

    /// Returns the symbolic template.
    pub fn template(&self) -> &VariableTemplate {
        &self.template
    }

    /// Returns all coordinate values.
    pub fn values(&self) -> &BTreeMap<CoordName, f64> {
        &self.values
    }

    /// Returns the value of one named coordinate, if defined.
    pub fn value(&self, name: &CoordName) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Returns the number of atoms.
    pub fn len(&self) -> usize {
        self.template.len()
    }

    /// Reports whether the z-matrix places no atoms.
    pub fn is_empty(&self) -> bool {
        self.template.is_empty()
    }

    /// Returns a copy with one coordinate set to a new value.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnknownCoordinate`] if the template does not
    /// define `name`.
    pub fn with_value(&self, name: &CoordName, value: f64) -> Result<Self, GeometryError> {
        if !self.template.defines(name) {
            return Err(GeometryError::UnknownCoordinate { name: name.clone() });
        }
        let mut next = self.clone();
        next.values.insert(name.clone(), value);
        Ok(next)
    }
}

/// A structure in either of the two supported representations.
#[derive(Debug, Clone, PartialEq)]
pub enum Structure {
    /// Cartesian coordinates.
    Cartesian(Geometry),
    /// Internal coordinates.
    Internal(ZMatrix),
}

impl Structure {
    /// Returns the number of atoms in either representation.
    pub fn atom_count(&self) -> usize {
        match self {
            Structure::Cartesian(geo) => geo.len(),
            Structure::Internal(zma) => zma.len(),
        }
    }
}

/// An evenly spaced one-dimensional grid, endpoints included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linspace {
    /// The first grid value.
    pub start: f64,
    /// The last grid value.
    pub stop: f64,
    /// The number of grid points.
    pub count: usize,
}

impl Linspace {
    /// Creates a grid description.
    pub fn new(start: f64, stop: f64, count: usize) -> Self {
        Self { start, stop, count }
    }

    /// Materializes the grid values.
    ///
    /// A count of zero yields an empty grid and a count of one yields just
    /// the start value; otherwise both endpoints are included.
    pub fn values(&self) -> Vec<f64> {
        match self.count {
            0 => Vec::new(),
            1 => vec![self.start],
            n => {
                let step = (self.stop - self.start) / (n - 1) as f64;
                (0..n).map(|i| self.start + step * i as f64).collect()
            }
        }
    }
}
