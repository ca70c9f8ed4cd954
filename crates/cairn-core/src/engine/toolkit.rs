//! Defines the seam for structure generation and coordinate analysis.

use crate::core::models::geometry::{Geometry, Linspace, VariableTemplate, ZMatrix};
use crate::core::models::key::{CoordName, SpeciesId};
use std::collections::BTreeMap;
use thiserror::Error;

/// The sampling interval for each free coordinate.
pub type SamplingRanges = BTreeMap<CoordName, (f64, f64)>;

#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("unknown species identity '{identity}'")]
    UnknownIdentity { identity: String },
    #[error("cannot build internal coordinates: {detail}")]
    InternalCoordinates { detail: String },
    #[error("I/O failure in the geometry toolkit: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces and analyzes molecular structures.
///
/// Workflows are generic over this trait: how starting geometries are
/// obtained, which coordinates count as free, and how structures are drawn
/// from the sampling ranges are all decisions of the implementation.
pub trait GeometryToolkit {
    /// Resolves a species identity to a starting Cartesian geometry.
    fn geometry_from_identity(&self, identity: &SpeciesId) -> Result<Geometry, ToolkitError>;

    /// Expresses a geometry in internal coordinates.
    fn internal_coordinates(&self, geometry: &Geometry) -> Result<ZMatrix, ToolkitError>;

    /// Derives the symbolic coordinate template of a geometry.
    fn symbolic_template(&self, geometry: &Geometry) -> Result<VariableTemplate, ToolkitError> {
        Ok(self.internal_coordinates(geometry)?.template().clone())
    }

    /// Names the freely rotatable coordinates of a geometry.
    ///
    /// An empty list means the species has nothing to sample over.
    fn free_coordinate_names(&self, geometry: &Geometry) -> Result<Vec<CoordName>, ToolkitError>;

    /// Assigns a sampling interval to each of the named coordinates.
    fn sampling_ranges(&self, zmatrix: &ZMatrix, names: &[CoordName]) -> SamplingRanges;

    /// Draws `count` structures with the named coordinates varied uniformly
    /// inside their ranges.
    fn sample_structures(
        &self,
        zmatrix: &ZMatrix,
        count: usize,
        ranges: &SamplingRanges,
    ) -> Vec<ZMatrix>;

    /// Lays out a scan grid over each of the named coordinates.
    fn grid_points(
        &self,
        zmatrix: &ZMatrix,
        names: &[CoordName],
        increment: f64,
    ) -> BTreeMap<CoordName, Linspace>;
}
