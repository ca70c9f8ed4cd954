//! Structure deduplication through Coulomb-matrix eigenvalue spectra, which
//! are invariant under rotation, translation, and atom reordering.

use crate::core::models::geometry::Geometry;
use crate::core::utils::elements;
use nalgebra::DMatrix;
use thiserror::Error;

// Absolute floor so near-zero eigenvalues compare sanely under a purely
// relative tolerance.
const ATOL: f64 = 1.0e-8;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("unknown element symbol '{symbol}' in geometry")]
    UnknownElement { symbol: String },
}

/// The sorted Coulomb-matrix eigenvalue spectrum of one geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint(Vec<f64>);

impl Fingerprint {
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Spectra of different lengths never match; equal-length spectra match
    /// when every eigenvalue pair satisfies `|a - b| <= ATOL + rtol * |b|`.
    pub fn matches(&self, other: &Fingerprint, rtol: f64) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| (a - b).abs() <= ATOL + rtol * b.abs())
    }
}

/// Computes the fingerprint of a geometry. The Coulomb matrix has
/// `0.5 * Z_i^2.4` on the diagonal and `Z_i * Z_j / r_ij` off it.
pub fn coulomb_spectrum(geometry: &Geometry) -> Result<Fingerprint, DedupError> {
    let charges: Vec<f64> = geometry
        .atoms()
        .iter()
        .map(|atom| {
            elements::atomic_number(&atom.symbol)
                .map(f64::from)
                .ok_or_else(|| DedupError::UnknownElement { symbol: atom.symbol.clone() })
        })
        .collect::<Result<_, _>>()?;

    let n = charges.len();
    if n == 0 {
        return Ok(Fingerprint(Vec::new()));
    }
    if n == 1 {
        return Ok(Fingerprint(vec![0.5 * charges[0].powf(2.4)]));
    }

    let mut matrix = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        matrix[(i, i)] = 0.5 * charges[i].powf(2.4);
        for j in 0..i {
            let r = nalgebra::distance(
                &geometry.atoms()[i].position,
                &geometry.atoms()[j].position,
            );
            let value = charges[i] * charges[j] / r;
            matrix[(i, j)] = value;
            matrix[(j, i)] = value;
        }
    }

    let mut values: Vec<f64> = matrix.symmetric_eigen().eigenvalues.iter().copied().collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Fingerprint(values))
}

/// Returns the indices, in input order, of candidates whose spectrum matches
/// neither any seen geometry nor any earlier kept candidate.
pub fn argunique(
    candidates: &[Geometry],
    seen: &[Geometry],
    rtol: f64,
) -> Result<Vec<usize>, DedupError> {
    let seen_prints: Vec<Fingerprint> =
        seen.iter().map(coulomb_spectrum).collect::<Result<_, _>>()?;

    let mut kept_indices = Vec::new();
    let mut kept_prints: Vec<Fingerprint> = Vec::new();
    for (index, candidate) in candidates.iter().enumerate() {
        let print = coulomb_spectrum(candidate)?;
        let duplicate = seen_prints
            .iter()
            .chain(kept_prints.iter())
            .any(|existing| print.matches(existing, rtol));
        if !duplicate {
            kept_indices.push(index);
            kept_prints.push(print);
        }
    }
    Ok(kept_indices)
}
