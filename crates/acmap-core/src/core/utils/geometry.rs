use crate::core::models::layout::{Layout, Transformation, euclidean};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProcrustesError {
    #[error(
        "Procrustes is under-determined: {available} matched point pair(s) positioned in both layouts, at least {required} required"
    )]
    UnderDetermined { required: usize, available: usize },

    #[error("Procrustes dimension mismatch: primary has {primary}, secondary has {secondary}")]
    DimensionMismatch { primary: usize, secondary: usize },

    #[error("Matched point {point} is out of range (layout has {count} point(s))")]
    PointOutOfRange { point: usize, count: usize },

    #[error("Singular value decomposition failed")]
    Decomposition,
}

/// Result of superimposing a secondary layout onto a primary one.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcrustesData {
    /// Maps secondary coordinates onto the primary layout.
    pub transformation: Transformation,
    pub rms: f64,
    /// Matched pairs positioned in both layouts.
    pub number_of_pairs: usize,
}

impl ProcrustesData {
    pub fn transform_secondary(&self, secondary: &Layout) -> Layout {
        secondary.transformed(&self.transformation)
    }

    /// Per-pair distances after superimposition, `None` where either point
    /// is not positioned.
    pub fn distances(
        &self,
        primary: &Layout,
        secondary: &Layout,
        matched_points: &[(usize, usize)],
    ) -> Vec<Option<f64>> {
        let moved = self.transform_secondary(secondary);
        matched_points
            .iter()
            .map(|&(p, s)| {
                (p < primary.number_of_points()
                    && s < moved.number_of_points()
                    && primary.is_positioned(p)
                    && moved.is_positioned(s))
                .then(|| euclidean(primary.point(p), moved.point(s)))
            })
            .collect()
    }
}

impl fmt::Display for ProcrustesData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "procrustes rms: {:.6} ({} pair(s), scale {:.6})",
            self.rms,
            self.number_of_pairs,
            self.transformation.scale()
        )
    }
}

/// Finds the orthogonal transformation (reflections allowed), translation and,
/// with `scaling`, uniform scale that best maps `secondary` onto `primary`.
///
/// `matched_points` are `(primary point, secondary point)` pairs. Pairs with a
/// point not positioned in either layout are ignored.
pub fn procrustes(
    primary: &Layout,
    secondary: &Layout,
    matched_points: &[(usize, usize)],
    scaling: bool,
) -> Result<ProcrustesData, ProcrustesError> {
    let dims = primary.number_of_dimensions();
    if secondary.number_of_dimensions() != dims {
        return Err(ProcrustesError::DimensionMismatch {
            primary: dims,
            secondary: secondary.number_of_dimensions(),
        });
    }

    let mut pairs = Vec::with_capacity(matched_points.len());
    for &(p, s) in matched_points {
        if p >= primary.number_of_points() {
            return Err(ProcrustesError::PointOutOfRange {
                point: p,
                count: primary.number_of_points(),
            });
        }
        if s >= secondary.number_of_points() {
            return Err(ProcrustesError::PointOutOfRange {
                point: s,
                count: secondary.number_of_points(),
            });
        }
        if primary.is_positioned(p) && secondary.is_positioned(s) {
            pairs.push((p, s));
        }
    }
    if pairs.len() < dims + 1 {
        return Err(ProcrustesError::UnderDetermined {
            required: dims + 1,
            available: pairs.len(),
        });
    }

    let n = pairs.len();
    let to = DMatrix::from_fn(dims, n, |r, c| primary.point(pairs[c].0)[r]);
    let from = DMatrix::from_fn(dims, n, |r, c| secondary.point(pairs[c].1)[r]);

    let to_centroid: DVector<f64> = to.column_mean();
    let from_centroid: DVector<f64> = from.column_mean();
    let centered_to = DMatrix::from_fn(dims, n, |r, c| to[(r, c)] - to_centroid[r]);
    let centered_from = DMatrix::from_fn(dims, n, |r, c| from[(r, c)] - from_centroid[r]);

    let h = &centered_to * centered_from.transpose();
    let svd = h.svd(true, true);
    let u = svd.u.as_ref().ok_or(ProcrustesError::Decomposition)?;
    let v_t = svd.v_t.as_ref().ok_or(ProcrustesError::Decomposition)?;
    let rotation = u * v_t;

    let scale = if scaling {
        let spread = centered_from.norm_squared();
        if spread > 0.0 {
            svd.singular_values.sum() / spread
        } else {
            1.0
        }
    } else {
        1.0
    };
    let translation = &to_centroid - &rotation * &from_centroid * scale;

    let transformation = Transformation::new(rotation, translation, scale);
    let sum_of_squares: f64 = pairs
        .iter()
        .map(|&(p, s)| {
            let moved = transformation.apply(secondary.point(s));
            let d = euclidean(primary.point(p), &moved);
            d * d
        })
        .sum();

    Ok(ProcrustesData {
        transformation,
        rms: (sum_of_squares / n as f64).sqrt(),
        number_of_pairs: n,
    })
}
