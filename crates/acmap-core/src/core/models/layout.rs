use super::error::{ModelError, check_index};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Point coordinates of a map, antigens first then sera.
///
/// Coordinates are stored row-major (`point * dimensions + dim`). A point
/// with any NaN coordinate is not positioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    number_of_dimensions: usize,
    coordinates: Vec<f64>,
}

impl Layout {
    /// Creates a layout with every point unpositioned.
    pub fn new(number_of_points: usize, number_of_dimensions: usize) -> Self {
        Self {
            number_of_dimensions,
            coordinates: vec![f64::NAN; number_of_points * number_of_dimensions],
        }
    }

    pub fn from_points(points: &[Vec<f64>], number_of_dimensions: usize) -> Result<Self, ModelError> {
        let mut coordinates = Vec::with_capacity(points.len() * number_of_dimensions);
        for point in points {
            if point.len() != number_of_dimensions {
                return Err(ModelError::DimensionMismatch {
                    expected: number_of_dimensions,
                    actual: point.len(),
                });
            }
            coordinates.extend_from_slice(point);
        }
        Ok(Self {
            number_of_dimensions,
            coordinates,
        })
    }

    pub(crate) fn from_flat(coordinates: Vec<f64>, number_of_dimensions: usize) -> Self {
        debug_assert!(number_of_dimensions > 0 && coordinates.len() % number_of_dimensions == 0);
        Self {
            number_of_dimensions,
            coordinates,
        }
    }

    #[inline]
    pub fn number_of_points(&self) -> usize {
        if self.number_of_dimensions == 0 {
            0
        } else {
            self.coordinates.len() / self.number_of_dimensions
        }
    }

    #[inline]
    pub fn number_of_dimensions(&self) -> usize {
        self.number_of_dimensions
    }

    #[inline]
    pub fn point(&self, point_no: usize) -> &[f64] {
        let start = point_no * self.number_of_dimensions;
        &self.coordinates[start..start + self.number_of_dimensions]
    }

    #[inline]
    pub(crate) fn point_mut(&mut self, point_no: usize) -> &mut [f64] {
        let start = point_no * self.number_of_dimensions;
        &mut self.coordinates[start..start + self.number_of_dimensions]
    }

    pub fn get(&self, point_no: usize) -> Result<&[f64], ModelError> {
        check_index("point", point_no, self.number_of_points())?;
        Ok(self.point(point_no))
    }

    pub fn set_point(&mut self, point_no: usize, coordinates: &[f64]) -> Result<(), ModelError> {
        check_index("point", point_no, self.number_of_points())?;
        if coordinates.len() != self.number_of_dimensions {
            return Err(ModelError::DimensionMismatch {
                expected: self.number_of_dimensions,
                actual: coordinates.len(),
            });
        }
        self.point_mut(point_no).copy_from_slice(coordinates);
        Ok(())
    }

    pub fn unset_point(&mut self, point_no: usize) -> Result<(), ModelError> {
        check_index("point", point_no, self.number_of_points())?;
        self.point_mut(point_no).fill(f64::NAN);
        Ok(())
    }

    #[inline]
    pub fn is_positioned(&self, point_no: usize) -> bool {
        self.point(point_no).iter().all(|c| c.is_finite())
    }

    /// Euclidean distance, `None` if either point is not positioned.
    pub fn distance(&self, p1: usize, p2: usize) -> Option<f64> {
        if !self.is_positioned(p1) || !self.is_positioned(p2) {
            return None;
        }
        Some(euclidean(self.point(p1), self.point(p2)))
    }

    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    pub(crate) fn coordinates_mut(&mut self) -> &mut [f64] {
        &mut self.coordinates
    }

    pub fn as_vec_of_vecs(&self) -> Vec<Vec<f64>> {
        (0..self.number_of_points())
            .map(|p| self.point(p).to_vec())
            .collect()
    }

    /// Axis-aligned bounding box of positioned points.
    pub fn bounding_box(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let mut min = vec![f64::INFINITY; self.number_of_dimensions];
        let mut max = vec![f64::NEG_INFINITY; self.number_of_dimensions];
        let mut any = false;
        for p in (0..self.number_of_points()).filter(|&p| self.is_positioned(p)) {
            any = true;
            for (dim, &c) in self.point(p).iter().enumerate() {
                min[dim] = min[dim].min(c);
                max[dim] = max[dim].max(c);
            }
        }
        any.then_some((min, max))
    }

    pub fn transformed(&self, transformation: &Transformation) -> Layout {
        let mut result = self.clone();
        for p in 0..self.number_of_points() {
            if self.is_positioned(p) {
                let moved = transformation.apply(self.point(p));
                result.point_mut(p).copy_from_slice(&moved);
            }
        }
        result
    }

    /// Removes points by index; indexes may come in any order.
    pub fn remove_points(&mut self, points: &[usize]) {
        let dims = self.number_of_dimensions;
        let kept: Vec<f64> = (0..self.number_of_points())
            .filter(|p| !points.contains(p))
            .flat_map(|p| self.point(p).to_vec())
            .collect();
        debug_assert_eq!(kept.len() % dims.max(1), 0);
        self.coordinates = kept;
    }

    /// Inserts unpositioned points before `before` (which may equal the point count).
    pub(crate) fn insert_unpositioned(&mut self, before: usize, count: usize) {
        let start = before * self.number_of_dimensions;
        self.coordinates.splice(
            start..start,
            std::iter::repeat_n(f64::NAN, count * self.number_of_dimensions),
        );
    }
}

#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// `x -> scale * R x + t`, used for display and comparison only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    rotation: DMatrix<f64>,
    translation: DVector<f64>,
    scale: f64,
}

impl Transformation {
    pub fn identity(number_of_dimensions: usize) -> Self {
        Self {
            rotation: DMatrix::identity(number_of_dimensions, number_of_dimensions),
            translation: DVector::zeros(number_of_dimensions),
            scale: 1.0,
        }
    }

    pub fn new(rotation: DMatrix<f64>, translation: DVector<f64>, scale: f64) -> Self {
        debug_assert!(rotation.is_square() && rotation.nrows() == translation.len());
        Self {
            rotation,
            translation,
            scale,
        }
    }

    #[inline]
    pub fn number_of_dimensions(&self) -> usize {
        self.translation.len()
    }

    pub fn rotation(&self) -> &DMatrix<f64> {
        &self.rotation
    }

    pub fn translation(&self) -> &DVector<f64> {
        &self.translation
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn apply(&self, point: &[f64]) -> Vec<f64> {
        let v = DVector::from_column_slice(point);
        let moved = &self.rotation * v * self.scale + &self.translation;
        moved.iter().copied().collect()
    }

    pub fn is_identity(&self, tolerance: f64) -> bool {
        let n = self.number_of_dimensions();
        (&self.rotation - DMatrix::<f64>::identity(n, n)).amax() <= tolerance
            && self.translation.amax() <= tolerance
            && (self.scale - 1.0).abs() <= tolerance
    }
}

impl std::fmt::Display for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rows: Vec<String> = self
            .rotation
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|v| format!("{:.6}", v))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect();
        write!(
            f,
            "Transformation([{}], scale: {:.6}, translation: [{}])",
            rows.join("; "),
            self.scale,
            self.translation
                .iter()
                .map(|v| format!("{:.6}", v))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
