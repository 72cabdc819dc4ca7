//! Stress of a layout against the titer-derived target distances.
//!
//! Every antigen-serum cell holding a measured titer becomes one target:
//! `target = column_basis[serum] - (logged_titer + avidity_adjust[antigen])`,
//! in log2 units relative to a 1:10 titer. A regular titer contributes
//! `|d - target|^p`. A `>` titer contributes only while `d < target` and a `<`
//! titer only while `d > target`. Don't-care cells never contribute.

use crate::core::models::column_bases::ColumnBases;
use crate::core::models::error::ModelError;
use crate::core::models::layout::{Layout, euclidean as distance};
use crate::core::models::titer::Titer;
use crate::core::models::titers::TiterMatrix;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressParameters {
    pub exponent: f64,
}

impl Default for StressParameters {
    fn default() -> Self {
        Self { exponent: 2.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Regular,
    LessThan,
    MoreThan,
}

#[derive(Debug, Clone, Copy)]
struct Target {
    antigen_point: usize,
    serum_point: usize,
    distance: f64,
    kind: TargetKind,
}

#[derive(Debug, Clone)]
pub struct Stress {
    number_of_points: usize,
    targets: Vec<Target>,
    by_point: Vec<Vec<usize>>,
    disconnected: Vec<bool>,
    auto_disconnected: Vec<usize>,
    exponent: f64,
}

impl Stress {
    pub fn new(
        titers: &TiterMatrix,
        column_bases: &ColumnBases,
        avidity_adjusts: Option<&[f64]>,
        disconnected: &BTreeSet<usize>,
        parameters: StressParameters,
    ) -> Result<Self, ModelError> {
        let number_of_antigens = titers.number_of_antigens();
        let number_of_sera = titers.number_of_sera();
        let number_of_points = number_of_antigens + number_of_sera;
        if column_bases.len() != number_of_sera {
            return Err(ModelError::ColumnBasesLength {
                expected: number_of_sera,
                actual: column_bases.len(),
            });
        }
        if let Some(adjusts) = avidity_adjusts {
            if adjusts.len() != number_of_antigens {
                return Err(ModelError::Shape(format!(
                    "{} avidity adjust(s) for {} antigen(s)",
                    adjusts.len(),
                    number_of_antigens
                )));
            }
        }

        let mut is_disconnected = vec![false; number_of_points];
        for &point_no in disconnected {
            if point_no < number_of_points {
                is_disconnected[point_no] = true;
            }
        }

        // A point with no regular titer to any connected partner cannot be
        // positioned. Decided in one pass over the explicit set.
        let mut has_regular = vec![false; number_of_points];
        for (ag, sr, titer) in titers.iter_measured() {
            let sr_point = number_of_antigens + sr;
            if titer.is_regular() && !is_disconnected[ag] && !is_disconnected[sr_point] {
                has_regular[ag] = true;
                has_regular[sr_point] = true;
            }
        }
        let auto_disconnected: Vec<usize> = (0..number_of_points)
            .filter(|&p| !is_disconnected[p] && !has_regular[p])
            .collect();
        for &p in &auto_disconnected {
            is_disconnected[p] = true;
        }

        let mut targets = Vec::new();
        let mut by_point = vec![Vec::new(); number_of_points];
        for (ag, sr, titer) in titers.iter_measured() {
            let sr_point = number_of_antigens + sr;
            if is_disconnected[ag] || is_disconnected[sr_point] {
                continue;
            }
            let Some(logged) = titer.logged_with_thresholded() else {
                continue;
            };
            let adjust = avidity_adjusts.map_or(0.0, |a| a[ag]);
            let kind = match titer {
                Titer::Regular(_) => TargetKind::Regular,
                Titer::LessThan(_) => TargetKind::LessThan,
                Titer::MoreThan(_) => TargetKind::MoreThan,
                Titer::DontCare => continue,
            };
            let index = targets.len();
            targets.push(Target {
                antigen_point: ag,
                serum_point: sr_point,
                distance: column_bases.data()[sr] - (logged + adjust),
                kind,
            });
            by_point[ag].push(index);
            by_point[sr_point].push(index);
        }

        debug!(
            targets = targets.len(),
            auto_disconnected = auto_disconnected.len(),
            "Stress targets prepared."
        );

        Ok(Self {
            number_of_points,
            targets,
            by_point,
            disconnected: is_disconnected,
            auto_disconnected,
            exponent: parameters.exponent,
        })
    }

    #[inline]
    pub fn number_of_points(&self) -> usize {
        self.number_of_points
    }

    pub fn number_of_targets(&self) -> usize {
        self.targets.len()
    }

    /// Points without a regular titer to a connected partner.
    pub fn auto_disconnected(&self) -> &[usize] {
        &self.auto_disconnected
    }

    /// Explicitly and automatically disconnected points.
    pub fn disconnected_points(&self) -> Vec<usize> {
        (0..self.number_of_points)
            .filter(|&p| self.disconnected[p])
            .collect()
    }

    #[inline]
    pub fn is_disconnected(&self, point_no: usize) -> bool {
        self.disconnected.get(point_no).copied().unwrap_or(true)
    }

    /// Largest target distance, at least 1.
    pub fn max_target_distance(&self) -> f64 {
        self.targets
            .iter()
            .map(|t| t.distance)
            .fold(1.0, f64::max)
    }

    pub fn value(&self, layout: &Layout) -> f64 {
        self.evaluate(layout.coordinates(), layout.number_of_dimensions(), None)
    }

    /// Fills `gradient` (same length as the layout's coordinates) and returns the stress.
    pub fn value_and_gradient(&self, layout: &Layout, gradient: &mut [f64]) -> f64 {
        self.evaluate(
            layout.coordinates(),
            layout.number_of_dimensions(),
            Some(gradient),
        )
    }

    pub(crate) fn evaluate(
        &self,
        coordinates: &[f64],
        dims: usize,
        mut gradient: Option<&mut [f64]>,
    ) -> f64 {
        if let Some(g) = gradient.as_deref_mut() {
            g.fill(0.0);
        }
        let mut total = 0.0;
        for target in &self.targets {
            let a = &coordinates[target.antigen_point * dims..(target.antigen_point + 1) * dims];
            let s = &coordinates[target.serum_point * dims..(target.serum_point + 1) * dims];
            let d = distance(a, s);
            if d.is_nan() {
                continue;
            }
            total += self.term(target, d);
            if let Some(g) = gradient.as_deref_mut() {
                let dterm = self.term_derivative(target, d);
                if dterm != 0.0 && d > 0.0 {
                    for dim in 0..dims {
                        let component = dterm * (a[dim] - s[dim]) / d;
                        g[target.antigen_point * dims + dim] += component;
                        g[target.serum_point * dims + dim] -= component;
                    }
                }
            }
        }
        total
    }

    /// Sum of the terms touching `point_no` with that point placed at `coordinates`.
    pub fn point_contribution(&self, layout: &Layout, point_no: usize, coordinates: &[f64]) -> f64 {
        self.point_contribution_and_gradient(layout, point_no, coordinates, None)
    }

    pub fn point_contribution_and_gradient(
        &self,
        layout: &Layout,
        point_no: usize,
        coordinates: &[f64],
        mut gradient: Option<&mut [f64]>,
    ) -> f64 {
        if let Some(g) = gradient.as_deref_mut() {
            g.fill(0.0);
        }
        let Some(indexes) = self.by_point.get(point_no) else {
            return 0.0;
        };
        let mut total = 0.0;
        for &index in indexes {
            let target = &self.targets[index];
            let partner = if target.antigen_point == point_no {
                target.serum_point
            } else {
                target.antigen_point
            };
            let other = layout.point(partner);
            let d = distance(coordinates, other);
            if d.is_nan() {
                continue;
            }
            total += self.term(target, d);
            if let Some(g) = gradient.as_deref_mut() {
                let dterm = self.term_derivative(target, d);
                if dterm != 0.0 && d > 0.0 {
                    for (dim, slot) in g.iter_mut().enumerate() {
                        *slot += dterm * (coordinates[dim] - other[dim]) / d;
                    }
                }
            }
        }
        total
    }

    #[inline]
    fn term(&self, target: &Target, d: f64) -> f64 {
        let diff = d - target.distance;
        let active = match target.kind {
            TargetKind::Regular => true,
            TargetKind::MoreThan => diff < 0.0,
            TargetKind::LessThan => diff > 0.0,
        };
        if !active {
            0.0
        } else if self.exponent == 2.0 {
            diff * diff
        } else {
            diff.abs().powf(self.exponent)
        }
    }

    /// Derivative of the term with respect to the distance.
    #[inline]
    fn term_derivative(&self, target: &Target, d: f64) -> f64 {
        let diff = d - target.distance;
        let active = match target.kind {
            TargetKind::Regular => true,
            TargetKind::MoreThan => diff < 0.0,
            TargetKind::LessThan => diff > 0.0,
        };
        if !active {
            0.0
        } else if self.exponent == 2.0 {
            2.0 * diff
        } else {
            self.exponent * diff.abs().powf(self.exponent - 1.0) * diff.signum()
        }
    }
}
