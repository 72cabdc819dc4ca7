use super::config::{DimensionAnnealing, Precision};
use super::minimizer::{MinimizerOutcome, MinimizerSettings, Objective, minimize};
use super::utils::sampling;
use crate::core::models::layout::Layout;
use crate::core::stress::Stress;
use nalgebra::DMatrix;
use std::collections::BTreeSet;
use tracing::{instrument, trace};

/// Stress as a function of the coordinates of the free points only.
struct LayoutObjective<'a> {
    stress: &'a Stress,
    template: Vec<f64>,
    variables: Vec<usize>,
    dims: usize,
}

impl<'a> LayoutObjective<'a> {
    fn new(stress: &'a Stress, layout: &Layout, unmovable: &BTreeSet<usize>) -> Self {
        let dims = layout.number_of_dimensions();
        let variables = (0..layout.number_of_points())
            .filter(|&p| {
                !stress.is_disconnected(p) && !unmovable.contains(&p) && layout.is_positioned(p)
            })
            .flat_map(|p| p * dims..(p + 1) * dims)
            .collect();
        Self {
            stress,
            template: layout.coordinates().to_vec(),
            variables,
            dims,
        }
    }

    fn start(&self) -> Vec<f64> {
        self.variables.iter().map(|&i| self.template[i]).collect()
    }

    fn scatter(&self, x: &[f64], coordinates: &mut [f64]) {
        for (&index, &value) in self.variables.iter().zip(x) {
            coordinates[index] = value;
        }
    }
}

impl Objective for LayoutObjective<'_> {
    fn value_and_gradient(&self, x: &[f64], gradient: &mut [f64]) -> f64 {
        let mut coordinates = self.template.clone();
        self.scatter(x, &mut coordinates);
        let mut full_gradient = vec![0.0; coordinates.len()];
        let value = self
            .stress
            .evaluate(&coordinates, self.dims, Some(&mut full_gradient));
        for (slot, &index) in gradient.iter_mut().zip(&self.variables) {
            *slot = full_gradient[index];
        }
        value
    }
}

struct PointObjective<'a> {
    stress: &'a Stress,
    layout: &'a Layout,
    point_no: usize,
}

impl Objective for PointObjective<'_> {
    fn value_and_gradient(&self, x: &[f64], gradient: &mut [f64]) -> f64 {
        self.stress
            .point_contribution_and_gradient(self.layout, self.point_no, x, Some(gradient))
    }
}

/// Minimizes stress in place over positioned, connected points that are not
/// `unmovable`. Everything else keeps its coordinates.
pub fn minimize_layout(
    stress: &Stress,
    layout: &mut Layout,
    unmovable: &BTreeSet<usize>,
    precision: Precision,
) -> MinimizerOutcome {
    let objective = LayoutObjective::new(stress, layout, unmovable);
    let mut x = objective.start();
    let outcome = minimize(
        &objective,
        &mut x,
        &MinimizerSettings::for_precision(precision),
    );
    objective.scatter(&x, layout.coordinates_mut());
    outcome
}

/// One optimized layout with the stress it reached.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub attempt: usize,
    pub layout: Layout,
    pub stress: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Optimizes from a random start seeded with `seed + attempt`.
///
/// The start box side is the largest target distance. With annealing the
/// start is drawn in more dimensions and reduced one principal axis at a
/// time, re-minimizing after each reduction.
#[instrument(level = "debug", skip_all, fields(attempt = attempt))]
pub fn optimize_random_start(
    stress: &Stress,
    number_of_dimensions: usize,
    annealing: DimensionAnnealing,
    precision: Precision,
    seed: u64,
    attempt: usize,
) -> AttemptResult {
    let mut rng = sampling::attempt_rng(seed, attempt);
    let start_dimensions = annealing.start_dimensions(number_of_dimensions);
    let mut layout = sampling::random_layout(
        stress.number_of_points(),
        start_dimensions,
        stress.max_target_distance(),
        |p| stress.is_disconnected(p),
        &mut rng,
    );

    let frozen = BTreeSet::new();
    let mut outcome = minimize_layout(stress, &mut layout, &frozen, precision);
    let mut iterations = outcome.iterations;
    while layout.number_of_dimensions() > number_of_dimensions {
        layout = reduce_dimensions(&layout, layout.number_of_dimensions() - 1);
        outcome = minimize_layout(stress, &mut layout, &frozen, precision);
        iterations += outcome.iterations;
    }

    let value = stress.value(&layout);
    trace!(attempt, stress = value, iterations, "Random start optimized.");
    AttemptResult {
        attempt,
        layout,
        stress: value,
        iterations,
        converged: outcome.converged,
    }
}

/// Projects positioned points onto the leading `number_of_dimensions`
/// principal axes of the layout.
pub fn reduce_dimensions(layout: &Layout, number_of_dimensions: usize) -> Layout {
    let dims = layout.number_of_dimensions();
    if number_of_dimensions >= dims {
        return layout.clone();
    }
    let n = layout.number_of_points();
    let mut reduced = Layout::new(n, number_of_dimensions);
    let positioned: Vec<usize> = (0..n).filter(|&p| layout.is_positioned(p)).collect();
    if positioned.is_empty() {
        return reduced;
    }

    let m = positioned.len();
    let mut centered = DMatrix::from_fn(m, dims, |r, c| layout.point(positioned[r])[c]);
    for c in 0..dims {
        let mean = centered.column(c).mean();
        centered.column_mut(c).add_scalar_mut(-mean);
    }

    let svd = centered.clone().svd(false, true);
    let Some(v_t) = svd.v_t.as_ref() else {
        for &p in &positioned {
            reduced
                .point_mut(p)
                .copy_from_slice(&layout.point(p)[..number_of_dimensions]);
        }
        return reduced;
    };
    let mut axes: Vec<usize> = (0..svd.singular_values.len()).collect();
    axes.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));

    for (row, &p) in positioned.iter().enumerate() {
        for (axis, slot) in reduced.point_mut(p).iter_mut().enumerate() {
            *slot = axes.get(axis).map_or(0.0, |&k| {
                (0..dims).map(|c| centered[(row, c)] * v_t[(k, c)]).sum()
            });
        }
    }
    reduced
}

/// Moves one point from `start` to the nearest minimum of its stress
/// contribution, all other points fixed. Returns the coordinates and the
/// contribution there.
pub fn relax_point(
    stress: &Stress,
    layout: &Layout,
    point_no: usize,
    start: &[f64],
    precision: Precision,
) -> (Vec<f64>, f64) {
    let objective = PointObjective {
        stress,
        layout,
        point_no,
    };
    let mut x = start.to_vec();
    let outcome = minimize(
        &objective,
        &mut x,
        &MinimizerSettings::for_precision(precision),
    );
    (x, outcome.value)
}
