use crate::core::models::chart::Chart;
use crate::core::models::layout::Layout;
use crate::core::models::projection::Projection;
use crate::engine::config::{IncrementalRelaxConfig, Precision, RelaxConfig};
use crate::engine::error::EngineError;
use crate::engine::minimizer::MinimizerOutcome;
use crate::engine::optimizer::{AttemptResult, minimize_layout, optimize_random_start};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::utils::{pool, sampling};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};

/// Stresses of the projections a relax added, best first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RelaxReport {
    pub stresses: Vec<f64>,
    pub converged: usize,
}

impl RelaxReport {
    pub fn best_stress(&self) -> Option<f64> {
        self.stresses.first().copied()
    }

    pub fn number_of_projections(&self) -> usize {
        self.stresses.len()
    }
}

/// Makes `number_of_optimizations` maps from random starts and adds them to
/// the chart. Chart projections are re-sorted by stress afterwards.
#[instrument(skip_all, name = "relax_workflow", fields(
    dims = config.number_of_dimensions,
    optimizations = config.number_of_optimizations
))]
pub fn relax(
    chart: &mut Chart,
    config: &RelaxConfig,
    reporter: &ProgressReporter,
) -> Result<RelaxReport, EngineError> {
    relax_with_adjusts(chart, config, None, reporter)
}

pub(crate) fn relax_with_adjusts(
    chart: &mut Chart,
    config: &RelaxConfig,
    avidity_adjusts: Option<Vec<f64>>,
    reporter: &ProgressReporter,
) -> Result<RelaxReport, EngineError> {
    let mut template = Projection::new(
        Layout::new(chart.number_of_points(), config.number_of_dimensions),
        config.minimum_column_basis,
    );
    template.disconnect(config.disconnected.iter().copied())?;
    template.set_avidity_adjusts(avidity_adjusts);
    let stress = chart.stress_for(&template)?;
    info!(
        points = chart.number_of_points(),
        targets = stress.number_of_targets(),
        "Starting relax."
    );

    reporter.report(Progress::PhaseStart { name: "Relax" });
    reporter.report(Progress::TaskStart {
        total_steps: config.number_of_optimizations as u64,
    });
    let mut attempts = pool::map_indexed(config.number_of_optimizations, config.threads, |attempt| {
        let result = optimize_random_start(
            &stress,
            config.number_of_dimensions,
            config.dimension_annealing,
            config.precision,
            config.seed,
            attempt,
        );
        reporter.report(Progress::TaskIncrement);
        result
    })?;
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    sort_attempts(&mut attempts);
    let report = RelaxReport {
        stresses: attempts.iter().map(|a| a.stress).collect(),
        converged: attempts.iter().filter(|a| a.converged).count(),
    };
    for attempt in attempts {
        let mut projection = template.clone();
        projection.set_layout(attempt.layout);
        projection.set_stress(attempt.stress);
        chart.add_projection(projection);
    }
    chart.sort_projections()?;

    info!(
        best = report.best_stress(),
        converged = report.converged,
        "Relax finished."
    );
    Ok(report)
}

/// Ascending stress, attempt order on ties.
fn sort_attempts(attempts: &mut [AttemptResult]) {
    attempts.sort_by(|a, b| {
        a.stress
            .total_cmp(&b.stress)
            .then(a.attempt.cmp(&b.attempt))
    });
}

/// Re-optimizes a projection starting from its layout.
///
/// Each attempt places unpositioned connected points randomly, jitters the
/// movable ones and minimizes. With `unmovable_non_nan_points` every point
/// positioned in the source stays put.
#[instrument(skip_all, name = "incremental_relax_workflow", fields(projection_no = projection_no))]
pub fn relax_incremental(
    chart: &mut Chart,
    projection_no: usize,
    config: &IncrementalRelaxConfig,
    reporter: &ProgressReporter,
) -> Result<RelaxReport, EngineError> {
    config.validate()?;
    let source = chart.projection(projection_no)?.clone();
    let stress = chart.stress_for(&source)?;

    let mut frozen: BTreeSet<usize> = source.unmovable().clone();
    if config.unmovable_non_nan_points {
        frozen.extend((0..source.number_of_points()).filter(|&p| source.layout().is_positioned(p)));
    }
    let side = stress.max_target_distance();

    reporter.report(Progress::PhaseStart {
        name: "Incremental Relax",
    });
    reporter.report(Progress::TaskStart {
        total_steps: config.number_of_optimizations as u64,
    });
    let mut attempts = pool::map_indexed(config.number_of_optimizations, config.threads, |attempt| {
        let mut rng = sampling::attempt_rng(config.seed, attempt);
        let mut layout = source.layout().clone();
        let placed =
            sampling::randomize_unpositioned(&mut layout, side, |p| stress.is_disconnected(p), &mut rng);
        sampling::jitter(
            &mut layout,
            config.jitter,
            |p| !frozen.contains(&p) && !stress.is_disconnected(p),
            &mut rng,
        );
        let outcome = minimize_layout(&stress, &mut layout, &frozen, config.precision);
        debug!(attempt, placed, iterations = outcome.iterations, "Incremental attempt done.");
        reporter.report(Progress::TaskIncrement);
        AttemptResult {
            attempt,
            stress: stress.value(&layout),
            layout,
            iterations: outcome.iterations,
            converged: outcome.converged,
        }
    })?;
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    if config.remove_source_projection {
        chart.projections_mut().remove(projection_no)?;
    }
    sort_attempts(&mut attempts);
    let report = RelaxReport {
        stresses: attempts.iter().map(|a| a.stress).collect(),
        converged: attempts.iter().filter(|a| a.converged).count(),
    };
    for attempt in attempts {
        let mut projection = source.clone();
        projection.set_layout(attempt.layout);
        projection.set_stress(attempt.stress);
        chart.add_projection(projection);
    }
    chart.sort_projections()?;
    info!(best = report.best_stress(), "Incremental relax finished.");
    Ok(report)
}

/// Minimizes an existing projection in place, honouring its unmovable and
/// disconnected points.
pub fn relax_projection(
    chart: &mut Chart,
    projection_no: usize,
    precision: Precision,
) -> Result<MinimizerOutcome, EngineError> {
    let stress = chart.stress_for(chart.projection(projection_no)?)?;
    let projection = chart.projection_mut(projection_no)?;
    let unmovable = projection.unmovable().clone();
    let outcome = minimize_layout(&stress, projection.layout_mut(), &unmovable, precision);
    projection.set_stress(stress.value(projection.layout()));
    Ok(outcome)
}
