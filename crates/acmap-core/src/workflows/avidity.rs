use super::relax::{RelaxReport, relax_with_adjusts};
use crate::core::models::chart::Chart;
use crate::core::models::error::ModelError;
use crate::engine::avidity::{AvidityBase, AvidityResults, PerAdjust, test_antigens};
use crate::engine::config::{AVIDITY_RELAX_OPTIMIZATIONS, AviditySettings, Precision, RelaxConfigBuilder};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{debug, info, instrument};

/// Avidity sweep for every antigen that is connected and positioned in the
/// projection.
#[instrument(skip_all, name = "avidity_workflow", fields(projection_no = projection_no))]
pub fn test(
    chart: &Chart,
    projection_no: usize,
    settings: &AviditySettings,
    reporter: &ProgressReporter,
) -> Result<AvidityResults, EngineError> {
    let projection = chart.projection(projection_no)?;
    let antigens: Vec<usize> = (0..chart.number_of_antigens())
        .filter(|&ag| !projection.is_disconnected(ag) && projection.layout().is_positioned(ag))
        .collect();
    debug!(
        testable = antigens.len(),
        skipped = chart.number_of_antigens() - antigens.len(),
        "Antigens selected for avidity test."
    );

    let results = reporter.phase("Avidity Test", || {
        test_antigens(chart, projection, &antigens, settings)
    })?;
    info!(antigens = results.len(), "Avidity test finished.");
    Ok(results)
}

/// Evaluates a single antigen at a single adjust. With
/// `add_new_projection_to_chart` the relaxed map is appended with the adjust
/// recorded in its avidity adjusts.
pub fn test_single(
    chart: &mut Chart,
    projection_no: usize,
    antigen_no: usize,
    logged_adjust: f64,
    add_new_projection_to_chart: bool,
    precision: Precision,
) -> Result<PerAdjust, EngineError> {
    let (per_adjust, relaxed, mut projection) = {
        let source = chart.projection(projection_no)?;
        let base = AvidityBase::new(chart, source, precision)?;
        base.check_testable(antigen_no)?;
        let (per_adjust, relaxed) = base.test_adjust(antigen_no, logged_adjust)?;
        (per_adjust, relaxed, source.clone())
    };

    if add_new_projection_to_chart {
        let mut adjusts = projection
            .avidity_adjusts()
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![0.0; chart.number_of_antigens()]);
        adjusts[antigen_no] += logged_adjust;
        projection.set_layout(relaxed);
        projection.set_avidity_adjusts(Some(adjusts));
        projection.set_comment(format!("avidity AG {} {:+}", antigen_no, logged_adjust));
        let added = chart.add_projection(projection);
        debug!(projection_no = added, "Avidity test projection added.");
    }
    Ok(per_adjust)
}

/// Copies the projection with every tested antigen moved to the final
/// coordinates of its best adjust and appends it. Returns the new number.
pub fn move_antigens(
    chart: &mut Chart,
    projection_no: usize,
    results: &AvidityResults,
) -> Result<usize, EngineError> {
    let mut projection = chart.projection(projection_no)?.clone();
    let mut moved = 0;
    for result in results {
        if let Some(best) = result.best_adjust() {
            projection
                .layout_mut()
                .set_point(result.antigen_no, &best.final_coordinates)?;
            moved += 1;
        }
    }
    projection.set_comment("avidity-moved");
    let added = chart.add_projection(projection);
    info!(moved, projection_no = added, "Antigens moved by avidity results.");
    Ok(added)
}

/// Relax from random starts with per-antigen logged avidity adjusts. A
/// missing or zero optimization count means 100. Projections are sorted.
pub fn relax(
    chart: &mut Chart,
    config: RelaxConfigBuilder,
    logged_adjusts: &[f64],
    reporter: &ProgressReporter,
) -> Result<RelaxReport, EngineError> {
    if logged_adjusts.len() != chart.number_of_antigens() {
        return Err(ModelError::Shape(format!(
            "{} avidity adjust(s) for {} antigen(s)",
            logged_adjusts.len(),
            chart.number_of_antigens()
        ))
        .into());
    }
    let config = config
        .fallback_optimizations(AVIDITY_RELAX_OPTIMIZATIONS)
        .build()?;
    reporter.report(Progress::Message(format!(
        "avidity relax with {} optimization(s)",
        config.number_of_optimizations
    )));
    relax_with_adjusts(chart, &config, Some(logged_adjusts.to_vec()), reporter)
}
