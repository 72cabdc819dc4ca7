use crate::core::common::{CommonAntigensSera, MatchLevel};
use crate::core::models::chart::Chart;
use crate::core::utils::geometry::{ProcrustesData, procrustes};
use crate::engine::error::EngineError;
use tracing::{info, instrument};

/// Rotates and translates a projection so that it displays in the frame of
/// the first projection of `master`. Antigens and sera are matched strictly;
/// the layout itself is untouched and only the transformation is replaced.
#[instrument(skip_all, name = "orient_workflow", fields(projection_no = projection_no))]
pub fn orient_to(
    chart: &mut Chart,
    master: &Chart,
    projection_no: usize,
) -> Result<ProcrustesData, EngineError> {
    let common = CommonAntigensSera::new(master, chart, MatchLevel::Strict);
    let target = master.projection(0)?.transformed_layout();
    let projection = chart.projection_mut(projection_no)?;
    let data = procrustes(&target, projection.layout(), &common.points(), false)?;
    projection.set_transformation(data.transformation.clone())?;
    info!(
        pairs = data.number_of_pairs,
        rms = data.rms,
        "Projection oriented to master."
    );
    Ok(data)
}
