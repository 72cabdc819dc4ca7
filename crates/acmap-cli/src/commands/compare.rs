use super::point_name;
use crate::cli::CompareArgs;
use crate::config::builder;
use crate::error::{CliError, Result};
use crate::table;
use acmap::core::common::CommonAntigensSera;
use acmap::core::utils::geometry::procrustes;
use acmap::engine::error::EngineError;
use std::path::Path;
use tracing::{info, warn};

pub fn run(args: CompareArgs) -> Result<()> {
    let file = builder::load_file_config(&args.config)?;
    let match_level = builder::match_level(&file, args.match_level.as_deref())?;

    let primary = table::read_chart(&args.primary)?;
    let primary_layout = table::read_layout(&args.primary_layout, &primary)?;
    let secondary = table::read_chart(&args.secondary)?;
    let secondary_layout = table::read_layout(&args.secondary_layout, &secondary)?;

    let common = CommonAntigensSera::new(&primary, &secondary, match_level);
    print!("{}", common.report(&primary, &secondary));
    if common.is_empty() {
        warn!("No common antigens or sera, nothing to compare.");
        return Err(CliError::Argument(
            "the charts have no antigens or sera in common".to_string(),
        ));
    }

    let points = common.points();
    let data = procrustes(&primary_layout, &secondary_layout, &points, args.scaling)
        .map_err(EngineError::from)?;
    info!(rms = data.rms, pairs = data.number_of_pairs, "Maps superimposed.");
    println!("{}", data);

    let mut rows: Vec<(String, f64)> = points
        .iter()
        .zip(data.distances(&primary_layout, &secondary_layout, &points))
        .filter_map(|(&(p, _), distance)| distance.map(|d| (point_name(&primary, p), d)))
        .collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (name, distance) in rows.iter().take(20) {
        println!("  {:>8.4}  {}", distance, name);
    }

    if let Some(output) = &args.output {
        write_distances(output, &rows)?;
        println!("Distances written to: {}", output.display());
    }
    Ok(())
}

fn write_distances(path: &Path, rows: &[(String, f64)]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["point", "distance"])?;
    for (name, distance) in rows {
        writer.write_record([name.as_str(), &format!("{:.6}", distance)])?;
    }
    writer.flush()?;
    Ok(())
}
