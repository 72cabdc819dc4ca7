use crate::cli::{MapInput, RelaxOverrides};
use crate::config::builder;
use crate::config::file::FileConfig;
use crate::error::Result;
use crate::table;
use acmap::core::models::chart::Chart;
use acmap::core::models::projection::Projection;
use acmap::engine::progress::ProgressReporter;
use acmap::workflows;
use tracing::info;

pub mod avidity;
pub mod compare;
pub mod merge;
pub mod relax;

/// Loads the table and makes projection 0: the given layout, or the best of
/// a relax when no layout is given.
pub fn load_map(
    input: &MapInput,
    file: &FileConfig,
    flags: &RelaxOverrides,
    threads: Option<usize>,
    reporter: &ProgressReporter,
) -> Result<Chart> {
    let mut chart = table::read_chart(&input.table)?;
    match &input.layout {
        Some(path) => {
            let layout = table::read_layout(path, &chart)?;
            let mut projection =
                Projection::new(layout, builder::minimum_column_basis(file, flags)?);
            projection.disconnect(flags.disconnect.iter().copied())?;
            chart.add_projection(projection);
            info!(path = %path.display(), "Layout loaded.");
        }
        None => {
            let config = builder::build_relax_config(file, flags, threads)?;
            let report = workflows::relax::relax(&mut chart, &config, reporter)?;
            chart.projections_mut().keep_just(1);
            info!(stress = report.best_stress(), "Map made from random starts.");
        }
    }
    Ok(chart)
}

/// `AG name` or `SR name` for a point number, antigens first.
pub fn point_name(chart: &Chart, point_no: usize) -> String {
    let antigens = chart.number_of_antigens();
    if point_no < antigens {
        chart
            .antigen(point_no)
            .map(|ag| format!("AG {}", ag.full_name()))
            .unwrap_or_else(|_| format!("AG {}", point_no))
    } else {
        chart
            .serum(point_no - antigens)
            .map(|sr| format!("SR {}", sr.full_name()))
            .unwrap_or_else(|_| format!("SR {}", point_no - antigens))
    }
}

/// Writes the transformed layout of a projection when an output path is set.
pub fn write_projection(
    output: Option<&std::path::Path>,
    chart: &Chart,
    projection_no: usize,
) -> Result<()> {
    if let Some(path) = output {
        let layout = chart.projection(projection_no)?.transformed_layout();
        table::write_layout(path, chart, &layout)?;
        println!("Layout written to: {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{ConfigArgs, MergeArgs, RelaxArgs};
    use std::fs;
    use tempfile::tempdir;

    const TABLE: &str = "name,S1,S2,S3\nA1,1280,320,80\nA2,320,1280,320\nA3,80,320,1280\n";

    fn quick_relax() -> RelaxOverrides {
        RelaxOverrides {
            optimizations: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn point_names_number_antigens_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, TABLE).unwrap();
        let chart = table::read_chart(&path).unwrap();
        assert_eq!(point_name(&chart, 0), "AG A1");
        assert_eq!(point_name(&chart, 3), "SR S1");
    }

    #[test]
    fn relax_writes_a_layout_that_loads_back() {
        let dir = tempdir().unwrap();
        let table_path = dir.path().join("t.csv");
        let layout_path = dir.path().join("layout.csv");
        fs::write(&table_path, TABLE).unwrap();

        let args = RelaxArgs {
            table: table_path.clone(),
            output: Some(layout_path.clone()),
            config: ConfigArgs::default(),
            relax: quick_relax(),
        };
        relax::run(args, Some(1), false).unwrap();

        let input = MapInput {
            table: table_path,
            layout: Some(layout_path),
        };
        let chart = load_map(
            &input,
            &FileConfig::default(),
            &RelaxOverrides::default(),
            Some(1),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(chart.projections().len(), 1);
        assert_eq!(chart.projection(0).unwrap().number_of_points(), 6);
    }

    #[test]
    fn map_without_layout_is_relaxed_to_one_projection() {
        let dir = tempdir().unwrap();
        let table_path = dir.path().join("t.csv");
        fs::write(&table_path, TABLE).unwrap();
        let input = MapInput {
            table: table_path,
            layout: None,
        };
        let chart = load_map(
            &input,
            &FileConfig::default(),
            &quick_relax(),
            Some(1),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(chart.projections().len(), 1);
    }

    #[test]
    fn merge_writes_the_combined_table() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("a.csv");
        let secondary = dir.path().join("b.csv");
        let output = dir.path().join("merged.csv");
        fs::write(&primary, TABLE).unwrap();
        fs::write(&secondary, "name,S1,S4\nA1,640,40\nA4,160,1280\n").unwrap();

        let args = MergeArgs {
            primary,
            secondary,
            primary_layout: None,
            secondary_layout: None,
            merge_type: None,
            match_level: Some("strict".to_string()),
            combine_cheating_assays: false,
            remove_distinct: false,
            output: Some(output.clone()),
            output_layout: None,
            config: ConfigArgs::default(),
        };
        merge::run(args).unwrap();

        let merged = table::read_chart(&output).unwrap();
        assert_eq!(merged.number_of_antigens(), 4);
        assert_eq!(merged.number_of_sera(), 4);
    }
}
