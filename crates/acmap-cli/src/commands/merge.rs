use crate::cli::{MergeArgs, RelaxOverrides};
use crate::config::builder;
use crate::error::Result;
use crate::table;
use acmap::core::models::chart::Chart;
use acmap::core::models::column_bases::MinimumColumnBasis;
use acmap::core::models::projection::Projection;
use acmap::workflows;
use std::path::Path;
use tracing::info;

fn read_map(
    table_path: &Path,
    layout_path: Option<&Path>,
    minimum_column_basis: MinimumColumnBasis,
) -> Result<Chart> {
    let mut chart = table::read_chart(table_path)?;
    if let Some(path) = layout_path {
        let layout = table::read_layout(path, &chart)?;
        chart.add_projection(Projection::new(layout, minimum_column_basis));
    }
    Ok(chart)
}

pub fn run(args: MergeArgs) -> Result<()> {
    let file = builder::load_file_config(&args.config)?;
    let settings = builder::build_merge_settings(&file, &args)?;
    let minimum_column_basis =
        builder::minimum_column_basis(&file, &RelaxOverrides::default())?;

    let primary = read_map(
        &args.primary,
        args.primary_layout.as_deref(),
        minimum_column_basis,
    )?;
    let secondary = read_map(
        &args.secondary,
        args.secondary_layout.as_deref(),
        minimum_column_basis,
    )?;

    let (merged, report) = workflows::merge::merge(&primary, &secondary, &settings)?;
    info!(
        antigens = merged.number_of_antigens(),
        sera = merged.number_of_sera(),
        conflicts = report.conflicts.len(),
        "Charts merged."
    );
    print!("{}", report);

    if let Some(output) = &args.output {
        table::write_chart(output, &merged)?;
        println!("Merged table written to: {}", output.display());
    }
    if let Some(output) = &args.output_layout {
        if merged.projections().is_empty() {
            println!("Merge {} makes no map, no layout written.", report.merge_type);
        } else {
            println!("Merged map stress: {:.4}", merged.projection_stress(0)?);
            super::write_projection(Some(output.as_path()), &merged, 0)?;
        }
    }
    Ok(())
}
