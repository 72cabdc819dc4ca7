use super::write_projection;
use crate::cli::RelaxArgs;
use crate::config::builder;
use crate::error::Result;
use crate::table;
use crate::utils::progress::CliProgressHandler;
use acmap::engine::progress::ProgressReporter;
use acmap::workflows;
use tracing::info;

pub fn run(args: RelaxArgs, threads: Option<usize>, show_progress: bool) -> Result<()> {
    let file = builder::load_file_config(&args.config)?;
    let config = builder::build_relax_config(&file, &args.relax, threads)?;
    let mut chart = table::read_chart(&args.table)?;

    let progress = CliProgressHandler::new(show_progress);
    let reporter = ProgressReporter::with_callback(progress.callback());
    println!(
        "Relaxing {} antigen(s) x {} serum(s) in {}D, {} optimization(s)...",
        chart.number_of_antigens(),
        chart.number_of_sera(),
        config.number_of_dimensions,
        config.number_of_optimizations
    );
    let report = workflows::relax::relax(&mut chart, &config, &reporter)?;
    info!(
        converged = report.converged,
        projections = report.number_of_projections(),
        "Relax finished."
    );

    for (projection_no, stress) in report.stresses.iter().enumerate().take(10) {
        println!("  {:>3}  stress {:.4}", projection_no, stress);
    }
    if report.number_of_projections() > 10 {
        println!("  ... {} more", report.number_of_projections() - 10);
    }

    write_projection(args.output.as_deref(), &chart, 0)
}
