use super::{load_map, point_name, write_projection};
use crate::cli::AvidityArgs;
use crate::config::builder;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use acmap::engine::progress::ProgressReporter;
use acmap::workflows;

pub fn run(args: AvidityArgs, threads: Option<usize>, show_progress: bool) -> Result<()> {
    let file = builder::load_file_config(&args.config)?;
    let precision = builder::precision(&file, &args.relax)?;
    let settings = builder::build_avidity_settings(
        &file,
        args.step,
        args.min_adjust,
        args.max_adjust,
        precision,
        threads,
    )?;

    let progress = CliProgressHandler::new(show_progress);
    let reporter = ProgressReporter::with_callback(progress.callback());
    let mut chart = load_map(&args.input, &file, &args.relax, threads, &reporter)?;

    let results = workflows::avidity::test(&chart, 0, &settings, &reporter)?;
    print!("{}", results.report(|p| point_name(&chart, p)));

    if args.output.is_some() {
        let moved = workflows::avidity::move_antigens(&mut chart, 0, &results)?;
        println!(
            "Stress after moving antigens: {:.4}",
            chart.projection_stress(moved)?
        );
        write_projection(args.output.as_deref(), &chart, moved)?;
    }
    Ok(())
}
