use crate::core::models::chart::Chart;
use crate::core::models::error::check_index;
use crate::engine::config::{GridTestSettings, Precision};
use crate::engine::error::EngineError;
use crate::engine::grid_test::{GridTestResults, test_points};
use crate::engine::optimizer::minimize_layout;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument};

/// Grid-tests `points` of a projection, or every point when `points` is `None`.
pub fn test(
    chart: &Chart,
    projection_no: usize,
    points: Option<&[usize]>,
    settings: &GridTestSettings,
) -> Result<GridTestResults, EngineError> {
    let projection = chart.projection(projection_no)?;
    let stress = chart.stress_for(projection)?;
    let points: Vec<usize> = match points {
        Some(points) => {
            for &p in points {
                check_index("point", p, chart.number_of_points())?;
            }
            points.to_vec()
        }
        None => (0..chart.number_of_points()).collect(),
    };
    test_points(
        &stress,
        projection.layout(),
        &points,
        projection.unmovable(),
        settings,
    )
}

/// Copies the projection, moves trapped and hemisphering points to the
/// positions the grid test found, relaxes the whole map and appends the
/// result. Returns the new projection number.
pub fn make_new_projection_and_relax(
    chart: &mut Chart,
    projection_no: usize,
    results: &GridTestResults,
    precision: Precision,
) -> Result<usize, EngineError> {
    let mut projection = chart.projection(projection_no)?.clone();
    for result in results.trapped_or_hemisphering() {
        projection
            .layout_mut()
            .set_point(result.point_no, &result.pos)?;
    }
    let stress = chart.stress_for(&projection)?;
    let unmovable = projection.unmovable().clone();
    minimize_layout(&stress, projection.layout_mut(), &unmovable, precision);
    projection.set_stress(stress.value(projection.layout()));
    Ok(chart.add_projection(projection))
}

#[derive(Debug, Clone, Default)]
pub struct GridTestRun {
    /// Results of every test round, first round first.
    pub rounds: Vec<GridTestResults>,
    /// Projections added by move-relax, in order.
    pub new_projections: Vec<usize>,
}

impl GridTestRun {
    pub fn last(&self) -> Option<&GridTestResults> {
        self.rounds.last()
    }
}

/// Repeats test and move-relax up to `settings.move_relax` times, stopping
/// once nothing is trapped. Added projections are commented `grid-test-N`,
/// numbered from 0.
#[instrument(skip_all, name = "grid_test_workflow", fields(projection_no = projection_no, move_relax = settings.move_relax))]
pub fn run(
    chart: &mut Chart,
    projection_no: usize,
    points: Option<&[usize]>,
    settings: &GridTestSettings,
    reporter: &ProgressReporter,
) -> Result<GridTestRun, EngineError> {
    let mut run = GridTestRun::default();
    let mut current = projection_no;

    reporter.report(Progress::PhaseStart { name: "Grid Test" });
    reporter.report(Progress::TaskStart {
        total_steps: settings.move_relax as u64 + 1,
    });
    let mut results = test(chart, current, points, settings)?;
    reporter.report(Progress::TaskIncrement);
    for attempt in 1..=settings.move_relax {
        let trapped = results.number_of_trapped();
        info!(attempt, trapped, "Grid test round.");
        if trapped == 0 {
            break;
        }
        let new_projection = make_new_projection_and_relax(chart, current, &results, settings.precision)?;
        chart
            .projection_mut(new_projection)?
            .set_comment(format!("grid-test-{}", attempt - 1));
        run.new_projections.push(new_projection);
        run.rounds.push(results);
        current = new_projection;
        results = test(chart, current, points, settings)?;
        reporter.report(Progress::TaskIncrement);
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    info!(
        trapped = results.number_of_trapped(),
        new_projections = run.new_projections.len(),
        "Grid test finished."
    );
    run.rounds.push(results);
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::antigen::{Antigen, Serum};
    use crate::core::models::column_bases::MinimumColumnBasis;
    use crate::core::models::layout::Layout;
    use crate::core::models::projection::Projection;
    use crate::core::models::titers::TiterMatrix;
    use crate::engine::grid_test::GridTestDiagnosis;

    // Antigen 0 belongs on serum 0; the layout starts it far to the left.
    fn chart_with_trapped_antigen() -> Chart {
        let titers = TiterMatrix::parse_rows(&[
            vec!["1280", "320", "160"],
            vec!["1280", "1280", "1280"],
        ])
        .unwrap();
        let mut chart = Chart::new(
            vec![Antigen::new("A0"), Antigen::new("A1")],
            vec![Serum::new("S0"), Serum::new("S1"), Serum::new("S2")],
            titers,
        )
        .unwrap();
        let layout = Layout::from_points(
            &[
                vec![-4.0, 0.0],
                vec![0.0, 0.0],
                vec![0.0, 0.0],
                vec![2.0, 0.0],
                vec![3.0, 0.0],
            ],
            2,
        )
        .unwrap();
        let mut projection = Projection::new(layout, MinimumColumnBasis::None);
        projection.set_unmovable([1, 2, 3, 4]).unwrap();
        chart.add_projection(projection);
        chart
    }

    fn settings(move_relax: usize) -> GridTestSettings {
        GridTestSettings {
            grid_step: 0.25,
            threads: 1,
            move_relax,
            ..Default::default()
        }
    }

    #[test]
    fn test_flags_the_trapped_point_only() {
        let chart = chart_with_trapped_antigen();
        let results = test(&chart, 0, None, &settings(0)).unwrap();
        assert_eq!(results.len(), 5);
        let map = results.diagnosis_map();
        assert_eq!(map[0], (0, GridTestDiagnosis::Trapped));
        assert!(map[1..].iter().all(|(_, d)| *d == GridTestDiagnosis::NotTested));
    }

    #[test]
    fn out_of_range_point_is_rejected() {
        let chart = chart_with_trapped_antigen();
        assert!(test(&chart, 0, Some(&[9]), &settings(0)).is_err());
        assert!(test(&chart, 3, None, &settings(0)).is_err());
    }

    #[test]
    fn move_relax_resolves_the_trap_and_comments_projections() {
        let mut chart = chart_with_trapped_antigen();
        let run = run(&mut chart, 0, None, &settings(3), &ProgressReporter::new()).unwrap();
        assert_eq!(run.new_projections, vec![1]);
        assert_eq!(run.rounds.len(), 2);
        assert_eq!(run.last().unwrap().number_of_trapped(), 0);
        assert_eq!(chart.projection(1).unwrap().comment(), "grid-test-0");
        assert!(chart.projection_stress(1).unwrap() < chart.projection_stress(0).unwrap());
    }

    #[test]
    fn zero_move_relax_only_tests() {
        let mut chart = chart_with_trapped_antigen();
        let run = run(&mut chart, 0, Some(&[0]), &settings(0), &ProgressReporter::new()).unwrap();
        assert!(run.new_projections.is_empty());
        assert_eq!(chart.projections().len(), 1);
        assert_eq!(run.last().unwrap().number_of_trapped(), 1);
    }
}
