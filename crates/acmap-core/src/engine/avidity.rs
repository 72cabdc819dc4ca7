use super::config::{AviditySettings, Precision};
use super::error::EngineError;
use super::optimizer::{minimize_layout, relax_point};
use super::utils::pool;
use crate::core::models::chart::Chart;
use crate::core::models::error::ModelError;
use crate::core::models::layout::{Layout, euclidean};
use crate::core::models::projection::Projection;
use crate::core::stress::Stress;
use crate::core::utils::geometry::procrustes;
use serde::Serialize;
use std::fmt;
use tracing::{debug, instrument};

/// Number of most moved antigens kept per adjust.
pub const MOST_MOVED_COUNT: usize = 5;

/// Adjusts whose stress differences are this close count as equal.
const STRESS_DIFF_TIE: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MostMoved {
    pub antigen_no: usize,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerAdjust {
    pub logged_adjust: f64,
    /// How far the test antigen moved when repositioned alone.
    pub distance_test_antigen: f64,
    /// Radians between that move and the direction to the antigen's measured sera.
    pub angle_test_antigen: f64,
    pub average_procrustes_distances_except_test_antigen: f64,
    /// Relaxed stress under the adjust minus the original stress.
    pub stress_diff: f64,
    /// Test antigen after the whole-map relax, in the original frame.
    pub final_coordinates: Vec<f64>,
    pub most_moved: Vec<MostMoved>,
}

impl fmt::Display for PerAdjust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "adjust {:+.2} moved {:.4} angle {:.4} procrustes {:.4} stress diff {:+.4}",
            self.logged_adjust,
            self.distance_test_antigen,
            self.angle_test_antigen,
            self.average_procrustes_distances_except_test_antigen,
            self.stress_diff
        )?;
        if !self.most_moved.is_empty() {
            let moved: Vec<String> = self
                .most_moved
                .iter()
                .map(|m| format!("{}:{:.2}", m.antigen_no, m.distance))
                .collect();
            write!(f, " most moved [{}]", moved.join(" "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvidityResult {
    pub antigen_no: usize,
    pub best_logged_adjust: f64,
    pub original: Vec<f64>,
    pub adjusts: Vec<PerAdjust>,
}

impl AvidityResult {
    fn new(antigen_no: usize, original: Vec<f64>, adjusts: Vec<PerAdjust>) -> Self {
        let best_logged_adjust = pick_best(&adjusts).map_or(0.0, |a| a.logged_adjust);
        Self {
            antigen_no,
            best_logged_adjust,
            original,
            adjusts,
        }
    }

    pub fn best_adjust(&self) -> Option<&PerAdjust> {
        self.adjusts
            .iter()
            .find(|a| a.logged_adjust == self.best_logged_adjust)
    }
}

/// Lowest `stress_diff`; near-ties go to the smaller absolute adjust.
fn pick_best(adjusts: &[PerAdjust]) -> Option<&PerAdjust> {
    adjusts.iter().reduce(|best, candidate| {
        let delta = candidate.stress_diff - best.stress_diff;
        if delta < -STRESS_DIFF_TIE
            || (delta.abs() <= STRESS_DIFF_TIE
                && candidate.logged_adjust.abs() < best.logged_adjust.abs())
        {
            candidate
        } else {
            best
        }
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AvidityResults(Vec<AvidityResult>);

impl AvidityResults {
    pub fn new(results: Vec<AvidityResult>) -> Self {
        Self(results)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AvidityResult> {
        self.0.iter()
    }

    pub fn get(&self, antigen_no: usize) -> Option<&AvidityResult> {
        self.0.iter().find(|r| r.antigen_no == antigen_no)
    }

    pub fn report(&self, names: impl Fn(usize) -> String) -> String {
        let mut out = String::new();
        for result in &self.0 {
            out.push_str(&format!(
                "AG {:>4} {} best adjust {:+.2}\n",
                result.antigen_no,
                names(result.antigen_no),
                result.best_logged_adjust
            ));
            for adjust in &result.adjusts {
                out.push_str(&format!("    {}\n", adjust));
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a AvidityResults {
    type Item = &'a AvidityResult;
    type IntoIter = std::slice::Iter<'a, AvidityResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Everything an adjust evaluation needs from the tested projection.
pub(crate) struct AvidityBase<'a> {
    chart: &'a Chart,
    projection: &'a Projection,
    base_adjusts: Vec<f64>,
    original_stress: f64,
    precision: Precision,
}

impl<'a> AvidityBase<'a> {
    pub(crate) fn new(
        chart: &'a Chart,
        projection: &'a Projection,
        precision: Precision,
    ) -> Result<Self, EngineError> {
        let original_stress = chart.stress_of(projection)?;
        let base_adjusts = projection
            .avidity_adjusts()
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![0.0; chart.number_of_antigens()]);
        Ok(Self {
            chart,
            projection,
            base_adjusts,
            original_stress,
            precision,
        })
    }

    pub(crate) fn check_testable(&self, antigen_no: usize) -> Result<(), EngineError> {
        if antigen_no >= self.chart.number_of_antigens() {
            return Err(ModelError::IndexOutOfRange {
                kind: "antigen",
                index: antigen_no,
                count: self.chart.number_of_antigens(),
            }
            .into());
        }
        if self.projection.is_disconnected(antigen_no) {
            return Err(EngineError::PointNotTestable {
                point_no: antigen_no,
                reason: "disconnected",
            });
        }
        if !self.projection.layout().is_positioned(antigen_no) {
            return Err(EngineError::PointNotTestable {
                point_no: antigen_no,
                reason: "not positioned",
            });
        }
        Ok(())
    }

    fn adjusted_stress(&self, antigen_no: usize, logged_adjust: f64) -> Result<Stress, EngineError> {
        let mut adjusts = self.base_adjusts.clone();
        adjusts[antigen_no] += logged_adjust;
        Ok(Stress::new(
            self.chart.titers(),
            &self.chart.column_bases(self.projection.minimum_column_basis()),
            Some(adjusts.as_slice()),
            self.projection.disconnected(),
            self.chart.stress_parameters(),
        )?)
    }

    /// Evaluates one adjust and returns it with the relaxed layout.
    pub(crate) fn test_adjust(
        &self,
        antigen_no: usize,
        logged_adjust: f64,
    ) -> Result<(PerAdjust, Layout), EngineError> {
        let stress = self.adjusted_stress(antigen_no, logged_adjust)?;
        let original_layout = self.projection.layout();
        let original = original_layout.point(antigen_no).to_vec();

        let (moved, _) = relax_point(
            &stress,
            original_layout,
            antigen_no,
            &original,
            self.precision,
        );
        let distance_test_antigen = euclidean(&original, &moved);
        let angle_test_antigen = self.angle_to_sera(antigen_no, &original, &moved);

        let mut relaxed = original_layout.clone();
        relaxed.point_mut(antigen_no).copy_from_slice(&moved);
        minimize_layout(
            &stress,
            &mut relaxed,
            self.projection.unmovable(),
            self.precision,
        );
        let stress_diff = stress.value(&relaxed) - self.original_stress;

        let pairs: Vec<(usize, usize)> = (0..original_layout.number_of_points())
            .filter(|&p| p != antigen_no)
            .map(|p| (p, p))
            .collect();
        let data = procrustes(original_layout, &relaxed, &pairs, false)?;
        let distances = data.distances(original_layout, &relaxed, &pairs);
        let used: Vec<f64> = distances.iter().flatten().copied().collect();
        let average = if used.is_empty() {
            0.0
        } else {
            used.iter().sum::<f64>() / used.len() as f64
        };

        let number_of_antigens = self.chart.number_of_antigens();
        let mut most_moved: Vec<MostMoved> = pairs
            .iter()
            .zip(&distances)
            .filter(|((p, _), _)| *p < number_of_antigens)
            .filter_map(|(&(p, _), d)| {
                d.map(|distance| MostMoved {
                    antigen_no: p,
                    distance,
                })
            })
            .collect();
        most_moved.sort_by(|a, b| {
            b.distance
                .total_cmp(&a.distance)
                .then(a.antigen_no.cmp(&b.antigen_no))
        });
        most_moved.truncate(MOST_MOVED_COUNT);

        let final_coordinates = data.transformation.apply(relaxed.point(antigen_no));
        Ok((
            PerAdjust {
                logged_adjust,
                distance_test_antigen,
                angle_test_antigen,
                average_procrustes_distances_except_test_antigen: average,
                stress_diff,
                final_coordinates,
                most_moved,
            },
            relaxed,
        ))
    }

    fn angle_to_sera(&self, antigen_no: usize, original: &[f64], moved: &[f64]) -> f64 {
        let layout = self.projection.layout();
        let number_of_antigens = self.chart.number_of_antigens();
        let dims = layout.number_of_dimensions();
        let mut centroid = vec![0.0; dims];
        let mut count = 0usize;
        for serum_no in 0..self.chart.number_of_sera() {
            let point_no = number_of_antigens + serum_no;
            let measured = self.chart.titers().at(antigen_no, serum_no).is_regular();
            if measured && layout.is_positioned(point_no) {
                for (c, v) in centroid.iter_mut().zip(layout.point(point_no)) {
                    *c += v;
                }
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        let toward: Vec<f64> = centroid
            .iter()
            .zip(original)
            .map(|(c, o)| c / count as f64 - o)
            .collect();
        let movement: Vec<f64> = moved.iter().zip(original).map(|(m, o)| m - o).collect();
        let norms = norm(&toward) * norm(&movement);
        if norms <= f64::EPSILON {
            return 0.0;
        }
        let cosine: f64 = toward.iter().zip(&movement).map(|(a, b)| a * b).sum::<f64>() / norms;
        cosine.clamp(-1.0, 1.0).acos()
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Sweeps every adjust of `settings` for each antigen. Antigen/adjust pairs
/// run in parallel.
#[instrument(skip_all, name = "avidity_task", fields(antigens = antigens.len()))]
pub fn test_antigens(
    chart: &Chart,
    projection: &Projection,
    antigens: &[usize],
    settings: &AviditySettings,
) -> Result<AvidityResults, EngineError> {
    settings.validate()?;
    let base = AvidityBase::new(chart, projection, settings.precision)?;
    for &antigen_no in antigens {
        base.check_testable(antigen_no)?;
    }
    let adjusts = settings.adjusts();
    let jobs: Vec<(usize, f64)> = antigens
        .iter()
        .flat_map(|&ag| adjusts.iter().map(move |&adjust| (ag, adjust)))
        .collect();

    let evaluated = pool::try_map_indexed(jobs.len(), settings.threads, |i| {
        let (antigen_no, adjust) = jobs[i];
        base.test_adjust(antigen_no, adjust).map(|(per_adjust, _)| per_adjust)
    })?;

    let mut evaluated = evaluated.into_iter();
    let results: Vec<AvidityResult> = antigens
        .iter()
        .map(|&antigen_no| {
            let per_antigen: Vec<PerAdjust> = evaluated.by_ref().take(adjusts.len()).collect();
            AvidityResult::new(
                antigen_no,
                projection.layout().point(antigen_no).to_vec(),
                per_antigen,
            )
        })
        .collect();
    debug!(results = results.len(), "Avidity test finished.");
    Ok(AvidityResults::new(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::antigen::{Antigen, Serum};
    use crate::core::models::column_bases::MinimumColumnBasis;
    use crate::core::models::titers::TiterMatrix;

    // Antigens sit on their homologous sera along a line, 2 units apart.
    fn chart_with_exact_projection() -> Chart {
        let titers = TiterMatrix::parse_rows(&[
            vec!["1280", "320", "80"],
            vec!["320", "1280", "320"],
            vec!["80", "320", "1280"],
        ])
        .unwrap();
        let mut chart = Chart::new(
            vec![Antigen::new("A0"), Antigen::new("A1"), Antigen::new("A2")],
            vec![Serum::new("S0"), Serum::new("S1"), Serum::new("S2")],
            titers,
        )
        .unwrap();
        let layout = Layout::from_points(
            &[
                vec![0.0, 0.0],
                vec![2.0, 0.0],
                vec![4.0, 0.0],
                vec![0.0, 0.0],
                vec![2.0, 0.0],
                vec![4.0, 0.0],
            ],
            2,
        )
        .unwrap();
        chart.add_projection(Projection::new(layout, MinimumColumnBasis::None));
        chart
    }

    fn per_adjust(logged_adjust: f64, stress_diff: f64) -> PerAdjust {
        PerAdjust {
            logged_adjust,
            distance_test_antigen: 0.0,
            angle_test_antigen: 0.0,
            average_procrustes_distances_except_test_antigen: 0.0,
            stress_diff,
            final_coordinates: vec![0.0, 0.0],
            most_moved: Vec::new(),
        }
    }

    #[test]
    fn best_adjust_minimizes_stress_diff_and_prefers_small_adjusts_on_ties() {
        let result = AvidityResult::new(
            0,
            vec![0.0, 0.0],
            vec![
                per_adjust(-2.0, 0.5),
                per_adjust(-1.0, 0.0),
                per_adjust(0.0, 1e-10),
                per_adjust(1.0, 0.3),
            ],
        );
        assert_eq!(result.best_logged_adjust, 0.0);

        let shifted = AvidityResult::new(
            1,
            vec![0.0, 0.0],
            vec![per_adjust(-1.0, -0.2), per_adjust(0.0, 0.0)],
        );
        assert_eq!(shifted.best_logged_adjust, -1.0);
        assert_eq!(shifted.best_adjust().unwrap().stress_diff, -0.2);
    }

    #[test]
    fn sweep_around_an_optimized_map_prefers_no_adjust() {
        let chart = chart_with_exact_projection();
        let projection = chart.projection(0).unwrap();
        let settings = AviditySettings {
            min_adjust: -1.0,
            max_adjust: 1.0,
            threads: 1,
            ..Default::default()
        };
        let results = test_antigens(&chart, projection, &[1], &settings).unwrap();
        assert_eq!(results.len(), 1);
        let result = results.get(1).unwrap();
        assert_eq!(result.adjusts.len(), 3);
        assert_eq!(result.best_logged_adjust, 0.0);
        let zero = result.best_adjust().unwrap();
        assert!(zero.stress_diff.abs() < 1e-8);
        assert!(result.adjusts.iter().all(|a| a.stress_diff >= -1e-8));
        assert!(zero.distance_test_antigen < 1e-3);
        assert!(zero.most_moved.len() <= MOST_MOVED_COUNT);
        assert!(zero.most_moved.iter().all(|m| m.antigen_no != 1));
    }

    #[test]
    fn disconnected_antigen_is_not_testable() {
        let mut chart = chart_with_exact_projection();
        chart.projection_mut(0).unwrap().disconnect([2]).unwrap();
        let projection = chart.projection(0).unwrap();
        let result = test_antigens(&chart, projection, &[2], &AviditySettings::default());
        assert!(matches!(
            result,
            Err(EngineError::PointNotTestable { point_no: 2, .. })
        ));
    }
}
