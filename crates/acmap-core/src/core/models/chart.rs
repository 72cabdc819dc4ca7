use super::antigen::{Antigen, Serum};
use super::column_bases::{ColumnBases, MinimumColumnBasis};
use super::error::{ModelError, check_index};
use super::projection::Projection;
use super::titer::Titer;
use super::titers::{TiterMatrix, TiterReplacement};
use crate::core::stress::{Stress, StressParameters};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// What a chart clone carries over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloneType {
    #[default]
    Titers,
    Projections,
    PlotSpec,
    ProjectionsPlotSpec,
}

impl CloneType {
    fn keeps_projections(self) -> bool {
        matches!(self, CloneType::Projections | CloneType::ProjectionsPlotSpec)
    }
}

impl FromStr for CloneType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "titers" => Ok(Self::Titers),
            "projections" => Ok(Self::Projections),
            "plot_spec" => Ok(Self::PlotSpec),
            "projections_plot_spec" => Ok(Self::ProjectionsPlotSpec),
            _ => Err(ModelError::UnknownOption {
                kind: "clone type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CloneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloneType::Titers => "titers",
            CloneType::Projections => "projections",
            CloneType::PlotSpec => "plot_spec",
            CloneType::ProjectionsPlotSpec => "projections_plot_spec",
        };
        f.write_str(name)
    }
}

/// Ordered collection of a chart's projections, addressed by number.
#[derive(Debug, Clone, Default)]
pub struct Projections(Vec<Projection>);

impl Projections {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, projection_no: usize) -> Result<&Projection, ModelError> {
        check_index("projection", projection_no, self.0.len())?;
        Ok(&self.0[projection_no])
    }

    pub fn get_mut(&mut self, projection_no: usize) -> Result<&mut Projection, ModelError> {
        check_index("projection", projection_no, self.0.len())?;
        Ok(&mut self.0[projection_no])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Projection> {
        self.0.iter()
    }

    /// Appends and returns the new projection number.
    pub fn add(&mut self, projection: Projection) -> usize {
        self.0.push(projection);
        self.0.len() - 1
    }

    pub fn remove(&mut self, projection_no: usize) -> Result<Projection, ModelError> {
        check_index("projection", projection_no, self.0.len())?;
        Ok(self.0.remove(projection_no))
    }

    pub fn remove_all(&mut self) {
        self.0.clear();
    }

    pub fn remove_all_except(&mut self, projection_no: usize) -> Result<(), ModelError> {
        check_index("projection", projection_no, self.0.len())?;
        let kept = self.0.swap_remove(projection_no);
        self.0 = vec![kept];
        Ok(())
    }

    /// Keeps the first `number_to_keep` projections.
    pub fn keep_just(&mut self, number_to_keep: usize) {
        self.0.truncate(number_to_keep);
    }

    /// Stable sort by cached stress; projections without one go last.
    fn sort_by_cached_stress(&mut self) {
        self.0.sort_by(|a, b| {
            let sa = a.cached_stress().unwrap_or(f64::INFINITY);
            let sb = b.cached_stress().unwrap_or(f64::INFINITY);
            sa.total_cmp(&sb)
        });
    }
}

impl<'a> IntoIterator for &'a Projections {
    type Item = &'a Projection;
    type IntoIter = std::slice::Iter<'a, Projection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Arena owning the entries, the titer table and every projection of a map.
#[derive(Debug, Clone, Default)]
pub struct Chart {
    name: String,
    antigens: Vec<Antigen>,
    sera: Vec<Serum>,
    titers: TiterMatrix,
    forced_column_bases: Option<ColumnBases>,
    stress_parameters: StressParameters,
    projections: Projections,
}

impl Chart {
    pub fn new(
        antigens: Vec<Antigen>,
        sera: Vec<Serum>,
        titers: TiterMatrix,
    ) -> Result<Self, ModelError> {
        if titers.number_of_antigens() != antigens.len() || titers.number_of_sera() != sera.len()
        {
            return Err(ModelError::Shape(format!(
                "{}x{} titer table for {} antigen(s) and {} serum(s)",
                titers.number_of_antigens(),
                titers.number_of_sera(),
                antigens.len(),
                sera.len()
            )));
        }
        Ok(Self {
            antigens,
            sera,
            titers,
            ..Default::default()
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn number_of_antigens(&self) -> usize {
        self.antigens.len()
    }

    #[inline]
    pub fn number_of_sera(&self) -> usize {
        self.sera.len()
    }

    #[inline]
    pub fn number_of_points(&self) -> usize {
        self.antigens.len() + self.sera.len()
    }

    pub fn antigens(&self) -> &[Antigen] {
        &self.antigens
    }

    pub fn sera(&self) -> &[Serum] {
        &self.sera
    }

    pub fn antigen(&self, antigen_no: usize) -> Result<&Antigen, ModelError> {
        check_index("antigen", antigen_no, self.antigens.len())?;
        Ok(&self.antigens[antigen_no])
    }

    pub fn serum(&self, serum_no: usize) -> Result<&Serum, ModelError> {
        check_index("serum", serum_no, self.sera.len())?;
        Ok(&self.sera[serum_no])
    }

    pub fn titers(&self) -> &TiterMatrix {
        &self.titers
    }

    /// Sets one titer. Layers are dropped and cached projection stresses
    /// are invalidated.
    pub fn set_titer(
        &mut self,
        antigen_no: usize,
        serum_no: usize,
        titer: Titer,
    ) -> Result<(), ModelError> {
        self.titers.set_titer(antigen_no, serum_no, titer)?;
        self.invalidate_stresses();
        Ok(())
    }

    /// Regex replacement over the titer texts, see [`TiterMatrix::replace_all`].
    pub fn replace_all(
        &mut self,
        look_for: &str,
        replacement: &str,
    ) -> Result<Vec<TiterReplacement>, ModelError> {
        let replaced = self.titers.replace_all(look_for, replacement)?;
        if !replaced.is_empty() {
            self.invalidate_stresses();
        }
        Ok(replaced)
    }

    pub fn stress_parameters(&self) -> StressParameters {
        self.stress_parameters
    }

    pub fn set_stress_parameters(&mut self, parameters: StressParameters) {
        self.stress_parameters = parameters;
        self.invalidate_stresses();
    }

    pub fn forced_column_bases(&self) -> Option<&ColumnBases> {
        self.forced_column_bases.as_ref()
    }

    /// Forces column bases (logged, one per serum) or, with `None`, returns
    /// to computed ones.
    pub fn set_forced_column_bases(&mut self, column_bases: Option<Vec<f64>>) -> Result<(), ModelError> {
        if let Some(data) = &column_bases {
            if data.len() != self.sera.len() {
                return Err(ModelError::ColumnBasesLength {
                    expected: self.sera.len(),
                    actual: data.len(),
                });
            }
        }
        self.forced_column_bases = column_bases.map(ColumnBases::new);
        self.invalidate_stresses();
        Ok(())
    }

    pub fn column_bases(&self, minimum_column_basis: MinimumColumnBasis) -> ColumnBases {
        match &self.forced_column_bases {
            Some(forced) => forced.clone(),
            None => ColumnBases::compute(&self.titers, minimum_column_basis),
        }
    }

    /// Column basis of one serum as used by a projection.
    pub fn column_basis(&self, serum_no: usize, projection_no: usize) -> Result<f64, ModelError> {
        check_index("serum", serum_no, self.sera.len())?;
        let projection = self.projections.get(projection_no)?;
        let bases = self.column_bases(projection.minimum_column_basis());
        bases.get(serum_no).ok_or(ModelError::IndexOutOfRange {
            kind: "serum",
            index: serum_no,
            count: bases.len(),
        })
    }

    pub fn projections(&self) -> &Projections {
        &self.projections
    }

    pub fn projections_mut(&mut self) -> &mut Projections {
        &mut self.projections
    }

    pub fn projection(&self, projection_no: usize) -> Result<&Projection, ModelError> {
        self.projections.get(projection_no)
    }

    pub fn projection_mut(&mut self, projection_no: usize) -> Result<&mut Projection, ModelError> {
        self.projections.get_mut(projection_no)
    }

    pub fn add_projection(&mut self, projection: Projection) -> usize {
        self.projections.add(projection)
    }

    /// Builds the stress function for a projection of this chart.
    pub fn stress_for(&self, projection: &Projection) -> Result<Stress, ModelError> {
        if projection.number_of_points() != self.number_of_points() {
            return Err(ModelError::Shape(format!(
                "projection has {} point(s), chart has {}",
                projection.number_of_points(),
                self.number_of_points()
            )));
        }
        Stress::new(
            &self.titers,
            &self.column_bases(projection.minimum_column_basis()),
            projection.avidity_adjusts(),
            projection.disconnected(),
            self.stress_parameters,
        )
    }

    pub fn projection_stress(&self, projection_no: usize) -> Result<f64, ModelError> {
        let projection = self.projections.get(projection_no)?;
        self.stress_of(projection)
    }

    pub(crate) fn stress_of(&self, projection: &Projection) -> Result<f64, ModelError> {
        if let Some(stress) = projection.cached_stress() {
            return Ok(stress);
        }
        let stress = self.stress_for(projection)?;
        Ok(projection.stress_or_init(|| stress.value(projection.layout())))
    }

    /// Sorts projections by ascending stress, keeping attempt order on ties.
    pub fn sort_projections(&mut self) -> Result<(), ModelError> {
        for projection in &self.projections {
            self.stress_of(projection)?;
        }
        self.projections.sort_by_cached_stress();
        Ok(())
    }

    /// Display name such as `"TABLE >=1280 12.3456"`.
    pub fn make_name(&self, projection_no: usize) -> Result<String, ModelError> {
        let projection = self.projections.get(projection_no)?;
        let stress = self.stress_of(projection)?;
        let name = if self.name.is_empty() {
            format!("{} antigens x {} sera", self.antigens.len(), self.sera.len())
        } else {
            self.name.clone()
        };
        Ok(format!(
            "{} >={} {:.4}",
            name,
            projection.minimum_column_basis(),
            stress
        ))
    }

    /// Copy of the chart. Plot-spec variants behave like their counterparts.
    pub fn clone_with(&self, clone_type: CloneType) -> Chart {
        let mut cloned = self.clone();
        if !clone_type.keeps_projections() {
            cloned.projections.remove_all();
        }
        cloned
    }

    /// Appends copies of `merge_in`'s projections. Both charts must have the
    /// same antigens and sera in the same order.
    pub fn combine_projections(&mut self, merge_in: &Chart) -> Result<usize, ModelError> {
        let same_antigens = self.antigens.len() == merge_in.antigens.len()
            && self
                .antigens
                .iter()
                .zip(&merge_in.antigens)
                .all(|(a, b)| a.full_name() == b.full_name());
        let same_sera = self.sera.len() == merge_in.sera.len()
            && self
                .sera
                .iter()
                .zip(&merge_in.sera)
                .all(|(a, b)| a.full_name() == b.full_name());
        if !same_antigens || !same_sera {
            return Err(ModelError::IncompatibleProjections(
                "charts have different antigens or sera".to_string(),
            ));
        }
        let added = merge_in.projections.len();
        for projection in &merge_in.projections {
            let mut copy = projection.clone();
            // cached stress may rest on the other chart's column bases
            copy.invalidate_stress();
            self.projections.add(copy);
        }
        self.sort_projections()?;
        debug!(added, total = self.projections.len(), "Projections combined.");
        Ok(added)
    }

    /// Removes antigens and sera by index. Projections are updated, or
    /// dropped altogether when `remove_projections` is set.
    pub fn remove_antigens_sera(
        &mut self,
        antigens: &[usize],
        sera: &[usize],
        remove_projections: bool,
    ) -> Result<(), ModelError> {
        for &ag in antigens {
            check_index("antigen", ag, self.antigens.len())?;
        }
        for &sr in sera {
            check_index("serum", sr, self.sera.len())?;
        }
        let number_of_antigens = self.antigens.len();

        self.titers.remove_antigens(antigens)?;
        self.titers.remove_sera(sera)?;
        retain_by_index(&mut self.antigens, antigens);
        retain_by_index(&mut self.sera, sera);
        if let Some(forced) = &mut self.forced_column_bases {
            forced.remove(sera);
        }

        if remove_projections {
            self.projections.remove_all();
        } else {
            let points: Vec<usize> = antigens
                .iter()
                .copied()
                .chain(sera.iter().map(|sr| sr + number_of_antigens))
                .collect();
            for projection in self.projections.0.iter_mut() {
                projection.remove_points(&points, antigens);
            }
        }
        debug!(
            antigens = antigens.len(),
            sera = sera.len(),
            "Antigens and sera removed."
        );
        Ok(())
    }

    /// Keeps only the listed antigens and sera.
    pub fn keep_antigens_sera(
        &mut self,
        antigens: &[usize],
        sera: &[usize],
        remove_projections: bool,
    ) -> Result<(), ModelError> {
        for &ag in antigens {
            check_index("antigen", ag, self.antigens.len())?;
        }
        for &sr in sera {
            check_index("serum", sr, self.sera.len())?;
        }
        let drop_antigens: Vec<usize> = (0..self.antigens.len())
            .filter(|ag| !antigens.contains(ag))
            .collect();
        let drop_sera: Vec<usize> = (0..self.sera.len())
            .filter(|sr| !sera.contains(sr))
            .collect();
        self.remove_antigens_sera(&drop_antigens, &drop_sera, remove_projections)
    }

    fn invalidate_stresses(&mut self) {
        self.projections
            .0
            .iter_mut()
            .for_each(Projection::invalidate_stress);
    }
}

fn retain_by_index<T>(items: &mut Vec<T>, remove: &[usize]) {
    let mut index = 0;
    items.retain(|_| {
        let keep = !remove.contains(&index);
        index += 1;
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::layout::Layout;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    fn chart() -> Chart {
        let titers =
            TiterMatrix::parse_rows(&[vec!["40", "80"], vec!["40", "*"], vec!["160", "80"]])
                .unwrap();
        Chart::new(
            vec![Antigen::new("A1"), Antigen::new("A2"), Antigen::new("A3")],
            vec![Serum::new("S1"), Serum::new("S2")],
            titers,
        )
        .unwrap()
        .with_name("TEST")
    }

    fn projection_at(offset: f64) -> Projection {
        let points: Vec<Vec<f64>> = (0..5).map(|p| vec![p as f64 * offset, 0.0]).collect();
        Projection::new(
            Layout::from_points(&points, 2).unwrap(),
            MinimumColumnBasis::None,
        )
    }

    #[test]
    fn titer_edits_keep_the_shape_and_drop_cached_stress() {
        let mut chart = chart();
        chart.add_projection(projection_at(1.0));
        chart.projection_stress(0).unwrap();
        assert!(chart.projection(0).unwrap().cached_stress().is_some());

        chart.set_titer(1, 1, Titer::Regular(320.0)).unwrap();
        assert_eq!(chart.titers().titer(1, 1).unwrap(), Titer::Regular(320.0));
        assert!(chart.projection(0).unwrap().cached_stress().is_none());
        assert!(chart.set_titer(3, 0, Titer::Regular(40.0)).is_err());

        chart.projection_stress(0).unwrap();
        let replaced = chart.replace_all("^40$", "<40").unwrap();
        assert_eq!(replaced.len(), 2);
        assert_eq!(chart.titers().titer(0, 0).unwrap(), Titer::LessThan(40.0));
        assert!(chart.projection(0).unwrap().cached_stress().is_none());
        assert_eq!(chart.titers().number_of_antigens(), chart.number_of_antigens());
    }

    #[test]
    fn new_rejects_mismatched_table() {
        let titers = TiterMatrix::parse_rows(&[vec!["40"]]).unwrap();
        let result = Chart::new(vec![Antigen::new("A")], vec![], titers);
        assert!(matches!(result, Err(ModelError::Shape(_))));
    }

    #[test]
    fn projection_out_of_range_names_index_and_count() {
        let chart = chart();
        match chart.projection(3) {
            Err(ModelError::IndexOutOfRange { kind, index, count }) => {
                assert_eq!((kind, index, count), ("projection", 3, 0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn column_basis_for_projection_and_serum() {
        let mut chart = chart();
        chart.add_projection(projection_at(1.0));
        assert!(f64_approx_equal(chart.column_basis(0, 0).unwrap(), 4.0));
        assert!(f64_approx_equal(chart.column_basis(1, 0).unwrap(), 3.0));
        assert!(chart.column_basis(2, 0).is_err());
        assert!(chart.column_basis(0, 1).is_err());
    }

    #[test]
    fn forced_column_bases_are_validated_and_used() {
        let mut chart = chart();
        assert!(matches!(
            chart.set_forced_column_bases(Some(vec![1.0])),
            Err(ModelError::ColumnBasesLength { expected: 2, actual: 1 })
        ));
        chart.set_forced_column_bases(Some(vec![7.0, 8.0])).unwrap();
        assert_eq!(chart.column_bases(MinimumColumnBasis::None).data(), &[7.0, 8.0]);
        chart.set_forced_column_bases(None).unwrap();
        assert_eq!(chart.column_bases(MinimumColumnBasis::None).data(), &[4.0, 3.0]);
    }

    #[test]
    fn sort_orders_by_stress_and_keeps_ties_stable() {
        let mut chart = chart();
        let tagged = |offset: f64, comment: &str| {
            let mut p = projection_at(offset);
            p.set_comment(comment);
            p
        };
        let high = tagged(3.0, "high");
        let tie_a = tagged(1.0, "tie-a");
        let tie_b = tagged(1.0, "tie-b");
        chart.add_projection(high);
        chart.add_projection(tie_a);
        chart.add_projection(tie_b);
        chart.sort_projections().unwrap();
        let comments: Vec<&str> = chart.projections().iter().map(|p| p.comment()).collect();
        assert_eq!(comments, vec!["tie-a", "tie-b", "high"]);
        let s0 = chart.projection_stress(0).unwrap();
        let s2 = chart.projection_stress(2).unwrap();
        assert!(s0 <= s2);
    }

    #[test]
    fn projection_pruning() {
        let mut chart = chart();
        for i in 0..4 {
            chart.add_projection(projection_at(i as f64 + 1.0));
        }
        chart.projections_mut().keep_just(3);
        assert_eq!(chart.projections().len(), 3);
        chart.projections_mut().remove(0).unwrap();
        assert_eq!(chart.projections().len(), 2);
        chart.projections_mut().remove_all_except(1).unwrap();
        assert_eq!(chart.projections().len(), 1);
        assert!(chart.projections_mut().remove_all_except(4).is_err());
        chart.projections_mut().remove_all();
        assert!(chart.projections().is_empty());
    }

    #[test]
    fn make_name_includes_minimum_column_basis_and_stress() {
        let mut chart = chart();
        chart.add_projection(projection_at(1.0));
        let name = chart.make_name(0).unwrap();
        assert!(name.starts_with("TEST >=none "));
    }

    #[test]
    fn clone_with_controls_projections() {
        let mut chart = chart();
        chart.add_projection(projection_at(1.0));
        assert!(chart.clone_with(CloneType::Titers).projections().is_empty());
        assert_eq!(chart.clone_with(CloneType::ProjectionsPlotSpec).projections().len(), 1);
        assert!(matches!(
            "bogus".parse::<CloneType>(),
            Err(ModelError::UnknownOption { .. })
        ));
        assert_eq!("plot-spec".parse::<CloneType>().unwrap(), CloneType::PlotSpec);
    }

    #[test]
    fn combine_projections_requires_same_entries() {
        let mut first = chart();
        let mut second = chart();
        second.add_projection(projection_at(2.0));
        second.add_projection(projection_at(1.0));
        assert_eq!(first.combine_projections(&second).unwrap(), 2);
        assert_eq!(first.projections().len(), 2);

        let mut other = chart();
        other.remove_antigens_sera(&[0], &[], false).unwrap();
        assert!(matches!(
            first.combine_projections(&other),
            Err(ModelError::IncompatibleProjections(_))
        ));
    }

    #[test]
    fn remove_and_keep_antigens_sera_update_projections() {
        let mut chart = chart();
        chart.add_projection(projection_at(1.0));
        chart.remove_antigens_sera(&[1], &[0], false).unwrap();
        assert_eq!(chart.number_of_antigens(), 2);
        assert_eq!(chart.number_of_sera(), 1);
        assert_eq!(chart.antigens()[1].name, "A3");
        let layout = chart.projection(0).unwrap().layout();
        assert_eq!(layout.number_of_points(), 3);
        assert_eq!(layout.point(2), &[4.0, 0.0]);

        chart.keep_antigens_sera(&[0], &[0], true).unwrap();
        assert_eq!(chart.number_of_antigens(), 1);
        assert!(chart.projections().is_empty());
    }
}
