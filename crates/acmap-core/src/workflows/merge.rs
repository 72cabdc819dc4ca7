use crate::core::common::CommonAntigensSera;
use crate::core::models::chart::Chart;
use crate::core::models::error::ModelError;
use crate::core::models::layout::Layout;
use crate::core::models::projection::Projection;
use crate::core::models::titer::Titer;
use crate::core::models::titers::{TiterConflict, TiterMatrix};
use crate::core::utils::geometry::{ProcrustesData, procrustes};
use crate::engine::config::{MergeSettings, MergeType, Precision};
use crate::engine::error::EngineError;
use crate::engine::optimizer::minimize_layout;
use crate::engine::utils::sampling;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, instrument};

/// Where the entries of both source charts ended up in the merged chart.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryMapping {
    /// Merged index of each primary entry.
    pub primary: Vec<usize>,
    /// Merged index of each secondary entry.
    pub secondary: Vec<usize>,
}

impl EntryMapping {
    /// Primary entries keep their order; unmatched secondary entries follow.
    fn build(
        primary_count: usize,
        secondary_count: usize,
        matched: impl Fn(usize) -> Option<usize>,
    ) -> Self {
        let mut next = primary_count;
        let secondary = (0..secondary_count)
            .map(|s| {
                matched(s).unwrap_or_else(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        Self {
            primary: (0..primary_count).collect(),
            secondary,
        }
    }

    pub fn merged_count(&self) -> usize {
        self.primary.len() + self.appended()
    }

    /// Secondary entries with no primary counterpart.
    pub fn appended(&self) -> usize {
        self.secondary
            .iter()
            .filter(|&&index| index >= self.primary.len())
            .count()
    }

    fn is_appended(&self, secondary_no: usize) -> bool {
        self.secondary[secondary_no] >= self.primary.len()
    }
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub merge_type: MergeType,
    pub common: CommonAntigensSera,
    /// Matched pairs listed with the names from both source charts.
    pub common_report: String,
    pub antigens: EntryMapping,
    pub sera: EntryMapping,
    /// Conflicting cells in merged numbering.
    pub conflicts: Vec<TiterConflict>,
    pub number_of_layers: usize,
    /// Entries annotated DISTINCT that were dropped before matching.
    pub removed_distinct: usize,
    pub procrustes: Option<ProcrustesData>,
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "merge {}", self.merge_type)?;
        write!(f, "{}", self.common_report)?;
        writeln!(
            f,
            "antigens: {} ({} new) sera: {} ({} new) layers: {}",
            self.antigens.merged_count(),
            self.antigens.appended(),
            self.sera.merged_count(),
            self.sera.appended(),
            self.number_of_layers
        )?;
        if self.removed_distinct > 0 {
            writeln!(f, "distinct entries removed: {}", self.removed_distinct)?;
        }
        if !self.conflicts.is_empty() {
            writeln!(f, "titer conflicts: {}", self.conflicts.len())?;
            for conflict in &self.conflicts {
                let titers: Vec<String> = conflict.titers.iter().map(Titer::to_string).collect();
                writeln!(
                    f,
                    "  AG {:>4} SR {:>4}  {}",
                    conflict.antigen,
                    conflict.serum,
                    titers.join(" ")
                )?;
            }
        }
        if let Some(procrustes) = &self.procrustes {
            writeln!(f, "{}", procrustes)?;
        }
        Ok(())
    }
}

/// Merges `secondary` into `primary`, producing a new chart.
///
/// Matched antigens and sera collapse into the primary entry, the rest of the
/// secondary entries are appended. Each source table becomes a layer of the
/// merged table. Projections are built according to the merge type.
#[instrument(skip_all, name = "merge_workflow", fields(merge_type = %settings.merge_type))]
pub fn merge(
    primary: &Chart,
    secondary: &Chart,
    settings: &MergeSettings,
) -> Result<(Chart, MergeReport), EngineError> {
    let (primary, secondary, removed_distinct) = if settings.remove_distinct {
        let (primary, removed_primary) = without_distinct(primary)?;
        let (secondary, removed_secondary) = without_distinct(secondary)?;
        (primary, secondary, removed_primary + removed_secondary)
    } else {
        (Cow::Borrowed(primary), Cow::Borrowed(secondary), 0)
    };

    let common = CommonAntigensSera::new(&primary, &secondary, settings.match_level);
    let antigen_map = EntryMapping::build(
        primary.number_of_antigens(),
        secondary.number_of_antigens(),
        |s| common.primary_antigen(s),
    );
    let serum_map = EntryMapping::build(primary.number_of_sera(), secondary.number_of_sera(), |s| {
        common.primary_serum(s)
    });

    let mut antigens = primary.antigens().to_vec();
    antigens.extend(
        secondary
            .antigens()
            .iter()
            .enumerate()
            .filter(|(s, _)| antigen_map.is_appended(*s))
            .map(|(_, antigen)| antigen.clone()),
    );
    let mut sera = primary.sera().to_vec();
    sera.extend(
        secondary
            .sera()
            .iter()
            .enumerate()
            .filter(|(s, _)| serum_map.is_appended(*s))
            .map(|(_, serum)| serum.clone()),
    );

    let (titers, conflicts) = merge_titers(
        &primary,
        &secondary,
        &antigen_map,
        &serum_map,
        settings.combine_cheating_assays,
    )?;
    let number_of_layers = titers.number_of_layers();
    let mut merged = Chart::new(antigens, sera, titers)?.with_name(merged_name(&primary, &secondary));
    merged.set_stress_parameters(primary.stress_parameters());

    let (primary_points, secondary_points) = point_maps(&antigen_map, &serum_map);
    let number_of_points = merged.number_of_points();
    let procrustes_data = match settings.merge_type {
        MergeType::Type1 => None,
        MergeType::Type2 | MergeType::Type3 => {
            let source = first_projection(&primary, "primary")?;
            let mut projection = incremental_projection(source, &primary_points, number_of_points)?;
            if settings.merge_type == MergeType::Type3 {
                let frozen: BTreeSet<usize> = primary_points
                    .iter()
                    .copied()
                    .filter(|&p| projection.layout().is_positioned(p))
                    .collect();
                relax_new_points(&merged, &mut projection, &frozen, settings.precision)?;
            }
            projection.set_comment(format!("merge {}", settings.merge_type));
            merged.add_projection(projection);
            None
        }
        MergeType::Type4 | MergeType::Type5 => {
            let primary_projection = first_projection(&primary, "primary")?;
            let secondary_projection = first_projection(&secondary, "secondary")?;
            let data = procrustes(
                primary_projection.layout(),
                secondary_projection.layout(),
                &common.points(),
                false,
            )?;
            debug!(rms = data.rms, pairs = data.number_of_pairs, "Secondary aligned onto primary.");
            let moved = data.transform_secondary(secondary_projection.layout());
            let layout = overlay_layouts(
                primary_projection.layout(),
                &moved,
                &primary_points,
                &secondary_points,
                number_of_points,
                settings.merge_type == MergeType::Type5,
            )?;
            let mut projection = Projection::new(layout, primary_projection.minimum_column_basis());
            if settings.merge_type == MergeType::Type4 {
                relax_new_points(&merged, &mut projection, &BTreeSet::new(), settings.precision)?;
            }
            projection.set_comment(format!("merge {}", settings.merge_type));
            merged.add_projection(projection);
            Some(data)
        }
    };

    let report = MergeReport {
        merge_type: settings.merge_type,
        common_report: common.report(&primary, &secondary),
        common,
        antigens: antigen_map,
        sera: serum_map,
        conflicts,
        number_of_layers,
        removed_distinct,
        procrustes: procrustes_data,
    };
    info!(
        antigens = merged.number_of_antigens(),
        sera = merged.number_of_sera(),
        conflicts = report.conflicts.len(),
        "Charts merged."
    );
    Ok((merged, report))
}

fn without_distinct(chart: &Chart) -> Result<(Cow<'_, Chart>, usize), ModelError> {
    let antigens: Vec<usize> = (0..chart.number_of_antigens())
        .filter(|&ag| chart.antigens()[ag].is_distinct())
        .collect();
    let sera: Vec<usize> = (0..chart.number_of_sera())
        .filter(|&sr| chart.sera()[sr].is_distinct())
        .collect();
    let removed = antigens.len() + sera.len();
    if removed == 0 {
        return Ok((Cow::Borrowed(chart), 0));
    }
    let mut chart = chart.clone();
    chart.remove_antigens_sera(&antigens, &sera, false)?;
    Ok((Cow::Owned(chart), removed))
}

fn merged_name(primary: &Chart, secondary: &Chart) -> String {
    match (primary.name().is_empty(), secondary.name().is_empty()) {
        (false, false) => format!("{} + {}", primary.name(), secondary.name()),
        (false, true) => primary.name().to_string(),
        _ => secondary.name().to_string(),
    }
}

fn first_projection<'a>(chart: &'a Chart, which: &str) -> Result<&'a Projection, EngineError> {
    if chart.projections().is_empty() {
        return Err(EngineError::Merge(format!("{} chart has no projections", which)));
    }
    Ok(chart.projection(0)?)
}

/// Source layers of a chart; a table without layers is its own single layer.
fn source_layers(titers: &TiterMatrix) -> Result<Vec<Vec<Titer>>, ModelError> {
    if titers.number_of_layers() == 0 {
        return Ok(vec![titers.rows().concat()]);
    }
    (0..titers.number_of_layers())
        .map(|layer_no| titers.layer(layer_no).map(<[Titer]>::to_vec))
        .collect()
}

/// Re-indexes a source layer into the merged table. Returns `None` when the
/// layer has no measured cell.
fn remap_layer(
    layer: &[Titer],
    source_sera: usize,
    antigens: &EntryMapping,
    sera: &EntryMapping,
    secondary: bool,
) -> Option<Vec<Titer>> {
    let merged_sera = sera.merged_count();
    let (antigen_index, serum_index) = if secondary {
        (&antigens.secondary, &sera.secondary)
    } else {
        (&antigens.primary, &sera.primary)
    };
    let mut remapped = vec![Titer::DontCare; antigens.merged_count() * merged_sera];
    let mut measured = false;
    for (cell, titer) in layer.iter().enumerate().filter(|(_, t)| !t.is_dont_care()) {
        let (ag, sr) = (cell / source_sera, cell % source_sera);
        remapped[antigen_index[ag] * merged_sera + serum_index[sr]] = *titer;
        measured = true;
    }
    measured.then_some(remapped)
}

/// Every measured cell of `layer` is already measured with the same titer in `other`.
fn repeats(layer: &[Titer], other: &[Titer]) -> bool {
    layer
        .iter()
        .zip(other)
        .all(|(titer, existing)| titer.is_dont_care() || titer == existing)
}

/// Geometric mean of the regular titers, rounded to a whole dilution value.
fn geometric_mean(titers: &[Titer]) -> Titer {
    let logs: Vec<f64> = titers
        .iter()
        .filter(|t| t.is_regular())
        .filter_map(Titer::value)
        .map(f64::ln)
        .collect();
    if logs.is_empty() {
        return Titer::DontCare;
    }
    Titer::Regular((logs.iter().sum::<f64>() / logs.len() as f64).exp().round())
}

fn merge_titers(
    primary: &Chart,
    secondary: &Chart,
    antigens: &EntryMapping,
    sera: &EntryMapping,
    combine_cheating_assays: bool,
) -> Result<(TiterMatrix, Vec<TiterConflict>), ModelError> {
    let number_of_antigens = antigens.merged_count();
    let number_of_sera = sera.merged_count();

    let primary_layers: Vec<Vec<Titer>> = source_layers(primary.titers())?
        .iter()
        .filter_map(|layer| remap_layer(layer, primary.number_of_sera(), antigens, sera, false))
        .collect();
    let mut secondary_layers: Vec<Vec<Titer>> = source_layers(secondary.titers())?
        .iter()
        .filter_map(|layer| remap_layer(layer, secondary.number_of_sera(), antigens, sera, true))
        .collect();
    if combine_cheating_assays {
        let before = secondary_layers.len();
        secondary_layers.retain(|layer| !primary_layers.iter().any(|p| repeats(layer, p)));
        debug!(
            collapsed = before - secondary_layers.len(),
            "Repeated assays collapsed."
        );
    }
    if secondary_layers.is_empty() && antigens.appended() == 0 && sera.appended() == 0 {
        return Ok((primary.titers().clone(), Vec::new()));
    }

    // Cells measured by the secondary; all others keep the primary's effective titer.
    let touched: Vec<bool> = (0..number_of_antigens * number_of_sera)
        .map(|cell| secondary_layers.iter().any(|layer| !layer[cell].is_dont_care()))
        .collect();
    let primary_effective = remap_layer(
        &primary.titers().rows().concat(),
        primary.number_of_sera(),
        antigens,
        sera,
        false,
    )
    .unwrap_or_else(|| vec![Titer::DontCare; touched.len()]);

    let mut layers = primary_layers;
    layers.extend(secondary_layers);
    let single_source = layers.len() < 2;
    let (mut titers, conflicts) = TiterMatrix::from_layers(number_of_antigens, number_of_sera, layers)?;
    if single_source {
        titers.remove_layers();
    }

    for (cell, _) in touched.iter().enumerate().filter(|(_, touched)| !**touched) {
        if !primary_effective[cell].is_dont_care() {
            titers.set_effective(cell / number_of_sera, cell % number_of_sera, primary_effective[cell]);
        }
    }

    let conflicts: Vec<TiterConflict> = conflicts
        .into_iter()
        .filter(|c| touched[c.antigen * number_of_sera + c.serum])
        .collect();
    for conflict in &conflicts {
        let cell = conflict.antigen * number_of_sera + conflict.serum;
        let resolved = if combine_cheating_assays {
            geometric_mean(&conflict.titers)
        } else {
            match primary_effective[cell] {
                Titer::DontCare => titers.at(conflict.antigen, conflict.serum),
                titer => titer,
            }
        };
        titers.set_effective(conflict.antigen, conflict.serum, resolved);
    }
    Ok((titers, conflicts))
}

/// Source point number to merged point number, for both charts.
fn point_maps(antigens: &EntryMapping, sera: &EntryMapping) -> (Vec<usize>, Vec<usize>) {
    let merged_antigens = antigens.merged_count();
    let map = |ag: &[usize], sr: &[usize]| -> Vec<usize> {
        ag.iter()
            .copied()
            .chain(sr.iter().map(|s| s + merged_antigens))
            .collect()
    };
    (
        map(&antigens.primary, &sera.primary),
        map(&antigens.secondary, &sera.secondary),
    )
}

/// Copy of the primary projection over the merged points; new points are
/// left unpositioned.
fn incremental_projection(
    source: &Projection,
    primary_points: &[usize],
    number_of_points: usize,
) -> Result<Projection, ModelError> {
    let mut layout = Layout::new(number_of_points, source.number_of_dimensions());
    for (point_no, &merged_no) in primary_points.iter().enumerate() {
        if source.layout().is_positioned(point_no) {
            layout.set_point(merged_no, source.layout().point(point_no))?;
        }
    }
    let mut projection = Projection::new(layout, source.minimum_column_basis());
    projection.disconnect(source.disconnected().iter().map(|&p| primary_points[p]))?;
    projection.set_transformation(source.transformation().clone())?;
    Ok(projection)
}

/// Primary points first, then secondary points not positioned yet. With
/// `midpoint` common points sit halfway between both layouts.
fn overlay_layouts(
    primary: &Layout,
    secondary: &Layout,
    primary_points: &[usize],
    secondary_points: &[usize],
    number_of_points: usize,
    midpoint: bool,
) -> Result<Layout, ModelError> {
    let mut layout = Layout::new(number_of_points, primary.number_of_dimensions());
    for (point_no, &merged_no) in primary_points.iter().enumerate() {
        if primary.is_positioned(point_no) {
            layout.set_point(merged_no, primary.point(point_no))?;
        }
    }
    for (point_no, &merged_no) in secondary_points.iter().enumerate() {
        if !secondary.is_positioned(point_no) {
            continue;
        }
        if !layout.is_positioned(merged_no) {
            layout.set_point(merged_no, secondary.point(point_no))?;
        } else if midpoint {
            let middle: Vec<f64> = layout
                .point(merged_no)
                .iter()
                .zip(secondary.point(point_no))
                .map(|(a, b)| (a + b) / 2.0)
                .collect();
            layout.set_point(merged_no, &middle)?;
        }
    }
    Ok(layout)
}

/// Places unpositioned points randomly and minimizes everything not frozen.
fn relax_new_points(
    chart: &Chart,
    projection: &mut Projection,
    frozen: &BTreeSet<usize>,
    precision: Precision,
) -> Result<(), EngineError> {
    let stress = chart.stress_for(projection)?;
    let mut rng = sampling::attempt_rng(0, 0);
    let placed = sampling::randomize_unpositioned(
        projection.layout_mut(),
        stress.max_target_distance(),
        |p| stress.is_disconnected(p),
        &mut rng,
    );
    let outcome = minimize_layout(&stress, projection.layout_mut(), frozen, precision);
    projection.set_stress(stress.value(projection.layout()));
    debug!(placed, iterations = outcome.iterations, "Merged projection relaxed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::MatchLevel;
    use crate::core::models::antigen::{Antigen, Serum};
    use crate::core::models::chart::CloneType;
    use crate::core::models::column_bases::MinimumColumnBasis;

    fn table_chart(antigens: &[&str], sera: &[&str], rows: &[Vec<&str>]) -> Chart {
        Chart::new(
            antigens.iter().map(|name| Antigen::new(*name)).collect(),
            sera.iter().map(|name| Serum::new(*name)).collect(),
            TiterMatrix::parse_rows(rows).unwrap(),
        )
        .unwrap()
    }

    fn with_layout(mut chart: Chart, points: &[Vec<f64>]) -> Chart {
        let layout = Layout::from_points(points, 2).unwrap();
        chart.add_projection(Projection::new(layout, MinimumColumnBasis::None));
        chart
    }

    // Antigens and sera on one line: A0 and S0 at 0, C at 1, A1 and S1 at 2.
    fn line_primary() -> Chart {
        with_layout(
            table_chart(&["A0", "A1"], &["S0", "S1"], &[vec!["1280", "160"], vec!["320", "640"]]),
            &[vec![0.0, 0.0], vec![2.0, 0.0], vec![0.0, 0.0], vec![2.0, 0.0]],
        )
    }

    fn line_secondary() -> Chart {
        with_layout(
            table_chart(
                &["A0", "A1", "C"],
                &["S0", "S1"],
                &[vec!["1280", "160"], vec!["320", "640"], vec!["640", "320"]],
            ),
            &[
                vec![5.0, 5.0],
                vec![7.0, 5.0],
                vec![6.0, 5.0],
                vec![5.0, 5.0],
                vec![7.0, 5.0],
            ],
        )
    }

    fn settings(merge_type: MergeType) -> MergeSettings {
        MergeSettings {
            merge_type,
            ..Default::default()
        }
    }

    #[test]
    fn merging_with_an_empty_chart_keeps_the_table() {
        let primary = line_primary();
        let empty = Chart::new(Vec::new(), Vec::new(), TiterMatrix::new(0, 0)).unwrap();
        let (merged, report) = merge(&primary, &empty, &settings(MergeType::Type1)).unwrap();
        assert_eq!(merged.titers(), primary.titers());
        assert!(report.conflicts.is_empty());
        assert!(merged.projections().is_empty());
    }

    #[test]
    fn matched_entries_collapse_and_the_rest_is_appended() {
        let primary = table_chart(&["A", "B"], &["S1"], &[vec!["40"], vec!["80"]]);
        let secondary = table_chart(&["B", "C"], &["S1", "S2"], &[vec!["80", "20"], vec!["*", "<10"]]);
        let (merged, report) = merge(&primary, &secondary, &MergeSettings::default()).unwrap();

        let names: Vec<&str> = merged.antigens().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(merged.number_of_sera(), 2);
        assert_eq!(report.antigens.secondary, vec![1, 2]);
        assert_eq!(report.sera.appended(), 1);
        assert_eq!(report.number_of_layers, 2);
        assert!(report.conflicts.is_empty());
        assert_eq!(merged.titers().titer(1, 0).unwrap(), Titer::Regular(80.0));
        assert_eq!(merged.titers().titer(2, 1).unwrap(), Titer::LessThan(10.0));
        assert_eq!(merged.titers().titer(0, 1).unwrap(), Titer::DontCare);
    }

    #[test]
    fn conflicts_resolve_to_primary_or_geometric_mean() {
        let primary = table_chart(&["A"], &["S"], &[vec!["40"]]);
        let secondary = table_chart(&["A"], &["S"], &[vec!["160"]]);

        let (merged, report) = merge(&primary, &secondary, &MergeSettings::default()).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].titers.len(), 2);
        assert_eq!(merged.titers().titer(0, 0).unwrap(), Titer::Regular(40.0));
        assert!(report.to_string().contains("titer conflicts: 1"));

        let combine = MergeSettings {
            combine_cheating_assays: true,
            ..Default::default()
        };
        let (merged, _) = merge(&primary, &secondary, &combine).unwrap();
        assert_eq!(merged.titers().titer(0, 0).unwrap(), Titer::Regular(80.0));
    }

    #[test]
    fn layered_chart_keeps_its_resolved_titers_in_later_merges() {
        let combine = MergeSettings {
            combine_cheating_assays: true,
            ..Default::default()
        };
        let (layered, _) = merge(
            &table_chart(&["A"], &["S"], &[vec!["40"]]),
            &table_chart(&["A"], &["S"], &[vec!["160"]]),
            &combine,
        )
        .unwrap();
        assert_eq!(layered.titers().number_of_layers(), 2);
        assert_eq!(layered.titers().titer(0, 0).unwrap(), Titer::Regular(80.0));

        let empty = Chart::new(Vec::new(), Vec::new(), TiterMatrix::new(0, 0)).unwrap();
        let (merged, report) = merge(&layered, &empty, &MergeSettings::default()).unwrap();
        assert_eq!(merged.titers(), layered.titers());
        assert!(report.conflicts.is_empty());

        let other_serum = table_chart(&["A"], &["T"], &[vec!["320"]]);
        let (merged, report) = merge(&layered, &other_serum, &MergeSettings::default()).unwrap();
        assert!(report.conflicts.is_empty());
        assert_eq!(merged.titers().titer(0, 0).unwrap(), Titer::Regular(80.0));
        assert_eq!(merged.titers().titer(0, 1).unwrap(), Titer::Regular(320.0));
    }

    #[test]
    fn repeated_assay_collapses_to_one_layer() {
        let primary = line_primary();
        let repeat = line_primary();
        let (merged, report) = merge(&primary, &repeat, &MergeSettings::default()).unwrap();
        assert_eq!(report.number_of_layers, 2);
        assert_eq!(merged.titers().rows(), primary.titers().rows());

        let combine = MergeSettings {
            combine_cheating_assays: true,
            ..Default::default()
        };
        let (merged, report) = merge(&primary, &repeat, &combine).unwrap();
        assert_eq!(report.number_of_layers, 0);
        assert_eq!(merged.titers(), primary.titers());
    }

    #[test]
    fn distinct_entries_are_appended_or_removed() {
        let primary = table_chart(&["A"], &["S"], &[vec!["40"]]);
        let secondary = Chart::new(
            vec![Antigen::new("A").with_annotation("DISTINCT")],
            vec![Serum::new("S")],
            TiterMatrix::parse_rows(&[vec!["80"]]).unwrap(),
        )
        .unwrap();

        let (merged, _) = merge(&primary, &secondary, &MergeSettings::default()).unwrap();
        assert_eq!(merged.number_of_antigens(), 2);

        let remove = MergeSettings {
            remove_distinct: true,
            ..Default::default()
        };
        let (merged, report) = merge(&primary, &secondary, &remove).unwrap();
        assert_eq!(merged.number_of_antigens(), 1);
        assert_eq!(report.removed_distinct, 1);
        assert_eq!(merged.titers().titer(0, 0).unwrap(), Titer::Regular(40.0));
    }

    #[test]
    fn incremental_merge_copies_primary_and_leaves_new_points_unpositioned() {
        let (merged, _) = merge(&line_primary(), &line_secondary(), &settings(MergeType::Type2)).unwrap();
        let layout = merged.projection(0).unwrap().layout();
        assert_eq!(layout.number_of_points(), 5);
        assert_eq!(layout.point(1), &[2.0, 0.0]);
        assert_eq!(layout.point(4), &[2.0, 0.0]);
        assert!(!layout.is_positioned(2));
    }

    #[test]
    fn type3_relaxes_only_the_new_points() {
        let (merged, _) = merge(&line_primary(), &line_secondary(), &settings(MergeType::Type3)).unwrap();
        let layout = merged.projection(0).unwrap().layout();
        assert!(layout.is_positioned(2));
        assert_eq!(layout.point(0), &[0.0, 0.0]);
        assert_eq!(layout.point(3), &[0.0, 0.0]);
        assert!(merged.projection_stress(0).unwrap() < 1e-3);
    }

    #[test]
    fn overlay_merges_place_secondary_points_in_the_primary_frame() {
        let (merged, report) =
            merge(&line_primary(), &line_secondary(), &settings(MergeType::Type5)).unwrap();
        assert!(report.procrustes.as_ref().unwrap().rms < 1e-9);
        let layout = merged.projection(0).unwrap().layout();
        assert!((layout.point(2)[0] - 1.0).abs() < 1e-9);
        assert!(layout.point(2)[1].abs() < 1e-9);
        assert!((layout.point(1)[0] - 2.0).abs() < 1e-9);

        let (merged, _) = merge(&line_primary(), &line_secondary(), &settings(MergeType::Type4)).unwrap();
        assert!(merged.projection_stress(0).unwrap() < 1e-6);
        let d = merged.projection(0).unwrap().layout().distance(0, 2).unwrap();
        assert!((d - 1.0).abs() < 1e-3);
    }

    #[test]
    fn projection_merges_need_projections() {
        let primary = table_chart(&["A"], &["S"], &[vec!["40"]]);
        let err = merge(&primary, &primary, &settings(MergeType::Type2)).unwrap_err();
        assert!(matches!(err, EngineError::Merge(_)));

        let tables_only = line_primary().clone_with(CloneType::Titers);
        let err = merge(&line_primary(), &tables_only, &settings(MergeType::Type4)).unwrap_err();
        assert!(matches!(err, EngineError::Merge(_)));
    }

    #[test]
    fn ignored_matching_follows_the_match_level() {
        let primary = Chart::new(
            vec![Antigen::new("A").with_passage("E1")],
            vec![Serum::new("S")],
            TiterMatrix::parse_rows(&[vec!["40"]]).unwrap(),
        )
        .unwrap();
        let secondary = Chart::new(
            vec![Antigen::new("A").with_passage("MDCK1")],
            vec![Serum::new("S")],
            TiterMatrix::parse_rows(&[vec!["40"]]).unwrap(),
        )
        .unwrap();
        let strict = MergeSettings {
            match_level: MatchLevel::Strict,
            ..Default::default()
        };
        assert_eq!(merge(&primary, &secondary, &strict).unwrap().0.number_of_antigens(), 2);
        let ignored = MergeSettings {
            match_level: MatchLevel::Ignored,
            ..Default::default()
        };
        assert_eq!(merge(&primary, &secondary, &ignored).unwrap().0.number_of_antigens(), 1);
    }
}
