//! CSV input and output: titer tables, layouts and per-point reports.
//!
//! A titer table has a header row whose first cell is ignored and whose
//! remaining cells name the sera; each following row starts with an antigen
//! name. A layout has one `AG`/`SR` row per point, antigens first, with an
//! empty cell for every coordinate of an unpositioned point.

use crate::error::{CliError, Result};
use acmap::core::models::antigen::{Antigen, Serum};
use acmap::core::models::chart::Chart;
use acmap::core::models::layout::Layout;
use acmap::core::models::titers::TiterMatrix;
use std::path::Path;
use tracing::{debug, info};

pub fn read_chart(path: &Path) -> Result<Chart> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CliError::parsing(path, e))?;
    let sera: Vec<Serum> = reader
        .headers()
        .map_err(|e| CliError::parsing(path, e))?
        .iter()
        .skip(1)
        .map(Serum::new)
        .collect();

    let mut antigens = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CliError::parsing(path, e))?;
        let mut cells = record.iter();
        antigens.push(Antigen::new(cells.next().unwrap_or_default()));
        rows.push(cells.map(str::to_string).collect());
    }

    let titers = if rows.is_empty() {
        TiterMatrix::new(0, sera.len())
    } else {
        TiterMatrix::parse_rows(&rows).map_err(|e| CliError::parsing(path, e))?
    };
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let chart = Chart::new(antigens, sera, titers)
        .map_err(|e| CliError::parsing(path, e))?
        .with_name(name);
    info!(
        path = %path.display(),
        antigens = chart.number_of_antigens(),
        sera = chart.number_of_sera(),
        "Titer table loaded."
    );
    Ok(chart)
}

pub fn write_chart(path: &Path, chart: &Chart) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["antigen".to_string()];
    header.extend(chart.sera().iter().map(|sr| sr.name.clone()));
    writer.write_record(&header)?;
    for (antigen, row) in chart.antigens().iter().zip(chart.titers().rows()) {
        let mut record = vec![antigen.name.clone()];
        record.extend(row.iter().map(ToString::to_string));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), "Titer table written.");
    Ok(())
}

fn point_label(chart: &Chart, point_no: usize) -> (&'static str, &str) {
    match point_no.checked_sub(chart.number_of_antigens()) {
        None => ("AG", chart.antigens()[point_no].name.as_str()),
        Some(serum_no) => ("SR", chart.sera()[serum_no].name.as_str()),
    }
}

/// Reads a layout for `chart`; rows must follow the chart's point order.
pub fn read_layout(path: &Path, chart: &Chart) -> Result<Layout> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CliError::parsing(path, e))?;
    let dimensions = reader
        .headers()
        .map_err(|e| CliError::parsing(path, e))?
        .len()
        .saturating_sub(2);
    if dimensions == 0 {
        return Err(CliError::parsing(
            path,
            anyhow::anyhow!("layout has no coordinate columns"),
        ));
    }

    let mut points = Vec::with_capacity(chart.number_of_points());
    for (point_no, record) in reader.records().enumerate() {
        let record = record.map_err(|e| CliError::parsing(path, e))?;
        if point_no >= chart.number_of_points() {
            return Err(CliError::parsing(
                path,
                anyhow::anyhow!("more rows than the {} point(s) of the table", chart.number_of_points()),
            ));
        }
        let (kind, name) = point_label(chart, point_no);
        if record.get(0) != Some(kind) || record.get(1) != Some(name) {
            return Err(CliError::parsing(
                path,
                anyhow::anyhow!("row {} is not {} \"{}\"", point_no + 1, kind, name),
            ));
        }
        let coordinates = record
            .iter()
            .skip(2)
            .map(|cell| {
                if cell.is_empty() {
                    Ok(f64::NAN)
                } else {
                    cell.parse::<f64>()
                        .map_err(|e| CliError::parsing(path, anyhow::anyhow!("\"{}\": {}", cell, e)))
                }
            })
            .collect::<Result<Vec<f64>>>()?;
        points.push(coordinates);
    }
    if points.len() != chart.number_of_points() {
        return Err(CliError::parsing(
            path,
            anyhow::anyhow!(
                "{} row(s) for {} point(s)",
                points.len(),
                chart.number_of_points()
            ),
        ));
    }
    Layout::from_points(&points, dimensions).map_err(|e| CliError::parsing(path, e))
}

pub fn write_layout(path: &Path, chart: &Chart, layout: &Layout) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["type".to_string(), "name".to_string()];
    header.extend((1..=layout.number_of_dimensions()).map(|d| format!("x{}", d)));
    writer.write_record(&header)?;
    for point_no in 0..layout.number_of_points() {
        let (kind, name) = point_label(chart, point_no);
        let mut record = vec![kind.to_string(), name.to_string()];
        record.extend(layout.point(point_no).iter().map(|v| {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!(path = %path.display(), points = layout.number_of_points(), "Layout written.");
    Ok(())
}
