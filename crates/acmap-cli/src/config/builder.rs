use super::defaults::DefaultsConfig;
use super::file::FileConfig;
use crate::cli::{ConfigArgs, MergeArgs, RelaxOverrides};
use crate::error::{CliError, Result};
use acmap::core::common::MatchLevel;
use acmap::core::models::column_bases::MinimumColumnBasis;
use acmap::engine::config::{
    AviditySettings, DimensionAnnealing, GridTestSettings, MergeSettings, MergeType, Precision,
    RelaxConfig, RelaxConfigBuilder,
};
use std::fmt::Display;
use std::str::FromStr;
use tracing::debug;

/// Reads the configuration file, if any, and applies `--set` overrides on top.
pub fn load_file_config(args: &ConfigArgs) -> Result<FileConfig> {
    let file_config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    apply_set_values(file_config, &args.set_values)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| CliError::Config(format!("Invalid value for {}: '{}' ({})", key, value, e)))
}

pub fn precision(file: &FileConfig, flags: &RelaxOverrides) -> Result<Precision> {
    let defaults = DefaultsConfig::default();
    let section = file.relax.as_ref();
    let text = flags
        .precision
        .as_deref()
        .or(section.and_then(|s| s.precision.as_deref()))
        .unwrap_or(&defaults.precision);
    parse_value("precision", text)
}

pub fn minimum_column_basis(file: &FileConfig, flags: &RelaxOverrides) -> Result<MinimumColumnBasis> {
    let defaults = DefaultsConfig::default();
    let text = flags
        .minimum_column_basis
        .as_deref()
        .or(file.relax.as_ref().and_then(|s| s.minimum_column_basis.as_deref()))
        .unwrap_or(&defaults.minimum_column_basis);
    parse_value("minimum column basis", text)
}

pub fn build_relax_config(
    file: &FileConfig,
    flags: &RelaxOverrides,
    threads: Option<usize>,
) -> Result<RelaxConfig> {
    let defaults = DefaultsConfig::default();
    let section = file.relax.clone().unwrap_or_default();

    let dimension_annealing = match (
        flags.dimension_annealing.dimension_annealing,
        flags.dimension_annealing.no_dimension_annealing,
    ) {
        (true, false) => true,
        (false, true) => false,
        _ => section
            .dimension_annealing
            .unwrap_or(defaults.dimension_annealing),
    };
    let disconnected = if flags.disconnect.is_empty() {
        section.disconnect.unwrap_or_default()
    } else {
        flags.disconnect.clone()
    };

    let config = RelaxConfigBuilder::new()
        .number_of_dimensions(
            flags
                .dimensions
                .or(section.dimensions)
                .unwrap_or(defaults.dimensions),
        )
        .number_of_optimizations(
            flags
                .optimizations
                .or(section.optimizations)
                .unwrap_or(defaults.optimizations),
        )
        .minimum_column_basis(minimum_column_basis(file, flags)?)
        .precision(precision(file, flags)?)
        .dimension_annealing(if dimension_annealing {
            DimensionAnnealing::Enabled
        } else {
            DimensionAnnealing::Disabled
        })
        .disconnected(disconnected)
        .seed(flags.seed.or(section.seed).unwrap_or(defaults.seed))
        .threads(threads.unwrap_or(0))
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    debug!(?config, "Relax configuration built.");
    Ok(config)
}

pub fn build_grid_test_settings(
    file: &FileConfig,
    step: Option<f64>,
    move_relax: Option<usize>,
    precision: Precision,
    threads: Option<usize>,
) -> Result<GridTestSettings> {
    let defaults = DefaultsConfig::default().grid_test;
    let section = file.grid_test.clone().unwrap_or_default();
    let settings = GridTestSettings {
        grid_step: step.or(section.step).unwrap_or(defaults.grid_step),
        stress_threshold: section.stress_threshold.unwrap_or(defaults.stress_threshold),
        distance_threshold: section
            .distance_threshold
            .unwrap_or(defaults.distance_threshold),
        precision,
        threads: threads.unwrap_or(defaults.threads),
        move_relax: move_relax.or(section.move_relax).unwrap_or(defaults.move_relax),
    };
    settings
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(settings)
}

pub fn build_avidity_settings(
    file: &FileConfig,
    step: Option<f64>,
    min_adjust: Option<f64>,
    max_adjust: Option<f64>,
    precision: Precision,
    threads: Option<usize>,
) -> Result<AviditySettings> {
    let defaults = DefaultsConfig::default().avidity;
    let section = file.avidity.clone().unwrap_or_default();
    let settings = AviditySettings {
        step: step.or(section.step).unwrap_or(defaults.step),
        min_adjust: min_adjust.or(section.min_adjust).unwrap_or(defaults.min_adjust),
        max_adjust: max_adjust.or(section.max_adjust).unwrap_or(defaults.max_adjust),
        precision,
        threads: threads.unwrap_or(defaults.threads),
    };
    settings
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(settings)
}

pub fn match_level(file: &FileConfig, flag: Option<&str>) -> Result<MatchLevel> {
    let defaults = DefaultsConfig::default();
    let text = flag
        .or(file.merge.as_ref().and_then(|m| m.match_level.as_deref()))
        .unwrap_or(&defaults.match_level);
    parse_value("match level", text)
}

pub fn build_merge_settings(file: &FileConfig, args: &MergeArgs) -> Result<MergeSettings> {
    let defaults = DefaultsConfig::default();
    let section = file.merge.clone().unwrap_or_default();
    let merge_type: MergeType = parse_value(
        "merge type",
        args.merge_type
            .as_deref()
            .or(section.merge_type.as_deref())
            .unwrap_or(&defaults.merge_type),
    )?;
    Ok(MergeSettings {
        match_level: match_level(file, args.match_level.as_deref())?,
        merge_type,
        combine_cheating_assays: args.combine_cheating_assays
            || section.combine_cheating_assays.unwrap_or(false),
        remove_distinct: args.remove_distinct || section.remove_distinct.unwrap_or(false),
        precision: precision(file, &RelaxOverrides::default())?,
    })
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let (key, value) = (key.trim(), value.trim());
        debug!(key, value, "Applying --set override.");

        match key {
            "relax.dimensions" => {
                config.relax.get_or_insert_with(Default::default).dimensions =
                    Some(parse_value(key, value)?);
            }
            "relax.optimizations" => {
                config.relax.get_or_insert_with(Default::default).optimizations =
                    Some(parse_value(key, value)?);
            }
            "relax.minimum-column-basis" => {
                parse_value::<MinimumColumnBasis>(key, value)?;
                config
                    .relax
                    .get_or_insert_with(Default::default)
                    .minimum_column_basis = Some(value.to_string());
            }
            "relax.precision" => {
                parse_value::<Precision>(key, value)?;
                config.relax.get_or_insert_with(Default::default).precision =
                    Some(value.to_string());
            }
            "relax.dimension-annealing" => {
                config
                    .relax
                    .get_or_insert_with(Default::default)
                    .dimension_annealing = Some(
                    parse_value::<DimensionAnnealing>(key, value)? == DimensionAnnealing::Enabled,
                );
            }
            "relax.seed" => {
                config.relax.get_or_insert_with(Default::default).seed =
                    Some(parse_value(key, value)?);
            }
            "grid-test.step" => {
                config.grid_test.get_or_insert_with(Default::default).step =
                    Some(parse_value(key, value)?);
            }
            "grid-test.stress-threshold" => {
                config
                    .grid_test
                    .get_or_insert_with(Default::default)
                    .stress_threshold = Some(parse_value(key, value)?);
            }
            "grid-test.distance-threshold" => {
                config
                    .grid_test
                    .get_or_insert_with(Default::default)
                    .distance_threshold = Some(parse_value(key, value)?);
            }
            "grid-test.move-relax" => {
                config.grid_test.get_or_insert_with(Default::default).move_relax =
                    Some(parse_value(key, value)?);
            }
            "avidity.step" => {
                config.avidity.get_or_insert_with(Default::default).step =
                    Some(parse_value(key, value)?);
            }
            "avidity.min-adjust" => {
                config.avidity.get_or_insert_with(Default::default).min_adjust =
                    Some(parse_value(key, value)?);
            }
            "avidity.max-adjust" => {
                config.avidity.get_or_insert_with(Default::default).max_adjust =
                    Some(parse_value(key, value)?);
            }
            "merge.type" => {
                parse_value::<MergeType>(key, value)?;
                config.merge.get_or_insert_with(Default::default).merge_type =
                    Some(value.to_string());
            }
            "merge.match-level" => {
                parse_value::<MatchLevel>(key, value)?;
                config.merge.get_or_insert_with(Default::default).match_level =
                    Some(value.to_string());
            }
            "merge.combine-cheating-assays" => {
                config
                    .merge
                    .get_or_insert_with(Default::default)
                    .combine_cheating_assays = Some(parse_value(key, value)?);
            }
            "merge.remove-distinct" => {
                config.merge.get_or_insert_with(Default::default).remove_distinct =
                    Some(parse_value(key, value)?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::DimensionAnnealingFlags;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("acmap.toml");
        fs::write(&path, content).unwrap();
        path
    }

    fn config_args(config: Option<PathBuf>, set_values: &[&str]) -> ConfigArgs {
        ConfigArgs {
            config,
            set_values: set_values.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn defaults_fill_everything_missing() {
        let file = load_file_config(&ConfigArgs::default()).unwrap();
        let config = build_relax_config(&file, &RelaxOverrides::default(), None).unwrap();
        let defaults = DefaultsConfig::default();
        assert_eq!(config.number_of_dimensions, defaults.dimensions);
        assert_eq!(config.number_of_optimizations, defaults.optimizations);
        assert_eq!(config.minimum_column_basis, MinimumColumnBasis::None);
        assert_eq!(config.precision, Precision::Fine);
        assert_eq!(config.dimension_annealing, DimensionAnnealing::Disabled);
        assert_eq!(config.seed, defaults.seed);
        assert_eq!(config.threads, 0);
        assert!(config.disconnected.is_empty());
    }

    #[test]
    fn file_values_are_used() {
        let dir = tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            [relax]
            dimensions = 3
            optimizations = 25
            minimum-column-basis = "1280"
            precision = "rough"
            dimension-annealing = true
            disconnect = [2]

            [grid-test]
            step = 0.5
            move-relax = 4
            "#,
        );
        let file = load_file_config(&config_args(Some(path), &[])).unwrap();
        let config = build_relax_config(&file, &RelaxOverrides::default(), Some(2)).unwrap();
        assert_eq!(config.number_of_dimensions, 3);
        assert_eq!(config.number_of_optimizations, 25);
        assert_eq!(config.minimum_column_basis, MinimumColumnBasis::Logged(7.0));
        assert_eq!(config.precision, Precision::Rough);
        assert_eq!(config.dimension_annealing, DimensionAnnealing::Enabled);
        assert_eq!(config.disconnected, vec![2]);
        assert_eq!(config.threads, 2);

        let grid = build_grid_test_settings(&file, None, None, config.precision, None).unwrap();
        assert_eq!(grid.grid_step, 0.5);
        assert_eq!(grid.move_relax, 4);
        assert_eq!(grid.stress_threshold, GridTestSettings::default().stress_threshold);
    }

    #[test]
    fn precedence_is_flag_then_set_then_file() {
        let dir = tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
            [relax]
            dimensions = 3
            optimizations = 25
            seed = 9
            dimension-annealing = true
            "#,
        );
        let file = load_file_config(&config_args(
            Some(path),
            &["relax.optimizations=40", "relax.dimensions=5", "relax.seed=11"],
        ))
        .unwrap();
        let flags = RelaxOverrides {
            dimensions: Some(2),
            dimension_annealing: DimensionAnnealingFlags {
                dimension_annealing: false,
                no_dimension_annealing: true,
            },
            ..Default::default()
        };
        let config = build_relax_config(&file, &flags, None).unwrap();
        assert_eq!(config.number_of_dimensions, 2);
        assert_eq!(config.number_of_optimizations, 40);
        assert_eq!(config.seed, 11);
        assert_eq!(config.dimension_annealing, DimensionAnnealing::Disabled);
    }

    #[test]
    fn set_values_reach_every_section() {
        let file = load_file_config(&config_args(
            None,
            &[
                "grid-test.stress-threshold=0.5",
                "avidity.min-adjust=-2",
                "avidity.max-adjust=2",
                "merge.type=incremental",
                "merge.match-level=strict",
                "merge.combine-cheating-assays=true",
            ],
        ))
        .unwrap();
        let grid = build_grid_test_settings(&file, Some(0.2), None, Precision::Fine, None).unwrap();
        assert_eq!(grid.stress_threshold, 0.5);
        assert_eq!(grid.grid_step, 0.2);

        let avidity = build_avidity_settings(&file, None, None, None, Precision::Fine, None).unwrap();
        assert_eq!(avidity.adjusts(), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);

        let merge_args = MergeArgs {
            primary: PathBuf::from("a.csv"),
            secondary: PathBuf::from("b.csv"),
            primary_layout: None,
            secondary_layout: None,
            merge_type: None,
            match_level: None,
            combine_cheating_assays: false,
            remove_distinct: false,
            output: None,
            output_layout: None,
            config: ConfigArgs::default(),
        };
        let merge = build_merge_settings(&file, &merge_args).unwrap();
        assert_eq!(merge.merge_type, MergeType::Type2);
        assert_eq!(merge.match_level, MatchLevel::Strict);
        assert!(merge.combine_cheating_assays);
        assert!(!merge.remove_distinct);
    }

    #[test]
    fn bad_set_values_are_rejected() {
        for bad in [
            "relax.dimensions",
            "relax.dimensions=two",
            "relax.precision=exact",
            "merge.type=type9",
            "plot.size=3",
        ] {
            let result = load_file_config(&config_args(None, &[bad]));
            assert!(matches!(result, Err(CliError::Config(_))), "{}", bad);
        }
    }

    #[test]
    fn invalid_settings_fail_validation() {
        let file = FileConfig::default();
        assert!(build_grid_test_settings(&file, Some(0.0), None, Precision::Fine, None).is_err());
        assert!(
            build_avidity_settings(&file, None, Some(3.0), Some(-3.0), Precision::Fine, None)
                .is_err()
        );
        let flags = RelaxOverrides {
            dimensions: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            build_relax_config(&file, &flags, None),
            Err(CliError::Config(_))
        ));
    }
}
