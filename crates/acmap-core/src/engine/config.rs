use crate::core::common::MatchLevel;
use crate::core::models::column_bases::MinimumColumnBasis;
use phf::{Map, phf_map};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Unrecognized {kind}: \"{value}\"")]
    UnknownValue { kind: &'static str, value: String },
}

/// Minimizer preset: `Rough` stops early for fast screening, `Fine` runs
/// to full convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    Rough,
    #[default]
    Fine,
}

impl FromStr for Precision {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rough" => Ok(Self::Rough),
            "fine" => Ok(Self::Fine),
            _ => Err(ConfigError::UnknownValue {
                kind: "precision",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Precision::Rough => "rough",
            Precision::Fine => "fine",
        })
    }
}

/// Dimensions in which annealing starts before reducing to the target.
pub const ANNEALING_START_DIMENSIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DimensionAnnealing {
    #[default]
    Disabled,
    Enabled,
}

impl DimensionAnnealing {
    pub fn start_dimensions(self, number_of_dimensions: usize) -> usize {
        match self {
            DimensionAnnealing::Disabled => number_of_dimensions,
            DimensionAnnealing::Enabled => number_of_dimensions.max(ANNEALING_START_DIMENSIONS),
        }
    }
}

impl FromStr for DimensionAnnealing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "true" | "on" | "enabled" => Ok(Self::Enabled),
            "no" | "false" | "off" | "disabled" => Ok(Self::Disabled),
            _ => Err(ConfigError::UnknownValue {
                kind: "dimension annealing",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxConfig {
    pub number_of_dimensions: usize,
    pub number_of_optimizations: usize,
    pub minimum_column_basis: MinimumColumnBasis,
    pub precision: Precision,
    pub dimension_annealing: DimensionAnnealing,
    /// Points excluded from stress and left unpositioned.
    pub disconnected: Vec<usize>,
    /// Attempt `i` draws its random start from `seed + i`.
    pub seed: u64,
    /// Worker threads, 0 for all available.
    pub threads: usize,
}

#[derive(Default)]
pub struct RelaxConfigBuilder {
    number_of_dimensions: Option<usize>,
    number_of_optimizations: Option<usize>,
    minimum_column_basis: Option<MinimumColumnBasis>,
    precision: Option<Precision>,
    dimension_annealing: Option<DimensionAnnealing>,
    disconnected: Vec<usize>,
    seed: Option<u64>,
    threads: Option<usize>,
}

impl RelaxConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number_of_dimensions(mut self, dims: usize) -> Self {
        self.number_of_dimensions = Some(dims);
        self
    }
    pub fn number_of_optimizations(mut self, n: usize) -> Self {
        self.number_of_optimizations = Some(n);
        self
    }
    pub fn minimum_column_basis(mut self, mcb: MinimumColumnBasis) -> Self {
        self.minimum_column_basis = Some(mcb);
        self
    }
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = Some(precision);
        self
    }
    pub fn dimension_annealing(mut self, annealing: DimensionAnnealing) -> Self {
        self.dimension_annealing = Some(annealing);
        self
    }
    pub fn disconnected(mut self, points: Vec<usize>) -> Self {
        self.disconnected = points;
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Uses `count` when no optimization count, or zero, was given.
    pub fn fallback_optimizations(mut self, count: usize) -> Self {
        if self.number_of_optimizations.is_none_or(|n| n == 0) {
            self.number_of_optimizations = Some(count);
        }
        self
    }

    pub fn build(self) -> Result<RelaxConfig, ConfigError> {
        let number_of_dimensions = self
            .number_of_dimensions
            .ok_or(ConfigError::MissingParameter("number_of_dimensions"))?;
        if number_of_dimensions == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "number_of_dimensions",
                reason: "must be at least 1".to_string(),
            });
        }
        let number_of_optimizations = self
            .number_of_optimizations
            .ok_or(ConfigError::MissingParameter("number_of_optimizations"))?;
        if number_of_optimizations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "number_of_optimizations",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(RelaxConfig {
            number_of_dimensions,
            number_of_optimizations,
            minimum_column_basis: self.minimum_column_basis.unwrap_or_default(),
            precision: self.precision.unwrap_or_default(),
            dimension_annealing: self.dimension_annealing.unwrap_or_default(),
            disconnected: self.disconnected,
            seed: self.seed.unwrap_or(0),
            threads: self.threads.unwrap_or(0),
        })
    }
}

/// Random starts made by an avidity relax when none are requested.
pub const AVIDITY_RELAX_OPTIMIZATIONS: usize = 100;

/// Default random offset applied to movable points before re-minimizing.
pub const DEFAULT_INCREMENTAL_JITTER: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct IncrementalRelaxConfig {
    pub number_of_optimizations: usize,
    pub precision: Precision,
    /// Freezes every point already positioned in the source projection.
    pub unmovable_non_nan_points: bool,
    pub remove_source_projection: bool,
    /// Half-width of the uniform jitter added to movable points.
    pub jitter: f64,
    pub seed: u64,
    pub threads: usize,
}

impl Default for IncrementalRelaxConfig {
    fn default() -> Self {
        Self {
            number_of_optimizations: 1,
            precision: Precision::Fine,
            unmovable_non_nan_points: false,
            remove_source_projection: false,
            jitter: DEFAULT_INCREMENTAL_JITTER,
            seed: 0,
            threads: 0,
        }
    }
}

impl IncrementalRelaxConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.number_of_optimizations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "number_of_optimizations",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.jitter >= 0.0 && self.jitter.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "jitter",
                reason: format!("{} is not a non-negative number", self.jitter),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridTestSettings {
    pub grid_step: f64,
    /// Contribution drop above which a moved point is trapped.
    pub stress_threshold: f64,
    /// Distance a point must move to be trapped or hemisphering.
    pub distance_threshold: f64,
    pub precision: Precision,
    pub threads: usize,
    /// Test and move-relax rounds; 0 runs the test once without moving.
    pub move_relax: usize,
}

impl Default for GridTestSettings {
    fn default() -> Self {
        Self {
            grid_step: 0.1,
            stress_threshold: 0.25,
            distance_threshold: 1.0,
            precision: Precision::Fine,
            threads: 0,
            move_relax: 0,
        }
    }
}

impl GridTestSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.grid_step > 0.0 && self.grid_step.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "grid_step",
                reason: format!("{} is not a positive number", self.grid_step),
            });
        }
        if self.stress_threshold < 0.0 || self.distance_threshold < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "thresholds",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AviditySettings {
    pub step: f64,
    pub min_adjust: f64,
    pub max_adjust: f64,
    pub precision: Precision,
    pub threads: usize,
}

impl Default for AviditySettings {
    fn default() -> Self {
        Self {
            step: 1.0,
            min_adjust: -6.0,
            max_adjust: 6.0,
            precision: Precision::Fine,
            threads: 0,
        }
    }
}

impl AviditySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.step > 0.0 && self.step.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "step",
                reason: format!("{} is not a positive number", self.step),
            });
        }
        if self.min_adjust > self.max_adjust {
            return Err(ConfigError::InvalidParameter {
                name: "min_adjust",
                reason: format!("{} exceeds max_adjust {}", self.min_adjust, self.max_adjust),
            });
        }
        Ok(())
    }

    /// Logged adjusts from `min_adjust` to `max_adjust` inclusive.
    pub fn adjusts(&self) -> Vec<f64> {
        let count = ((self.max_adjust - self.min_adjust) / self.step + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|i| self.min_adjust + i as f64 * self.step)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeType {
    /// Tables only, no projections.
    #[default]
    Type1,
    /// Primary layout copied, secondary-only points unpositioned.
    Type2,
    /// Type 2, then secondary-only points relaxed with primary points frozen.
    Type3,
    /// Secondary aligned onto primary by Procrustes, then the whole map relaxed.
    Type4,
    /// Type 4 with common points at the midpoint and no relaxation.
    Type5,
}

static MERGE_TYPE_NAMES: Map<&'static str, MergeType> = phf_map! {
    "type1" => MergeType::Type1,
    "tables-only" => MergeType::Type1,
    "1" => MergeType::Type1,
    "type2" => MergeType::Type2,
    "incremental" => MergeType::Type2,
    "2" => MergeType::Type2,
    "type3" => MergeType::Type3,
    "3" => MergeType::Type3,
    "type4" => MergeType::Type4,
    "4" => MergeType::Type4,
    "type5" => MergeType::Type5,
    "5" => MergeType::Type5,
};

impl FromStr for MergeType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MERGE_TYPE_NAMES
            .get(s.to_lowercase().as_str())
            .copied()
            .ok_or_else(|| ConfigError::UnknownValue {
                kind: "merge type",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for MergeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeType::Type1 => "type1",
            MergeType::Type2 => "type2",
            MergeType::Type3 => "type3",
            MergeType::Type4 => "type4",
            MergeType::Type5 => "type5",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeSettings {
    pub match_level: MatchLevel,
    pub merge_type: MergeType,
    /// Averages conflicting titers and collapses duplicated tables.
    pub combine_cheating_assays: bool,
    pub remove_distinct: bool,
    pub precision: Precision,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relax_builder_requires_dimensions_and_optimizations() {
        assert_eq!(
            RelaxConfigBuilder::new().number_of_optimizations(1).build(),
            Err(ConfigError::MissingParameter("number_of_dimensions"))
        );
        assert_eq!(
            RelaxConfigBuilder::new().number_of_dimensions(2).build(),
            Err(ConfigError::MissingParameter("number_of_optimizations"))
        );
        assert!(matches!(
            RelaxConfigBuilder::new()
                .number_of_dimensions(0)
                .number_of_optimizations(1)
                .build(),
            Err(ConfigError::InvalidParameter { name: "number_of_dimensions", .. })
        ));
    }

    #[test]
    fn relax_builder_fills_defaults() {
        let config = RelaxConfigBuilder::new()
            .number_of_dimensions(2)
            .number_of_optimizations(10)
            .build()
            .unwrap();
        assert_eq!(config.precision, Precision::Fine);
        assert_eq!(config.dimension_annealing, DimensionAnnealing::Disabled);
        assert_eq!(config.minimum_column_basis, MinimumColumnBasis::None);
        assert_eq!((config.seed, config.threads), (0, 0));
    }

    #[test]
    fn fallback_replaces_zero_optimizations() {
        let config = RelaxConfigBuilder::new()
            .number_of_dimensions(2)
            .number_of_optimizations(0)
            .fallback_optimizations(AVIDITY_RELAX_OPTIMIZATIONS)
            .build()
            .unwrap();
        assert_eq!(config.number_of_optimizations, 100);
    }

    #[test]
    fn annealing_starts_in_at_least_five_dimensions() {
        assert_eq!(DimensionAnnealing::Enabled.start_dimensions(2), 5);
        assert_eq!(DimensionAnnealing::Enabled.start_dimensions(7), 7);
        assert_eq!(DimensionAnnealing::Disabled.start_dimensions(2), 2);
    }

    #[test]
    fn merge_type_aliases_and_unknown_names() {
        assert_eq!("tables-only".parse::<MergeType>().unwrap(), MergeType::Type1);
        assert_eq!("incremental".parse::<MergeType>().unwrap(), MergeType::Type2);
        assert_eq!("TYPE4".parse::<MergeType>().unwrap(), MergeType::Type4);
        assert_eq!(
            "type9".parse::<MergeType>(),
            Err(ConfigError::UnknownValue {
                kind: "merge type",
                value: "type9".to_string()
            })
        );
    }

    #[test]
    fn precision_and_annealing_parse() {
        assert_eq!("rough".parse::<Precision>().unwrap(), Precision::Rough);
        assert!("medium".parse::<Precision>().is_err());
        assert_eq!("yes".parse::<DimensionAnnealing>().unwrap(), DimensionAnnealing::Enabled);
    }

    #[test]
    fn avidity_adjusts_cover_the_range_inclusively() {
        let settings = AviditySettings::default();
        let adjusts = settings.adjusts();
        assert_eq!(adjusts.len(), 13);
        assert_eq!(adjusts.first(), Some(&-6.0));
        assert_eq!(adjusts.last(), Some(&6.0));

        let narrow = AviditySettings {
            min_adjust: -1.0,
            max_adjust: 1.0,
            ..Default::default()
        };
        assert_eq!(narrow.adjusts(), vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn settings_validation() {
        assert!(GridTestSettings::default().validate().is_ok());
        let bad_grid = GridTestSettings {
            grid_step: 0.0,
            ..Default::default()
        };
        assert!(bad_grid.validate().is_err());
        let bad_avidity = AviditySettings {
            min_adjust: 2.0,
            max_adjust: 1.0,
            ..Default::default()
        };
        assert!(bad_avidity.validate().is_err());
        assert!(IncrementalRelaxConfig::default().validate().is_ok());
    }
}
