use crate::error::{CliError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRelaxConfig {
    pub dimensions: Option<usize>,
    pub optimizations: Option<usize>,
    pub minimum_column_basis: Option<String>,
    pub precision: Option<String>,
    pub dimension_annealing: Option<bool>,
    pub seed: Option<u64>,
    pub disconnect: Option<Vec<usize>>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileGridTestConfig {
    pub step: Option<f64>,
    pub stress_threshold: Option<f64>,
    pub distance_threshold: Option<f64>,
    pub move_relax: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileAvidityConfig {
    pub step: Option<f64>,
    pub min_adjust: Option<f64>,
    pub max_adjust: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileMergeConfig {
    #[serde(rename = "type")]
    pub merge_type: Option<String>,
    pub match_level: Option<String>,
    pub combine_cheating_assays: Option<bool>,
    pub remove_distinct: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub relax: Option<FileRelaxConfig>,
    pub grid_test: Option<FileGridTestConfig>,
    pub avidity: Option<FileAvidityConfig>,
    pub merge: Option<FileMergeConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::parsing(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_use_kebab_case_keys() {
        let config: FileConfig = toml::from_str(
            r#"
            [relax]
            dimensions = 3
            minimum-column-basis = "1280"
            dimension-annealing = true
            disconnect = [0, 5]

            [grid-test]
            move-relax = 2

            [merge]
            type = "incremental"
            combine-cheating-assays = true
            "#,
        )
        .unwrap();
        let relax = config.relax.unwrap();
        assert_eq!(relax.dimensions, Some(3));
        assert_eq!(relax.minimum_column_basis.as_deref(), Some("1280"));
        assert_eq!(relax.disconnect, Some(vec![0, 5]));
        assert_eq!(config.grid_test.unwrap().move_relax, Some(2));
        assert_eq!(config.merge.unwrap().merge_type.as_deref(), Some("incremental"));
        assert!(config.avidity.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("[relax]\nnum-dims = 2\n").is_err());
        assert!(toml::from_str::<FileConfig>("[plot]\nsize = 2\n").is_err());
    }

    #[test]
    fn unreadable_file_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[relax\n").unwrap();
        let err = FileConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, CliError::FileParsing { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }
}
