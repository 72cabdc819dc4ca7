use acmap::engine::config::{AviditySettings, GridTestSettings};

/// Values used when neither flags, `--set` nor the file provide one.
pub struct DefaultsConfig {
    pub dimensions: usize,
    pub optimizations: usize,
    pub minimum_column_basis: String,
    pub precision: String,
    pub dimension_annealing: bool,
    pub seed: u64,
    pub grid_test: GridTestSettings,
    pub avidity: AviditySettings,
    pub merge_type: String,
    pub match_level: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            dimensions: 2,
            optimizations: 10,
            minimum_column_basis: "none".to_string(),
            precision: "fine".to_string(),
            dimension_annealing: false,
            seed: 1,
            grid_test: GridTestSettings::default(),
            avidity: AviditySettings::default(),
            merge_type: "type1".to_string(),
            match_level: "auto".to_string(),
        }
    }
}
