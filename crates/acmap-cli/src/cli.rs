use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "acmap developers",
    version,
    about = "acmap CLI - make, test, compare and merge antigenic maps from titer tables.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors, and hide progress bars
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of threads for parallel optimization.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Make maps from random starts and write the best layout.
    Relax(RelaxArgs),
    /// Find trapped and hemisphering points, optionally moving them and relaxing.
    GridTest(GridTestArgs),
    /// Sweep avidity adjusts for every antigen of a map.
    Avidity(AvidityArgs),
    /// Superimpose two maps and report how far matched points are apart.
    Compare(CompareArgs),
    /// Merge two titer tables, optionally with their maps.
    Merge(MergeArgs),
}

/// Configuration file and `--set` overrides shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S relax.optimizations=100
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Overrides of the `[relax]` configuration section.
#[derive(Args, Debug, Clone, Default)]
pub struct RelaxOverrides {
    /// Number of map dimensions.
    #[arg(short = 'd', long, value_name = "INT")]
    pub dimensions: Option<usize>,

    /// Number of random starts.
    #[arg(short = 'n', long, value_name = "INT")]
    pub optimizations: Option<usize>,

    /// Minimum column basis: "none" or a titer such as 1280.
    #[arg(short = 'm', long, value_name = "MCB")]
    pub minimum_column_basis: Option<String>,

    /// Optimization precision: "rough" or "fine".
    #[arg(long, value_name = "PRECISION")]
    pub precision: Option<String>,

    #[command(flatten)]
    pub dimension_annealing: DimensionAnnealingFlags,

    /// Seed of the first random start; start i uses seed + i.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Points excluded from optimization, comma separated.
    #[arg(long, value_name = "POINTS", value_delimiter = ',')]
    pub disconnect: Vec<usize>,
}

/// Mutually exclusive flags overriding `relax.dimension-annealing`.
#[derive(Args, Debug, Clone, Copy, Default)]
#[group(required = false, multiple = false)]
pub struct DimensionAnnealingFlags {
    /// Start in more dimensions and reduce to the requested number.
    #[arg(long)]
    pub dimension_annealing: bool,
    /// Optimize directly in the requested number of dimensions.
    #[arg(long)]
    pub no_dimension_annealing: bool,
}

/// A titer table with an optional starting layout.
#[derive(Args, Debug, Clone)]
pub struct MapInput {
    /// Titer table in CSV: a header row of sera, then one row per antigen.
    #[arg(short = 't', long, required = true, value_name = "PATH")]
    pub table: PathBuf,

    /// Layout in CSV (as written by `relax`); maps are made from random
    /// starts when absent.
    #[arg(short = 'l', long, value_name = "PATH")]
    pub layout: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RelaxArgs {
    /// Titer table in CSV: a header row of sera, then one row per antigen.
    #[arg(short = 't', long, required = true, value_name = "PATH")]
    pub table: PathBuf,

    /// Write the layout of the best map to this CSV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub relax: RelaxOverrides,
}

#[derive(Args, Debug)]
pub struct GridTestArgs {
    #[command(flatten)]
    pub input: MapInput,

    /// Write the layout of the last map to this CSV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Grid step in map units.
    #[arg(long, value_name = "FLOAT")]
    pub step: Option<f64>,

    /// Rounds of moving trapped points and relaxing.
    #[arg(long, value_name = "INT")]
    pub move_relax: Option<usize>,

    /// Points to test, comma separated; every point when absent.
    #[arg(long, value_name = "POINTS", value_delimiter = ',')]
    pub points: Vec<usize>,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub relax: RelaxOverrides,
}

#[derive(Args, Debug)]
pub struct AvidityArgs {
    #[command(flatten)]
    pub input: MapInput,

    /// Write a layout with antigens moved to their best adjust to this CSV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Adjust step in log2 units.
    #[arg(long, value_name = "FLOAT")]
    pub step: Option<f64>,

    /// Lowest adjust of the sweep.
    #[arg(long, value_name = "FLOAT", allow_hyphen_values = true)]
    pub min_adjust: Option<f64>,

    /// Highest adjust of the sweep.
    #[arg(long, value_name = "FLOAT", allow_hyphen_values = true)]
    pub max_adjust: Option<f64>,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub relax: RelaxOverrides,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Titer table of the primary map.
    #[arg(long, required = true, value_name = "PATH")]
    pub primary: PathBuf,

    /// Layout of the primary map.
    #[arg(long, required = true, value_name = "PATH")]
    pub primary_layout: PathBuf,

    /// Titer table of the secondary map.
    #[arg(long, required = true, value_name = "PATH")]
    pub secondary: PathBuf,

    /// Layout of the secondary map.
    #[arg(long, required = true, value_name = "PATH")]
    pub secondary_layout: PathBuf,

    /// How antigens and sera are matched: strict, relaxed, ignored or auto.
    #[arg(long, value_name = "LEVEL")]
    pub match_level: Option<String>,

    /// Allow uniform scaling of the secondary map.
    #[arg(long)]
    pub scaling: bool,

    /// Write per-point distances to this CSV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Titer table of the primary chart.
    #[arg(long, required = true, value_name = "PATH")]
    pub primary: PathBuf,

    /// Titer table of the secondary chart.
    #[arg(long, required = true, value_name = "PATH")]
    pub secondary: PathBuf,

    /// Layout of the primary chart, needed by merge types 2 to 5.
    #[arg(long, value_name = "PATH")]
    pub primary_layout: Option<PathBuf>,

    /// Layout of the secondary chart, needed by merge types 4 and 5.
    #[arg(long, value_name = "PATH")]
    pub secondary_layout: Option<PathBuf>,

    /// Merge type: type1 (tables-only) to type5.
    #[arg(long = "type", value_name = "TYPE")]
    pub merge_type: Option<String>,

    /// How antigens and sera are matched: strict, relaxed, ignored or auto.
    #[arg(long, value_name = "LEVEL")]
    pub match_level: Option<String>,

    /// Average conflicting titers and collapse repeated tables.
    #[arg(long)]
    pub combine_cheating_assays: bool,

    /// Drop entries annotated DISTINCT before merging.
    #[arg(long)]
    pub remove_distinct: bool,

    /// Write the merged titer table to this CSV file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write the merged layout to this CSV file.
    #[arg(long, value_name = "PATH")]
    pub output_layout: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relax_arguments_parse() {
        let cli = Cli::parse_from([
            "acmap", "-vv", "relax", "-t", "table.csv", "-d", "3", "-n", "50", "--disconnect",
            "1,4", "-S", "relax.seed=7", "--dimension-annealing",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Relax(args) = cli.command else {
            panic!("Expected 'relax' subcommand");
        };
        assert_eq!(args.relax.dimensions, Some(3));
        assert_eq!(args.relax.optimizations, Some(50));
        assert_eq!(args.relax.disconnect, vec![1, 4]);
        assert_eq!(args.config.set_values, vec!["relax.seed=7"]);
        assert!(args.relax.dimension_annealing.dimension_annealing);
    }

    #[test]
    fn annealing_flags_are_exclusive() {
        let result = Cli::try_parse_from([
            "acmap",
            "relax",
            "-t",
            "table.csv",
            "--dimension-annealing",
            "--no-dimension-annealing",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn avidity_accepts_negative_adjusts() {
        let cli = Cli::parse_from([
            "acmap", "avidity", "-t", "t.csv", "--min-adjust", "-2", "--max-adjust", "2",
        ]);
        let Commands::Avidity(args) = cli.command else {
            panic!("Expected 'avidity' subcommand");
        };
        assert_eq!(args.min_adjust, Some(-2.0));
        assert_eq!(args.max_adjust, Some(2.0));
        assert!(args.input.layout.is_none());
    }

    #[test]
    fn merge_requires_both_tables() {
        assert!(Cli::try_parse_from(["acmap", "merge", "--primary", "a.csv"]).is_err());
        let cli = Cli::parse_from([
            "acmap", "merge", "--primary", "a.csv", "--secondary", "b.csv", "--type", "type3",
        ]);
        let Commands::Merge(args) = cli.command else {
            panic!("Expected 'merge' subcommand");
        };
        assert_eq!(args.merge_type.as_deref(), Some("type3"));
    }
}
