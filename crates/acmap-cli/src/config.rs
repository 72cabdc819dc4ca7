//! Layered CLI configuration: built-in defaults, a TOML file, `--set`
//! overrides and command-line flags, in increasing order of precedence.

pub mod builder;
pub mod defaults;
pub mod file;
