//! # Core Models Module
//!
//! Data structures describing an antigenic chart: titers and the titer
//! table, column bases, antigen and serum entries, layouts and projections,
//! and the [`chart::Chart`] arena that owns them.
//!
//! ## Key Components
//!
//! - [`titer`] - A single measurement (`40`, `<40`, `>1280`, `*`) and log2 conversion
//! - [`titers`] - Antigen x serum table with optional replicate layers
//! - [`column_bases`] - Per-serum normalization and the minimum column basis setting
//! - [`antigen`] - Antigen and serum entries used for matching and selection
//! - [`layout`] - Point coordinates and display transformations
//! - [`projection`] - One embedding with its cached stress and point sets
//! - [`chart`] - Owner of entries, titers and the ordered projection collection
//!
//! ## Usage
//!
//! ```ignore
//! use acmap::core::models::{chart::Chart, titers::TiterMatrix, antigen::{Antigen, Serum}};
//!
//! let titers = TiterMatrix::parse_rows(&[vec!["40", "80"], vec!["<10", "160"]])?;
//! let chart = Chart::new(
//!     vec![Antigen::new("A/PERTH/16/2009"), Antigen::new("A/VICTORIA/361/2011")],
//!     vec![Serum::new("A/PERTH/16/2009"), Serum::new("A/TEXAS/50/2012")],
//!     titers,
//! )?;
//! ```

pub mod antigen;
pub mod chart;
pub mod column_bases;
pub mod error;
pub mod layout;
pub mod projection;
pub mod titer;
pub mod titers;
