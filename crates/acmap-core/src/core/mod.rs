//! # Core Module
//!
//! Stateless building blocks of antigenic cartography: the chart data model,
//! the stress function that scores a layout against its titers, matching of
//! antigens and sera between charts, Procrustes superposition and
//! predicate-driven point selection.
//!
//! ## Architecture
//!
//! - **Data Model** ([`models`]) - Titers, titer tables, column bases, entries, layouts, projections and charts
//! - **Objective** ([`stress`]) - Stress value, gradient and per-point contributions
//! - **Chart Comparison** ([`common`]) - Common antigens and sera at several match levels
//! - **Geometry** ([`utils`]) - Procrustes superposition of layouts
//! - **Selection** ([`selection`]) - Choosing antigens and sera by predicate, clade or amino acid
//!
//! ## Conventions
//!
//! Titers are logged as `log2(titer / 10)`. Points are numbered antigens
//! first, then sera. A NaN coordinate means the point is not positioned.

pub mod common;
pub mod models;
pub mod selection;
pub mod stress;
pub mod utils;
