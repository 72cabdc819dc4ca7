//! # Workflows Module
//!
//! Complete procedures operating on a [`Chart`](crate::core::models::chart::Chart).
//!
//! ## Overview
//!
//! Workflows are the entry points for front ends. Each one validates its
//! inputs, drives the engine, reports progress and decides which results are
//! stored back into the chart as projections.
//!
//! ## Architecture
//!
//! - **Relax** ([`relax`]) - Multi-start optimization, incremental relax and in-place relax
//! - **Grid Test** ([`grid_test`]) - Grid test with the move-relax loop
//! - **Avidity** ([`avidity`]) - Avidity sweeps, moving antigens and avidity-adjusted relax
//! - **Merge** ([`merge`]) - Matching and merging two charts, merge types 1 to 5
//! - **Orientation** ([`orient`]) - Superimposing a projection onto a master chart

pub mod avidity;
pub mod grid_test;
pub mod merge;
pub mod orient;
pub mod relax;
