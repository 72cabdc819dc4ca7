//! # acmap Core Library
//!
//! Antigenic map optimization and comparison: titers between antigens and
//! sera are embedded as points in a low-dimensional Euclidean space by
//! minimizing stress, and the resulting maps are tested, compared and merged.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Chart`, `TiterMatrix`,
//!   `Projection`), the stress function, chart matching and Procrustes geometry.
//!
//! - **[`engine`]: The Logic Core.** Configuration, the L-BFGS minimizer,
//!   random layout sampling, the multi-start optimizer, grid test and avidity
//!   test machinery, all parallelized across attempts or points.
//!
//! - **[`workflows`]: The Public API.** Complete procedures operating on a chart:
//!   relax, incremental relax, grid test with move-relax, avidity test,
//!   merge and orientation onto a master chart.

pub mod core;
pub mod engine;
pub mod workflows;
