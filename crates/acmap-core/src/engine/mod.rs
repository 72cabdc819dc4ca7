//! # Engine Module
//!
//! Numerical machinery behind the chart workflows: stress minimization,
//! random-start optimization, grid testing and avidity sweeps.
//!
//! ## Overview
//!
//! The engine works on borrowed chart data and produces layouts and result
//! records; it never mutates a [`Chart`](crate::core::models::chart::Chart)
//! itself. Workflows decide which results become projections.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Typed settings with builders and string parsing
//! - **Error Handling** ([`error`]) - Engine error type wrapping model, config and Procrustes failures
//! - **Progress Monitoring** ([`progress`]) - Phase and task events for front ends
//! - **Minimizer** ([`minimizer`]) - L-BFGS with backtracking line search
//! - **Optimizer** ([`optimizer`]) - Random starts, dimension annealing, single-point relax
//! - **Grid Test** ([`grid_test`]) - Trapped and hemisphering point detection
//! - **Avidity** ([`avidity`]) - Per-antigen avidity adjust sweeps
//!
//! ## Key Capabilities
//!
//! - **Reproducible multi-start optimization**: attempt `i` is seeded from `seed + i`
//! - **Parallel execution** on a scoped rayon pool honouring the caller's thread count
//! - **Partial relaxation** with unmovable and disconnected points

pub mod avidity;
pub mod config;
pub mod error;
pub mod minimizer;
pub mod optimizer;
pub mod progress;
pub(crate) mod utils;
