//! Helpers shared by the engine tasks: the scoped worker pool and seeded
//! random sampling of starting layouts.

pub mod pool;
pub mod sampling;
