use crate::core::models::layout::Layout;
use rand::prelude::*;
use rand::rngs::StdRng;

/// Deterministic generator for attempt `attempt` of a run seeded with `seed`.
pub fn attempt_rng(seed: u64, attempt: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(attempt as u64))
}

/// Layout with every point not rejected by `skip` drawn uniformly from a cube
/// of side `side` centered on the origin. Skipped points stay unpositioned.
pub fn random_layout(
    number_of_points: usize,
    number_of_dimensions: usize,
    side: f64,
    skip: impl Fn(usize) -> bool,
    rng: &mut impl Rng,
) -> Layout {
    let mut layout = Layout::new(number_of_points, number_of_dimensions);
    let half = side.abs() / 2.0;
    for point_no in 0..number_of_points {
        if skip(point_no) {
            continue;
        }
        for value in layout.point_mut(point_no) {
            *value = rng.gen_range(-half..=half);
        }
    }
    layout
}

/// Places unpositioned points (other than skipped ones) randomly. Returns how
/// many points were placed.
pub fn randomize_unpositioned(
    layout: &mut Layout,
    side: f64,
    skip: impl Fn(usize) -> bool,
    rng: &mut impl Rng,
) -> usize {
    let half = side.abs() / 2.0;
    let mut placed = 0;
    for point_no in 0..layout.number_of_points() {
        if skip(point_no) || layout.is_positioned(point_no) {
            continue;
        }
        for value in layout.point_mut(point_no) {
            *value = rng.gen_range(-half..=half);
        }
        placed += 1;
    }
    placed
}

/// Offsets positioned points selected by `movable` by up to `amount` per coordinate.
pub fn jitter(layout: &mut Layout, amount: f64, movable: impl Fn(usize) -> bool, rng: &mut impl Rng) {
    if amount <= 0.0 {
        return;
    }
    for point_no in 0..layout.number_of_points() {
        if !movable(point_no) || !layout.is_positioned(point_no) {
            continue;
        }
        for value in layout.point_mut(point_no) {
            *value += rng.gen_range(-amount..=amount);
        }
    }
}
