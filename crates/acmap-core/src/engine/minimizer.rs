use super::config::Precision;
use std::collections::VecDeque;
use tracing::trace;

/// A smooth function of a flat variable vector.
pub trait Objective: Sync {
    /// Writes the gradient at `x` into `gradient` and returns the value.
    fn value_and_gradient(&self, x: &[f64], gradient: &mut [f64]) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerSettings {
    pub max_iterations: usize,
    /// Stop when the relative change of the value falls below this.
    pub function_tolerance: f64,
    pub gradient_tolerance: f64,
    /// Number of correction pairs kept by L-BFGS.
    pub history: usize,
}

impl MinimizerSettings {
    pub fn for_precision(precision: Precision) -> Self {
        match precision {
            Precision::Rough => Self {
                max_iterations: 300,
                function_tolerance: 1e-6,
                gradient_tolerance: 1e-4,
                history: 8,
            },
            Precision::Fine => Self {
                max_iterations: 5000,
                function_tolerance: 1e-12,
                gradient_tolerance: 1e-8,
                history: 12,
            },
        }
    }
}

impl Default for MinimizerSettings {
    fn default() -> Self {
        Self::for_precision(Precision::Fine)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizerOutcome {
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Minimizes `objective` in place with limited-memory BFGS and a
/// backtracking Armijo line search.
///
/// Hitting the iteration limit is not an error; the outcome records whether
/// a tolerance was reached.
pub fn minimize<O: Objective + ?Sized>(
    objective: &O,
    x: &mut [f64],
    settings: &MinimizerSettings,
) -> MinimizerOutcome {
    let n = x.len();
    let mut gradient = vec![0.0; n];
    let mut value = objective.value_and_gradient(x, &mut gradient);
    if n == 0 || !value.is_finite() {
        return MinimizerOutcome {
            value,
            iterations: 0,
            converged: n == 0,
        };
    }

    let mut history: VecDeque<Correction> = VecDeque::with_capacity(settings.history);
    let mut candidate = vec![0.0; n];
    let mut candidate_gradient = vec![0.0; n];
    let mut converged = false;
    let mut iterations = 0;

    while iterations < settings.max_iterations {
        let gradient_norm = norm(&gradient);
        if gradient_norm <= settings.gradient_tolerance {
            converged = true;
            break;
        }
        iterations += 1;

        let mut direction = two_loop_direction(&history, &gradient);
        let mut slope = dot(&direction, &gradient);
        if slope >= 0.0 {
            history.clear();
            direction = gradient.iter().map(|g| -g).collect();
            slope = -gradient_norm * gradient_norm;
        }

        let mut step = if history.is_empty() {
            (1.0 / gradient_norm).min(1.0)
        } else {
            1.0
        };
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            for i in 0..n {
                candidate[i] = x[i] + step * direction[i];
            }
            let candidate_value = objective.value_and_gradient(&candidate, &mut candidate_gradient);
            if candidate_value.is_finite() && candidate_value <= value + ARMIJO_C1 * step * slope {
                accepted = Some(candidate_value);
                break;
            }
            step *= 0.5;
        }
        let Some(new_value) = accepted else {
            // no decrease along the direction: numerically at a minimum
            converged = true;
            break;
        };

        let s: Vec<f64> = (0..n).map(|i| candidate[i] - x[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| candidate_gradient[i] - gradient[i]).collect();
        let sy = dot(&s, &y);
        if sy > 1e-12 {
            if history.len() == settings.history {
                history.pop_front();
            }
            history.push_back(Correction { s, y, rho: 1.0 / sy });
        }

        let change = (value - new_value).abs();
        x.copy_from_slice(&candidate);
        gradient.copy_from_slice(&candidate_gradient);
        let previous = value;
        value = new_value;
        if change <= settings.function_tolerance * previous.abs().max(value.abs()).max(1.0) {
            converged = true;
            break;
        }
    }

    trace!(value, iterations, converged, "Minimization finished.");
    MinimizerOutcome {
        value,
        iterations,
        converged,
    }
}

fn two_loop_direction(history: &VecDeque<Correction>, gradient: &[f64]) -> Vec<f64> {
    let mut q = gradient.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for c in history.iter().rev() {
        let alpha = c.rho * dot(&c.s, &q);
        axpy(-alpha, &c.y, &mut q);
        alphas.push(alpha);
    }
    if let Some(last) = history.back() {
        let yy = dot(&last.y, &last.y);
        if yy > 0.0 {
            let gamma = dot(&last.s, &last.y) / yy;
            q.iter_mut().for_each(|v| *v *= gamma);
        }
    }
    for (c, alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = c.rho * dot(&c.y, &q);
        axpy(alpha - beta, &c.s, &mut q);
    }
    q.iter_mut().for_each(|v| *v = -*v);
    q
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

#[inline]
fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}
