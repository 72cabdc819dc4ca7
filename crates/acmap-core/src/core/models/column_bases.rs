use super::error::ModelError;
use super::titer::{log_titer, unlog_titer};
use super::titers::TiterMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lower bound applied to computed column bases.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum MinimumColumnBasis {
    #[default]
    None,
    /// Stored logged, e.g. `1280` is kept as `7.0`.
    Logged(f64),
}

impl MinimumColumnBasis {
    pub fn logged(&self) -> Option<f64> {
        match *self {
            MinimumColumnBasis::None => None,
            MinimumColumnBasis::Logged(v) => Some(v),
        }
    }

    pub fn apply(&self, column_basis: f64) -> f64 {
        match *self {
            MinimumColumnBasis::None => column_basis,
            MinimumColumnBasis::Logged(v) => column_basis.max(v),
        }
    }
}

impl FromStr for MinimumColumnBasis {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(MinimumColumnBasis::None);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 10.0 => {
                Ok(MinimumColumnBasis::Logged(log_titer(value)))
            }
            _ => Err(ModelError::InvalidMinimumColumnBasis(s.to_string())),
        }
    }
}

impl fmt::Display for MinimumColumnBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MinimumColumnBasis::None => write!(f, "none"),
            MinimumColumnBasis::Logged(v) => write!(f, "{}", unlog_titer(v).round()),
        }
    }
}

/// One logged column basis per serum.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnBases(Vec<f64>);

impl ColumnBases {
    pub fn new(data: Vec<f64>) -> Self {
        Self(data)
    }

    /// Column basis of each serum is its highest regular logged titer, floored
    /// by `minimum`. A serum without regular titers gets the minimum (or 0).
    pub fn compute(titers: &TiterMatrix, minimum: MinimumColumnBasis) -> Self {
        let mut bases: Vec<Option<f64>> = vec![None; titers.number_of_sera()];
        for (_, serum_no, titer) in titers.iter_measured() {
            if let Some(logged) = titer.logged_for_column_bases() {
                let slot = &mut bases[serum_no];
                *slot = Some(slot.map_or(logged, |current| current.max(logged)));
            }
        }
        Self(
            bases
                .into_iter()
                .map(|basis| minimum.apply(basis.unwrap_or_else(|| minimum.logged().unwrap_or(0.0))))
                .collect(),
        )
    }

    #[inline]
    pub fn get(&self, serum_no: usize) -> Option<f64> {
        self.0.get(serum_no).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.0
    }

    pub(crate) fn remove(&mut self, sera: &[usize]) {
        let mut serum_no = 0;
        self.0.retain(|_| {
            let keep = !sera.contains(&serum_no);
            serum_no += 1;
            keep
        });
    }
}
