use super::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Titer value of the 1:10 reference dilution; logged titers are `log2(value / 10)`.
pub const TITER_REFERENCE: f64 = 10.0;

/// A single hemagglutination-inhibition (or neutralization) measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Titer {
    Regular(f64),
    /// Measured below the lowest dilution, e.g. `<10`.
    LessThan(f64),
    /// Measured above the highest dilution, e.g. `>1280`.
    MoreThan(f64),
    #[default]
    DontCare,
}

impl Titer {
    #[inline]
    pub fn is_regular(&self) -> bool {
        matches!(self, Titer::Regular(_))
    }

    #[inline]
    pub fn is_less_than(&self) -> bool {
        matches!(self, Titer::LessThan(_))
    }

    #[inline]
    pub fn is_more_than(&self) -> bool {
        matches!(self, Titer::MoreThan(_))
    }

    #[inline]
    pub fn is_dont_care(&self) -> bool {
        matches!(self, Titer::DontCare)
    }

    #[inline]
    pub fn is_thresholded(&self) -> bool {
        self.is_less_than() || self.is_more_than()
    }

    pub fn value(&self) -> Option<f64> {
        match *self {
            Titer::Regular(v) | Titer::LessThan(v) | Titer::MoreThan(v) => Some(v),
            Titer::DontCare => None,
        }
    }

    /// `log2(value / 10)` ignoring the threshold sign.
    pub fn logged(&self) -> Option<f64> {
        self.value().map(log_titer)
    }

    /// Logged value with thresholded titers shifted one step outwards.
    pub fn logged_with_thresholded(&self) -> Option<f64> {
        match *self {
            Titer::Regular(v) => Some(log_titer(v)),
            Titer::LessThan(v) => Some(log_titer(v) - 1.0),
            Titer::MoreThan(v) => Some(log_titer(v) + 1.0),
            Titer::DontCare => None,
        }
    }

    /// Only regular titers participate in computed column bases.
    pub fn logged_for_column_bases(&self) -> Option<f64> {
        match *self {
            Titer::Regular(v) => Some(log_titer(v)),
            _ => None,
        }
    }
}

#[inline]
pub fn log_titer(value: f64) -> f64 {
    (value / TITER_REFERENCE).log2()
}

#[inline]
pub fn unlog_titer(logged: f64) -> f64 {
    logged.exp2() * TITER_REFERENCE
}

impl FromStr for Titer {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "*" || trimmed.is_empty() {
            return Ok(Titer::DontCare);
        }
        let (constructor, digits): (fn(f64) -> Titer, &str) =
            if let Some(rest) = trimmed.strip_prefix('<') {
                (Titer::LessThan, rest)
            } else if let Some(rest) = trimmed.strip_prefix('>') {
                (Titer::MoreThan, rest)
            } else {
                (Titer::Regular, trimmed)
            };
        match digits.parse::<f64>() {
            Ok(value) if value.is_finite() && value > 0.0 => Ok(constructor(value)),
            _ => Err(ModelError::InvalidTiter(s.to_string())),
        }
    }
}

impl fmt::Display for Titer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Titer::Regular(v) => write!(f, "{}", v),
            Titer::LessThan(v) => write!(f, "<{}", v),
            Titer::MoreThan(v) => write!(f, ">{}", v),
            Titer::DontCare => write!(f, "*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn parse_recognizes_all_titer_kinds() {
        assert_eq!("40".parse::<Titer>().unwrap(), Titer::Regular(40.0));
        assert_eq!("<10".parse::<Titer>().unwrap(), Titer::LessThan(10.0));
        assert_eq!(">1280".parse::<Titer>().unwrap(), Titer::MoreThan(1280.0));
        assert_eq!("*".parse::<Titer>().unwrap(), Titer::DontCare);
        assert_eq!("".parse::<Titer>().unwrap(), Titer::DontCare);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            "abc".parse::<Titer>(),
            Err(ModelError::InvalidTiter(_))
        ));
        assert!("<".parse::<Titer>().is_err());
        assert!("-40".parse::<Titer>().is_err());
        assert!("0".parse::<Titer>().is_err());
    }

    #[test]
    fn display_matches_parse_input() {
        for text in ["40", "<10", ">1280", "*"] {
            assert_eq!(text.parse::<Titer>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn logged_uses_base_two_relative_to_ten() {
        assert!(f64_approx_equal(Titer::Regular(10.0).logged().unwrap(), 0.0));
        assert!(f64_approx_equal(Titer::Regular(160.0).logged().unwrap(), 4.0));
        assert!(f64_approx_equal(Titer::LessThan(40.0).logged().unwrap(), 2.0));
        assert!(Titer::DontCare.logged().is_none());
    }

    #[test]
    fn logged_with_thresholded_shifts_thresholded_titers() {
        assert!(f64_approx_equal(
            Titer::LessThan(40.0).logged_with_thresholded().unwrap(),
            1.0
        ));
        assert!(f64_approx_equal(
            Titer::MoreThan(40.0).logged_with_thresholded().unwrap(),
            3.0
        ));
        assert!(f64_approx_equal(
            Titer::Regular(40.0).logged_with_thresholded().unwrap(),
            2.0
        ));
    }

    #[test]
    fn only_regular_titers_count_for_column_bases() {
        assert!(Titer::Regular(80.0).logged_for_column_bases().is_some());
        assert!(Titer::LessThan(80.0).logged_for_column_bases().is_none());
        assert!(Titer::MoreThan(80.0).logged_for_column_bases().is_none());
        assert!(Titer::DontCare.logged_for_column_bases().is_none());
    }

    #[test]
    fn unlog_inverts_log() {
        assert!(f64_approx_equal(unlog_titer(log_titer(320.0)), 320.0));
    }
}
