use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid titer: \"{0}\"")]
    InvalidTiter(String),

    #[error("Invalid {kind} index {index}: valid range is 0..{count}")]
    IndexOutOfRange {
        kind: &'static str,
        index: usize,
        count: usize,
    },

    #[error("Invalid minimum column basis: \"{0}\"")]
    InvalidMinimumColumnBasis(String),

    #[error("Forced column bases must have {expected} value(s), got {actual}")]
    ColumnBasesLength { expected: usize, actual: usize },

    #[error("Inconsistent table shape: {0}")]
    Shape(String),

    #[error("Layout dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cannot combine projections: {0}")]
    IncompatibleProjections(String),

    #[error("Unknown {kind}: \"{value}\"")]
    UnknownOption { kind: &'static str, value: String },

    #[error("Invalid amino-acid criterion: \"{0}\"")]
    InvalidAminoAcidCriterion(String),

    #[error("Invalid regular expression: {source}")]
    Regex {
        #[from]
        source: regex::Error,
    },
}

pub(crate) fn check_index(kind: &'static str, index: usize, count: usize) -> Result<(), ModelError> {
    if index < count {
        Ok(())
    } else {
        Err(ModelError::IndexOutOfRange { kind, index, count })
    }
}
