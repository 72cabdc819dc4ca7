//! Choosing antigens and sera by caller-supplied predicates.
//!
//! Sequences and clades are opaque metadata here: the only thing asked of
//! them is whether an entry belongs to a subset.

use crate::core::models::antigen::{Antigen, Serum};
use crate::core::models::chart::Chart;
use crate::core::models::error::ModelError;
use std::str::FromStr;

pub fn select_antigens<F>(chart: &Chart, predicate: F) -> Vec<usize>
where
    F: Fn(usize, &Antigen) -> bool,
{
    chart
        .antigens()
        .iter()
        .enumerate()
        .filter(|(no, antigen)| predicate(*no, antigen))
        .map(|(no, _)| no)
        .collect()
}

pub fn select_sera<F>(chart: &Chart, predicate: F) -> Vec<usize>
where
    F: Fn(usize, &Serum) -> bool,
{
    chart
        .sera()
        .iter()
        .enumerate()
        .filter(|(no, serum)| predicate(*no, serum))
        .map(|(no, _)| no)
        .collect()
}

pub fn antigens_in_clade(chart: &Chart, clade: &str) -> Vec<usize> {
    select_antigens(chart, |_, antigen| antigen.clades.iter().any(|c| c == clade))
}

pub fn sera_in_clade(chart: &Chart, clade: &str) -> Vec<usize> {
    select_sera(chart, |_, serum| serum.clades.iter().any(|c| c == clade))
}

/// Amino acid at a 1-based sequence position, e.g. `156K`, or its
/// negation `!145K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AminoAcidCriterion {
    pub position: usize,
    pub amino_acid: char,
    pub negated: bool,
}

impl AminoAcidCriterion {
    /// Entries without a sequence, or with one shorter than `position`,
    /// never match.
    pub fn matches(&self, sequence: Option<&str>) -> bool {
        let Some(at) = sequence.and_then(|seq| seq.chars().nth(self.position - 1)) else {
            return false;
        };
        (at == self.amino_acid) != self.negated
    }
}

impl FromStr for AminoAcidCriterion {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ModelError::InvalidAminoAcidCriterion(s.to_string());
        let trimmed = s.trim();
        let (negated, body) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let amino_acid = body.chars().last().ok_or_else(invalid)?;
        if !amino_acid.is_ascii_alphabetic() && amino_acid != '-' {
            return Err(invalid());
        }
        let position: usize = body[..body.len() - amino_acid.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        if position == 0 {
            return Err(invalid());
        }
        Ok(Self {
            position,
            amino_acid: amino_acid.to_ascii_uppercase(),
            negated,
        })
    }
}

fn parse_criteria(criteria: &[&str]) -> Result<Vec<AminoAcidCriterion>, ModelError> {
    criteria.iter().map(|c| c.parse()).collect()
}

/// Antigens whose sequence satisfies every criterion.
pub fn antigens_with_amino_acids(chart: &Chart, criteria: &[&str]) -> Result<Vec<usize>, ModelError> {
    let parsed = parse_criteria(criteria)?;
    Ok(select_antigens(chart, |_, antigen| {
        parsed
            .iter()
            .all(|c| c.matches(antigen.sequence.as_deref()))
    }))
}

pub fn sera_with_amino_acids(chart: &Chart, criteria: &[&str]) -> Result<Vec<usize>, ModelError> {
    let parsed = parse_criteria(criteria)?;
    Ok(select_sera(chart, |_, serum| {
        parsed.iter().all(|c| c.matches(serum.sequence.as_deref()))
    }))
}

/// Converts antigen and serum indexes into point numbers.
pub fn to_points(chart: &Chart, antigens: &[usize], sera: &[usize]) -> Vec<usize> {
    antigens
        .iter()
        .copied()
        .chain(sera.iter().map(|sr| sr + chart.number_of_antigens()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::titers::TiterMatrix;

    fn chart() -> Chart {
        let mut a1 = Antigen::new("A1");
        a1.clades = vec!["3C.2a".to_string()];
        a1.sequence = Some("QKIPGNDNSTATLCLGHHAVPNGTIVK".to_string());
        let mut a2 = Antigen::new("A2");
        a2.clades = vec!["3C.3a".to_string()];
        a2.sequence = Some("QKIPGNDNSTATLCLGHHAVPNGTIVR".to_string());
        let a3 = Antigen::new("A3");
        let mut s1 = Serum::new("S1");
        s1.clades = vec!["3C.2a".to_string()];
        Chart::new(vec![a1, a2, a3], vec![s1], TiterMatrix::new(3, 1)).unwrap()
    }

    #[test]
    fn predicate_selection() {
        let chart = chart();
        assert_eq!(select_antigens(&chart, |no, _| no != 1), vec![0, 2]);
        assert_eq!(select_sera(&chart, |_, sr| sr.name == "S1"), vec![0]);
    }

    #[test]
    fn clade_selection() {
        let chart = chart();
        assert_eq!(antigens_in_clade(&chart, "3C.2a"), vec![0]);
        assert_eq!(sera_in_clade(&chart, "3C.2a"), vec![0]);
        assert!(antigens_in_clade(&chart, "1").is_empty());
    }

    #[test]
    fn amino_acid_criteria_parse() {
        let c: AminoAcidCriterion = "156K".parse().unwrap();
        assert_eq!((c.position, c.amino_acid, c.negated), (156, 'K', false));
        let n: AminoAcidCriterion = "!145k".parse().unwrap();
        assert_eq!((n.position, n.amino_acid, n.negated), (145, 'K', true));
        for bad in ["K", "0K", "15", "!", "abcK"] {
            assert!(bad.parse::<AminoAcidCriterion>().is_err(), "{}", bad);
        }
    }

    #[test]
    fn amino_acid_selection_requires_all_criteria_and_a_sequence() {
        let chart = chart();
        assert_eq!(antigens_with_amino_acids(&chart, &["27K"]).unwrap(), vec![0]);
        assert_eq!(antigens_with_amino_acids(&chart, &["!27K"]).unwrap(), vec![1]);
        assert_eq!(
            antigens_with_amino_acids(&chart, &["1Q", "27R"]).unwrap(),
            vec![1]
        );
        assert!(antigens_with_amino_acids(&chart, &["300K"]).unwrap().is_empty());
        assert!(antigens_with_amino_acids(&chart, &["x"]).is_err());
    }

    #[test]
    fn points_offset_sera() {
        let chart = chart();
        assert_eq!(to_points(&chart, &[0, 2], &[0]), vec![0, 2, 3]);
    }
}
