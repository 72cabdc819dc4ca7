//! Matching antigens and sera between two charts.

use crate::core::models::antigen::{Antigen, Serum};
use crate::core::models::chart::Chart;
use crate::core::models::error::ModelError;
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchLevel {
    /// Every identifying field must be equal.
    Strict,
    /// Passage and annotations may differ.
    Relaxed,
    /// Names only; several secondary entries may match one primary entry.
    Ignored,
    /// Strict first, then relaxed for entries left unmatched.
    #[default]
    Automatic,
}

impl FromStr for MatchLevel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "relaxed" => Ok(Self::Relaxed),
            "ignored" => Ok(Self::Ignored),
            "auto" | "automatic" => Ok(Self::Automatic),
            _ => Err(ModelError::UnknownOption {
                kind: "match level",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchLevel::Strict => "strict",
            MatchLevel::Relaxed => "relaxed",
            MatchLevel::Ignored => "ignored",
            MatchLevel::Automatic => "automatic",
        };
        f.write_str(name)
    }
}

pub type AntigenExtractor<'a> = Box<dyn Fn(&Antigen) -> Antigen + Send + Sync + 'a>;
pub type SerumExtractor<'a> = Box<dyn Fn(&Serum) -> Serum + Send + Sync + 'a>;

/// Rewrites entries before their match keys are computed, e.g. to strip a
/// lab-specific suffix from names.
#[derive(Default)]
pub struct EntryExtractors<'a> {
    antigen: Option<AntigenExtractor<'a>>,
    serum: Option<SerumExtractor<'a>>,
}

impl<'a> EntryExtractors<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn antigen(mut self, extractor: AntigenExtractor<'a>) -> Self {
        self.antigen = Some(extractor);
        self
    }

    pub fn serum(mut self, extractor: SerumExtractor<'a>) -> Self {
        self.serum = Some(extractor);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyLevel {
    Strict,
    Relaxed,
    Name,
}

trait MatchKey {
    fn match_key(&self, level: KeyLevel) -> String;
    fn distinct(&self) -> bool;
}

fn join_key(parts: &[&str]) -> String {
    parts.join("\u{1f}")
}

impl MatchKey for Antigen {
    fn match_key(&self, level: KeyLevel) -> String {
        match level {
            KeyLevel::Strict => join_key(&[
                self.name.as_str(),
                self.reassortant.as_str(),
                self.passage.as_str(),
                self.annotations.join(" ").as_str(),
            ]),
            KeyLevel::Relaxed => join_key(&[self.name.as_str(), self.reassortant.as_str()]),
            KeyLevel::Name => self.name.clone(),
        }
    }

    fn distinct(&self) -> bool {
        self.is_distinct()
    }
}

impl MatchKey for Serum {
    fn match_key(&self, level: KeyLevel) -> String {
        match level {
            KeyLevel::Strict => join_key(&[
                self.name.as_str(),
                self.reassortant.as_str(),
                self.passage.as_str(),
                self.annotations.join(" ").as_str(),
                self.serum_id.as_str(),
                self.species.as_str(),
            ]),
            KeyLevel::Relaxed => join_key(&[
                self.name.as_str(),
                self.reassortant.as_str(),
                self.serum_id.as_str(),
            ]),
            KeyLevel::Name => self.name.clone(),
        }
    }

    fn distinct(&self) -> bool {
        self.is_distinct()
    }
}

/// Matched `(primary, secondary)` antigen and serum pairs of two charts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonAntigensSera {
    antigens: Vec<(usize, usize)>,
    sera: Vec<(usize, usize)>,
    primary_antigens: usize,
    secondary_antigens: usize,
    match_level: MatchLevel,
}

impl CommonAntigensSera {
    pub fn new(primary: &Chart, secondary: &Chart, match_level: MatchLevel) -> Self {
        Self::with_extractors(primary, secondary, match_level, &EntryExtractors::default())
    }

    pub fn with_extractors(
        primary: &Chart,
        secondary: &Chart,
        match_level: MatchLevel,
        extractors: &EntryExtractors<'_>,
    ) -> Self {
        let rewrite_antigens = |entries: &[Antigen]| -> Vec<Antigen> {
            match &extractors.antigen {
                Some(extract) => entries.iter().map(|e| extract(e)).collect(),
                None => entries.to_vec(),
            }
        };
        let rewrite_sera = |entries: &[Serum]| -> Vec<Serum> {
            match &extractors.serum {
                Some(extract) => entries.iter().map(|e| extract(e)).collect(),
                None => entries.to_vec(),
            }
        };

        let antigens = match_entries(
            &rewrite_antigens(primary.antigens()),
            &rewrite_antigens(secondary.antigens()),
            match_level,
        );
        let sera = match_entries(
            &rewrite_sera(primary.sera()),
            &rewrite_sera(secondary.sera()),
            match_level,
        );
        debug!(
            level = %match_level,
            antigens = antigens.len(),
            sera = sera.len(),
            "Common antigens and sera found."
        );

        Self {
            antigens,
            sera,
            primary_antigens: primary.number_of_antigens(),
            secondary_antigens: secondary.number_of_antigens(),
            match_level,
        }
    }

    /// Every antigen and serum matched with itself, for comparing
    /// projections of one chart.
    pub fn same_chart(chart: &Chart) -> Self {
        Self {
            antigens: (0..chart.number_of_antigens()).map(|i| (i, i)).collect(),
            sera: (0..chart.number_of_sera()).map(|i| (i, i)).collect(),
            primary_antigens: chart.number_of_antigens(),
            secondary_antigens: chart.number_of_antigens(),
            match_level: MatchLevel::Strict,
        }
    }

    pub fn match_level(&self) -> MatchLevel {
        self.match_level
    }

    pub fn antigens(&self) -> &[(usize, usize)] {
        &self.antigens
    }

    pub fn sera(&self) -> &[(usize, usize)] {
        &self.sera
    }

    pub fn number_of_antigens(&self) -> usize {
        self.antigens.len()
    }

    pub fn number_of_sera(&self) -> usize {
        self.sera.len()
    }

    pub fn is_empty(&self) -> bool {
        self.antigens.is_empty() && self.sera.is_empty()
    }

    /// Matched pairs in point numbering, antigens first.
    pub fn points(&self) -> Vec<(usize, usize)> {
        self.antigens
            .iter()
            .copied()
            .chain(self.sera_as_points())
            .collect()
    }

    pub fn sera_as_points(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sera
            .iter()
            .map(|&(p, s)| (p + self.primary_antigens, s + self.secondary_antigens))
    }

    /// Secondary entry matched to a primary antigen.
    pub fn secondary_antigen(&self, primary_no: usize) -> Option<usize> {
        self.antigens
            .iter()
            .find(|(p, _)| *p == primary_no)
            .map(|&(_, s)| s)
    }

    /// Primary entry matched to a secondary antigen.
    pub fn primary_antigen(&self, secondary_no: usize) -> Option<usize> {
        self.antigens
            .iter()
            .find(|(_, s)| *s == secondary_no)
            .map(|&(p, _)| p)
    }

    pub fn primary_serum(&self, secondary_no: usize) -> Option<usize> {
        self.sera
            .iter()
            .find(|(_, s)| *s == secondary_no)
            .map(|&(p, _)| p)
    }

    /// Lists matched pairs with their full names.
    pub fn report(&self, primary: &Chart, secondary: &Chart) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "common antigens: {} sera: {} (match level: {})",
            self.antigens.len(),
            self.sera.len(),
            self.match_level
        );
        for &(p, s) in &self.antigens {
            let _ = writeln!(
                out,
                "  AG {:>4} {:<50} | {:>4} {}",
                p,
                primary.antigens()[p].full_name(),
                s,
                secondary.antigens()[s].full_name()
            );
        }
        for &(p, s) in &self.sera {
            let _ = writeln!(
                out,
                "  SR {:>4} {:<50} | {:>4} {}",
                p,
                primary.sera()[p].full_name(),
                s,
                secondary.sera()[s].full_name()
            );
        }
        out
    }
}

fn match_entries<T: MatchKey>(
    primary: &[T],
    secondary: &[T],
    match_level: MatchLevel,
) -> Vec<(usize, usize)> {
    let mut pairs = match match_level {
        MatchLevel::Strict => match_one_to_one(primary, secondary, KeyLevel::Strict, Vec::new()),
        MatchLevel::Relaxed => match_one_to_one(primary, secondary, KeyLevel::Relaxed, Vec::new()),
        MatchLevel::Automatic => {
            let strict = match_one_to_one(primary, secondary, KeyLevel::Strict, Vec::new());
            match_one_to_one(primary, secondary, KeyLevel::Relaxed, strict)
        }
        MatchLevel::Ignored => secondary
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.distinct())
            .filter_map(|(s, entry)| {
                let key = entry.match_key(KeyLevel::Name);
                primary
                    .iter()
                    .position(|p| !p.distinct() && p.match_key(KeyLevel::Name) == key)
                    .map(|p| (p, s))
            })
            .collect(),
    };
    pairs.sort_unstable();
    pairs
}

/// Extends `pairs` with one-to-one matches among entries not yet paired.
fn match_one_to_one<T: MatchKey>(
    primary: &[T],
    secondary: &[T],
    level: KeyLevel,
    mut pairs: Vec<(usize, usize)>,
) -> Vec<(usize, usize)> {
    let mut secondary_used = vec![false; secondary.len()];
    let mut primary_used = vec![false; primary.len()];
    for &(p, s) in &pairs {
        primary_used[p] = true;
        secondary_used[s] = true;
    }
    let secondary_keys: Vec<String> = secondary.iter().map(|e| e.match_key(level)).collect();
    for (p, entry) in primary.iter().enumerate() {
        if primary_used[p] || entry.distinct() {
            continue;
        }
        let key = entry.match_key(level);
        let found = (0..secondary.len()).find(|&s| {
            !secondary_used[s] && !secondary[s].distinct() && secondary_keys[s] == key
        });
        if let Some(s) = found {
            secondary_used[s] = true;
            primary_used[p] = true;
            pairs.push((p, s));
        }
    }
    pairs
}
