use super::error::{ModelError, check_index};
use super::titer::Titer;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Cell whose layers carry different regular titers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiterConflict {
    pub antigen: usize,
    pub serum: usize,
    pub titers: Vec<Titer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TiterReplacement {
    pub antigen: usize,
    pub serum: usize,
    pub titer: Titer,
}

/// Antigen x serum titer table, optionally backed by replicate layers.
///
/// `titers` always holds the effective value of every cell. When the table was
/// built from layers, the layers are kept alongside so that merges and reports
/// can see the individual sources.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TiterMatrix {
    number_of_antigens: usize,
    number_of_sera: usize,
    titers: Vec<Titer>,
    layers: Vec<Vec<Titer>>,
}

impl TiterMatrix {
    pub fn new(number_of_antigens: usize, number_of_sera: usize) -> Self {
        Self {
            number_of_antigens,
            number_of_sera,
            titers: vec![Titer::DontCare; number_of_antigens * number_of_sera],
            layers: Vec::new(),
        }
    }

    pub fn from_rows(rows: Vec<Vec<Titer>>) -> Result<Self, ModelError> {
        let number_of_antigens = rows.len();
        let number_of_sera = rows.first().map_or(0, Vec::len);
        let mut titers = Vec::with_capacity(number_of_antigens * number_of_sera);
        for (antigen_no, row) in rows.into_iter().enumerate() {
            if row.len() != number_of_sera {
                return Err(ModelError::Shape(format!(
                    "row {} has {} titer(s), expected {}",
                    antigen_no,
                    row.len(),
                    number_of_sera
                )));
            }
            titers.extend(row);
        }
        Ok(Self {
            number_of_antigens,
            number_of_sera,
            titers,
            layers: Vec::new(),
        })
    }

    /// Parses a table of titer strings such as `[["40", "<10"], ["*", "80"]]`.
    pub fn parse_rows<S: AsRef<str>>(rows: &[Vec<S>]) -> Result<Self, ModelError> {
        let parsed = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().parse::<Titer>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_rows(parsed)
    }

    /// Builds the effective table from replicate layers.
    ///
    /// Each layer is a dense `number_of_antigens * number_of_sera` table. The
    /// effective titer of a cell is the most common non-dont-care titer across
    /// layers, the earliest layer winning ties.
    pub fn from_layers(
        number_of_antigens: usize,
        number_of_sera: usize,
        layers: Vec<Vec<Titer>>,
    ) -> Result<(Self, Vec<TiterConflict>), ModelError> {
        let cells = number_of_antigens * number_of_sera;
        if let Some((layer_no, layer)) = layers.iter().enumerate().find(|(_, l)| l.len() != cells)
        {
            return Err(ModelError::Shape(format!(
                "layer {} has {} cell(s), expected {}",
                layer_no,
                layer.len(),
                cells
            )));
        }

        let mut titers = Vec::with_capacity(cells);
        let mut conflicts = Vec::new();
        let mut column: Vec<Titer> = Vec::with_capacity(layers.len());
        for cell in 0..cells {
            column.clear();
            column.extend(layers.iter().map(|layer| layer[cell]));
            let (titer, conflicting) = merge_layer_cell(&column);
            if conflicting {
                conflicts.push(TiterConflict {
                    antigen: cell / number_of_sera.max(1),
                    serum: cell % number_of_sera.max(1),
                    titers: column.iter().copied().filter(Titer::is_regular).collect(),
                });
            }
            titers.push(titer);
        }

        debug!(
            layers = layers.len(),
            conflicts = conflicts.len(),
            "Merged titer layers."
        );

        Ok((
            Self {
                number_of_antigens,
                number_of_sera,
                titers,
                layers,
            },
            conflicts,
        ))
    }

    #[inline]
    pub fn number_of_antigens(&self) -> usize {
        self.number_of_antigens
    }

    #[inline]
    pub fn number_of_sera(&self) -> usize {
        self.number_of_sera
    }

    pub fn titer(&self, antigen_no: usize, serum_no: usize) -> Result<Titer, ModelError> {
        check_index("antigen", antigen_no, self.number_of_antigens)?;
        check_index("serum", serum_no, self.number_of_sera)?;
        Ok(self.at(antigen_no, serum_no))
    }

    #[inline]
    pub(crate) fn at(&self, antigen_no: usize, serum_no: usize) -> Titer {
        self.titers[antigen_no * self.number_of_sera + serum_no]
    }

    /// Sets the effective titer of a cell. Layers no longer describe the
    /// table after a manual edit and are dropped.
    pub fn set_titer(
        &mut self,
        antigen_no: usize,
        serum_no: usize,
        titer: Titer,
    ) -> Result<(), ModelError> {
        check_index("antigen", antigen_no, self.number_of_antigens)?;
        check_index("serum", serum_no, self.number_of_sera)?;
        self.drop_layers_for_edit();
        self.titers[antigen_no * self.number_of_sera + serum_no] = titer;
        Ok(())
    }

    /// Overrides the effective value of a cell, keeping the layers.
    pub(crate) fn set_effective(&mut self, antigen_no: usize, serum_no: usize, titer: Titer) {
        self.titers[antigen_no * self.number_of_sera + serum_no] = titer;
    }

    pub fn row(&self, antigen_no: usize) -> Result<&[Titer], ModelError> {
        check_index("antigen", antigen_no, self.number_of_antigens)?;
        let start = antigen_no * self.number_of_sera;
        Ok(&self.titers[start..start + self.number_of_sera])
    }

    pub fn rows(&self) -> Vec<Vec<Titer>> {
        if self.number_of_sera == 0 {
            return vec![Vec::new(); self.number_of_antigens];
        }
        self.titers
            .chunks(self.number_of_sera)
            .map(<[Titer]>::to_vec)
            .collect()
    }

    /// Iterates `(antigen_no, serum_no, titer)` over cells that are not dont-care.
    pub fn iter_measured(&self) -> impl Iterator<Item = (usize, usize, Titer)> + '_ {
        let number_of_sera = self.number_of_sera;
        self.titers
            .iter()
            .enumerate()
            .filter(|(_, titer)| !titer.is_dont_care())
            .map(move |(cell, titer)| (cell / number_of_sera, cell % number_of_sera, *titer))
    }

    #[inline]
    pub fn number_of_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, layer_no: usize) -> Result<&[Titer], ModelError> {
        check_index("layer", layer_no, self.layers.len())?;
        Ok(&self.layers[layer_no])
    }

    pub fn remove_layers(&mut self) {
        self.layers.clear();
    }

    pub fn layers_with_antigen(&self, antigen_no: usize) -> Result<Vec<usize>, ModelError> {
        check_index("antigen", antigen_no, self.number_of_antigens)?;
        let start = antigen_no * self.number_of_sera;
        Ok(self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| {
                layer[start..start + self.number_of_sera]
                    .iter()
                    .any(|t| !t.is_dont_care())
            })
            .map(|(layer_no, _)| layer_no)
            .collect())
    }

    pub fn layers_with_serum(&self, serum_no: usize) -> Result<Vec<usize>, ModelError> {
        check_index("serum", serum_no, self.number_of_sera)?;
        Ok(self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, layer)| {
                (0..self.number_of_antigens)
                    .any(|ag| !layer[ag * self.number_of_sera + serum_no].is_dont_care())
            })
            .map(|(layer_no, _)| layer_no)
            .collect())
    }

    pub fn number_of_regular_for_antigen(&self, antigen_no: usize) -> usize {
        (0..self.number_of_sera)
            .filter(|&sr| self.at(antigen_no, sr).is_regular())
            .count()
    }

    pub fn number_of_regular_for_serum(&self, serum_no: usize) -> usize {
        (0..self.number_of_antigens)
            .filter(|&ag| self.at(ag, serum_no).is_regular())
            .count()
    }

    /// Replaces titers whose text matches `look_for` using regex substitution
    /// (`$1`, `$2`, ... refer to capture groups).
    pub fn replace_all(
        &mut self,
        look_for: &str,
        replacement: &str,
    ) -> Result<Vec<TiterReplacement>, ModelError> {
        let re = Regex::new(look_for)?;
        let mut replaced = Vec::new();
        for antigen_no in 0..self.number_of_antigens {
            for serum_no in 0..self.number_of_sera {
                let text = self.at(antigen_no, serum_no).to_string();
                if !re.is_match(&text) {
                    continue;
                }
                let new_titer: Titer = re.replace_all(&text, replacement).parse()?;
                replaced.push(TiterReplacement {
                    antigen: antigen_no,
                    serum: serum_no,
                    titer: new_titer,
                });
            }
        }

        if replaced.is_empty() {
            warn!(
                "No titer replacement performed: no titer match for \"{}\"",
                look_for
            );
            return Ok(replaced);
        }

        self.drop_layers_for_edit();
        for rep in &replaced {
            self.titers[rep.antigen * self.number_of_sera + rep.serum] = rep.titer;
        }
        debug!(replacements = replaced.len(), "Titer replacements done.");
        Ok(replaced)
    }

    /// Removes antigens (rows) by index; indexes may come in any order.
    pub fn remove_antigens(&mut self, antigens: &[usize]) -> Result<(), ModelError> {
        for &ag in antigens {
            check_index("antigen", ag, self.number_of_antigens)?;
        }
        let keep: Vec<usize> = (0..self.number_of_antigens)
            .filter(|ag| !antigens.contains(ag))
            .collect();
        let n_sr = self.number_of_sera;
        let pick = |table: &[Titer]| -> Vec<Titer> {
            keep.iter()
                .flat_map(|&ag| table[ag * n_sr..(ag + 1) * n_sr].iter().copied())
                .collect()
        };
        self.titers = pick(&self.titers);
        self.layers = self.layers.iter().map(|layer| pick(layer)).collect();
        self.number_of_antigens = keep.len();
        Ok(())
    }

    /// Removes sera (columns) by index; indexes may come in any order.
    pub fn remove_sera(&mut self, sera: &[usize]) -> Result<(), ModelError> {
        for &sr in sera {
            check_index("serum", sr, self.number_of_sera)?;
        }
        let keep: Vec<usize> = (0..self.number_of_sera)
            .filter(|sr| !sera.contains(sr))
            .collect();
        let n_sr = self.number_of_sera;
        let n_ag = self.number_of_antigens;
        let pick = |table: &[Titer]| -> Vec<Titer> {
            (0..n_ag)
                .flat_map(|ag| keep.iter().map(move |&sr| table[ag * n_sr + sr]))
                .collect()
        };
        self.titers = pick(&self.titers);
        self.layers = self.layers.iter().map(|layer| pick(layer)).collect();
        self.number_of_sera = keep.len();
        Ok(())
    }

    fn drop_layers_for_edit(&mut self) {
        if !self.layers.is_empty() {
            warn!(
                layers = self.layers.len(),
                "Titer edit on a layered table: layers removed."
            );
            self.layers.clear();
        }
    }
}

/// Returns the effective titer of a cell and whether its regular values disagree.
pub(crate) fn merge_layer_cell(values: &[Titer]) -> (Titer, bool) {
    let measured: Vec<Titer> = values.iter().copied().filter(|t| !t.is_dont_care()).collect();
    let Some(first) = measured.first().copied() else {
        return (Titer::DontCare, false);
    };

    let mut best = first;
    let mut best_count = 0;
    for candidate in &measured {
        let count = measured.iter().filter(|t| *t == candidate).count();
        if count > best_count {
            best = *candidate;
            best_count = count;
        }
    }

    let mut regular = measured.iter().filter(|t| t.is_regular());
    let conflicting = match regular.next() {
        Some(r0) => regular.any(|r| r != r0),
        None => false,
    };
    (best, conflicting)
}
