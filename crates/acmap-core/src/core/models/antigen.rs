use serde::{Deserialize, Serialize};

/// Annotation marking an entry that must never be matched with another chart.
pub const DISTINCT_ANNOTATION: &str = "DISTINCT";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Antigen {
    pub name: String,
    pub reassortant: String,
    pub passage: String,
    pub annotations: Vec<String>,
    /// Opaque clade labels, used only by selection predicates.
    pub clades: Vec<String>,
    /// Aligned amino-acid sequence, used only by selection predicates.
    pub sequence: Option<String>,
}

impl Antigen {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_passage(mut self, passage: impl Into<String>) -> Self {
        self.passage = passage.into();
        self
    }

    pub fn with_reassortant(mut self, reassortant: impl Into<String>) -> Self {
        self.reassortant = reassortant.into();
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn full_name(&self) -> String {
        full_name(&self.name, &self.reassortant, &self.annotations, None, &self.passage)
    }

    pub fn is_distinct(&self) -> bool {
        self.annotations.iter().any(|a| a == DISTINCT_ANNOTATION)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Serum {
    pub name: String,
    pub reassortant: String,
    pub passage: String,
    pub annotations: Vec<String>,
    pub serum_id: String,
    pub species: String,
    pub clades: Vec<String>,
    pub sequence: Option<String>,
}

impl Serum {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_serum_id(mut self, serum_id: impl Into<String>) -> Self {
        self.serum_id = serum_id.into();
        self
    }

    pub fn with_passage(mut self, passage: impl Into<String>) -> Self {
        self.passage = passage.into();
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn full_name(&self) -> String {
        full_name(
            &self.name,
            &self.reassortant,
            &self.annotations,
            Some(&self.serum_id),
            &self.passage,
        )
    }

    pub fn is_distinct(&self) -> bool {
        self.annotations.iter().any(|a| a == DISTINCT_ANNOTATION)
    }
}

fn full_name(
    name: &str,
    reassortant: &str,
    annotations: &[String],
    serum_id: Option<&str>,
    passage: &str,
) -> String {
    let mut parts = vec![name.to_string()];
    parts.extend(
        [reassortant]
            .into_iter()
            .chain(annotations.iter().map(String::as_str))
            .chain(serum_id)
            .chain([passage])
            .filter(|part| !part.is_empty())
            .map(str::to_string),
    );
    parts.join(" ")
}
