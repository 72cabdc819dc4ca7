use super::column_bases::MinimumColumnBasis;
use super::error::{ModelError, check_index};
use super::layout::{Layout, Transformation};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// One embedding of a chart's titer table.
///
/// The stress value is cached and dropped whenever the layout is borrowed
/// mutably, so it is always consistent with the coordinates it describes.
#[derive(Debug, Clone)]
pub struct Projection {
    layout: Layout,
    stress: OnceLock<f64>,
    minimum_column_basis: MinimumColumnBasis,
    avidity_adjusts: Option<Vec<f64>>,
    disconnected: BTreeSet<usize>,
    unmovable: BTreeSet<usize>,
    transformation: Transformation,
    comment: String,
}

impl Projection {
    pub fn new(layout: Layout, minimum_column_basis: MinimumColumnBasis) -> Self {
        let dims = layout.number_of_dimensions();
        Self {
            layout,
            stress: OnceLock::new(),
            minimum_column_basis,
            avidity_adjusts: None,
            disconnected: BTreeSet::new(),
            unmovable: BTreeSet::new(),
            transformation: Transformation::identity(dims),
            comment: String::new(),
        }
    }

    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut Layout {
        self.stress = OnceLock::new();
        &mut self.layout
    }

    pub fn set_layout(&mut self, layout: Layout) {
        if layout.number_of_dimensions() != self.layout.number_of_dimensions() {
            self.transformation = Transformation::identity(layout.number_of_dimensions());
        }
        self.layout = layout;
        self.stress = OnceLock::new();
    }

    pub fn transformed_layout(&self) -> Layout {
        self.layout.transformed(&self.transformation)
    }

    #[inline]
    pub fn number_of_points(&self) -> usize {
        self.layout.number_of_points()
    }

    #[inline]
    pub fn number_of_dimensions(&self) -> usize {
        self.layout.number_of_dimensions()
    }

    /// Stress of the current layout, if it has been computed since the last change.
    pub fn cached_stress(&self) -> Option<f64> {
        self.stress.get().copied()
    }

    pub(crate) fn stress_or_init(&self, compute: impl FnOnce() -> f64) -> f64 {
        *self.stress.get_or_init(compute)
    }

    pub(crate) fn invalidate_stress(&mut self) {
        self.stress = OnceLock::new();
    }

    pub(crate) fn set_stress(&mut self, stress: f64) {
        self.stress = OnceLock::from(stress);
    }

    pub fn minimum_column_basis(&self) -> MinimumColumnBasis {
        self.minimum_column_basis
    }

    pub fn avidity_adjusts(&self) -> Option<&[f64]> {
        self.avidity_adjusts.as_deref()
    }

    pub fn set_avidity_adjusts(&mut self, adjusts: Option<Vec<f64>>) {
        self.avidity_adjusts = adjusts;
        self.stress = OnceLock::new();
    }

    pub fn disconnected(&self) -> &BTreeSet<usize> {
        &self.disconnected
    }

    pub fn is_disconnected(&self, point_no: usize) -> bool {
        self.disconnected.contains(&point_no)
    }

    /// Marks points disconnected and clears their coordinates.
    pub fn disconnect(&mut self, points: impl IntoIterator<Item = usize>) -> Result<(), ModelError> {
        let count = self.number_of_points();
        for point_no in points {
            check_index("point", point_no, count)?;
            self.disconnected.insert(point_no);
            self.layout.point_mut(point_no).fill(f64::NAN);
        }
        self.stress = OnceLock::new();
        Ok(())
    }

    /// Reconnects every disconnected point. Reconnected points stay
    /// unpositioned until the next incremental relax places them.
    pub fn connect_all_disconnected(&mut self) {
        if !self.disconnected.is_empty() {
            self.disconnected.clear();
            self.stress = OnceLock::new();
        }
    }

    pub fn unmovable(&self) -> &BTreeSet<usize> {
        &self.unmovable
    }

    pub fn set_unmovable(&mut self, points: impl IntoIterator<Item = usize>) -> Result<(), ModelError> {
        let count = self.number_of_points();
        let mut unmovable = BTreeSet::new();
        for point_no in points {
            check_index("point", point_no, count)?;
            unmovable.insert(point_no);
        }
        self.unmovable = unmovable;
        Ok(())
    }

    pub fn reset_unmovable(&mut self) {
        self.unmovable.clear();
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn set_transformation(&mut self, transformation: Transformation) -> Result<(), ModelError> {
        if transformation.number_of_dimensions() != self.number_of_dimensions() {
            return Err(ModelError::DimensionMismatch {
                expected: self.number_of_dimensions(),
                actual: transformation.number_of_dimensions(),
            });
        }
        self.transformation = transformation;
        Ok(())
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Drops points by index and renumbers point sets. `avidity_antigens`
    /// lists the removed antigens so per-antigen avidity adjusts stay aligned.
    pub(crate) fn remove_points(&mut self, points: &[usize], avidity_antigens: &[usize]) {
        self.layout.remove_points(points);
        let renumber = |set: &BTreeSet<usize>| -> BTreeSet<usize> {
            set.iter()
                .filter(|p| !points.contains(p))
                .map(|&p| p - points.iter().filter(|&&r| r < p).count())
                .collect()
        };
        self.disconnected = renumber(&self.disconnected);
        self.unmovable = renumber(&self.unmovable);
        if let Some(adjusts) = &mut self.avidity_adjusts {
            let mut antigen_no = 0;
            adjusts.retain(|_| {
                let keep = !avidity_antigens.contains(&antigen_no);
                antigen_no += 1;
                keep
            });
        }
        self.stress = OnceLock::new();
    }
}
