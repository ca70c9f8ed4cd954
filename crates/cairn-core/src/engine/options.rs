use crate::engine::compute::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScfOption {
    GuessCore,
    GuessHuckel,
    Diis(bool),
    MaxIter(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptOption {
    InternalCoords,
    MaxIter(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobOptions {
    pub scf: Vec<ScfOption>,
    pub opt: Vec<OptOption>,
}

impl JobOptions {
    pub fn overridden(&self, set: &OptionSet) -> Self {
        let mut next = self.clone();
        match set {
            OptionSet::Scf(options) => next.scf = options.clone(),
            OptionSet::Opt(options) => next.opt = options.clone(),
        }
        next
    }

    pub fn overridden_all<'a, I>(&self, sets: I) -> Self
    where
        I: IntoIterator<Item = &'a OptionSet>,
    {
        sets.into_iter().fold(self.clone(), |acc, set| acc.overridden(set))
    }
}

// An alternative payload for a single category; a row replaces the whole
// category, it does not merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionSet {
    Scf(Vec<ScfOption>),
    Opt(Vec<OptOption>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRow {
    pub trigger: ErrorKind,
    pub options: Vec<OptionSet>,
}

impl FallbackRow {
    pub fn new(trigger: ErrorKind, options: Vec<OptionSet>) -> Self {
        Self { trigger, options }
    }
}

// The matrix is immutable during a retry sequence; progress through it is
// tracked separately by a MatrixCursor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FallbackMatrix {
    rows: Vec<FallbackRow>,
}

impl FallbackMatrix {
    pub fn new(rows: Vec<FallbackRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FallbackRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cursor(&self) -> MatrixCursor {
        MatrixCursor { positions: vec![0; self.rows.len()] }
    }

    /// The default matrix for geometry optimizations: progressively simpler
    /// SCF guesses for SCF failures, a coordinate change plus a larger step
    /// budget for optimizer failures.
    pub fn standard_optimization() -> Self {
        Self::new(vec![
            FallbackRow::new(
                ErrorKind::ScfNoConv,
                vec![
                    OptionSet::Scf(vec![ScfOption::GuessCore]),
                    OptionSet::Scf(vec![ScfOption::GuessHuckel]),
                    OptionSet::Scf(vec![ScfOption::Diis(false), ScfOption::GuessHuckel]),
                ],
            ),
            FallbackRow::new(
                ErrorKind::OptNoConv,
                vec![
                    OptionSet::Opt(vec![OptOption::InternalCoords]),
                    OptionSet::Opt(vec![OptOption::InternalCoords, OptOption::MaxIter(100)]),
                ],
            ),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixCursor {
    positions: Vec<usize>,
}

impl MatrixCursor {
    /// The option set at the head of each non-exhausted row.
    pub fn current<'m>(&self, matrix: &'m FallbackMatrix) -> Vec<&'m OptionSet> {
        self.positions
            .iter()
            .zip(matrix.rows())
            .filter_map(|(pos, row)| row.options.get(*pos))
            .collect()
    }

    pub fn position(&self, row: usize) -> usize {
        self.positions[row]
    }

    pub fn advance(&mut self, row: usize) {
        self.positions[row] += 1;
    }

    pub fn is_exhausted(&self, matrix: &FallbackMatrix) -> bool {
        self.positions.iter().zip(matrix.rows()).any(|(pos, row)| *pos >= row.options.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> FallbackMatrix {
        FallbackMatrix::new(vec![
            FallbackRow::new(
                ErrorKind::ScfNoConv,
                vec![
                    OptionSet::Scf(vec![ScfOption::GuessCore]),
                    OptionSet::Scf(vec![ScfOption::GuessHuckel]),
                ],
            ),
            FallbackRow::new(
                ErrorKind::OptNoConv,
                vec![OptionSet::Opt(vec![OptOption::InternalCoords])],
            ),
        ])
    }

    #[test]
    fn overridden_replaces_only_its_category() {
        let base = JobOptions {
            scf: vec![ScfOption::MaxIter(50)],
            opt: vec![OptOption::MaxIter(20)],
        };
        let next = base.overridden(&OptionSet::Scf(vec![ScfOption::GuessHuckel]));
        assert_eq!(next.scf, vec![ScfOption::GuessHuckel]);
        assert_eq!(next.opt, vec![OptOption::MaxIter(20)]);
    }

    #[test]
    fn a_fresh_cursor_selects_every_row_head() {
        let m = matrix();
        let cursor = m.cursor();
        let current = cursor.current(&m);
        assert_eq!(current.len(), 2);
        assert_eq!(current[0], &OptionSet::Scf(vec![ScfOption::GuessCore]));
        assert_eq!(current[1], &OptionSet::Opt(vec![OptOption::InternalCoords]));
    }

    #[test]
    fn advancing_one_row_leaves_the_others_in_place() {
        let m = matrix();
        let mut cursor = m.cursor();
        cursor.advance(0);
        assert_eq!(cursor.position(0), 1);
        assert_eq!(cursor.position(1), 0);
        let current = cursor.current(&m);
        assert_eq!(current[0], &OptionSet::Scf(vec![ScfOption::GuessHuckel]));
    }

    #[test]
    fn the_cursor_is_exhausted_when_any_row_runs_out() {
        let m = matrix();
        let mut cursor = m.cursor();
        assert!(!cursor.is_exhausted(&m));
        cursor.advance(1);
        assert!(cursor.is_exhausted(&m));
        // Exhausted rows drop out of the current selection.
        assert_eq!(cursor.current(&m).len(), 1);
    }

    #[test]
    fn an_empty_matrix_never_exhausts() {
        let m = FallbackMatrix::default();
        let cursor = m.cursor();
        assert!(!cursor.is_exhausted(&m));
        assert!(cursor.current(&m).is_empty());
    }
}
